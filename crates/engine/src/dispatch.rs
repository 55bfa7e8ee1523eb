use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde_json::Value;
use shared::{
    domain::{LocaleTag, Phase, Seat, Session},
    protocol::{Acknowledgment, Action, ActionRequest, Outcome, RenderInstruction, View},
};
use storage::{SaveOutcome, SessionStore};
use tracing::{debug, error, warn};

use crate::{
    config::{ConcurrencyPolicy, EngineConfig},
    crash::{CrashReport, CrashReporter, Fault, LogReporter},
    game::{Game, GameFault, MoveInput, MoveOutcome},
    locale::{Languages, Translator},
    render::{self, KeyboardContext, Screen},
    transport::Transport,
};

const FORCED_CRASH: &str = "(forced crash)";
const NULL_STATE: &str = "game returned a null state";

/// Resolves actions against stored sessions and drives the transport.
pub struct Dispatcher {
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    game: Arc<dyn Game>,
    languages: Arc<Languages>,
    reporter: Arc<dyn CrashReporter>,
    config: EngineConfig,
}

/// Working state of one action.
struct Turn<'r> {
    request: &'r ActionRequest,
    session: Session,
    revision: Option<u64>,
    locale: LocaleTag,
}

struct Reply {
    outcome: Outcome,
    view: Option<View>,
    ack: Acknowledgment,
}

impl Reply {
    fn update(view: View) -> Self {
        Self {
            outcome: Outcome::Updated,
            view: Some(view),
            ack: Acknowledgment::silent(),
        }
    }

    fn rerender(view: View) -> Self {
        Self {
            outcome: Outcome::Acknowledged,
            view: Some(view),
            ack: Acknowledgment::silent(),
        }
    }

    fn acknowledged() -> Self {
        Self {
            outcome: Outcome::Acknowledged,
            view: None,
            ack: Acknowledgment::silent(),
        }
    }

    fn ignored() -> Self {
        Self {
            outcome: Outcome::Ignored,
            view: None,
            ack: Acknowledgment::silent(),
        }
    }

    fn reject(text: String) -> Self {
        Self {
            outcome: Outcome::Rejected,
            view: None,
            ack: Acknowledgment::alert(text),
        }
    }

    fn notice(text: String) -> Self {
        Self {
            outcome: Outcome::Rejected,
            view: None,
            ack: Acknowledgment::notice(text),
        }
    }

    fn storage_failure(tr: &Translator<'_>) -> Self {
        Self {
            outcome: Outcome::StorageFailure,
            view: None,
            ack: Acknowledgment::alert(retry_text(tr, "Database error!")),
        }
    }

    fn with_ack(mut self, ack: Acknowledgment) -> Self {
        self.ack = ack;
        self
    }
}

/// A null state would be stored as "no game" and silently end the match.
fn checked_state(state: Value) -> Result<Value, Fault> {
    if state.is_null() {
        return Err(GameFault::new(NULL_STATE).into());
    }
    Ok(state)
}

fn retry_text(tr: &Translator<'_>, headline: &str) -> String {
    format!("{}\n\n{}", tr.tr(headline), tr.tr("Try again in a few seconds."))
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
        game: Arc<dyn Game>,
        languages: Arc<Languages>,
    ) -> Self {
        Self {
            store,
            transport,
            game,
            languages,
            reporter: Arc::new(LogReporter),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CrashReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn game(&self) -> &dyn Game {
        self.game.as_ref()
    }

    /// Handles one event end to end. Never fails: every problem is mapped to
    /// an outcome and exactly one acknowledgment is sent when the request
    /// carries an event id.
    pub async fn handle(&self, request: &ActionRequest) -> RenderInstruction {
        let loaded = match self.store.load(&request.session_id).await {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(session = %request.session_id, error = %err, "failed to load session");
                let tr = self.languages.translator(self.languages.default_locale());
                return self.deliver(request, &tr, Reply::storage_failure(&tr)).await;
            }
        };

        let (session, revision) = match loaded {
            Some(stored) => (stored.session, Some(stored.revision)),
            None => {
                debug!(session = %request.session_id, "no stored session, starting empty");
                (Session::default(), None)
            }
        };

        let locale = self.languages.resolve(session.settings.language.as_ref());
        let action = Action::parse(&request.action);
        if let Action::Unknown(name) = &action {
            debug!(session = %request.session_id, action = %name, "ignoring unknown action");
            let tr = self.languages.translator(&locale);
            return self.deliver(request, &tr, Reply::ignored()).await;
        }

        debug!(
            session = %request.session_id,
            action = action.as_str(),
            %locale,
            "executing action"
        );

        let before = session.clone();
        let mut turn = Turn {
            request,
            session,
            revision,
            locale,
        };

        let result = AssertUnwindSafe(self.run(&action, &mut turn))
            .catch_unwind()
            .await;
        let fault = match result {
            Ok(Ok(reply)) => {
                let tr = self.languages.translator(&turn.locale);
                return self.deliver(request, &tr, reply).await;
            }
            Ok(Err(fault)) => fault,
            Err(panic) => Fault::from_panic(panic),
        };

        self.recover(turn, &before, fault).await
    }

    async fn run(&self, action: &Action, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        match action {
            Action::New => self.on_new(turn).await,
            Action::Join => self.on_join(turn).await,
            Action::Quit => self.on_quit(turn).await,
            Action::Kick => self.on_kick(turn).await,
            Action::Start => self.on_start(turn).await,
            Action::Move => self.on_move(turn).await,
            Action::Language => self.on_language(turn).await,
            Action::Crash => self.on_crash(),
            Action::Unknown(_) => Ok(Reply::ignored()),
        }
    }

    async fn on_new(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let actor = &turn.request.actor;
        let players = &turn.session.players;

        if players.host.is_some() && !players.is_host(actor) {
            return Ok(Reply::reject(tr.tr("This game is already created!")));
        }

        turn.session.players.host = Some(actor.clone());
        turn.session.players.guest = None;
        turn.session.data = None;

        if !self.persist(turn).await {
            return Ok(Reply::storage_failure(&tr));
        }
        Ok(Reply::update(self.phase_view(&turn.session, &tr)?))
    }

    async fn on_join(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let actor = &turn.request.actor;
        let players = &turn.session.players;

        if players.host.is_none() {
            debug!(player = %actor.id, "joined as host");
            turn.session.players.host = Some(actor.clone());
            turn.session.players.guest = None;
            turn.session.data = None;
        } else if players.guest.is_none() {
            if players.is_host(actor) && !self.config.is_debug_admin(actor.id) {
                return Ok(Reply::reject(tr.tr("You cannot play with yourself!")));
            }
            debug!(player = %actor.id, "joined as guest");
            turn.session.players.guest = Some(actor.clone());
        } else {
            return Ok(Reply::notice(tr.tr("This game is full!")));
        }

        if !self.persist(turn).await {
            return Ok(Reply::storage_failure(&tr));
        }
        Ok(Reply::update(self.phase_view(&turn.session, &tr)?))
    }

    async fn on_quit(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let actor = &turn.request.actor;

        let Some(seat) = turn.session.players.seat_of(actor) else {
            return Ok(Reply::reject(tr.tr("You're not in this game!")));
        };

        turn.session.data = None;
        match seat {
            Seat::Host => match turn.session.players.guest.take() {
                Some(guest) => {
                    debug!(from = %actor.id, to = %guest.id, "host migration");
                    turn.session.players.host = Some(guest);
                }
                None => {
                    debug!(player = %actor.id, "host quit, session is empty");
                    turn.session.players.host = None;
                }
            },
            Seat::Guest => {
                debug!(player = %actor.id, "guest quit");
                turn.session.players.guest = None;
            }
        }

        if !self.persist(turn).await {
            return Ok(Reply::storage_failure(&tr));
        }

        let view = match &turn.session.players.host {
            Some(host) => self.view(
                &tr,
                &format!("{}\n{}", render::quit_text(&tr, actor), render::lobby_text(&tr, host)),
                Screen::Lobby,
            ),
            None => self.view(&tr, &render::empty_text(&tr), Screen::Empty),
        };
        Ok(Reply::update(view))
    }

    async fn on_kick(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let actor = &turn.request.actor;

        if !turn.session.players.is_host(actor) {
            return Ok(Reply::reject(tr.tr("You're not the host!")));
        }

        let Some(guest) = turn.session.players.guest.take() else {
            debug!(player = %actor.id, "kick without a guest");
            return Ok(Reply::acknowledged());
        };
        debug!(host = %actor.id, guest = %guest.id, "guest kicked");
        turn.session.data = None;

        if !self.persist(turn).await {
            return Ok(Reply::storage_failure(&tr));
        }

        let body = match &turn.session.players.host {
            Some(host) => format!(
                "{}\n{}",
                render::kicked_text(&tr, &guest),
                render::lobby_text(&tr, host)
            ),
            None => render::kicked_text(&tr, &guest),
        };
        Ok(Reply::update(self.view(&tr, &body, Screen::Lobby)))
    }

    async fn on_start(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let actor = &turn.request.actor;
        let players = &turn.session.players;

        if players.host.is_none() {
            return Ok(Reply::rerender(self.view(
                &tr,
                &render::empty_text(&tr),
                Screen::Empty,
            )));
        }

        match players.seat_of(actor) {
            None => return Ok(Reply::reject(tr.tr("You're not in this game!"))),
            Some(Seat::Guest) => return Ok(Reply::reject(tr.tr("You're not the host!"))),
            Some(Seat::Host) => {}
        }

        if players.guest.is_none() {
            debug!(player = %actor.id, "start requested without a guest");
            return Ok(Reply::rerender(self.phase_view(&turn.session, &tr)?));
        }

        let state = checked_state(self.game.new_game(&turn.session.players)?)?;
        turn.session.data = Some(state);
        debug!(player = %actor.id, "game started");

        if !self.persist(turn).await {
            return Ok(Reply::storage_failure(&tr));
        }
        Ok(Reply::update(self.phase_view(&turn.session, &tr)?))
    }

    async fn on_move(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        let tr = self.translator(turn);
        let request = turn.request;

        let Some(seat) = turn.session.players.seat_of(&request.actor) else {
            return Ok(Reply::reject(tr.tr("You're not in this game!")));
        };

        let state = match &turn.session.data {
            Some(state) if turn.session.players.is_full() => state.clone(),
            _ => {
                debug!(session = %request.session_id, "move without game data");
                return Ok(Reply::rerender(self.phase_view(&turn.session, &tr)?)
                    .with_ack(Acknowledgment::alert(tr.tr("Error!"))));
            }
        };

        let outcome = self.game.apply_move(MoveInput {
            state: &state,
            seat,
            players: &turn.session.players,
            token: request.token.as_deref(),
            tr: &tr,
        })?;

        match outcome {
            MoveOutcome::Accepted(next) => {
                turn.session.data = Some(checked_state(next)?);
                if !self.persist(turn).await {
                    return Ok(Reply::storage_failure(&tr));
                }
                Ok(Reply::update(self.phase_view(&turn.session, &tr)?))
            }
            MoveOutcome::Rejected(text) => Ok(Reply::reject(text)),
            MoveOutcome::Ignored => Ok(Reply::acknowledged()),
        }
    }

    async fn on_language(&self, turn: &mut Turn<'_>) -> Result<Reply, Fault> {
        if turn.revision.is_none() && turn.session.phase() == Phase::Empty {
            debug!(session = %turn.request.session_id, "language change on a session that does not exist");
            let tr = self.translator(turn);
            return Ok(Reply::rerender(self.phase_view(&turn.session, &tr)?));
        }

        let previous = turn.session.settings.language.clone();
        let next = self.languages.next_after(&turn.locale);
        turn.session.settings.language = Some(next.clone());

        if !self.persist(turn).await {
            warn!(
                session = %turn.request.session_id,
                locale = %next,
                "language change not saved, keeping previous locale"
            );
            turn.session.settings.language = previous;
            let tr = self.translator(turn);
            return Ok(Reply::rerender(self.phase_view(&turn.session, &tr)?));
        }

        debug!(locale = %next, "language changed");
        turn.locale = next;
        let tr = self.translator(turn);
        Ok(Reply::update(self.phase_view(&turn.session, &tr)?))
    }

    fn on_crash(&self) -> Result<Reply, Fault> {
        if !self.config.debug_mode {
            return Ok(Reply::acknowledged());
        }
        Err(Fault::Malformed(FORCED_CRASH.to_string()))
    }

    fn translator(&self, turn: &Turn<'_>) -> Translator<'_> {
        self.languages.translator(&turn.locale)
    }

    /// Stamps the game code and writes the session. Under the optimistic
    /// policy the write only lands if nobody saved since it was loaded.
    async fn persist(&self, turn: &mut Turn<'_>) -> bool {
        turn.session.game_code = Some(self.game.code().to_string());
        let expected = match self.config.concurrency {
            ConcurrencyPolicy::Optimistic => Some(turn.revision.unwrap_or(0)),
            ConcurrencyPolicy::LastWriteWins => None,
        };

        match self
            .store
            .save(&turn.request.session_id, &turn.session, expected)
            .await
        {
            Ok(SaveOutcome::Saved { revision }) => {
                turn.revision = Some(revision);
                true
            }
            Ok(SaveOutcome::Conflict) => {
                warn!(
                    session = %turn.request.session_id,
                    expected = ?expected,
                    "session changed concurrently, action rejected"
                );
                false
            }
            Err(err) => {
                error!(session = %turn.request.session_id, error = %err, "failed to save session");
                false
            }
        }
    }

    fn view(&self, tr: &Translator<'_>, body: &str, screen: Screen<'_>) -> View {
        let ctx = KeyboardContext {
            game_code: self.game.code(),
            locale_count: self.languages.count(),
            language_label: self.languages.display_name(tr.locale()),
            debug: self.config.debug_mode,
        };
        View {
            text: render::titled(self.game.title(), body),
            keyboard: render::keyboard(screen, &ctx, tr),
        }
    }

    fn phase_view(&self, session: &Session, tr: &Translator<'_>) -> Result<View, Fault> {
        let players = &session.players;
        Ok(match (session.phase(), &players.host, &players.guest, &session.data) {
            (Phase::Lobby, Some(host), _, _) => {
                self.view(tr, &render::lobby_text(tr, host), Screen::Lobby)
            }
            (Phase::Pregame, Some(host), Some(guest), _) => self.view(
                tr,
                &render::pregame_text(tr, host, guest),
                Screen::Pregame,
            ),
            (Phase::InGame, _, _, Some(state)) => self.board_view(session, state, tr)?,
            _ => self.view(tr, &render::empty_text(tr), Screen::Empty),
        })
    }

    fn board_view(&self, session: &Session, state: &Value, tr: &Translator<'_>) -> Result<View, Fault> {
        let board = self.game.render_board(state, &session.players, tr)?;
        if self.config.debug_mode {
            if let Some(dump) = self.game.board_dump(state) {
                debug!("current board:\n{dump}");
            }
        }
        Ok(self.view(tr, &board.text, Screen::InGame(&board)))
    }

    async fn deliver(
        &self,
        request: &ActionRequest,
        tr: &Translator<'_>,
        reply: Reply,
    ) -> RenderInstruction {
        let Reply { outcome, view, ack } = reply;

        if let Some(view) = &view {
            if let Err(err) = self.transport.edit_view(&request.session_id, view).await {
                if err.is_tolerated(&self.config.tolerated_transport_errors) {
                    debug!(session = %request.session_id, error = %err, "tolerated transport error");
                } else {
                    error!(session = %request.session_id, error = %err, "transport rejected view update");
                    let ack = Acknowledgment::alert(retry_text(tr, "Messaging service error!"));
                    self.acknowledge(request, &ack).await;
                    return RenderInstruction {
                        outcome: Outcome::TransportFailure,
                        view: None,
                        ack,
                    };
                }
            }
        }

        self.acknowledge(request, &ack).await;
        debug!(session = %request.session_id, outcome = ?outcome, "action handled");
        RenderInstruction { outcome, view, ack }
    }

    async fn acknowledge(&self, request: &ActionRequest, ack: &Acknowledgment) {
        let Some(event_id) = &request.event_id else {
            return;
        };
        if let Err(err) = self.transport.acknowledge(event_id, ack).await {
            warn!(session = %request.session_id, event = %event_id, error = %err, "acknowledgment failed");
        }
    }

    /// Reports the fault, resets the session and tells the viewer. The crash
    /// notice is only shown once the empty session is safely stored.
    async fn recover(&self, turn: Turn<'_>, before: &Session, fault: Fault) -> RenderInstruction {
        let request = turn.request;
        let report = CrashReport::new(
            &request.session_id,
            self.game.title(),
            before,
            &turn.session,
            request.payload_or_placeholder(),
            &fault,
        );
        self.reporter.report(&report);

        let tr = self.translator(&turn);
        let mut empty = turn.session;
        empty.reset();
        empty.game_code = Some(self.game.code().to_string());

        let view = match self.store.save(&request.session_id, &empty, None).await {
            Ok(SaveOutcome::Saved { .. }) => {
                let view = self.view(
                    &tr,
                    &render::crashed_text(&tr, &request.session_id),
                    Screen::Empty,
                );
                match self.transport.edit_view(&request.session_id, &view).await {
                    Ok(()) => Some(view),
                    Err(err) if err.is_tolerated(&self.config.tolerated_transport_errors) => Some(view),
                    Err(err) => {
                        error!(session = %request.session_id, error = %err, "crash notice not shown");
                        None
                    }
                }
            }
            Ok(SaveOutcome::Conflict) => {
                error!(session = %request.session_id, "crashed session could not be reset");
                None
            }
            Err(err) => {
                error!(session = %request.session_id, error = %err, "crashed session could not be reset");
                None
            }
        };

        let ack = Acknowledgment::alert(tr.tr("Critical error!"));
        self.acknowledge(request, &ack).await;
        RenderInstruction {
            outcome: Outcome::Crashed,
            view,
            ack,
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
