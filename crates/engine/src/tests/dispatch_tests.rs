use super::*;

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{EventId, Phase, PlayerRef, Players, SessionId, UserId},
    error::TransportError,
    protocol::{Acknowledgment, ActionRequest},
};
use storage::{MemoryStore, StoredSession};

use crate::{
    game::{Board, Cell, GameFault},
    locale::Catalog,
};

const SESSION: &str = "inline-1";

fn alice() -> PlayerRef {
    PlayerRef::new(UserId(1), "Alice")
}

fn bob() -> PlayerRef {
    PlayerRef::new(UserId(2), "Bob")
}

fn carol() -> PlayerRef {
    PlayerRef::new(UserId(3), "Carol")
}

#[derive(Default)]
struct RecordingTransport {
    edits: Mutex<Vec<View>>,
    acks: Mutex<Vec<(EventId, Acknowledgment)>>,
    edit_error: Mutex<Option<TransportError>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn edit_view(&self, _session_id: &SessionId, view: &View) -> Result<(), TransportError> {
        if let Some(err) = self.edit_error.lock().expect("lock").clone() {
            return Err(err);
        }
        self.edits.lock().expect("lock").push(view.clone());
        Ok(())
    }

    async fn acknowledge(
        &self,
        event_id: &EventId,
        ack: &Acknowledgment,
    ) -> Result<(), TransportError> {
        self.acks
            .lock()
            .expect("lock")
            .push((event_id.clone(), ack.clone()));
        Ok(())
    }
}

/// Memory store with switchable failures and a simulated concurrent writer.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    interfere: AtomicBool,
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn load(&self, id: &SessionId) -> anyhow::Result<Option<StoredSession>> {
        if self.fail_load.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.inner.load(id).await
    }

    async fn save(
        &self,
        id: &SessionId,
        session: &Session,
        expected_revision: Option<u64>,
    ) -> anyhow::Result<SaveOutcome> {
        if self.fail_save.load(Ordering::SeqCst) {
            anyhow::bail!("disk I/O error");
        }
        if self.interfere.swap(false, Ordering::SeqCst) {
            if let Some(stored) = self.inner.load(id).await? {
                self.inner.save(id, &stored.session, None).await?;
            }
        }
        self.inner.save(id, session, expected_revision).await
    }
}

#[derive(Default)]
struct CollectingReporter {
    reports: Mutex<Vec<CrashReport>>,
}

impl CrashReporter for CollectingReporter {
    fn report(&self, report: &CrashReport) {
        self.reports.lock().expect("lock").push(report.clone());
    }
}

/// Tap counter. Token `tap` adds one; `nope`, `fault`, `panic` and `void`
/// exercise the rejection and crash paths.
#[derive(Default)]
struct CounterGame {
    fail_on_start: bool,
    null_on_start: bool,
}

fn count_of(state: &Value) -> Result<i64, GameFault> {
    state
        .get("count")
        .and_then(Value::as_i64)
        .ok_or_else(|| GameFault::new("missing count"))
}

impl Game for CounterGame {
    fn code(&self) -> &str {
        "ct"
    }

    fn title(&self) -> &str {
        "Counter"
    }

    fn new_game(&self, _players: &Players) -> Result<Value, GameFault> {
        if self.fail_on_start {
            return Err(GameFault::new("cannot deal"));
        }
        if self.null_on_start {
            return Ok(Value::Null);
        }
        Ok(json!({ "count": 0 }))
    }

    fn apply_move(&self, input: MoveInput<'_>) -> Result<MoveOutcome, GameFault> {
        let count = count_of(input.state)?;
        match input.token {
            Some("tap") => Ok(MoveOutcome::Accepted(json!({ "count": count + 1 }))),
            Some("nope") => Ok(MoveOutcome::Rejected(input.tr.tr("Not your turn!"))),
            Some("fault") => Err(GameFault::new("tripped")),
            Some("panic") => panic!("counter exploded"),
            Some("void") => Ok(MoveOutcome::Accepted(Value::Null)),
            _ => Ok(MoveOutcome::Ignored),
        }
    }

    fn render_board(
        &self,
        state: &Value,
        _players: &Players,
        _tr: &Translator<'_>,
    ) -> Result<Board, GameFault> {
        let count = count_of(state)?;
        Ok(Board {
            text: format!("Count: {count}"),
            rows: vec![vec![Cell::new("+", "tap")]],
            finished: count >= 3,
        })
    }

    fn board_dump(&self, state: &Value) -> Option<String> {
        count_of(state).ok().map(|count| format!("count={count}"))
    }
}

struct Harness {
    store: Arc<FlakyStore>,
    transport: Arc<RecordingTransport>,
    reporter: Arc<CollectingReporter>,
    dispatcher: Dispatcher,
    events: AtomicUsize,
}

fn harness() -> Harness {
    harness_with(EngineConfig::default(), CounterGame::default())
}

fn harness_with(config: EngineConfig, game: CounterGame) -> Harness {
    let mut catalog = Catalog::new();
    catalog.insert("pl", "Join", "Dołącz");
    let languages = Languages::with_locales(
        LocaleTag::new("en"),
        ["en", "pl", "de"].into_iter().map(LocaleTag::new),
    )
    .with_catalog(catalog);

    let store = Arc::new(FlakyStore::default());
    let transport = Arc::new(RecordingTransport::default());
    let reporter = Arc::new(CollectingReporter::default());
    let dispatcher = Dispatcher::new(
        store.clone(),
        transport.clone(),
        Arc::new(game),
        Arc::new(languages),
    )
    .with_config(config)
    .with_reporter(reporter.clone());

    Harness {
        store,
        transport,
        reporter,
        dispatcher,
        events: AtomicUsize::new(0),
    }
}

impl Harness {
    fn request(&self, actor: &PlayerRef, action: &str) -> ActionRequest {
        let event = self.events.fetch_add(1, Ordering::SeqCst);
        ActionRequest::new(SessionId::new(SESSION), actor.clone(), action)
            .with_event(EventId::new(format!("ev-{event}")))
    }

    async fn act(&self, actor: &PlayerRef, action: &str) -> RenderInstruction {
        let request = self.request(actor, action);
        self.dispatcher.handle(&request).await
    }

    async fn play(&self, actor: &PlayerRef, token: &str) -> RenderInstruction {
        let request = self.request(actor, "move").with_token(token);
        self.dispatcher.handle(&request).await
    }

    async fn session(&self) -> Session {
        self.stored().await.map(|stored| stored.session).unwrap_or_default()
    }

    async fn stored(&self) -> Option<StoredSession> {
        self.store
            .inner
            .load(&SessionId::new(SESSION))
            .await
            .expect("load")
    }

    async fn blob(&self) -> Option<String> {
        self.store.inner.raw_blob(&SessionId::new(SESSION)).await
    }

    async fn pregame(&self) {
        self.act(&alice(), "new").await;
        self.act(&bob(), "join").await;
    }

    fn acks(&self) -> Vec<(EventId, Acknowledgment)> {
        self.transport.acks.lock().expect("lock").clone()
    }

    fn last_ack(&self) -> Acknowledgment {
        self.acks().last().map(|(_, ack)| ack.clone()).unwrap_or_default()
    }

    fn edits(&self) -> Vec<View> {
        self.transport.edits.lock().expect("lock").clone()
    }

    fn fail_edits_with(&self, description: &str) {
        *self.transport.edit_error.lock().expect("lock") =
            Some(TransportError::new(400, description));
    }
}

#[tokio::test]
async fn new_creates_lobby_with_actor_as_host() {
    let h = harness();

    let result = h.act(&alice(), "new").await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert!(result.ack.is_silent());

    let session = h.session().await;
    assert_eq!(session.players.host, Some(alice()));
    assert_eq!(session.players.guest, None);
    assert_eq!(session.game_code.as_deref(), Some("ct"));

    let view = result.view.expect("view");
    assert!(view.text.starts_with("<b>Counter</b>\n\n"));
    assert!(view.text.contains("is waiting for opponent to join..."));
    assert_eq!(view.keyboard.payloads(), vec!["ct;language", "ct;quit", "ct;join"]);
    assert_eq!(h.edits(), vec![view]);
    assert_eq!(h.acks().len(), 1);
}

#[tokio::test]
async fn new_is_idempotent_for_host_and_rejected_for_others() {
    let h = harness();
    h.act(&alice(), "new").await;
    h.act(&alice(), "new").await;
    assert_eq!(h.session().await.players.host, Some(alice()));

    let result = h.act(&bob(), "new").await;
    assert_eq!(result.outcome, Outcome::Rejected);
    assert_eq!(result.ack, Acknowledgment::alert("This game is already created!"));
    assert_eq!(h.session().await.players.host, Some(alice()));
}

#[tokio::test]
async fn join_fills_host_then_guest_then_reports_full() {
    let h = harness();

    assert_eq!(h.act(&alice(), "join").await.outcome, Outcome::Updated);
    assert_eq!(h.session().await.players.host, Some(alice()));

    let result = h.act(&alice(), "join").await;
    assert_eq!(result.outcome, Outcome::Rejected);
    assert_eq!(result.ack, Acknowledgment::alert("You cannot play with yourself!"));

    let result = h.act(&bob(), "join").await;
    assert_eq!(result.outcome, Outcome::Updated);
    let view = result.view.expect("view");
    assert!(view.text.contains("Bob</a> joined..."));
    assert_eq!(view.keyboard.payloads()[0], "ct;start");

    let result = h.act(&carol(), "join").await;
    assert_eq!(result.outcome, Outcome::Rejected);
    assert_eq!(result.ack, Acknowledgment::notice("This game is full!"));

    let session = h.session().await;
    assert_eq!(session.players.host, Some(alice()));
    assert_eq!(session.players.guest, Some(bob()));
}

#[tokio::test]
async fn debug_admin_may_join_own_game() {
    let h = harness_with(
        EngineConfig::debug().with_admin(UserId(1)),
        CounterGame::default(),
    );
    h.act(&alice(), "join").await;

    let result = h.act(&alice(), "join").await;
    assert_eq!(result.outcome, Outcome::Updated);
    let session = h.session().await;
    assert_eq!(session.players.guest, Some(alice()));
}

#[tokio::test]
async fn host_quit_promotes_guest_and_clears_game() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;

    let result = h.act(&alice(), "quit").await;
    assert_eq!(result.outcome, Outcome::Updated);
    let text = result.view.expect("view").text;
    assert!(text.contains("Alice</a> quit..."));
    assert!(text.contains("Bob</a> is waiting for opponent to join..."));

    let session = h.session().await;
    assert_eq!(session.players.host, Some(bob()));
    assert_eq!(session.players.guest, None);
    assert_eq!(session.data, None);
}

#[tokio::test]
async fn lone_host_quit_empties_session() {
    let h = harness();
    h.act(&alice(), "new").await;

    let result = h.act(&alice(), "quit").await;
    let view = result.view.expect("view");
    assert!(view.text.contains("This game session is empty."));
    assert_eq!(view.keyboard.payloads(), vec!["ct;new"]);

    let session = h.session().await;
    assert_eq!(session.players.host, None);
    assert_eq!(session.phase(), Phase::Empty);
}

#[tokio::test]
async fn guest_quit_returns_to_lobby() {
    let h = harness();
    h.pregame().await;

    h.act(&bob(), "quit").await;
    let session = h.session().await;
    assert_eq!(session.players.host, Some(alice()));
    assert_eq!(session.players.guest, None);

    let result = h.act(&carol(), "quit").await;
    assert_eq!(result.ack, Acknowledgment::alert("You're not in this game!"));
}

#[tokio::test]
async fn kick_is_host_only() {
    let h = harness();
    h.pregame().await;

    let result = h.act(&bob(), "kick").await;
    assert_eq!(result.outcome, Outcome::Rejected);
    assert_eq!(result.ack, Acknowledgment::alert("You're not the host!"));
    assert_eq!(h.session().await.players.guest, Some(bob()));

    let result = h.act(&alice(), "kick").await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert!(result.view.expect("view").text.contains("Bob</a> was kicked..."));
    assert_eq!(h.session().await.players.guest, None);

    let edits_before = h.edits().len();
    let result = h.act(&alice(), "kick").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert!(result.ack.is_silent());
    assert_eq!(h.edits().len(), edits_before);
}

#[tokio::test]
async fn start_with_host_only_rerenders_lobby() {
    let h = harness();
    h.act(&alice(), "new").await;
    let before = h.stored().await.expect("stored");

    let result = h.act(&alice(), "start").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert!(result.ack.is_silent());
    assert!(result.view.expect("view").text.contains("is waiting for opponent"));
    assert_eq!(h.stored().await, Some(before));
}

#[tokio::test]
async fn start_checks_membership_and_host() {
    let h = harness();
    h.pregame().await;

    let result = h.act(&carol(), "start").await;
    assert_eq!(result.ack, Acknowledgment::alert("You're not in this game!"));

    let result = h.act(&bob(), "start").await;
    assert_eq!(result.ack, Acknowledgment::alert("You're not the host!"));
    assert_eq!(h.session().await.data, None);
}

#[tokio::test]
async fn start_creates_game_and_moves_update_it() {
    let h = harness();
    h.pregame().await;

    let result = h.act(&alice(), "start").await;
    assert_eq!(result.outcome, Outcome::Updated);
    let view = result.view.expect("view");
    assert!(view.text.ends_with("Count: 0"));
    assert_eq!(view.keyboard.payloads(), vec!["ct;move;tap", "ct;quit", "ct;kick"]);
    assert_eq!(h.session().await.data, Some(json!({ "count": 0 })));

    h.play(&bob(), "tap").await;
    h.play(&alice(), "tap").await;
    let result = h.play(&bob(), "tap").await;
    let view = result.view.expect("view");
    assert!(view.text.ends_with("Count: 3"));
    assert!(view.keyboard.payloads().contains(&"ct;start"));

    let result = h.play(&alice(), "nope").await;
    assert_eq!(result.outcome, Outcome::Rejected);
    assert_eq!(result.ack, Acknowledgment::alert("Not your turn!"));

    let result = h.play(&alice(), "").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert_eq!(h.session().await.data, Some(json!({ "count": 3 })));
}

#[tokio::test]
async fn game_alias_routes_to_move() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;

    let request = h.request(&alice(), "game").with_token("tap");
    let result = h.dispatcher.handle(&request).await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert_eq!(h.session().await.data, Some(json!({ "count": 1 })));
}

#[tokio::test]
async fn move_outside_game_is_refused() {
    let h = harness();
    h.pregame().await;

    let result = h.play(&carol(), "tap").await;
    assert_eq!(result.ack, Acknowledgment::alert("You're not in this game!"));

    let result = h.play(&alice(), "tap").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert_eq!(result.ack, Acknowledgment::alert("Error!"));
    assert!(result.view.expect("view").text.contains("Bob</a> joined..."));
    assert_eq!(h.session().await.data, None);
}

#[tokio::test]
async fn language_cycles_through_supported_locales() {
    let h = harness();
    h.act(&alice(), "new").await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let result = h.act(&alice(), "language").await;
        assert_eq!(result.outcome, Outcome::Updated);
        let session = h.session().await;
        seen.push(session.settings.language.expect("language").to_string());

        let view = result.view.expect("view");
        let label = view.keyboard.rows[0][0].label.clone();
        seen.push(label);
    }

    assert_eq!(seen, vec!["pl", "Polski", "de", "Deutsch", "en", "English"]);
}

#[tokio::test]
async fn language_view_uses_new_catalog() {
    let h = harness();
    h.act(&alice(), "new").await;

    let result = h.act(&alice(), "language").await;
    let view = result.view.expect("view");
    assert_eq!(view.keyboard.rows[1][1].label, "Dołącz");
}

#[tokio::test]
async fn language_keeps_old_locale_when_save_fails() {
    let h = harness();
    h.act(&alice(), "new").await;
    h.store.fail_save.store(true, Ordering::SeqCst);

    let result = h.act(&alice(), "language").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert!(result.ack.is_silent());
    let view = result.view.expect("view");
    assert_eq!(view.keyboard.rows[0][0].label, "English");
    assert_eq!(h.session().await.settings.language, None);
}

#[tokio::test]
async fn language_on_missing_session_creates_nothing() {
    let h = harness();

    let result = h.act(&alice(), "language").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert!(result.view.expect("view").text.contains("This game session is empty."));
    assert_eq!(h.blob().await, None);
    assert!(h.store.inner.is_empty().await);
}

#[tokio::test]
async fn unknown_action_leaves_stored_blob_untouched() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;
    let before = h.blob().await;
    let edits_before = h.edits().len();

    let result = h.act(&alice(), "dance").await;
    assert_eq!(result.outcome, Outcome::Ignored);
    assert!(result.ack.is_silent());
    assert_eq!(h.blob().await, before);
    assert_eq!(h.edits().len(), edits_before);

    let request = ActionRequest::from_callback(
        SessionId::new(SESSION),
        EventId::new("raw"),
        alice(),
        "garbage",
    );
    let result = h.dispatcher.handle(&request).await;
    assert_eq!(result.outcome, Outcome::Ignored);
    assert_eq!(h.blob().await, before);
}

#[tokio::test]
async fn fault_during_start_resets_session_and_reports_once() {
    let h = harness_with(EngineConfig::default(), CounterGame {
            fail_on_start: true,
            ..CounterGame::default()
        });
    h.pregame().await;
    let acks_before = h.acks().len();

    let result = h.act(&alice(), "start").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert_eq!(result.ack, Acknowledgment::alert("Critical error!"));

    let session = h.session().await;
    assert_eq!(
        session,
        Session {
            game_code: Some("ct".into()),
            ..Session::default()
        }
    );

    let reports = h.reporter.reports.lock().expect("lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, "game fault: cannot deal");
    assert!(reports[0].before.contains("Bob"));

    assert_eq!(h.acks().len(), acks_before + 1);
    let notice = h.edits().last().cloned().expect("crash notice");
    assert!(notice.text.contains("This game session has crashed."));
    assert!(notice.text.contains("(ID: inline-1)"));
    assert_eq!(notice.keyboard.payloads(), vec!["ct;new"]);
}

#[tokio::test]
async fn panic_inside_move_is_contained() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;

    let result = h.play(&alice(), "panic").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert_eq!(h.session().await.phase(), Phase::Empty);

    let reports = h.reporter.reports.lock().expect("lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, "handler panicked: counter exploded");

    let result = h.act(&alice(), "new").await;
    assert_eq!(result.outcome, Outcome::Updated);
}

#[tokio::test]
async fn crash_without_reset_hides_notice() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;
    h.store.fail_save.store(true, Ordering::SeqCst);
    let edits_before = h.edits().len();

    let result = h.play(&alice(), "fault").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert_eq!(result.view, None);
    assert_eq!(h.edits().len(), edits_before);
    assert_eq!(h.last_ack(), Acknowledgment::alert("Critical error!"));
    assert_eq!(h.session().await.data, Some(json!({ "count": 0 })));
}

#[tokio::test]
async fn crash_action_needs_debug_mode() {
    let h = harness();
    h.act(&alice(), "new").await;
    let result = h.act(&alice(), "crash").await;
    assert_eq!(result.outcome, Outcome::Acknowledged);
    assert!(h.reporter.reports.lock().expect("lock").is_empty());

    let h = harness_with(EngineConfig::debug(), CounterGame::default());
    let result = h.act(&alice(), "new").await;
    let payloads = result.view.expect("view").keyboard.payloads().join(" ");
    assert!(payloads.ends_with("ct;crash"));

    let result = h.act(&alice(), "crash").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    let reports = h.reporter.reports.lock().expect("lock").clone();
    assert_eq!(reports[0].result, "malformed handler result: (forced crash)");
    assert_eq!(reports[0].payload, shared::protocol::NO_CALLBACK_PAYLOAD);
}

#[tokio::test]
async fn load_failure_is_reported_as_database_error() {
    let h = harness();
    h.store.fail_load.store(true, Ordering::SeqCst);

    let result = h.act(&alice(), "new").await;
    assert_eq!(result.outcome, Outcome::StorageFailure);
    assert_eq!(
        result.ack,
        Acknowledgment::alert("Database error!\n\nTry again in a few seconds.")
    );
    assert!(h.edits().is_empty());
    assert_eq!(h.acks().len(), 1);
}

#[tokio::test]
async fn save_failure_leaves_session_unchanged() {
    let h = harness();
    h.act(&alice(), "new").await;
    let before = h.blob().await;
    h.store.fail_save.store(true, Ordering::SeqCst);

    let result = h.act(&bob(), "join").await;
    assert_eq!(result.outcome, Outcome::StorageFailure);
    assert_eq!(result.view, None);
    assert_eq!(h.blob().await, before);
}

#[tokio::test]
async fn concurrent_write_is_rejected_under_optimistic_policy() {
    let h = harness();
    h.act(&alice(), "new").await;
    h.store.interfere.store(true, Ordering::SeqCst);

    let result = h.act(&bob(), "join").await;
    assert_eq!(result.outcome, Outcome::StorageFailure);
    assert_eq!(h.session().await.players.guest, None);

    let result = h.act(&bob(), "join").await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert_eq!(h.session().await.players.guest, Some(bob()));
}

#[tokio::test]
async fn last_write_wins_overwrites_concurrent_write() {
    let h = harness_with(
        EngineConfig::default().with_concurrency(ConcurrencyPolicy::LastWriteWins),
        CounterGame::default(),
    );
    h.act(&alice(), "new").await;
    h.store.interfere.store(true, Ordering::SeqCst);

    let result = h.act(&bob(), "join").await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert_eq!(h.stored().await.expect("stored").revision, 3);
}

#[tokio::test]
async fn not_modified_transport_error_is_tolerated() {
    let h = harness();
    h.act(&alice(), "new").await;
    h.fail_edits_with("Bad Request: message is not modified");

    let result = h.act(&alice(), "new").await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert!(result.ack.is_silent());
}

#[tokio::test]
async fn other_transport_errors_surface_once() {
    let h = harness();
    h.fail_edits_with("Bad Request: chat not found");
    let acks_before = h.acks().len();

    let result = h.act(&alice(), "new").await;
    assert_eq!(result.outcome, Outcome::TransportFailure);
    assert_eq!(
        result.ack,
        Acknowledgment::alert("Messaging service error!\n\nTry again in a few seconds.")
    );
    assert_eq!(h.acks().len(), acks_before + 1);
}

#[tokio::test]
async fn requests_without_event_are_not_acknowledged() {
    let h = harness();
    let request = ActionRequest::new(SessionId::new(SESSION), alice(), "new");

    let result = h.dispatcher.handle(&request).await;
    assert_eq!(result.outcome, Outcome::Updated);
    assert!(h.acks().is_empty());
    assert_eq!(h.edits().len(), 1);
}

#[tokio::test]
async fn stored_session_stays_consistent_across_lifecycle() {
    let h = harness();
    let script: &[(PlayerRef, &str, Option<&str>)] = &[
        (bob(), "start", None),
        (alice(), "join", None),
        (carol(), "kick", None),
        (bob(), "join", None),
        (alice(), "start", None),
        (bob(), "move", Some("tap")),
        (carol(), "join", None),
        (alice(), "kick", None),
        (carol(), "join", None),
        (alice(), "language", None),
        (alice(), "start", None),
        (carol(), "quit", None),
        (alice(), "quit", None),
        (carol(), "move", Some("tap")),
        (carol(), "quit", None),
    ];

    for (actor, action, token) in script {
        let mut request = h.request(actor, action);
        if let Some(token) = token {
            request = request.with_token(*token);
        }
        h.dispatcher.handle(&request).await;

        let session = h.session().await;
        assert!(session.is_consistent(), "inconsistent after {action}: {session:?}");
    }

    assert_eq!(h.session().await.phase(), Phase::Empty);
    assert_eq!(h.acks().len(), script.len());
}

#[tokio::test]
async fn null_state_from_start_is_a_crash() {
    let h = harness_with(
        EngineConfig::default(),
        CounterGame {
            null_on_start: true,
            ..CounterGame::default()
        },
    );
    h.pregame().await;

    let result = h.act(&alice(), "start").await;
    assert_eq!(result.outcome, Outcome::Crashed);

    let session = h.session().await;
    assert_eq!(session.phase(), Phase::Empty);
    assert_eq!(session.data, None);

    let reports = h.reporter.reports.lock().expect("lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, "game fault: game returned a null state");
}

#[tokio::test]
async fn null_state_from_move_is_a_crash() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;

    let result = h.play(&bob(), "void").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert_eq!(h.session().await.phase(), Phase::Empty);
    assert_eq!(h.reporter.reports.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn started_game_stays_in_game_after_reload() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;
    h.play(&bob(), "tap").await;

    let stored = h.stored().await.expect("stored");
    assert_eq!(stored.session.phase(), Phase::InGame);
    let reloaded = Session::from_json(&stored.session.to_json().expect("encode")).expect("decode");
    assert_eq!(reloaded, stored.session);
}

#[tokio::test]
async fn failed_crash_notice_is_not_reported_as_shown() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;
    h.fail_edits_with("Bad Request: chat not found");

    let result = h.play(&alice(), "fault").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert_eq!(result.view, None);
    assert_eq!(h.last_ack(), Acknowledgment::alert("Critical error!"));
    assert_eq!(h.session().await.phase(), Phase::Empty);
}

#[tokio::test]
async fn tolerated_crash_notice_error_still_counts_as_shown() {
    let h = harness();
    h.pregame().await;
    h.act(&alice(), "start").await;
    h.fail_edits_with("Bad Request: message is not modified");

    let result = h.play(&alice(), "fault").await;
    assert_eq!(result.outcome, Outcome::Crashed);
    assert!(result.view.expect("view").text.contains("has crashed"));
}
