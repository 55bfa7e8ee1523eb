//! View renderer: keyboards and message bodies for each phase.
//!
//! Everything here is a pure function of its arguments.

use shared::{
    domain::{PlayerRef, SessionId},
    protocol::{Action, Button, CallbackData, Keyboard},
};

use crate::{game::Board, locale::Translator};

pub const DEBUG_PREFIX: &str = "DEBUG: ";

#[derive(Debug, Clone, Copy)]
pub enum Screen<'a> {
    Empty,
    Lobby,
    Pregame,
    InGame(&'a Board),
}

#[derive(Debug, Clone)]
pub struct KeyboardContext<'a> {
    pub game_code: &'a str,
    pub locale_count: usize,
    /// Display name of the current locale.
    pub language_label: String,
    pub debug: bool,
}

impl KeyboardContext<'_> {
    fn button(&self, label: impl Into<String>, action: &Action) -> Button {
        Button::new(label, &CallbackData::new(self.game_code, action.as_str()))
    }

    fn language_row(&self) -> Option<Vec<Button>> {
        (self.locale_count > 1).then(|| vec![self.button(self.language_label.clone(), &Action::Language)])
    }
}

pub fn keyboard(screen: Screen<'_>, ctx: &KeyboardContext<'_>, tr: &Translator<'_>) -> Keyboard {
    let mut keyboard = Keyboard::default();

    match screen {
        Screen::Empty => {
            keyboard.push_row(vec![ctx.button(tr.tr("Create"), &Action::New)]);
        }
        Screen::Lobby => {
            if let Some(row) = ctx.language_row() {
                keyboard.push_row(row);
            }
            keyboard.push_row(vec![
                ctx.button(tr.tr("Quit"), &Action::Quit),
                ctx.button(tr.tr("Join"), &Action::Join),
            ]);
        }
        Screen::Pregame => {
            keyboard.push_row(vec![ctx.button(tr.tr("Play"), &Action::Start)]);
            if let Some(row) = ctx.language_row() {
                keyboard.push_row(row);
            }
            keyboard.push_row(vec![
                ctx.button(tr.tr("Quit"), &Action::Quit),
                ctx.button(tr.tr("Kick"), &Action::Kick),
            ]);
        }
        Screen::InGame(board) => {
            for row in &board.rows {
                keyboard.push_row(
                    row.iter()
                        .map(|cell| {
                            let payload = CallbackData::new(ctx.game_code, Action::Move.as_str())
                                .with_token(cell.token.clone());
                            Button::new(cell.label.clone(), &payload)
                        })
                        .collect(),
                );
            }
            if board.finished {
                keyboard.push_row(vec![ctx.button(tr.tr("Play again!"), &Action::Start)]);
            }
            keyboard.push_row(vec![
                ctx.button(tr.tr("Quit"), &Action::Quit),
                ctx.button(tr.tr("Kick"), &Action::Kick),
            ]);
            if ctx.debug {
                keyboard.push_row(vec![
                    ctx.button(format!("{DEBUG_PREFIX}Restart"), &Action::Start),
                ]);
            }
        }
    }

    if ctx.debug {
        keyboard.push_row(vec![ctx.button(format!("{DEBUG_PREFIX}CRASH"), &Action::Crash)]);
    }

    keyboard
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn mention(player: &PlayerRef) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        player.id,
        escape_html(&player.first_name)
    )
}

pub fn titled(title: &str, body: &str) -> String {
    format!("<b>{}</b>\n\n{body}", escape_html(title))
}

fn button_hint(tr: &Translator<'_>, label: &str) -> String {
    format!("<b>'{}'</b>", tr.tr(label))
}

pub fn empty_text(tr: &Translator<'_>) -> String {
    format!("<i>{}</i>", tr.tr("This game session is empty."))
}

pub fn lobby_text(tr: &Translator<'_>, host: &PlayerRef) -> String {
    format!(
        "{}\n{}",
        tr.tr_with(
            "{PLAYER_HOST} is waiting for opponent to join...",
            &[("{PLAYER_HOST}", mention(host).as_str())],
        ),
        tr.tr_with(
            "Press {BUTTON} button to join.",
            &[("{BUTTON}", button_hint(tr, "Join").as_str())],
        ),
    )
}

pub fn pregame_text(tr: &Translator<'_>, host: &PlayerRef, guest: &PlayerRef) -> String {
    format!(
        "{}\n{}\n{}",
        tr.tr_with("{PLAYER_GUEST} joined...", &[("{PLAYER_GUEST}", mention(guest).as_str())]),
        tr.tr_with("Waiting for {PLAYER} to start...", &[("{PLAYER}", mention(host).as_str())]),
        tr.tr_with(
            "Press {BUTTON} button to start.",
            &[("{BUTTON}", button_hint(tr, "Play").as_str())],
        ),
    )
}

pub fn quit_text(tr: &Translator<'_>, quitter: &PlayerRef) -> String {
    tr.tr_with("{PLAYER} quit...", &[("{PLAYER}", mention(quitter).as_str())])
}

pub fn kicked_text(tr: &Translator<'_>, guest: &PlayerRef) -> String {
    tr.tr_with("{PLAYER_GUEST} was kicked...", &[("{PLAYER_GUEST}", mention(guest).as_str())])
}

pub fn crashed_text(tr: &Translator<'_>, session_id: &SessionId) -> String {
    format!(
        "<i>{}</i>\n(ID: {})",
        tr.tr("This game session has crashed."),
        escape_html(session_id.as_str())
    )
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
