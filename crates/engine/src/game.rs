//! Extension point implemented by each concrete game.
//!
//! The dispatcher owns the lobby (players, language, lifecycle) and hands the
//! opaque game state to the implementation for moves and board rendering.

use serde_json::Value;
use shared::domain::{Players, Seat};
use thiserror::Error;

use crate::locale::Translator;

/// Unrecoverable problem inside the game implementation. Surfaces as a crash
/// of the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("game fault: {0}")]
pub struct GameFault(pub String);

impl GameFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One board button. `token` is carried back as the move argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub label: String,
    pub token: String,
}

impl Cell {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    /// Status line shown above the keyboard (turn, winner...).
    pub text: String,
    pub rows: Vec<Vec<Cell>>,
    /// Offers "Play again" once set.
    pub finished: bool,
}

pub struct MoveInput<'a> {
    pub state: &'a Value,
    pub seat: Seat,
    pub players: &'a Players,
    pub token: Option<&'a str>,
    pub tr: &'a Translator<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Accepted(Value),
    /// Shown to the mover as an alert; state is left untouched.
    Rejected(String),
    Ignored,
}

pub trait Game: Send + Sync {
    /// Short identifier prefixed to every button payload.
    fn code(&self) -> &str;

    fn title(&self) -> &str;

    fn new_game(&self, _players: &Players) -> Result<Value, GameFault> {
        Ok(Value::Object(Default::default()))
    }

    fn apply_move(&self, input: MoveInput<'_>) -> Result<MoveOutcome, GameFault>;

    fn render_board(
        &self,
        state: &Value,
        players: &Players,
        tr: &Translator<'_>,
    ) -> Result<Board, GameFault>;

    /// Plain-text picture of the state, logged in debug mode.
    fn board_dump(&self, _state: &Value) -> Option<String> {
        None
    }
}

/// Lobby-only game without a board. Moves are ignored.
#[derive(Debug, Clone)]
pub struct Placeholder {
    code: String,
    title: String,
}

impl Placeholder {
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
        }
    }
}

impl Game for Placeholder {
    fn code(&self) -> &str {
        &self.code
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn apply_move(&self, _input: MoveInput<'_>) -> Result<MoveOutcome, GameFault> {
        Ok(MoveOutcome::Ignored)
    }

    fn render_board(
        &self,
        _state: &Value,
        _players: &Players,
        tr: &Translator<'_>,
    ) -> Result<Board, GameFault> {
        Ok(Board {
            text: tr.tr("Game in progress..."),
            rows: Vec::new(),
            finished: false,
        })
    }
}
