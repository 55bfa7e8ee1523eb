use serde::{Deserialize, Serialize};

use crate::domain::{EventId, PlayerRef, SessionId};

/// Separator between the fields of a callback payload: `code;action[;token]`.
pub const PAYLOAD_SEPARATOR: char = ';';

/// Placeholder written into crash reports when the event carried no payload.
pub const NO_CALLBACK_PAYLOAD: &str = "<not a callback query>";

/// Closed set of actions a player can request against a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    New,
    Join,
    Quit,
    Kick,
    Start,
    Move,
    Language,
    Crash,
    Unknown(String),
}

impl Action {
    /// Matches case-insensitively after stripping everything but ASCII letters.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "new" => Action::New,
            "join" => Action::Join,
            "quit" => Action::Quit,
            "kick" => Action::Kick,
            "start" => Action::Start,
            "move" | "game" => Action::Move,
            "language" => Action::Language,
            "crash" => Action::Crash,
            _ => Action::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::New => "new",
            Action::Join => "join",
            Action::Quit => "quit",
            Action::Kick => "kick",
            Action::Start => "start",
            Action::Move => "move",
            Action::Language => "language",
            Action::Crash => "crash",
            Action::Unknown(name) => name,
        }
    }
}

/// Decoded button payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    pub game_code: String,
    pub action: String,
    pub token: Option<String>,
}

impl CallbackData {
    pub fn new(game_code: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            game_code: game_code.into(),
            action: action.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, PAYLOAD_SEPARATOR);
        let game_code = parts.next()?.trim();
        let action = parts.next()?.trim();
        if game_code.is_empty() || action.is_empty() {
            return None;
        }
        let token = parts
            .next()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Some(Self {
            game_code: game_code.to_string(),
            action: action.to_string(),
            token,
        })
    }

    pub fn encode(&self) -> String {
        match &self.token {
            Some(token) => format!(
                "{}{PAYLOAD_SEPARATOR}{}{PAYLOAD_SEPARATOR}{token}",
                self.game_code, self.action
            ),
            None => format!("{}{PAYLOAD_SEPARATOR}{}", self.game_code, self.action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: &CallbackData) -> Self {
        Self {
            label: label.into(),
            payload: payload.encode(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn push_row(&mut self, row: Vec<Button>) {
        if !row.is_empty() {
            self.rows.push(row);
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    pub fn payloads(&self) -> Vec<&str> {
        self.buttons().map(|button| button.payload.as_str()).collect()
    }
}

/// Replacement content for the session's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub text: String,
    pub keyboard: Keyboard,
}

/// Answer to the triggering event. An empty text is a silent acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub text: String,
    pub alert: bool,
}

impl Acknowledgment {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: true,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// State changed and the view was edited.
    Updated,
    /// Nothing was stored. The view may still have been re-rendered.
    Acknowledged,
    /// A precondition was not met; nothing was mutated.
    Rejected,
    /// The action name was not recognized.
    Ignored,
    StorageFailure,
    TransportFailure,
    Crashed,
}

/// What the dispatcher did for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderInstruction {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    pub ack: Acknowledgment,
}

/// One incoming action as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    pub actor: PlayerRef,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl ActionRequest {
    pub fn new(session_id: SessionId, actor: PlayerRef, action: impl Into<String>) -> Self {
        Self {
            session_id,
            event_id: None,
            actor,
            action: action.into(),
            token: None,
            payload: None,
        }
    }

    /// Builds a request from a button press. Payloads that do not decode are
    /// kept verbatim as the action name and end up ignored.
    pub fn from_callback(
        session_id: SessionId,
        event_id: EventId,
        actor: PlayerRef,
        payload: &str,
    ) -> Self {
        let (action, token) = match CallbackData::parse(payload) {
            Some(data) => (data.action, data.token),
            None => (payload.to_string(), None),
        };

        Self {
            session_id,
            event_id: Some(event_id),
            actor,
            action,
            token,
            payload: Some(payload.to_string()),
        }
    }

    pub fn with_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn payload_or_placeholder(&self) -> &str {
        self.payload.as_deref().unwrap_or(NO_CALLBACK_PAYLOAD)
    }
}
