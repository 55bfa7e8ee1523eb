use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(UserId);
key_newtype!(SessionId);
key_newtype!(EventId);
key_newtype!(LocaleTag);

/// Identity snapshot of a participant, captured when they joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: UserId,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl PlayerRef {
    pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            username: None,
        }
    }

    /// Players are the same person when their ids match; names are cosmetic.
    pub fn same_as(&self, other: &PlayerRef) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Host,
    Guest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    #[serde(default)]
    pub host: Option<PlayerRef>,
    #[serde(default)]
    pub guest: Option<PlayerRef>,
}

impl Players {
    pub fn seat_of(&self, user: &PlayerRef) -> Option<Seat> {
        if self.host.as_ref().is_some_and(|host| host.same_as(user)) {
            Some(Seat::Host)
        } else if self.guest.as_ref().is_some_and(|guest| guest.same_as(user)) {
            Some(Seat::Guest)
        } else {
            None
        }
    }

    pub fn is_host(&self, user: &PlayerRef) -> bool {
        self.seat_of(user) == Some(Seat::Host)
    }

    pub fn is_full(&self) -> bool {
        self.host.is_some() && self.guest.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LocaleTag>,
}

/// Lifecycle position of a session, derived from which slots are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Empty,
    Lobby,
    Pregame,
    InGame,
}

/// Persisted record of one game instance.
///
/// `data` belongs to the concrete game: the engine only checks whether it is
/// present. `game_code` is stamped on every save so housekeeping tooling can
/// tell which game owns a row even after the rest has been cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub players: Players,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_code: Option<String>,
}

impl Session {
    pub fn phase(&self) -> Phase {
        match (&self.players.host, &self.players.guest) {
            (None, _) => Phase::Empty,
            (Some(_), None) => Phase::Lobby,
            (Some(_), Some(_)) if self.data.is_some() => Phase::InGame,
            (Some(_), Some(_)) => Phase::Pregame,
        }
    }

    /// Guest requires host; game data requires both players.
    pub fn is_consistent(&self) -> bool {
        let guest_ok = self.players.guest.is_none() || self.players.host.is_some();
        let data_ok = self.data.is_none() || self.players.is_full();
        guest_ok && data_ok
    }

    /// Drops players and game data, keeping nothing but the owner stamp.
    pub fn reset(&mut self) {
        let game_code = self.game_code.take();
        *self = Session {
            game_code,
            ..Session::default()
        };
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
