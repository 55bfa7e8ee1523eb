use serde::{Deserialize, Serialize};
use shared::domain::UserId;

/// Fragment of the transport error that means "nothing changed".
pub const MESSAGE_NOT_MODIFIED: &str = "message is not modified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Every save carries the revision it was loaded at; a concurrent writer
    /// makes the later save fail and the action is rejected as transient.
    #[default]
    Optimistic,
    /// Unconditional overwrite. Concurrent actions on one session may lose
    /// the earlier writer's effect.
    LastWriteWins,
}

impl std::str::FromStr for ConcurrencyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "optimistic" => Ok(Self::Optimistic),
            "last_write_wins" | "lww" => Ok(Self::LastWriteWins),
            other => Err(format!("unknown concurrency policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Enables the `crash` action and the diagnostic keyboard buttons.
    pub debug_mode: bool,
    /// In debug mode this user may join their own game as guest.
    pub admin_id: Option<UserId>,
    pub tolerated_transport_errors: Vec<String>,
    pub concurrency: ConcurrencyPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            admin_id: None,
            tolerated_transport_errors: vec![MESSAGE_NOT_MODIFIED.to_string()],
            concurrency: ConcurrencyPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn debug() -> Self {
        Self {
            debug_mode: true,
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, admin_id: UserId) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn is_debug_admin(&self, user: UserId) -> bool {
        self.debug_mode && self.admin_id == Some(user)
    }
}
