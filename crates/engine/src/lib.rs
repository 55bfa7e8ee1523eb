//! Session lifecycle engine for two-player inline games.
//!
//! A [`Dispatcher`] takes one [`ActionRequest`](shared::protocol::ActionRequest),
//! loads the session, applies the lobby rules or the game's move, persists the
//! result and edits the shared message through a [`Transport`].

pub mod config;
pub mod crash;
pub mod dispatch;
pub mod game;
pub mod locale;
pub mod render;
pub mod transport;

pub use config::{ConcurrencyPolicy, EngineConfig};
pub use crash::{CrashReport, CrashReporter, DumpReporter, Fault, LogReporter};
pub use dispatch::Dispatcher;
pub use game::{Board, Cell, Game, GameFault, MoveInput, MoveOutcome, Placeholder};
pub use locale::{Catalog, Languages, Translator, DEFAULT_LOCALE};
pub use transport::Transport;
