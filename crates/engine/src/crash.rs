//! Crash reports for sessions whose handler produced something outside the
//! success/rejection contract.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use shared::domain::{Session, SessionId};
use thiserror::Error;
use tracing::{error, warn};

use crate::game::GameFault;

/// Why a handler did not produce a usable reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Fault {
    #[error(transparent)]
    Game(#[from] GameFault),
    #[error("malformed handler result: {0}")]
    Malformed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl Fault {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        Fault::Panicked(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub session_id: SessionId,
    pub game: String,
    pub before: String,
    pub after: String,
    pub payload: String,
    pub result: String,
}

impl CrashReport {
    pub fn new(
        session_id: &SessionId,
        game: &str,
        before: &Session,
        after: &Session,
        payload: &str,
        fault: &Fault,
    ) -> Self {
        Self {
            session_id: session_id.clone(),
            game: game.to_string(),
            before: snapshot(before),
            after: snapshot(after),
            payload: payload.to_string(),
            result: fault.to_string(),
        }
    }
}

fn snapshot(session: &Session) -> String {
    session
        .to_json()
        .unwrap_or_else(|err| format!("<unserializable: {err}>"))
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CRASH (ID: {}):", self.session_id)?;
        writeln!(f, "Game: {}", self.game)?;
        writeln!(f, "Game data (before): {}", self.before)?;
        writeln!(f, "Game data (after): {}", self.after)?;
        writeln!(f, "Callback data: {}", self.payload)?;
        writeln!(f, "Result: {}", self.result)
    }
}

/// Logging collaborator receiving crash reports.
pub trait CrashReporter: Send + Sync {
    fn report(&self, report: &CrashReport);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl CrashReporter for LogReporter {
    fn report(&self, report: &CrashReport) {
        error!(session = %report.session_id, "{report}");
    }
}

/// Logs the report and also writes it to a dump file.
#[derive(Debug, Clone)]
pub struct DumpReporter {
    dir: PathBuf,
}

impl DumpReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, report: &CrashReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create crash dump directory '{}'", self.dir.display())
        })?;

        let file_name = format!(
            "{}_{}.txt",
            sanitize(report.session_id.as_str()),
            Utc::now().format("%y-%m-%d_%H-%M-%S")
        );
        let path = self.dir.join(file_name);
        fs::write(&path, report.to_string())
            .with_context(|| format!("failed to write crash dump '{}'", path.display()))?;
        Ok(path)
    }
}

impl CrashReporter for DumpReporter {
    fn report(&self, report: &CrashReport) {
        LogReporter.report(report);
        if let Err(err) = self.write(report) {
            warn!(session = %report.session_id, error = %err, "crash dump not written");
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "tests/crash_tests.rs"]
mod tests;
