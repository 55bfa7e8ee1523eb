mod config;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use engine::{Dispatcher, Placeholder, Transport};
use shared::{
    domain::{EventId, PlayerRef, SessionId, UserId},
    error::TransportError,
    protocol::{Acknowledgment, ActionRequest, View, PAYLOAD_SEPARATOR},
};
use storage::{SessionStore, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(about = "Operator tooling for inline game sessions")]
struct Cli {
    /// Overrides the configured database url.
    #[arg(long)]
    database_url: Option<String>,
    /// Enables debug mode for this run.
    #[arg(long)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs one action through the dispatcher and prints the result.
    Dispatch {
        #[arg(long)]
        session: String,
        /// Action name, or a full button payload such as `xo;move;4`.
        #[arg(long)]
        action: String,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        event: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    Show {
        #[arg(long)]
        session: String,
    },
    List {
        #[arg(long)]
        game_code: Option<String>,
    },
    /// Deletes sessions not written for the given number of hours.
    Clean {
        #[arg(long)]
        older_than_hours: i64,
        #[arg(long)]
        game_code: Option<String>,
    },
}

/// Prints every view edit and acknowledgment instead of sending it.
struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn edit_view(&self, session_id: &SessionId, view: &View) -> Result<(), TransportError> {
        println!("--- view for {session_id} ---");
        println!("{}", view.text);
        for row in &view.keyboard.rows {
            let labels: Vec<String> = row
                .iter()
                .map(|button| format!("[{} -> {}]", button.label, button.payload))
                .collect();
            println!("{}", labels.join(" "));
        }
        Ok(())
    }

    async fn acknowledge(
        &self,
        event_id: &EventId,
        ack: &Acknowledgment,
    ) -> Result<(), TransportError> {
        if ack.is_silent() {
            println!("--- ack {event_id}: (silent) ---");
        } else {
            let kind = if ack.alert { "alert" } else { "notice" };
            println!("--- ack {event_id} ({kind}) ---\n{}", ack.text);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings()?;
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    settings.debug |= cli.debug;

    let default_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open session store '{database_url}'"))?;
    info!(%database_url, "session store ready");

    match cli.command {
        Command::Dispatch {
            session,
            action,
            user_id,
            name,
            event,
            token,
        } => {
            let dispatcher = build_dispatcher(&settings, storage)?;
            let session_id = SessionId::new(session);
            let actor = PlayerRef::new(UserId(user_id), name);

            let mut request = if action.contains(PAYLOAD_SEPARATOR) {
                let event_id = EventId::new(event.unwrap_or_else(|| "cli".into()));
                ActionRequest::from_callback(session_id, event_id, actor, &action)
            } else {
                let mut request = ActionRequest::new(session_id, actor, action);
                if let Some(event) = event {
                    request = request.with_event(EventId::new(event));
                }
                request
            };
            if let Some(token) = token {
                request = request.with_token(token);
            }

            let result = dispatcher.handle(&request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Show { session } => {
            let session_id = SessionId::new(session);
            match storage.load(&session_id).await? {
                Some(stored) => {
                    println!("revision={}", stored.revision);
                    println!("{}", serde_json::to_string_pretty(&stored.session)?);
                }
                None => println!("no session stored under {session_id}"),
            }
        }
        Command::List { game_code } => {
            let sessions = storage.list_sessions(game_code.as_deref()).await?;
            for summary in &sessions {
                println!(
                    "{}\tgame={}\trevision={}\tupdated={}",
                    summary.id,
                    summary.game_code.as_deref().unwrap_or("-"),
                    summary.revision,
                    summary.updated_at.to_rfc3339()
                );
            }
            println!("{} session(s)", sessions.len());
        }
        Command::Clean {
            older_than_hours,
            game_code,
        } => {
            let cutoff = stale_cutoff(Utc::now(), older_than_hours)?;
            let removed = storage
                .delete_stale(cutoff, game_code.as_deref())
                .await?;
            info!(removed, %cutoff, "stale sessions deleted");
            println!("deleted {removed} session(s)");
        }
    }

    Ok(())
}

/// Point in time before which sessions count as stale.
fn stale_cutoff(now: DateTime<Utc>, older_than_hours: i64) -> Result<DateTime<Utc>> {
    let age = Duration::try_hours(older_than_hours.max(0))
        .ok_or_else(|| anyhow!("--older-than-hours {older_than_hours} is out of range"))?;
    now.checked_sub_signed(age).ok_or_else(|| {
        anyhow!("--older-than-hours {older_than_hours} reaches before the earliest date")
    })
}

fn build_dispatcher(settings: &Settings, storage: Storage) -> Result<Dispatcher> {
    let languages = settings.languages()?;
    let game = Placeholder::new(settings.game_code.clone(), settings.game_title.clone());

    Ok(Dispatcher::new(
        Arc::new(storage),
        Arc::new(ConsoleTransport),
        Arc::new(game),
        Arc::new(languages),
    )
    .with_config(settings.engine_config())
    .with_reporter(settings.crash_reporter()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
