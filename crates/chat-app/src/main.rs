use std::sync::Arc;

use echome::chat::Synchronizer;
use echome::export::MarkdownTableExporter;
use echome::notify::RecordingNotifier;
use echome::settings::SettingsStore;
use echome::terminal::{
    Authenticator, Flow, ReadInputSnafu, StoreSnafu, TerminalApp, TerminalResult,
};
use echome_remote::{
    ConversationStore, HttpConversationStore, MemoryConversationStore, PasswordAuthClient,
};
use snafu::ResultExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so they stay out of the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let offline = std::env::args().skip(1).any(|argument| argument == "--offline");
    if let Err(error) = run(offline).await {
        tracing::error!("echome stopped: {error}");
        std::process::exit(1);
    }
}

async fn run(offline: bool) -> TerminalResult<()> {
    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();

    let (store, auth): (Arc<dyn ConversationStore>, Authenticator) = if offline {
        tracing::info!("running offline against an in-memory store");
        (
            Arc::new(MemoryConversationStore::new()),
            Authenticator::Offline,
        )
    } else {
        let store = HttpConversationStore::new(settings.to_remote_config()).context(StoreSnafu {
            stage: "build-conversation-store",
        })?;
        tracing::info!(api_url = %store.base_url(), "using remote conversation store");
        let auth = match settings.to_auth_config() {
            Some(config) => match PasswordAuthClient::new(config) {
                Ok(client) => Authenticator::Password(client),
                Err(error) => {
                    tracing::warn!("identity provider unavailable: {error}");
                    Authenticator::Unconfigured
                }
            },
            None => Authenticator::Unconfigured,
        };
        (Arc::new(store), auth)
    };

    let notifications = Arc::new(RecordingNotifier::new());
    let sync = Synchronizer::new(store, notifications.clone());
    let exporter = MarkdownTableExporter::new(settings.export_dir());
    let mut app = TerminalApp::new(sync, notifications, auth, exporter, std::io::stdout());

    println!("EchoMe. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context(ReadInputSnafu { stage: "read-stdin" })? else {
                    break;
                };
                if app.handle_line(&line).await? == Flow::Quit {
                    break;
                }
            }
            completion = app.next_completion(), if app.has_pending_requests() => completion?,
        }
    }

    Ok(())
}
