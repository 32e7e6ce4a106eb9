//! Line-oriented front end: commands in, transcript out.

use std::io::Write;
use std::sync::Arc;

use echome_remote::{PasswordAuthClient, RemoteError, UserId};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::chat::{ChatSnapshot, Identity, Message, Synchronizer};
use crate::export::{
    AI_CELL_PREFIX, ExportError, MarkdownTableExporter, TranscriptExporter, USER_CELL_PREFIX,
};
use crate::format::format_timestamp;
use crate::notify::{
    LOGGED_OUT, NOTHING_TO_EXPORT, Notification, NotificationLevel, RecordingNotifier,
};

pub const HELP_TEXT: &str = "\
Commands:
  /login <email> <password>   sign in
  /signup <email> <password>  create an account and sign in
  /logout                     sign out
  /new                        start a new chat
  /sessions                   list chats
  /open <n>                   switch to chat number n
  /reload                     fetch the current chat again
  /export                     write the current chat to a Markdown table
  /retry                      send the kept draft again
  /help                       show this help
  /quit                       exit
Anything else is sent as a message.";

const SIGN_IN_HINT: &str = "Sign in with /login <email> <password> first.";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TerminalError {
    #[snafu(display("usage: {usage}"))]
    Usage {
        stage: &'static str,
        usage: &'static str,
    },
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("{source}"))]
    Auth {
        stage: &'static str,
        source: RemoteError,
    },
    #[snafu(display("sign-in is not configured, set auth.api_key in the settings file"))]
    AuthUnavailable { stage: &'static str },
    #[snafu(display("failed to start the conversation store on `{stage}`: {source}"))]
    Store {
        stage: &'static str,
        source: RemoteError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type TerminalResult<T> = Result<T, TerminalError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Signup { email: String, password: String },
    Logout,
    New,
    Sessions,
    /// One-based position in the session list.
    Open(usize),
    Reload,
    Export,
    Retry,
    Help,
    Quit,
    Say(String),
    Empty,
}

pub fn parse_command(line: &str) -> TerminalResult<Command> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        if trimmed.is_empty() {
            return Ok(Command::Empty);
        }
        return Ok(Command::Say(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arguments = words.collect::<Vec<_>>();

    let command = match name {
        "login" | "signup" => {
            let [email, password] = arguments.as_slice() else {
                return UsageSnafu {
                    stage: "parse-credentials",
                    usage: "/login <email> <password>",
                }
                .fail();
            };
            let (email, password) = (email.to_string(), password.to_string());
            if name == "login" {
                Command::Login { email, password }
            } else {
                Command::Signup { email, password }
            }
        }
        "logout" => Command::Logout,
        "new" => Command::New,
        "sessions" => Command::Sessions,
        "open" => {
            let position = arguments
                .first()
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|position| *position > 0)
                .context(UsageSnafu {
                    stage: "parse-session-position",
                    usage: "/open <n>",
                })?;
            Command::Open(position)
        }
        "reload" => Command::Reload,
        "export" => Command::Export,
        "retry" => Command::Retry,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return UnknownCommandSnafu {
                stage: "parse-command-name",
                name: other.to_string(),
            }
            .fail();
        }
    };

    Ok(command)
}

/// How the terminal signs users in.
pub enum Authenticator {
    /// Accepts any credentials; the email becomes the user id.
    Offline,
    Password(PasswordAuthClient),
    Unconfigured,
}

impl Authenticator {
    pub async fn sign_in(&self, email: &str, password: &str) -> TerminalResult<Identity> {
        match self {
            Self::Offline => offline_identity(email, password),
            Self::Password(client) => {
                let user = client.sign_in(email, password).await.context(AuthSnafu {
                    stage: "sign-in",
                })?;
                Ok(identity_from(user.uid, user.email))
            }
            Self::Unconfigured => AuthUnavailableSnafu { stage: "sign-in" }.fail(),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> TerminalResult<Identity> {
        match self {
            Self::Offline => offline_identity(email, password),
            Self::Password(client) => {
                let user = client.sign_up(email, password).await.context(AuthSnafu {
                    stage: "sign-up",
                })?;
                Ok(identity_from(user.uid, user.email))
            }
            Self::Unconfigured => AuthUnavailableSnafu { stage: "sign-up" }.fail(),
        }
    }
}

fn offline_identity(email: &str, password: &str) -> TerminalResult<Identity> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(RemoteError::MissingCredentials {
            stage: "offline-sign-in",
        })
        .context(AuthSnafu {
            stage: "offline-sign-in",
        });
    }
    let uid = UserId::parse(email).context(AuthSnafu {
        stage: "offline-sign-in",
    })?;
    Ok(Identity::new(uid).with_email(email))
}

fn identity_from(uid: UserId, email: Option<String>) -> Identity {
    match email {
        Some(email) => Identity::new(uid).with_email(email),
        None => Identity::new(uid),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The interactive client: feeds commands to the synchronizer and prints what changed.
pub struct TerminalApp<W> {
    sync: Synchronizer,
    auth: Authenticator,
    exporter: MarkdownTableExporter,
    notifications: Arc<RecordingNotifier>,
    rendered: Option<ChatSnapshot>,
    out: W,
}

impl<W: Write> TerminalApp<W> {
    /// `notifications` must be the sink the synchronizer was built with.
    pub fn new(
        sync: Synchronizer,
        notifications: Arc<RecordingNotifier>,
        auth: Authenticator,
        exporter: MarkdownTableExporter,
        out: W,
    ) -> Self {
        Self {
            sync,
            auth,
            exporter,
            notifications,
            rendered: None,
            out,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn has_pending_requests(&self) -> bool {
        self.sync.has_pending_requests()
    }

    /// Applies the next finished request and prints the result.
    pub async fn next_completion(&mut self) -> TerminalResult<()> {
        if self.sync.next_completion().await {
            self.refresh()?;
        }
        Ok(())
    }

    /// Waits for all outstanding requests, printing as they land.
    pub async fn settle(&mut self) -> TerminalResult<()> {
        while self.sync.next_completion().await {
            self.refresh()?;
        }
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> TerminalResult<Flow> {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(error) => {
                self.emit(format!("! {error}"))?;
                return Ok(Flow::Continue);
            }
        };
        tracing::debug!(?command, "handling command");

        match command {
            Command::Empty => {}
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => self.emit(HELP_TEXT)?,
            Command::Login { email, password } => {
                let identity = self.auth.sign_in(&email, &password).await;
                self.finish_sign_in(identity)?;
            }
            Command::Signup { email, password } => {
                let identity = self.auth.sign_up(&email, &password).await;
                self.finish_sign_in(identity)?;
            }
            Command::Logout => {
                if self.sync.state().identity().is_some() {
                    self.sync.set_identity(None);
                    self.sync.notify(Notification::success(LOGGED_OUT));
                }
            }
            Command::New => {
                if self.sync.create_session().is_none() {
                    self.emit(SIGN_IN_HINT)?;
                }
            }
            Command::Sessions => {
                let listing = render_sessions(&self.sync.snapshot());
                self.emit(listing)?;
            }
            Command::Open(position) => {
                let session_id = position
                    .checked_sub(1)
                    .and_then(|index| self.sync.state().sessions().get(index))
                    .map(|session| session.id.clone());
                match session_id {
                    Some(session_id) => self.sync.select_session(&session_id),
                    None => self.emit(format!("! no chat number {position}, see /sessions"))?,
                }
            }
            Command::Reload => self.sync.reload_messages(),
            Command::Export => self.export_current(),
            Command::Retry => self.submit()?,
            Command::Say(text) => {
                self.sync.set_input(text);
                self.submit()?;
            }
        }

        self.refresh()?;
        Ok(Flow::Continue)
    }

    /// Prints notifications and whatever part of the transcript changed since the last call.
    pub fn refresh(&mut self) -> TerminalResult<()> {
        for notification in self.notifications.take() {
            let marker = match notification.level {
                NotificationLevel::Success => "*",
                NotificationLevel::Error => "!",
            };
            self.emit(format!("{marker} {}", notification.message))?;
        }

        let snapshot = self.sync.snapshot();
        let previous = self.rendered.take();
        let start = match previous {
            Some(previous) if previous.current_session == snapshot.current_session => {
                common_prefix_len(&previous.messages, &snapshot.messages)
            }
            _ => {
                if let Some(session) = snapshot.sessions.iter().find(|session| session.is_current) {
                    self.emit(format!("== {} ==", session.display_name))?;
                }
                0
            }
        };
        for message in snapshot.messages.iter().skip(start) {
            self.emit(render_message(message))?;
        }

        self.rendered = Some(snapshot);
        self.out.flush().context(WriteOutputSnafu {
            stage: "flush-output",
        })
    }

    fn finish_sign_in(&mut self, identity: TerminalResult<Identity>) -> TerminalResult<()> {
        match identity {
            Ok(identity) => {
                let label = identity
                    .email
                    .clone()
                    .unwrap_or_else(|| identity.uid.to_string());
                self.sync.set_identity(Some(identity));
                self.emit(format!("Signed in as {label}"))
            }
            Err(error) => {
                tracing::warn!("sign-in failed: {error}");
                self.emit(format!("! {error}"))
            }
        }
    }

    fn submit(&mut self) -> TerminalResult<()> {
        let snapshot = self.sync.snapshot();
        if !snapshot.signed_in {
            return self.emit(SIGN_IN_HINT);
        }
        if snapshot.sending {
            return self.emit("! still waiting for the last reply");
        }
        self.sync.submit();
        Ok(())
    }

    fn export_current(&mut self) {
        let state = self.sync.state();
        let result = match state.current_session() {
            Some(session_id) => self.exporter.export(session_id, state.messages()),
            None => Err(ExportError::NothingToExport {
                stage: "select-export-session",
            }),
        };

        let notification = match result {
            Ok(path) => Notification::success(format!("Exported to {}", path.display())),
            Err(ExportError::NothingToExport { .. }) => Notification::error(NOTHING_TO_EXPORT),
            Err(error) => {
                tracing::warn!("export failed: {error}");
                Notification::error(error.to_string())
            }
        };
        self.sync.notify(notification);
    }

    fn emit(&mut self, text: impl std::fmt::Display) -> TerminalResult<()> {
        writeln!(self.out, "{text}").context(WriteOutputSnafu {
            stage: "write-line",
        })
    }
}

pub fn render_message(message: &Message) -> String {
    if message.is_pending() {
        return format!("{AI_CELL_PREFIX}{}", message.ai_text);
    }
    format!(
        "{USER_CELL_PREFIX}{}\n{AI_CELL_PREFIX}{}",
        message.user_text, message.ai_text
    )
}

pub fn render_sessions(snapshot: &ChatSnapshot) -> String {
    if !snapshot.signed_in {
        return SIGN_IN_HINT.to_string();
    }
    if snapshot.sessions.is_empty() {
        return "No chats yet. Type a message or /new to start one.".to_string();
    }

    snapshot
        .sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let marker = if session.is_current { '>' } else { ' ' };
            let approximate = if session.created_at_is_approximate { "~" } else { "" };
            format!(
                "{marker} {}. {}  {approximate}{}  ({} messages)",
                index + 1,
                session.display_name,
                format_timestamp(session.created_at),
                session.message_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix_len(previous: &[Message], current: &[Message]) -> usize {
    previous
        .iter()
        .zip(current)
        .take_while(|(left, right)| left == right)
        .count()
}
