//! Transcript export for the current session.

use std::path::PathBuf;

use chrono::{FixedOffset, Local, TimeZone};
use echome_remote::SessionId;
use snafu::{ResultExt, Snafu, ensure};

use crate::chat::Message;
use crate::format::format_timestamp_in;

pub const EXPORT_FILE_PREFIX: &str = "EchoMeChat_";
pub const USER_CELL_PREFIX: &str = "You: ";
pub const AI_CELL_PREFIX: &str = "AI: ";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExportError {
    #[snafu(display("No messages to export."))]
    NothingToExport { stage: &'static str },
    #[snafu(display("failed to create export directory at {path} on `{stage}`: {source}"))]
    CreateDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write transcript to {path} on `{stage}`: {source}"))]
    WriteDocument {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
}

pub type ExportResult<T> = Result<T, ExportError>;

/// One exported exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRow {
    pub time: String,
    pub user: String,
    pub ai: String,
}

/// Writes a session's messages somewhere the user can keep them.
pub trait TranscriptExporter {
    /// Returns the location of the written document.
    fn export(&self, session_id: &SessionId, messages: &[Message]) -> ExportResult<PathBuf>;
}

/// Exports a Markdown pipe table with Time, User and AI columns.
#[derive(Debug, Clone)]
pub struct MarkdownTableExporter {
    directory: PathBuf,
    /// Fixed zone for the Time column; the local zone when unset.
    utc_offset: Option<FixedOffset>,
}

impl MarkdownTableExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            utc_offset: None,
        }
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = Some(utc_offset);
        self
    }

    pub fn document_path(&self, session_id: &SessionId) -> PathBuf {
        self.directory.join(format!(
            "{EXPORT_FILE_PREFIX}{}.md",
            file_name_component(session_id.as_str())
        ))
    }

    pub fn render(&self, messages: &[Message]) -> String {
        let mut document = String::from("| Time | User | AI |\n| --- | --- | --- |\n");
        let rows = match &self.utc_offset {
            Some(utc_offset) => transcript_rows(messages, utc_offset),
            None => transcript_rows(messages, &Local),
        };
        for row in rows {
            document.push_str("| ");
            document.push_str(&escape_cell(&row.time));
            document.push_str(" | ");
            document.push_str(&escape_cell(&row.user));
            document.push_str(" | ");
            document.push_str(&escape_cell(&row.ai));
            document.push_str(" |\n");
        }
        document
    }
}

impl TranscriptExporter for MarkdownTableExporter {
    fn export(&self, session_id: &SessionId, messages: &[Message]) -> ExportResult<PathBuf> {
        ensure!(
            messages.iter().any(|message| !message.is_pending()),
            NothingToExportSnafu {
                stage: "collect-transcript-rows",
            }
        );

        if !self.directory.as_os_str().is_empty() {
            std::fs::create_dir_all(&self.directory).context(CreateDirectorySnafu {
                stage: "create-export-directory",
                path: self.directory.display().to_string(),
            })?;
        }

        let path = self.document_path(session_id);
        std::fs::write(&path, self.render(messages)).context(WriteDocumentSnafu {
            stage: "write-transcript",
            path: path.display().to_string(),
        })?;

        tracing::info!(session_id = %session_id, path = %path.display(), "exported transcript");
        Ok(path)
    }
}

/// Rows for every resolved message; placeholders are skipped.
pub fn transcript_rows<Tz>(messages: &[Message], timezone: &Tz) -> Vec<TranscriptRow>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    messages
        .iter()
        .filter(|message| !message.is_pending())
        .map(|message| TranscriptRow {
            time: message
                .sent_at
                .map(|sent_at| format_timestamp_in(sent_at, timezone))
                .unwrap_or_default(),
            user: format!("{USER_CELL_PREFIX}{}", message.user_text),
            ai: format!("{AI_CELL_PREFIX}{}", message.ai_text),
        })
        .collect()
}

fn escape_cell(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut characters = text.chars().peekable();

    while let Some(character) = characters.next() {
        match character {
            '|' => escaped.push_str("\\|"),
            '\\' => escaped.push_str("\\\\"),
            '\r' => {
                if characters.peek() == Some(&'\n') {
                    characters.next();
                }
                escaped.push_str("<br>");
            }
            '\n' => escaped.push_str("<br>"),
            _ => escaped.push(character),
        }
    }

    escaped
}

fn file_name_component(raw: &str) -> String {
    raw.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.') {
                character
            } else {
                '_'
            }
        })
        .collect()
}
