use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RemoteError {
    #[snafu(display("remote id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("remote base URL '{raw}' is invalid: {details}"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        details: String,
    },
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{url} returned status {status}: {message}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        message: String,
    },
    #[snafu(display("failed to decode response from {url} on `{stage}`: {source}"))]
    DecodePayload {
        stage: &'static str,
        url: String,
        source: serde_json::Error,
    },
    #[snafu(display("Email and password required."))]
    MissingCredentials { stage: &'static str },
    #[snafu(display("identity provider API key is not configured"))]
    MissingApiKey { stage: &'static str },
    // Provider text is shown to the user as-is.
    #[snafu(display("{message}"))]
    AuthRejected {
        stage: &'static str,
        status: u16,
        message: String,
    },
}

impl RemoteError {
    /// Returns true for failures a repeated idempotent request may get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidId { stage, .. }
            | Self::InvalidBaseUrl { stage, .. }
            | Self::BuildHttpClient { stage, .. }
            | Self::Request { stage, .. }
            | Self::Status { stage, .. }
            | Self::DecodePayload { stage, .. }
            | Self::MissingCredentials { stage }
            | Self::MissingApiKey { stage }
            | Self::AuthRejected { stage, .. } => stage,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
