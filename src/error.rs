//! Error types for the build bot.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for build bot operations.
#[derive(Error, Debug)]
pub enum BuildBotError {
    // Cli args errors
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Run contention
    #[error(
        "Another run is in progress (lock file {} is {age_minutes} minutes old)",
        path.display()
    )]
    AlreadyRunning { path: PathBuf, age_minutes: i64 },

    #[error("No credential file found at {}", .0.display())]
    MissingCredentials(PathBuf),

    // Git errors
    #[error("Git command `{command}` failed with exit code {code:?}: {output}")]
    GitCommand {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Git repository error: {0}")]
    GitError(#[from] git2::Error),

    #[error("Git URL parse error: {0}")]
    GitUrlError(#[from] git_url_parse::GitUrlParseError),

    // Network/API errors
    #[error("Issue update rejected with status {status}: {body}")]
    UpdateRejected { status: u16, body: String },

    #[error("Network request failed: {0}")]
    NetworkError(String),

    #[error("API authentication failed: {0}")]
    AuthenticationError(String),

    // Parsing errors - automatic conversions via #[from]
    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Regular expression error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Datetime parse error: {0}")]
    ChronoParseError(#[from] chrono::ParseError),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] log::SetLoggerError),

    // Generic wrapper for other errors
    #[error(transparent)]
    Other(#[from] color_eyre::Report),
}

/// Result type alias using BuildBotError
pub type Result<T> = std::result::Result<T, BuildBotError>;

impl BuildBotError {
    /// Create a failed git command error from a rendered command line and
    /// its output
    pub fn git_command(
        command: impl Into<String>,
        code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self::GitCommand {
            command: command.into(),
            code,
            output: output.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error must abort the whole run. Everything else is
    /// scoped to the request being processed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UpdateRejected { .. }
                | Self::NetworkError(_)
                | Self::AuthenticationError(_)
                | Self::JsonParseError(_)
                | Self::ChronoParseError(_)
        )
    }
}

// Implement From for std::io::Error - wraps in Other variant for generic I/O errors
impl From<std::io::Error> for BuildBotError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

// Implement From for reqwest errors (network/API)
impl From<reqwest::Error> for BuildBotError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => Self::AuthenticationError(err.to_string()),
            _ => Self::NetworkError(err.to_string()),
        }
    }
}

// Implement From for reqwest header errors (needs custom message)
impl From<reqwest::header::InvalidHeaderValue> for BuildBotError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::AuthenticationError(format!("Invalid header value: {}", err))
    }
}
