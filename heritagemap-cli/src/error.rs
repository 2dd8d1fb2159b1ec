//! CLI error type.

use std::fmt;
use std::io;

use heritagemap::bridge::BridgeError;
use heritagemap::config::ConfigError;
use heritagemap::location::LocationError;
use heritagemap::logging::LoggingError;
use heritagemap::proximity::QueryError;

/// Errors surfaced to the user by a command.
#[derive(Debug)]
pub enum CliError {
    /// Bad or unreadable configuration, or an invalid argument.
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// Track file could not be loaded.
    Track(String),
    /// Map surface connection failed.
    Bridge(String),
    /// Nearby endpoint client could not be built.
    Api(String),
    Io(io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Logging(_) | CliError::Io(_) => 1,
            CliError::Track(_) => 3,
            CliError::Bridge(_) | CliError::Api(_) => 4,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging setup failed: {}", msg),
            CliError::Track(msg) => write!(f, "Track error: {}", msg),
            CliError::Bridge(msg) => write!(f, "Map surface error: {}", msg),
            CliError::Api(msg) => write!(f, "Nearby API error: {}", msg),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<LocationError> for CliError {
    fn from(e: LocationError) -> Self {
        CliError::Track(e.to_string())
    }
}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        CliError::Bridge(e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        CliError::Api(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        assert_eq!(CliError::Config("x".into()).exit_code(), 2);
        assert_eq!(CliError::Track("x".into()).exit_code(), 3);
        assert_eq!(CliError::Bridge("x".into()).exit_code(), 4);
        assert_eq!(
            CliError::Io(io::Error::new(io::ErrorKind::Other, "x")).exit_code(),
            1
        );
    }

    #[test]
    fn test_config_error_converts_with_message() {
        let err: CliError = ConfigError::UnknownKey("a.b".into()).into();
        assert!(err.to_string().contains("a.b"));
        assert_eq!(err.exit_code(), 2);
    }
}
