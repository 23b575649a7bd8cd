//! Error type shared by the client, the engine and the binary.
//!
//! Per-request failures never reach this module: they are folded into loss
//! or zero contribution where they happen. `SpeedTestError` carries the
//! structural failures that end a run or stop the process.

use std::error::Error;
use std::fmt;

/// Process exit codes, one per [`ErrorKind`] family.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Server unreachable, timed out, or could not be bound.
    pub const NETWORK_ERROR: i32 = 1;
    /// The server answered, but not with the speed test contract.
    pub const API_ERROR: i32 = 2;
    /// Bad flags, config file or output path.
    pub const CONFIG_ERROR: i32 = 3;
    pub const MEASUREMENT_ERROR: i32 = 4;
    /// Interrupted with Ctrl-C, following the shell's SIGINT convention.
    pub const CANCELED: i32 = 130;
    pub const UNKNOWN_ERROR: i32 = 99;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    /// Unusable response from the speed test server.
    Api,
    Config,
    /// A measurement phase could not produce a result.
    Measurement,
    /// The embedded server failed to bind or stopped.
    Server,
    Unknown,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;

        match self {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server => {
                NETWORK_ERROR
            }
            ErrorKind::Api => API_ERROR,
            ErrorKind::Config => CONFIG_ERROR,
            ErrorKind::Measurement => MEASUREMENT_ERROR,
            ErrorKind::Unknown => UNKNOWN_ERROR,
        }
    }

    /// Heading used when the error is displayed.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Api => "Server response error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Measurement => "Measurement error",
            ErrorKind::Server => "Server error",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// What to try next, for the kinds where there is a useful answer.
    fn default_suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Network => Some(
                "Check that the speed test server is reachable and try again.",
            ),
            ErrorKind::Timeout => {
                Some("The server may be slow or overloaded. Try again later.")
            }
            ErrorKind::Api => Some(
                "Point --server at a host that serves the /api/speed endpoints.",
            ),
            _ => None,
        }
    }
}

/// A run-ending or process-ending failure with a user facing message.
#[derive(Debug)]
pub struct SpeedTestError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: Option<String>,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl SpeedTestError {
    /// An error of `kind` without a suggestion.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// An error of `kind` carrying that kind's stock suggestion, if any.
    fn suggested(kind: ErrorKind, message: impl Into<String>) -> Self {
        let error = Self::new(kind, message);

        match kind.default_suggestion() {
            Some(suggestion) => error.with_suggestion(suggestion),
            None => error,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn measurement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Measurement, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }
}

impl fmt::Display for SpeedTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        match &self.suggestion {
            Some(suggestion) => write!(f, "\n  Suggestion: {}", suggestion),
            None => Ok(()),
        }
    }
}

impl Error for SpeedTestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Message fragments that identify an error's kind, checked in order.
const CLASSIFIERS: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::Timeout, &["timeout", "timed out", "deadline"]),
    (
        ErrorKind::Network,
        &[
            "connection refused",
            "connection reset",
            "connection aborted",
            "network unreachable",
            "host unreachable",
            "no route",
            "broken pipe",
            "dns",
            "resolve",
        ],
    ),
    (
        ErrorKind::Server,
        &["address in use", "address already in use", "address not available"],
    ),
    (
        ErrorKind::Api,
        &["status: 4", "status: 5", "malformed response", "decode"],
    ),
    (ErrorKind::Config, &["invalid", "must be"]),
];

/// Guess an [`ErrorKind`] from the text of an arbitrary error.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let text = error.to_string().to_lowercase();

    CLASSIFIERS
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| text.contains(needle)))
        .map_or(ErrorKind::Unknown, |(kind, _)| *kind)
}

/// Wrap a foreign error, classifying it and prefixing `context`.
pub fn to_speed_test_error(
    error: Box<dyn Error + Send + Sync>,
    context: &str,
) -> SpeedTestError {
    let kind = classify_error(error.as_ref());

    let mut wrapped =
        SpeedTestError::suggested(kind, format!("{}: {}", context, error));
    wrapped.source = Some(error);
    wrapped
}

/// The form printed to stderr by the binary.
pub fn format_error_for_display(error: &SpeedTestError) -> String {
    match &error.suggestion {
        Some(suggestion) => {
            format!("Error: {}\n\nSuggestion: {}", error.message, suggestion)
        }
        None => format!("Error: {}", error.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportError;
    use http::StatusCode;
    use std::io;

    #[test]
    fn test_exit_codes_by_family() {
        assert_eq!(ErrorKind::Network.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Timeout.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Server.exit_code(), exit_codes::NETWORK_ERROR);
        assert_eq!(ErrorKind::Api.exit_code(), exit_codes::API_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(
            ErrorKind::Measurement.exit_code(),
            exit_codes::MEASUREMENT_ERROR
        );
        assert_ne!(exit_codes::CANCELED, ErrorKind::Unknown.exit_code());
    }

    #[test]
    fn test_network_error_carries_suggestion() {
        let refused = Box::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let error = to_speed_test_error(refused, "server info");

        let display = error.to_string();
        assert!(display.starts_with("Network error: server info: connection refused"));
        assert!(display.contains("\n  Suggestion: "));
    }

    #[test]
    fn test_config_error_has_no_suggestion() {
        let error = SpeedTestError::config("concurrency must be at least 1");
        assert!(error.suggestion.is_none());
        assert_eq!(
            error.to_string(),
            "Configuration error: concurrency must be at least 1"
        );
    }

    #[test]
    fn test_classify_io_errors() {
        let refused =
            io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(classify_error(&refused), ErrorKind::Network);

        let slow = io::Error::new(io::ErrorKind::TimedOut, "operation timed out");
        assert_eq!(classify_error(&slow), ErrorKind::Timeout);

        let taken =
            io::Error::new(io::ErrorKind::AddrInUse, "Address already in use");
        assert_eq!(classify_error(&taken), ErrorKind::Server);

        assert_eq!(classify_error(&io::Error::other("odd")), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_transport_errors() {
        assert_eq!(classify_error(&TransportError::Timeout), ErrorKind::Timeout);
        assert_eq!(
            classify_error(&TransportError::Status(StatusCode::BAD_GATEWAY)),
            ErrorKind::Api
        );
        assert_eq!(
            classify_error(&TransportError::Malformed("not json".into())),
            ErrorKind::Api
        );
    }

    #[test]
    fn test_to_speed_test_error_keeps_source() {
        let error: Box<dyn Error + Send + Sync> = Box::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));

        let wrapped = to_speed_test_error(error, "server stopped");

        assert_eq!(wrapped.kind, ErrorKind::Network);
        assert_eq!(wrapped.message, "server stopped: connection reset by peer");
        assert!(wrapped.suggestion.is_some());
        assert!(wrapped.source().is_some());
    }

    #[test]
    fn test_format_error_for_display() {
        let error = to_speed_test_error(Box::new(TransportError::Timeout), "ping");
        let output = format_error_for_display(&error);
        assert!(output.starts_with("Error: ping: request timed out\n\nSuggestion: "));

        let plain = format_error_for_display(&SpeedTestError::server("boom"));
        assert_eq!(plain, "Error: boom");
    }
}
