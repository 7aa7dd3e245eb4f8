//! Error types for the AMI client

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AmiResult<T> = Result<T, AmiError>;

/// Errors produced by the AMI client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// Underlying transport error (read or write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection wrote fewer bytes than the encoded packet holds.
    #[error("short write: {written} of {expected} bytes sent")]
    ShortWrite { written: usize, expected: usize },

    /// The server closed the connection (EOF on the read side).
    #[error("connection closed by server")]
    ConnectionClosed,

    /// An action was sent before a successful login, or after the connection failed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The server answered `Login` with something other than `Success`.
    #[error("login rejected: {message}")]
    LoginRejected { message: String },

    /// `login` was called on a session whose dispatcher is already running.
    #[error("dispatcher already started for this session")]
    AlreadyStarted,

    /// A retained callback was requested without a handler.
    #[error("retained callback requires a handler, use send_action without one instead")]
    MissingHandler,

    /// An event handler is already registered for this event name.
    #[error("handler already registered for event {event}")]
    HandlerExists { event: String },

    /// The server answered an action with `Response: Error`.
    #[error("action failed: {message}")]
    ActionFailed { message: String },

    /// A header a caller required is absent or does not parse.
    #[error("no such value: {header}")]
    NoSuchValue { header: String },

    /// Header name or value that cannot go on the wire.
    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    /// Framing violation on the inbound stream.
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// The dispatcher dropped a pending reply without answering it.
    #[error("dispatcher stopped before the reply arrived")]
    DispatcherStopped,
}

impl AmiError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        AmiError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn no_such_value(header: impl Into<String>) -> Self {
        AmiError::NoSuchValue {
            header: header.into(),
        }
    }

    /// `true` for failures that end the session (transport and framing errors).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AmiError::Io(_)
                | AmiError::ShortWrite { .. }
                | AmiError::ConnectionClosed
                | AmiError::ProtocolError { .. }
        )
    }
}
