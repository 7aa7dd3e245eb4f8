//! Protocol constants and configuration values

/// Default Asterisk manager port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Socket read chunk size for the reader task
pub const SOCKET_BUF_SIZE: usize = 8192;

/// Initial allocation for the accumulation buffer
pub const BUF_CHUNK: usize = 16 * 1024;

/// Largest amount of unframed data tolerated before a packet boundary shows up.
/// `Command` output for a busy `core show channels` stays well under 1MB.
pub const MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;

/// Capacity of the reader -> framing chunk channel
pub const DEFAULT_CHUNK_QUEUE_SIZE: usize = 64;

/// Line terminator
pub const LINE_TERMINATOR: &str = "\r\n";
/// Packet terminator: a line terminator followed by a blank line
pub const PACKET_TERMINATOR: &str = "\r\n\r\n";

/// Trailer line closing the output of a `Command` action
pub const COMMAND_END_MARKER: &str = "--END COMMAND--";

/// First line sent by the server right after the TCP connect
pub const GREETING_PREFIX: &str = "Asterisk Call Manager/";

/// Prefix for ActionIDs when the local hostname cannot be read
pub const FALLBACK_HOSTNAME: &str = "ami-client";

/// Correlation header stamped on every outgoing action.
pub const HEADER_ACTION_ID: &str = "ActionID";
/// Action name header.
pub const HEADER_ACTION: &str = "Action";
/// Response classification (`Success`, `Error`, `Follows`, `Goodbye`).
pub const HEADER_RESPONSE: &str = "Response";
/// Human readable text accompanying a response.
pub const HEADER_MESSAGE: &str = "Message";
/// Unsolicited notification name.
pub const HEADER_EVENT: &str = "Event";
/// List marker (`start` / `Complete`).
pub const HEADER_EVENT_LIST: &str = "EventList";
/// Synthetic header holding folded command output.
pub const HEADER_CMD_DATA: &str = "CmdData";
/// Text following the three-digit code of a reply status line (`200 result=1`).
pub const STATUS_RESULT_MARKER: &str = " result=";
/// Synthetic header holding a `NNN result=...` reply status line.
pub const HEADER_CMD_STATUS: &str = "CmdStatus";
/// Login credentials.
pub const HEADER_USERNAME: &str = "Username";
/// Login credentials (redacted in logs).
pub const HEADER_SECRET: &str = "Secret";

/// `Response` value of a successful action.
pub const RESPONSE_SUCCESS: &str = "Success";
/// `Response` value of a failed action.
pub const RESPONSE_ERROR: &str = "Error";

/// `EventList` value opening a multi-packet answer.
pub const EVENT_LIST_START: &str = "start";
/// `EventList` value closing a multi-packet answer.
pub const EVENT_LIST_COMPLETE: &str = "Complete";
