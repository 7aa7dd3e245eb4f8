//! AMI framing: packet parsing and encoding

use crate::{
    buffer::AmiBuffer,
    constants::{
        COMMAND_END_MARKER, GREETING_PREFIX, STATUS_RESULT_MARKER, HEADER_CMD_DATA, HEADER_CMD_STATUS, LINE_TERMINATOR,
        MAX_PACKET_SIZE, PACKET_TERMINATOR,
    },
    error::{AmiError, AmiResult},
    message::Message,
};
use std::fmt::Write as _;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Parser state for the head of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Nothing consumed yet; the server may open with a one-line banner.
    WaitingForGreeting,
    WaitingForPacket,
}

/// Incremental AMI packet parser.
///
/// Bytes go in through [`add_data`](Self::add_data) in whatever chunks the
/// socket produces; [`parse_message`](Self::parse_message) yields one
/// [`Message`] per blank-line-terminated block once it is complete.
pub struct AmiParser {
    buffer: AmiBuffer,
    state: ParseState,
    banner: Option<String>,
}

impl AmiParser {
    /// Parser with the default accumulation limit.
    pub fn new() -> Self {
        Self::with_max_packet_size(MAX_PACKET_SIZE)
    }

    /// Parser failing once `max_packet_size` bytes wait without a packet terminator.
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            buffer: AmiBuffer::new(max_packet_size),
            state: ParseState::WaitingForGreeting,
            banner: None,
        }
    }

    /// Append raw socket data.
    pub fn add_data(&mut self, data: &[u8]) {
        self.buffer
            .extend_from_slice(data);
    }

    /// Greeting line consumed from the head of the stream, if any.
    pub fn take_banner(&mut self) -> Option<String> {
        self.banner
            .take()
    }

    /// Try to parse one complete packet from the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed. Empty packets (stray blank
    /// lines) are skipped.
    pub fn parse_message(&mut self) -> AmiResult<Option<Message>> {
        if self.state == ParseState::WaitingForGreeting && !self.consume_greeting() {
            self.buffer
                .check_size_limits()?;
            return Ok(None);
        }

        loop {
            let Some(packet) = self
                .buffer
                .extract_until_pattern(PACKET_TERMINATOR.as_bytes())
            else {
                self.buffer
                    .compact();
                self.buffer
                    .check_size_limits()?;
                return Ok(None);
            };

            let text = String::from_utf8_lossy(&packet);
            let message = parse_packet(&text);
            if message.is_empty() {
                trace!("skipping empty packet");
                continue;
            }
            trace!("parsed packet with {} headers", message.len());
            return Ok(Some(message));
        }
    }

    /// Returns `true` once the greeting question is settled.
    fn consume_greeting(&mut self) -> bool {
        let prefix = GREETING_PREFIX.as_bytes();
        let pending = self
            .buffer
            .pending();
        let n = pending
            .len()
            .min(prefix.len());
        if pending[..n] != prefix[..n] {
            self.state = ParseState::WaitingForPacket;
            return true;
        }
        if pending.len() < prefix.len() {
            return false;
        }
        match self
            .buffer
            .extract_until_pattern(LINE_TERMINATOR.as_bytes())
        {
            Some(line) => {
                let banner = String::from_utf8_lossy(&line)
                    .trim()
                    .to_string();
                debug!("server greeting: {}", banner);
                self.banner = Some(banner);
                self.state = ParseState::WaitingForPacket;
                true
            }
            None => false,
        }
    }
}

impl Default for AmiParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `NNN result=...` reply status line, as printed ahead of command output.
///
/// Plain output that merely starts with a number (`150 active channels`) is
/// not a status line.
fn is_status_line(line: &str) -> bool {
    let b = line.as_bytes();
    b.len() > 4
        && b[..3]
            .iter()
            .all(u8::is_ascii_digit)
        && line[3..].starts_with(STATUS_RESULT_MARKER)
}

/// Parse the text of one packet (without its terminating blank line).
///
/// Lines split once on the first `:` into a trimmed name and value. Lines
/// without a separator are command output: the end-of-command marker is
/// dropped, a leading `NNN result=` status line lands in `CmdStatus`, and the
/// rest is joined with `\n` into `CmdData`.
pub fn parse_packet(text: &str) -> Message {
    let mut message = Message::new();
    let mut output: Vec<&str> = Vec::new();
    let mut status: Option<&str> = None;

    for line in text.split(LINE_TERMINATOR) {
        if line
            .trim()
            .is_empty()
        {
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            message.set(name.trim(), value.trim());
            continue;
        }

        let line = line.trim_end();
        let line = line
            .strip_suffix(COMMAND_END_MARKER)
            .unwrap_or(line);
        if line
            .trim()
            .is_empty()
        {
            continue;
        }
        if output.is_empty() && status.is_none() && is_status_line(line) {
            status = Some(line);
            continue;
        }
        output.push(line);
    }

    if let Some(status) = status {
        message.set(HEADER_CMD_STATUS, status);
    }
    if !output.is_empty() {
        message.set(HEADER_CMD_DATA, output.join("\n"));
    }
    message
}

/// Reject strings that would break the line framing of a packet.
pub(crate) fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains(['\r', '\n']) {
        return Err(AmiError::InvalidHeader {
            header: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

fn validate_header(name: &str, value: &str) -> AmiResult<()> {
    if name.is_empty() || name.contains(':') {
        return Err(AmiError::InvalidHeader {
            header: name.to_string(),
        });
    }
    validate_no_newlines(name, "header name")?;
    validate_no_newlines(value, "header value")
}

/// Encode a message as `Name:Value` lines closed by a blank line.
///
/// Header order is whatever the map yields; the protocol does not care.
pub fn encode_message(message: &Message) -> AmiResult<String> {
    let mut wire = String::new();
    for (name, value) in message.iter() {
        validate_header(name, value)?;
        let _ = write!(wire, "{}:{}{}", name, value, LINE_TERMINATOR);
    }
    wire.push_str(LINE_TERMINATOR);
    Ok(wire)
}

/// Write one encoded packet, treating any short write as failure.
pub(crate) async fn write_packet<W>(writer: &mut W, packet: &[u8]) -> AmiResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while written < packet.len() {
        let n = writer
            .write(&packet[written..])
            .await?;
        if n == 0 {
            return Err(AmiError::ShortWrite {
                written,
                expected: packet.len(),
            });
        }
        written += n;
    }
    writer
        .flush()
        .await?;
    Ok(())
}
