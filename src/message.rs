//! AMI message: one header block exchanged over the connection

use crate::{
    constants::{
        EVENT_LIST_COMPLETE, EVENT_LIST_START, HEADER_ACTION_ID, HEADER_CMD_DATA, HEADER_EVENT,
        HEADER_EVENT_LIST, HEADER_MESSAGE, HEADER_RESPONSE, RESPONSE_ERROR, RESPONSE_SUCCESS,
    },
    error::{AmiError, AmiResult},
};
use std::collections::HashMap;
use std::str::FromStr;

/// Classification of the `Response` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseStatus {
    /// `Response: Success`
    Success,
    /// `Response: Error`
    Error,
    /// `Response: Follows` (command output follows in the same packet)
    Follows,
    /// `Response: Goodbye` (answer to `Logoff`)
    Goodbye,
    /// Any other value.
    Other,
}

impl ResponseStatus {
    fn from_wire(value: &str) -> Self {
        match value {
            RESPONSE_SUCCESS => ResponseStatus::Success,
            RESPONSE_ERROR => ResponseStatus::Error,
            "Follows" => ResponseStatus::Follows,
            "Goodbye" => ResponseStatus::Goodbye,
            _ => ResponseStatus::Other,
        }
    }
}

/// Header name to value mapping for one packet.
///
/// Keys are case-sensitive and unique; order is not preserved. Multi-line
/// command output is collected under the synthetic `CmdData` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: HashMap<String, String>,
}

impl Message {
    /// Empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message with a single `Action` header.
    pub fn action(name: impl Into<String>) -> Self {
        let mut m = Self::new();
        m.set(crate::constants::HEADER_ACTION, name);
        m
    }

    /// Look up a header by name.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// Set a header, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.headers
            .insert(name.into(), value.into())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: impl AsRef<str>) -> Option<String> {
        self.headers
            .remove(name.as_ref())
    }

    /// Whether the header is present.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.headers
            .contains_key(name.as_ref())
    }

    /// Header value, or [`AmiError::NoSuchValue`] when absent.
    pub fn require(&self, name: impl AsRef<str>) -> AmiResult<&str> {
        let name = name.as_ref();
        self.get(name)
            .ok_or_else(|| AmiError::no_such_value(name))
    }

    /// Parse a header value, or [`AmiError::NoSuchValue`] when absent or malformed.
    ///
    /// ```
    /// # use asterisk_ami_tokio::Message;
    /// let m = Message::new().with("ListItems", "3");
    /// assert_eq!(m.parse::<u32>("ListItems").unwrap(), 3);
    /// assert!(m.parse::<u32>("Missing").is_err());
    /// ```
    pub fn parse<T: FromStr>(&self, name: impl AsRef<str>) -> AmiResult<T> {
        let name = name.as_ref();
        self.require(name)?
            .parse()
            .map_err(|_| AmiError::no_such_value(name))
    }

    /// All headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Consume into the underlying map.
    pub fn into_headers(self) -> HashMap<String, String> {
        self.headers
    }

    /// Iterate over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.headers
            .len()
    }

    /// `true` if the message has no headers.
    pub fn is_empty(&self) -> bool {
        self.headers
            .is_empty()
    }

    /// `ActionID` correlation header.
    pub fn action_id(&self) -> Option<&str> {
        self.get(HEADER_ACTION_ID)
    }

    /// `Event` name of an unsolicited notification.
    pub fn event(&self) -> Option<&str> {
        self.get(HEADER_EVENT)
    }

    /// `Message` text accompanying a response.
    pub fn message_text(&self) -> Option<&str> {
        self.get(HEADER_MESSAGE)
    }

    /// Folded command output.
    pub fn cmd_data(&self) -> Option<&str> {
        self.get(HEADER_CMD_DATA)
    }

    /// Classified `Response` header, `None` for events.
    pub fn response_status(&self) -> Option<ResponseStatus> {
        self.get(HEADER_RESPONSE)
            .map(ResponseStatus::from_wire)
    }

    /// `true` for `Response: Success`.
    pub fn is_success(&self) -> bool {
        self.response_status() == Some(ResponseStatus::Success)
    }

    /// `true` for `Response: Error`.
    pub fn is_error(&self) -> bool {
        self.response_status() == Some(ResponseStatus::Error)
    }

    /// `EventList: start` marker opening a list answer.
    pub fn is_list_start(&self) -> bool {
        self.get(HEADER_EVENT_LIST)
            .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_LIST_START))
    }

    /// `EventList: Complete` marker closing a list answer.
    pub fn is_list_complete(&self) -> bool {
        self.get(HEADER_EVENT_LIST)
            .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_LIST_COMPLETE))
    }
}

impl<K, V> FromIterator<(K, V)> for Message
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V> Extend<(K, V)> for Message
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl From<HashMap<String, String>> for Message {
    fn from(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }
}
