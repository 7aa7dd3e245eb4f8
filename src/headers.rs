//! Typed names for the AMI headers the client itself reads or writes.

/// Error returned when parsing an unrecognized header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmiHeaderError(pub String);

impl std::fmt::Display for ParseAmiHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI header: {}", self.0)
    }
}

impl std::error::Error for ParseAmiHeaderError {}

define_header_enum! {
    error_type: ParseAmiHeaderError,
    /// Header names with protocol meaning to the client.
    ///
    /// Anything else in a [`Message`](crate::Message) is payload and is looked
    /// up by plain string. All of these work with [`Message::get()`](crate::Message::get).
    pub enum AmiHeader {
        ActionId => "ActionID",
        Action => "Action",
        Response => "Response",
        Message => "Message",
        Event => "Event",
        EventList => "EventList",
        CmdData => "CmdData",
        CmdStatus => "CmdStatus",
        Username => "Username",
        Secret => "Secret",
        Channel => "Channel",
        Privilege => "Privilege",
    }
}
