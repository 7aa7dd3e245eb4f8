//! Builders for common manager actions
//!
//! Each builder converts into a [`Message`] ready for
//! [`AmiSession::send_action`](crate::AmiSession::send_action). The session
//! sets `ActionID` itself, so builders never carry one.

use crate::{
    constants::HEADER_ACTION,
    error::AmiResult,
    message::Message,
    protocol::validate_no_newlines,
};
use std::collections::BTreeMap;

/// Action answered by a sequence of events closed by a completion event.
///
/// Run with [`AmiSession::list`](crate::AmiSession::list).
pub trait ListAction: Into<Message> {
    /// `Event` name of the packet that ends the list.
    const COMPLETE_EVENT: &'static str;
}

/// Build an arbitrary action header by header.
///
/// ```
/// use asterisk_ami_tokio::ActionBuilder;
///
/// let msg = ActionBuilder::new("QueueStatus")
///     .header("Queue", "support").unwrap()
///     .build();
/// assert_eq!(msg.get("Action"), Some("QueueStatus"));
/// assert_eq!(msg.get("Queue"), Some("support"));
/// assert!(ActionBuilder::new("QueueStatus").header("Queue", "a\r\nAction: Logoff").is_err());
/// ```
#[derive(Debug)]
pub struct ActionBuilder {
    message: Message,
}

impl ActionBuilder {
    /// Start an action with the given `Action` name.
    pub fn new(action: &str) -> Self {
        Self {
            message: Message::action(action),
        }
    }

    /// Add a header.
    ///
    /// Returns an error if the name or value contains newline characters.
    pub fn header(mut self, name: &str, value: &str) -> AmiResult<Self> {
        validate_no_newlines(name, "header name")?;
        validate_no_newlines(value, "header value")?;
        self.message
            .set(name, value);
        Ok(self)
    }

    pub fn build(self) -> Message {
        self.message
    }
}

/// `Ping`: keepalive, answered with `Response: Success`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl From<Ping> for Message {
    fn from(_: Ping) -> Self {
        Message::action("Ping")
    }
}

/// `Logoff`: ends the manager session, answered with `Response: Goodbye`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logoff;

impl From<Logoff> for Message {
    fn from(_: Logoff) -> Self {
        Message::action("Logoff")
    }
}

/// `Command`: run a CLI command; output comes back folded into `CmdData`.
#[derive(Debug, Clone)]
pub struct Command {
    pub command: String,
}

impl Command {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl From<Command> for Message {
    fn from(c: Command) -> Self {
        Message::action("Command").with("Command", c.command)
    }
}

/// `Hangup` a channel.
#[derive(Debug, Clone)]
pub struct Hangup {
    pub channel: String,
    /// Q.850 cause code.
    pub cause: Option<u32>,
}

impl Hangup {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: u32) -> Self {
        self.cause = Some(cause);
        self
    }
}

impl From<Hangup> for Message {
    fn from(h: Hangup) -> Self {
        let mut m = Message::action("Hangup").with("Channel", h.channel);
        if let Some(cause) = h.cause {
            m.set("Cause", cause.to_string());
        }
        m
    }
}

/// `Redirect` a channel to a dialplan location.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub channel: String,
    pub context: String,
    pub exten: String,
    pub priority: String,
}

impl Redirect {
    pub fn new(
        channel: impl Into<String>,
        context: impl Into<String>,
        exten: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            context: context.into(),
            exten: exten.into(),
            priority: priority.into(),
        }
    }
}

impl From<Redirect> for Message {
    fn from(r: Redirect) -> Self {
        Message::action("Redirect")
            .with("Channel", r.channel)
            .with("Context", r.context)
            .with("Exten", r.exten)
            .with("Priority", r.priority)
    }
}

/// Where an originated channel goes once answered.
#[derive(Debug, Clone)]
pub enum OriginateTarget {
    /// Dialplan location.
    Extension {
        context: String,
        exten: String,
        priority: String,
    },
    /// Single dialplan application.
    Application { application: String, data: String },
}

/// `Originate` a call.
///
/// ```
/// use asterisk_ami_tokio::{Message, Originate};
///
/// let msg: Message = Originate::extension("PJSIP/100", "default", "200", "1")
///     .caller_id("Desk <100>")
///     .variable("A", "1")
///     .variable("B", "2")
///     .into();
/// assert_eq!(msg.get("Context"), Some("default"));
/// assert_eq!(msg.get("Variable"), Some("A=1,B=2"));
/// assert_eq!(msg.get("Application"), None);
/// ```
#[derive(Debug, Clone)]
pub struct Originate {
    pub channel: String,
    pub target: OriginateTarget,
    /// Milliseconds to wait for answer.
    pub timeout: Option<u64>,
    pub caller_id: Option<String>,
    pub account: Option<String>,
    pub is_async: bool,
    pub variables: BTreeMap<String, String>,
}

impl Originate {
    /// Connect `channel` to a dialplan extension.
    pub fn extension(
        channel: impl Into<String>,
        context: impl Into<String>,
        exten: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self::new(
            channel,
            OriginateTarget::Extension {
                context: context.into(),
                exten: exten.into(),
                priority: priority.into(),
            },
        )
    }

    /// Connect `channel` to an application.
    pub fn application(
        channel: impl Into<String>,
        application: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self::new(
            channel,
            OriginateTarget::Application {
                application: application.into(),
                data: data.into(),
            },
        )
    }

    fn new(channel: impl Into<String>, target: OriginateTarget) -> Self {
        Self {
            channel: channel.into(),
            target,
            timeout: None,
            caller_id: None,
            account: None,
            is_async: false,
            variables: BTreeMap::new(),
        }
    }

    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Answer immediately with `Response: Success` and report the outcome
    /// later in an `OriginateResponse` event.
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Channel variable set on the new channel.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables
            .insert(name.into(), value.into());
        self
    }
}

impl From<Originate> for Message {
    fn from(o: Originate) -> Self {
        let mut m = Message::action("Originate").with("Channel", o.channel);
        match o.target {
            OriginateTarget::Extension {
                context,
                exten,
                priority,
            } => {
                m.set("Context", context);
                m.set("Exten", exten);
                m.set("Priority", priority);
            }
            OriginateTarget::Application { application, data } => {
                m.set("Application", application);
                m.set("Data", data);
            }
        }
        if let Some(timeout) = o.timeout {
            m.set("Timeout", timeout.to_string());
        }
        if let Some(caller_id) = o.caller_id {
            m.set("CallerID", caller_id);
        }
        if let Some(account) = o.account {
            m.set("Account", account);
        }
        if o.is_async {
            m.set("Async", "yes");
        }
        if !o.variables.is_empty() {
            let joined = o
                .variables
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            m.set("Variable", joined);
        }
        m
    }
}

/// `GetVar`: read a global or channel variable.
#[derive(Debug, Clone)]
pub struct GetVar {
    pub variable: String,
    /// `None` reads a global variable.
    pub channel: Option<String>,
}

impl GetVar {
    pub fn global(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            channel: None,
        }
    }

    pub fn channel(variable: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            channel: Some(channel.into()),
        }
    }
}

impl From<GetVar> for Message {
    fn from(g: GetVar) -> Self {
        let mut m = Message::action("GetVar").with("Variable", g.variable);
        if let Some(channel) = g.channel {
            m.set("Channel", channel);
        }
        m
    }
}

/// `SetVar`: write a global or channel variable.
#[derive(Debug, Clone)]
pub struct SetVar {
    pub variable: String,
    pub value: String,
    /// `None` sets a global variable.
    pub channel: Option<String>,
}

impl SetVar {
    pub fn global(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            value: value.into(),
            channel: None,
        }
    }

    pub fn channel(
        variable: impl Into<String>,
        value: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            variable: variable.into(),
            value: value.into(),
            channel: Some(channel.into()),
        }
    }
}

impl From<SetVar> for Message {
    fn from(s: SetVar) -> Self {
        let mut m = Message::action("SetVar")
            .with("Variable", s.variable)
            .with("Value", s.value);
        if let Some(channel) = s.channel {
            m.set("Channel", channel);
        }
        m
    }
}

/// `DBGet`: the value arrives in a `DBGetResponse` event carrying the same ActionID.
#[derive(Debug, Clone)]
pub struct DbGet {
    pub family: String,
    pub key: String,
}

impl DbGet {
    pub fn new(family: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            key: key.into(),
        }
    }
}

impl From<DbGet> for Message {
    fn from(d: DbGet) -> Self {
        Message::action("DBGet")
            .with("Family", d.family)
            .with("Key", d.key)
    }
}

/// `DBPut`: store a value in the Asterisk database.
#[derive(Debug, Clone)]
pub struct DbPut {
    pub family: String,
    pub key: String,
    pub value: String,
}

impl DbPut {
    pub fn new(family: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<DbPut> for Message {
    fn from(d: DbPut) -> Self {
        Message::action("DBPut")
            .with("Family", d.family)
            .with("Key", d.key)
            .with("Value", d.value)
    }
}

#[derive(Debug, Clone)]
pub struct DbDel {
    pub family: String,
    pub key: String,
}

impl DbDel {
    pub fn new(family: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            key: key.into(),
        }
    }
}

impl From<DbDel> for Message {
    fn from(d: DbDel) -> Self {
        Message::action("DBDel")
            .with("Family", d.family)
            .with("Key", d.key)
    }
}

/// `UserEvent`: broadcast a custom event to every manager client.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub name: String,
    pub headers: BTreeMap<String, String>,
}

impl UserEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into(), value.into());
        self
    }
}

impl From<UserEvent> for Message {
    fn from(u: UserEvent) -> Self {
        let mut m = Message::action("UserEvent");
        m.extend(u.headers);
        // Set last: a custom header must not rename the event or the action.
        m.set("UserEvent", u.name);
        m.set(HEADER_ACTION, "UserEvent");
        m
    }
}

/// `ConfbridgeList`: participants of one ConfBridge conference.
#[derive(Debug, Clone)]
pub struct ConfbridgeList {
    pub conference: String,
}

impl ConfbridgeList {
    pub fn new(conference: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
        }
    }
}

impl From<ConfbridgeList> for Message {
    fn from(c: ConfbridgeList) -> Self {
        Message::action("ConfbridgeList").with("Conference", c.conference)
    }
}

impl ListAction for ConfbridgeList {
    const COMPLETE_EVENT: &'static str = "ConfbridgeListComplete";
}

/// `MeetmeList`: participants of one MeetMe conference, or of all of them.
#[derive(Debug, Clone, Default)]
pub struct MeetmeList {
    pub conference: Option<String>,
}

impl MeetmeList {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn conference(conference: impl Into<String>) -> Self {
        Self {
            conference: Some(conference.into()),
        }
    }
}

impl From<MeetmeList> for Message {
    fn from(l: MeetmeList) -> Self {
        let mut m = Message::action("MeetmeList");
        if let Some(conference) = l.conference {
            m.set("Conference", conference);
        }
        m
    }
}

impl ListAction for MeetmeList {
    const COMPLETE_EVENT: &'static str = "MeetmeListComplete";
}

/// `CoreShowChannels`: one `CoreShowChannel` event per active channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreShowChannels;

impl From<CoreShowChannels> for Message {
    fn from(_: CoreShowChannels) -> Self {
        Message::action("CoreShowChannels")
    }
}

impl ListAction for CoreShowChannels {
    const COMPLETE_EVENT: &'static str = "CoreShowChannelsComplete";
}
