//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async client for the Asterisk Manager Interface,
//! the line-based protocol Asterisk exposes on TCP port 5038. One connection
//! carries both unsolicited events and the responses to actions sent by the
//! client, correlated through the `ActionID` header.
//!
//! # Architecture
//!
//! - [`AmiSession`] (Clone + Send) wraps a connected stream. [`AmiSession::login`]
//!   starts a background reader task and a framing task that parses packets
//!   and routes each one to the handlers registered for it.
//! - Action handlers are keyed by `ActionID` and are dropped after their first
//!   packet, unless registered through [`AmiSession::hold_callback_action`].
//! - Event handlers are keyed by `Event` name, one per name.
//! - Every handler call runs on its own task, so a slow handler never holds
//!   up the connection.
//!
//! The crate does not dial or reconnect. A session lives as long as its
//! connection; [`AmiSession::on_network_error`] reports the end.
//!
//! # Examples
//!
//! ## Login and send an action
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiError, AmiSession, DEFAULT_AMI_PORT};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AmiError> {
//!     let stream = TcpStream::connect(("localhost", DEFAULT_AMI_PORT)).await?;
//!     let session = AmiSession::new(stream);
//!     session.on_network_error(|e| eprintln!("AMI connection lost: {}", e));
//!     session.login("admin", "secret").await?;
//!
//!     let reply = session.command("core show uptime").await?;
//!     println!("{}", reply.cmd_data().unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! ## Event handlers
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiSession, Message};
//! use std::sync::Arc;
//!
//! # fn example(session: AmiSession) -> asterisk_ami_tokio::AmiResult<()> {
//! session.register_handler(
//!     "Hangup",
//!     Arc::new(|m: &Message| {
//!         println!("{} hung up", m.get("Channel").unwrap_or("?"));
//!     }),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## List actions
//!
//! Actions such as `CoreShowChannels` answer with a series of events closed
//! by a `...Complete` event. [`AmiSession::list`] collects them:
//!
//! ```rust,no_run
//! # async fn example(session: asterisk_ami_tokio::AmiSession) -> asterisk_ami_tokio::AmiResult<()> {
//! use asterisk_ami_tokio::ConfbridgeList;
//!
//! let members = session.list(ConfbridgeList::new("1000")).await?;
//! println!("{} participants", members.len());
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod action_id;
pub mod constants;
pub mod error;
pub mod headers;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod session;

pub(crate) mod buffer;
pub(crate) mod dispatcher;
mod list;

pub use action::{
    ActionBuilder, Command, ConfbridgeList, CoreShowChannels, DbDel, DbGet, DbPut, GetVar, Hangup,
    ListAction, Logoff, MeetmeList, Originate, OriginateTarget, Ping, Redirect, SetVar, UserEvent,
};
pub use action_id::ActionIdGenerator;
pub use constants::DEFAULT_AMI_PORT;
pub use error::{AmiError, AmiResult};
pub use headers::{AmiHeader, ParseAmiHeaderError};
pub use message::{Message, ResponseStatus};
pub use protocol::{encode_message, parse_packet, AmiParser};
pub use registry::{CallbackRegistry, Handler};
pub use session::{
    AmiConnectOptions, AmiSession, ConnectionStatus, DisconnectReason, NetworkErrorHandler,
};
