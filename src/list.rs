//! Collection of list-style answers (`EventList: start` ... `<Name>Complete`)

use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::debug;

use crate::{
    action::ListAction,
    error::{AmiError, AmiResult},
    message::Message,
    registry::Handler,
    session::{AmiSession, Handoff, SessionShared},
};

/// Accumulates the packets of one list answer.
struct ListCollector {
    complete_event: String,
    items: Mutex<Vec<Message>>,
    done: Handoff<AmiResult<Vec<Message>>>,
    shared: Weak<SessionShared>,
}

impl ListCollector {
    fn on_packet(&self, m: &Message) {
        if m.is_error() {
            self.finish(
                m,
                Err(AmiError::ActionFailed {
                    message: m
                        .message_text()
                        .unwrap_or_default()
                        .to_string(),
                }),
            );
            return;
        }
        if m.event() == Some(self.complete_event.as_str()) && m.is_list_complete() {
            let items = std::mem::take(
                &mut *self
                    .items
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            debug!("list {} complete with {} items", self.complete_event, items.len());
            self.finish(m, Ok(items));
            return;
        }
        if m.is_list_start() {
            return;
        }
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(m.clone());
    }

    fn finish(&self, m: &Message, result: AmiResult<Vec<Message>>) {
        if let (Some(shared), Some(id)) = (self.shared.upgrade(), m.action_id()) {
            shared
                .actions
                .del(id);
        }
        self.done
            .resolve(result);
    }
}

impl AmiSession {
    /// Send an action answered by a list of events and wait for all of them.
    ///
    /// Packets carrying the action's ID are collected in arrival order until
    /// one with `Event: <complete_event>` and `EventList: Complete`. The
    /// opening `EventList: start` response and the closing packet are left
    /// out. A `Response: Error` ends the exchange with
    /// [`AmiError::ActionFailed`].
    ///
    /// There is no deadline; wrap the call in [`tokio::time::timeout`] if needed.
    pub async fn collect_list(
        &self,
        message: Message,
        complete_event: &str,
    ) -> AmiResult<Vec<Message>> {
        let (done, rx) = Handoff::new();
        let collector = Arc::new(ListCollector {
            complete_event: complete_event.to_string(),
            items: Mutex::new(Vec::new()),
            done,
            shared: Arc::downgrade(&self.shared),
        });
        let handler: Handler = Arc::new(move |m: &Message| collector.on_packet(m));

        self.hold_callback_action(message, Some(handler))
            .await?;
        rx.await
            .map_err(|_| AmiError::DispatcherStopped)?
    }

    /// Run a [`ListAction`] and collect its events.
    ///
    /// ```rust,no_run
    /// # async fn example(session: asterisk_ami_tokio::AmiSession) -> asterisk_ami_tokio::AmiResult<()> {
    /// use asterisk_ami_tokio::CoreShowChannels;
    ///
    /// for channel in session.list(CoreShowChannels).await? {
    ///     println!("{}", channel.get("Channel").unwrap_or("?"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list<A: ListAction>(&self, action: A) -> AmiResult<Vec<Message>> {
        self.collect_list(action.into(), A::COMPLETE_EVENT)
            .await
    }
}
