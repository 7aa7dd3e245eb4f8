//! Read loop: socket reader task and packet framing/dispatch task

use crate::{
    constants::SOCKET_BUF_SIZE,
    error::AmiError,
    message::Message,
    protocol::AmiParser,
    registry::Handler,
    session::{BoxedReader, DisconnectReason, SessionShared},
};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Run `handler` on its own task.
///
/// There is no bound on how many of these run at once; a stuck handler costs
/// a task, never the dispatch loop.
pub(crate) fn spawn_handler(handler: Handler, message: Arc<Message>) {
    tokio::spawn(async move {
        handler(&message);
    });
}

/// Start a task feeding queued packets to `handler` one at a time, in order.
///
/// The task ends once every sender is dropped and the queue is drained.
pub(crate) fn spawn_lane(handler: Handler) -> mpsc::UnboundedSender<Arc<Message>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Message>>();
    tokio::spawn(async move {
        while let Some(message) = rx
            .recv()
            .await
        {
            handler(&message);
        }
        trace!("handler lane finished");
    });
    tx
}

/// Spawn the reader and framing tasks for a session.
pub(crate) fn start(
    reader: BoxedReader,
    parser: AmiParser,
    shared: Arc<SessionShared>,
    chunk_queue_size: usize,
) {
    let (chunk_tx, chunk_rx) = mpsc::channel(chunk_queue_size.max(1));
    tokio::spawn(guarded(
        "reader",
        shared.clone(),
        reader_loop(reader, chunk_tx, shared.clone()),
    ));
    tokio::spawn(guarded(
        "framing",
        shared.clone(),
        framing_loop(chunk_rx, parser, shared),
    ));
    debug!("dispatcher started");
}

/// Turn a panic inside a loop into a session failure.
async fn guarded<F>(name: &'static str, shared: Arc<SessionShared>, task: F)
where
    F: std::future::Future<Output = ()>,
{
    let result = std::panic::AssertUnwindSafe(task);
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        error!("{} task panicked", name);
        shared.connection_failed(
            AmiError::protocol_error(format!("{} task panicked", name)),
            DisconnectReason::IoError(format!("{} task panicked", name)),
        );
    }
}

/// Pull fixed-size chunks off the connection until a read fails.
async fn reader_loop(
    mut reader: BoxedReader,
    chunk_tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<SessionShared>,
) {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        match reader
            .read(&mut read_buffer)
            .await
        {
            Ok(0) => {
                info!("Connection closed (EOF)");
                shared.connection_failed(AmiError::ConnectionClosed, DisconnectReason::ConnectionClosed);
                return;
            }
            Ok(n) => {
                trace!("[RECV] Read {} bytes from socket", n);
                if chunk_tx
                    .send(read_buffer[..n].to_vec())
                    .await
                    .is_err()
                {
                    debug!("framing task gone, reader exiting");
                    return;
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                let reason = DisconnectReason::IoError(e.to_string());
                shared.connection_failed(AmiError::Io(e), reason);
                return;
            }
        }
    }
}

/// Frame buffered bytes into packets and route each one.
async fn framing_loop(
    mut chunk_rx: mpsc::Receiver<Vec<u8>>,
    mut parser: AmiParser,
    shared: Arc<SessionShared>,
) {
    while let Some(chunk) = chunk_rx
        .recv()
        .await
    {
        parser.add_data(&chunk);
        loop {
            let parsed = parser.parse_message();
            if let Some(banner) = parser.take_banner() {
                shared.set_banner(banner);
            }
            match parsed {
                Ok(Some(message)) => dispatch(&shared, message),
                Ok(None) => break,
                Err(e) => {
                    warn!("Parser error: {}", e);
                    let reason = DisconnectReason::IoError(e.to_string());
                    shared.connection_failed(e, reason);
                    return;
                }
            }
        }
    }
    debug!("chunk channel closed, framing task exiting");
}

/// Route one packet: action handler, event handler, then the default handler.
pub(crate) fn dispatch(shared: &SessionShared, message: Message) {
    let message = Arc::new(message);

    if let Some(action_id) = message.action_id() {
        if shared
            .actions
            .dispatch(action_id, &message)
        {
            trace!("[DISPATCH] action {}", action_id);
        }
    }

    if let Some(event) = message.event() {
        if let Some((handler, _)) = shared
            .events
            .get(event)
        {
            trace!("[DISPATCH] event {}", event);
            spawn_handler(handler, message.clone());
        }
    }

    if let Some(handler) = shared.default_handler() {
        spawn_handler(handler, message);
    }
}
