use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::RoomError;
use crate::http::RoomApi;
use crate::logging;
use crate::room::RoomConnection;

/// Duplex control channel as the room sees it: fire-and-forget sends plus
/// an open trigger. Reconnect/backoff policy lives with the driver's
/// caller, not here.
pub trait SocketChannel: Send {
    fn open(&mut self);
    fn send(&mut self, frame: String) -> Result<(), RoomError>;
}

/// Handle given to the room. Outbound frames go through an unbounded
/// queue; `open()` releases the driver waiting in [`run_socket`].
pub struct WsSocket {
    outbound: mpsc::UnboundedSender<String>,
    connect: Arc<Notify>,
}

/// Driver-side ends of a [`WsSocket`].
pub struct WsSocketBackend {
    outbound: mpsc::UnboundedReceiver<String>,
    connect: Arc<Notify>,
}

pub fn ws_socket() -> (WsSocket, WsSocketBackend) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connect = Arc::new(Notify::new());
    (
        WsSocket {
            outbound: tx,
            connect: connect.clone(),
        },
        WsSocketBackend {
            outbound: rx,
            connect,
        },
    )
}

impl SocketChannel for WsSocket {
    fn open(&mut self) {
        self.connect.notify_one();
    }

    fn send(&mut self, frame: String) -> Result<(), RoomError> {
        self.outbound
            .send(frame)
            .map_err(|_| RoomError::Socket("writer queue closed".to_string()))
    }
}

/// Own the websocket connection: wait for `open()`, connect, report the
/// open to the room, then pump inbound frames into it in arrival order
/// while a writer task drains the outbound queue. Returns when the server
/// closes the stream; the caller decides whether to reconnect.
pub async fn run_socket<A>(
    mut backend: WsSocketBackend,
    url: &str,
    room: Arc<Mutex<RoomConnection<A>>>,
) -> Result<()>
where
    A: RoomApi + Send,
{
    backend.connect.notified().await;

    let (ws_stream, _) = connect_async(url)
        .await
        .with_context(|| format!("connect {url}"))?;
    let (mut write, mut read) = ws_stream.split();

    room.lock().await.handle_socket_open();

    let write_task = tokio::spawn(async move {
        while let Some(frame) = backend.outbound.recv().await {
            if let Err(err) = write.send(Message::Text(frame)).await {
                logging::error(format!("socket send error: {err}"));
                break;
            }
        }
    });

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(txt)) => dispatch_frame(&room, &txt).await,
            Ok(Message::Binary(bin)) => {
                if let Ok(txt) = String::from_utf8(bin) {
                    dispatch_frame(&room, &txt).await;
                }
            }
            Ok(_) => {}
            Err(err) => {
                logging::error(format!("socket read error: {err}"));
                break;
            }
        }
    }

    write_task.abort();
    logging::info("control channel closed");
    Ok(())
}

async fn dispatch_frame<A>(room: &Arc<Mutex<RoomConnection<A>>>, raw: &str)
where
    A: RoomApi + Send,
{
    // Protocol and membership faults must not be swallowed; they signal
    // drift between server and client.
    if let Err(err) = room.lock().await.handle_frame(raw) {
        logging::error(format!("frame dispatch failed: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_lands_in_the_writer_queue() {
        let (mut socket, mut backend) = ws_socket();
        socket.send("{\"t\":\"e\"}".to_string()).unwrap();
        assert_eq!(backend.outbound.try_recv().unwrap(), "{\"t\":\"e\"}");
    }

    #[tokio::test]
    async fn open_releases_the_driver() {
        let (mut socket, backend) = ws_socket();
        socket.open();
        // a stored permit means notified() resolves immediately
        backend.connect.notified().await;
    }

    #[test]
    fn send_after_driver_exit_is_a_socket_fault() {
        let (mut socket, backend) = ws_socket();
        drop(backend);
        let err = socket.send("frame".to_string()).unwrap_err();
        assert!(matches!(err, RoomError::Socket(_)));
    }
}
