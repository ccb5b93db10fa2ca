// WebSocket server for draft clients.
//
// Each accepted connection gets an id, a reader that forwards text frames to
// the app loop, and a writer fed by an outbound channel the app loop holds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Frames queued per connection before the app loop starts dropping them.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the handshake. Frames sent on `outbound` are
    /// written to it as text.
    Connected {
        conn_id: u64,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// The client went away.
    Disconnected { conn_id: u64 },
    /// A text frame from the client (raw JSON string).
    Message { conn_id: u64, text: String },
}

/// Source of raw client connections. Tests substitute in-memory duplex
/// streams for TCP.
#[async_trait]
pub trait ConnectionListener: Send {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> std::io::Result<(Self::Io, String)>;
}

/// TCP listener bound to localhost.
pub struct TungsteniteListener {
    listener: TcpListener,
}

impl TungsteniteListener {
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
        info!("WebSocket server listening on {}", listener.local_addr()?);
        Ok(TungsteniteListener { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl ConnectionListener for TungsteniteListener {
    type Io = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, String)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((stream, addr.to_string()))
    }
}

/// Accept connections forever, serving each on its own task. Returns when
/// the app loop drops its receiver or the listener fails.
pub async fn run<L: ConnectionListener>(
    mut listener: L,
    tx: mpsc::Sender<WsEvent>,
) -> anyhow::Result<()> {
    let next_id = Arc::new(AtomicU64::new(1));
    loop {
        let (io, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        let conn_id = next_id.fetch_add(1, Ordering::Relaxed);
        info!("Accepted connection {conn_id} from {addr}");
        tokio::spawn(serve_connection(io, addr, conn_id, tx.clone()));
    }
    Ok(())
}

/// Handshake, then pump frames both ways until either side closes.
async fn serve_connection<S>(io: S, addr: String, conn_id: u64, tx: mpsc::Sender<WsEvent>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match tokio_tungstenite::accept_async(io).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    if tx
        .send(WsEvent::Connected {
            conn_id,
            addr: addr.clone(),
            outbound: out_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("Write to connection {conn_id} failed: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &tx, conn_id, &addr).await;
    writer.abort();
    let _ = tx.send(WsEvent::Disconnected { conn_id }).await;
    info!("Connection {conn_id} from {addr} closed");
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    conn_id: u64,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    conn_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong, Frame.
            }
        }
    }
    Ok(())
}
