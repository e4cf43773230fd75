//! TCP connection establishment (§4.5) and the sender/receiver I/O workers
//! (§5) that run beside the FSM once a connection exists. Generalizes
//! `ocatvius-daemon`'s half-finished `mio` + `socket2` polling sketch to a
//! plain `tokio::net` implementation: a dedicated task per direction, talking
//! to the peer through its event and message queues.

use crate::{
    cancel::CancelToken,
    config::{
        Config,
        Mode,
    },
    error::PeerError,
    peer::Event,
};
use bgp_wire::message::{
    self,
    BgpMessage,
    UpdateMessage,
};
use log::{
    debug,
    trace,
    warn,
};
use std::{
    net::{
        IpAddr,
        SocketAddr,
    },
    time::Duration,
};
use tokio::{
    io::{
        AsyncReadExt,
        AsyncWriteExt,
    },
    net::{
        tcp::{
            OwnedReadHalf,
            OwnedWriteHalf,
        },
        TcpListener,
        TcpSocket,
        TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
    time::sleep,
};

const READ_CHUNK: usize = 4096;

/// Opens the TCP connection for the Idle -> Connect transition (§4.5): dials
/// in Active mode (retrying every second until cancelled) or accepts one
/// inbound connection in Passive mode.
pub async fn establish(config: &Config, cancel: &CancelToken) -> Result<TcpStream, PeerError> {
    match config.mode {
        Mode::Active => dial_with_retry(config, cancel).await,
        Mode::Passive => listen_and_accept(config, cancel).await,
    }
}

async fn dial_with_retry(config: &Config, cancel: &CancelToken) -> Result<TcpStream, PeerError> {
    let local = SocketAddr::new(IpAddr::V4(config.local_ip), config.bgp_port);
    let remote = SocketAddr::new(IpAddr::V4(config.remote_ip), config.bgp_port);

    loop {
        if cancel.is_cancelled() {
            return Err(PeerError::Cancelled);
        }
        match dial_once(local, remote).await {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                warn!("dial to {remote} from {local} failed: {error}; retrying in 1s");
                tokio::select! {
                    _ = sleep(Duration::from_secs(1)) => {}
                    _ = cancel.cancelled() => return Err(PeerError::Cancelled),
                }
            }
        }
    }
}

async fn dial_once(local: SocketAddr, remote: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(local)?;
    socket.connect(remote).await
}

async fn listen_and_accept(config: &Config, cancel: &CancelToken) -> Result<TcpStream, PeerError> {
    let local = SocketAddr::new(IpAddr::V4(config.local_ip), config.bgp_port);
    let listener = TcpListener::bind(local).await?;
    debug!("listening for a peer on {local}");
    tokio::select! {
        accepted = listener.accept() => {
            let (stream, remote) = accepted?;
            debug!("accepted connection from {remote}");
            Ok(stream)
        }
        _ = cancel.cancelled() => Err(PeerError::Cancelled),
    }
}

/// The established connection's I/O half: an outbound channel the FSM can
/// enqueue messages on, plus the sender/receiver tasks that drain it and feed
/// the peer's event and message queues.
pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<BgpMessage>,
    sender_task: JoinHandle<()>,
    receiver_task: JoinHandle<()>,
}

impl Connection {
    pub fn spawn(
        stream: TcpStream,
        event_tx: mpsc::UnboundedSender<Event>,
        message_tx: mpsc::UnboundedSender<UpdateMessage>,
        error_tx: mpsc::UnboundedSender<PeerError>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (read_half, write_half) = stream.into_split();
        let sender_task = tokio::spawn(send_loop(write_half, outbound_rx, error_tx.clone()));
        let receiver_task = tokio::spawn(recv_loop(read_half, event_tx, message_tx, error_tx));
        Self { outbound_tx, sender_task, receiver_task }
    }

    /// Enqueues `message` for the sender task. Silently dropped if the sender
    /// task has already exited (the connection is being torn down).
    pub fn send(&self, message: BgpMessage) {
        let _ = self.outbound_tx.send(message);
    }

    pub async fn close(self) {
        self.sender_task.abort();
        self.receiver_task.abort();
        let _ = self.sender_task.await;
        let _ = self.receiver_task.await;
    }
}

async fn send_loop(mut write_half: OwnedWriteHalf, mut outbound_rx: mpsc::UnboundedReceiver<BgpMessage>, error_tx: mpsc::UnboundedSender<PeerError>) {
    while let Some(outgoing) = outbound_rx.recv().await {
        let bytes = message::marshal(&outgoing);
        if let Err(error) = write_half.write_all(&bytes).await {
            let _ = error_tx.send(PeerError::Io(error));
            return;
        }
    }
}

async fn recv_loop(
    mut read_half: OwnedReadHalf,
    event_tx: mpsc::UnboundedSender<Event>,
    message_tx: mpsc::UnboundedSender<UpdateMessage>,
    error_tx: mpsc::UnboundedSender<PeerError>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match read_one_message(&mut read_half, &mut buffer, &mut chunk).await {
            Ok(Some(bytes)) => {
                if let Err(error) = dispatch(&bytes, &event_tx, &message_tx) {
                    let _ = error_tx.send(PeerError::Wire(error));
                    return;
                }
            }
            Ok(None) => {
                let _ = error_tx.send(PeerError::ConnectionClosed);
                return;
            }
            Err(error) => {
                let _ = error_tx.send(PeerError::Io(error));
                return;
            }
        }
    }
}

/// Reads bytes until one full framed message is buffered, per the framing
/// helper contract in §4.3 (read length, wait for that many bytes, slice).
/// Returns `Ok(None)` on a clean EOF.
async fn read_one_message(read_half: &mut OwnedReadHalf, buffer: &mut Vec<u8>, chunk: &mut [u8]) -> std::io::Result<Option<Vec<u8>>> {
    loop {
        let needed = message::message_length(buffer);
        if needed > 0 && buffer.len() >= needed {
            return Ok(Some(buffer.drain(..needed).collect()));
        }
        match read_half.read(chunk).await? {
            0 => return Ok(None),
            n => buffer.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Decodes `bytes` and pushes the resulting event (and, for UPDATE, the
/// message itself) onto the peer's queues. The message is always pushed to
/// the message queue *before* the corresponding event reaches the event
/// queue, preserving the ordering §4.5 requires. Returns `false` on a decode
/// error.
fn dispatch(bytes: &[u8], event_tx: &mpsc::UnboundedSender<Event>, message_tx: &mpsc::UnboundedSender<UpdateMessage>) -> Result<(), bgp_wire::WireError> {
    match message::unmarshal(bytes)? {
        BgpMessage::Open(_) => {
            trace!("received OPEN");
            let _ = event_tx.send(Event::BgpOpen);
        }
        BgpMessage::KeepAlive => {
            trace!("received KEEPALIVE");
            let _ = event_tx.send(Event::KeepAliveMsg);
        }
        BgpMessage::Update(update) => {
            trace!("received UPDATE ({} NLRI)", update.nlri.len());
            let _ = message_tx.send(update);
            let _ = event_tx.send(Event::UpdateMsg);
        }
    }
    Ok(())
}
