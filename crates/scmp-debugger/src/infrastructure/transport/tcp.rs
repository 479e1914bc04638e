//! TCP transport.
//!
//! Architecture:
//! - `connect` spawns one link task on the current tokio runtime and returns
//!   immediately; the outcome arrives later as a [`TransportEvent`].
//! - Once the socket is up the stream is split: the link task keeps reading,
//!   and a writer task drains an `mpsc` queue of outbound messages.
//! - `disconnect` flips a `watch` flag that both tasks select on, so they wind
//!   down cooperatively instead of being aborted.
//!
//! Events from a link that was already disconnected locally may still arrive;
//! the engine drops them by target identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scmp_core::protocol::RECEIVE_CAPACITY;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::application::transport::{Target, Transport, TransportError};
use crate::infrastructure::transport::TransportEvent;

/// One live (or pending) connection.
struct Link {
    target: Target,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

/// [`Transport`] over a tokio `TcpStream`.
pub struct TcpTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    link: Option<Link>,
}

impl TcpTransport {
    /// Creates a transport that reports on `events`.
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { events, link: None }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, target: &Target) -> Result<(), TransportError> {
        let handle = Handle::try_current().map_err(|e| TransportError::ConnectFailed {
            address: target.address().to_string(),
            reason: e.to_string(),
        })?;
        self.disconnect();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(false));

        handle.spawn(run_link(
            target.clone(),
            outbound_rx,
            Arc::clone(&connected),
            shutdown_rx,
            self.events.clone(),
        ));

        self.link = Some(Link {
            target: target.clone(),
            outbound: outbound_tx,
            connected,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            debug!("closing link to {}", link.target);
            link.connected.store(false, Ordering::SeqCst);
            // Receivers may already be gone if the link died on its own.
            let _ = link.shutdown.send(true);
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        if !link.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        link.outbound
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Closed)?;
        Ok(bytes.len())
    }

    fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.connected.load(Ordering::SeqCst))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connects, then reads until the link closes or is shut down.
async fn run_link(
    target: Target,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let stream = tokio::select! {
        result = TcpStream::connect(target.address()) => result,
        _ = shutdown.changed() => {
            debug!("connect to {target} cancelled");
            return;
        }
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            warn!("failed to connect to {target}: {e}");
            let _ = events.send(TransportEvent::Failed(target, e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY: {e}");
    }

    info!("connected to {target}");
    connected.store(true, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Connected(target.clone()));

    let (reader, writer) = stream.into_split();
    tokio::spawn(write_loop(
        target.clone(),
        writer,
        outbound,
        shutdown.clone(),
        events.clone(),
    ));
    read_loop(target, reader, &connected, shutdown, &events).await;
}

async fn read_loop(
    target: Target,
    mut reader: OwnedReadHalf,
    connected: &AtomicBool,
    mut shutdown: watch::Receiver<bool>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) {
    let mut buf = vec![0u8; RECEIVE_CAPACITY];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("{target} closed the connection");
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(TransportEvent::Closed(target));
                    return;
                }
                Ok(n) => {
                    if events.send(TransportEvent::Data(target.clone(), buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!("read error from {target}: {e}");
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(TransportEvent::Failed(target, e.to_string()));
                    return;
                }
            },
            _ = shutdown.changed() => return,
        }
    }
}

async fn write_loop(
    target: Target,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(bytes) = msg else { break };
                if let Err(e) = writer.write_all(&bytes).await {
                    error!("write error to {target}: {e}");
                    let _ = events.send(TransportEvent::Failed(target, e.to_string()));
                    return;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    // Flush anything queued before the shutdown (e.g. a final DISCONNECT).
    while let Ok(bytes) = outbound.try_recv() {
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::timeout;

    use super::*;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(tx);
        let result = transport.connect(&Target::new("127.0.0.1:1"));
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }

    #[test]
    fn test_send_before_connect_is_not_connected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(tx);
        assert!(matches!(transport.send(&[1]), Err(TransportError::NotConnected)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(tx);
        let target = Target::new(addr.to_string());

        // Act
        transport.connect(&target).unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected(target.clone()));

        peer.write_all(&[0x01, 0x00, 0x06, 0x00, 0x02, 0x01]).await.unwrap();
        transport.send(&[0x07, 0x00, 0x04, 0x00]).unwrap();

        // Assert
        let mut received = Vec::new();
        while received.len() < 6 {
            match next_event(&mut rx).await {
                TransportEvent::Data(t, bytes) => {
                    assert_eq!(t, target);
                    received.extend(bytes);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(received, vec![0x01, 0x00, 0x06, 0x00, 0x02, 0x01]);

        let mut reply = [0u8; 4];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x07, 0x00, 0x04, 0x00]);
    }

    #[tokio::test]
    async fn test_peer_close_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(tx);
        let target = Target::new(addr.to_string());

        transport.connect(&target).unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        assert_eq!(next_event(&mut rx).await, TransportEvent::Connected(target.clone()));
        drop(peer);

        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed(target));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failed() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = TcpTransport::new(tx);
        let target = Target::new(addr.to_string());

        transport.connect(&target).unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Failed(t, _) if t == target
        ));
    }
}
