//! Broadcast Bus - best-effort UDP chat channel
//!
//! Architecture:
//! - Receive socket on the well-known port (SO_REUSEADDR, so every local
//!   instance can listen)
//! - Separate send socket with SO_BROADCAST
//! - Receive loop decodes datagrams into a bounded hand-off queue
//! - One callback slot (`start`) plus any number of `subscribe` handles,
//!   all fed from the same queue
//!
//! The queue is a `tokio::sync::broadcast` channel: when a consumer falls
//! more than `queue_capacity` envelopes behind, the oldest are dropped and the
//! consumer is told how many it missed.
//!
//! Our own datagrams loop back and are delivered like any other; filtering
//! them is up to the consumer.

use lanchat_core::{ChatError, Envelope, NodeConfig, Result, MAX_DATAGRAM_SIZE};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::UdpSocket;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bus addressing and queue sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Where the receive socket binds
    pub listen: SocketAddrV4,
    /// Where `broadcast` sends
    pub destination: SocketAddrV4,
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::from(&NodeConfig::default())
    }
}

impl From<&NodeConfig> for BusConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            listen: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.broadcast_port),
            destination: SocketAddrV4::new(config.broadcast_addr, config.broadcast_port),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

/// A received envelope and the address it came from
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    pub source: SocketAddr,
}

type MessageHandler = Arc<dyn Fn(Envelope, SocketAddr) + Send + Sync>;

#[derive(Default)]
struct BusState {
    running: bool,
    send_socket: Option<Arc<UdpSocket>>,
    shutdown: Option<watch::Sender<bool>>,
    receiver: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

pub struct BroadcastBus {
    config: BusConfig,
    queue: broadcast::Sender<Delivery>,
    state: Mutex<BusState>,
}

impl BroadcastBus {
    pub fn new(config: BusConfig) -> Self {
        let (queue, _) = broadcast::channel(config.queue_capacity.max(1));
        Self {
            config,
            queue,
            state: Mutex::new(BusState::default()),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Bind sockets if needed and route every received envelope to `on_message`.
    ///
    /// Calling again while running replaces the callback; sockets are kept.
    pub async fn start<F>(&self, on_message: F) -> Result<()>
    where
        F: Fn(Envelope, SocketAddr) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(on_message);
        let mut state = self.state();

        if !state.running {
            let recv_socket = UdpSocket::from_std(bind_receive_socket(self.config.listen)?)?;
            let send_socket = UdpSocket::from_std(bind_send_socket()?)?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            state.receiver = Some(tokio::spawn(receive_loop(
                recv_socket,
                self.queue.clone(),
                shutdown_rx,
            )));
            state.send_socket = Some(Arc::new(send_socket));
            state.shutdown = Some(shutdown_tx);
            state.running = true;

            info!(
                "✓ Broadcast bus listening on {} (sending to {})",
                self.config.listen, self.config.destination
            );
        }

        if let Some(previous) = state.dispatcher.take() {
            previous.abort();
            debug!("Replaced broadcast bus callback");
        }

        let shutdown_rx = match state.shutdown.as_ref() {
            Some(tx) => tx.subscribe(),
            None => return Err(ChatError::SendFailed("bus shutdown signal missing".into())),
        };
        state.dispatcher = Some(tokio::spawn(dispatch_loop(
            self.queue.subscribe(),
            handler,
            shutdown_rx,
        )));

        Ok(())
    }

    /// Independent consumer of every envelope received from now on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.queue.subscribe(),
        }
    }

    fn send_socket(&self) -> Option<Arc<UdpSocket>> {
        self.state().send_socket.clone()
    }

    /// Send one envelope to the broadcast destination
    pub async fn try_broadcast(&self, envelope: &Envelope) -> Result<usize> {
        let payload = envelope.encode()?;
        let socket = self
            .send_socket()
            .ok_or_else(|| ChatError::SendFailed("broadcast bus is not running".into()))?;

        socket
            .send_to(&payload, SocketAddr::V4(self.config.destination))
            .await
            .map_err(|e| ChatError::SendFailed(e.to_string()))
    }

    /// Like `try_broadcast`, but failures are only logged
    pub async fn broadcast(&self, envelope: &Envelope) {
        if let Err(e) = self.try_broadcast(envelope).await {
            error!("Failed to broadcast message: {}", e);
        }
    }

    /// Drop the `start` callback; sockets and subscriptions stay up
    pub fn detach(&self) {
        if let Some(dispatcher) = self.state().dispatcher.take() {
            dispatcher.abort();
            debug!("Broadcast bus callback removed");
        }
    }

    /// End the receive loop and release both sockets. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.state();
        if !state.running {
            return;
        }

        state.running = false;
        state.send_socket = None;
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(true);
        }
        state.receiver.take();
        state.dispatcher.take();

        info!("Broadcast bus stopped");
    }
}

impl Drop for BroadcastBus {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle returned by [`BroadcastBus::subscribe`]; dropping it unsubscribes
pub struct Subscription {
    rx: broadcast::Receiver<Delivery>,
}

impl Subscription {
    /// Next delivery; `None` once the bus itself is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.recv().await {
                Ok(delivery) => return Some(delivery),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber fell behind, oldest messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

fn bind_receive_socket(listen: SocketAddrV4) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(listen).into())?;
    Ok(socket.into())
}

fn bind_send_socket() -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
    Ok(socket.into())
}

async fn receive_loop(
    socket: UdpSocket,
    queue: broadcast::Sender<Delivery>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, source)) => match Envelope::decode(&buf[..len]) {
                    Ok(envelope) => {
                        // No consumers is fine, the datagram is simply dropped
                        let _ = queue.send(Delivery { envelope, source });
                    }
                    Err(e) => warn!(%source, "Dropping datagram: {}", e),
                },
                Err(e) => warn!("Broadcast receive error: {}", e),
            }
        }
    }

    debug!("Broadcast receive loop stopped");
}

async fn dispatch_loop(
    mut rx: broadcast::Receiver<Delivery>,
    handler: MessageHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = rx.recv() => match next {
                Ok(Delivery { envelope, source }) => handler(envelope, source),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Message handler fell behind, oldest messages dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
