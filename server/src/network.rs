//! Server network layer: TCP accept loop, per-connection receive loops,
//! and the outbound fan-out used for broadcasts.
//!
//! Each accepted connection gets a monotonically increasing id, a player
//! registered at its deterministic spawn tile, and two tasks: a writer task
//! draining an unbounded outbound queue, and a reader loop dispatching
//! newline-delimited JSON into the hub. A failure on one connection never
//! blocks delivery to the others, and removing a connection twice is a
//! no-op.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use shared::{decode, encode, Message};

use crate::error::ServerError;
use crate::hub::{CollisionEvent, CollisionObserver, Hub};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Draining,
    Closed,
}

#[derive(Debug)]
struct Connection {
    addr: SocketAddr,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<String>,
}

/// Handle to the live connection table. Cheap to clone; every sender path
/// (hub broadcasts, observers, receive loops) shares the same table.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<RwLock<HashMap<u32, Connection>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: u32, addr: SocketAddr, outbound: mpsc::UnboundedSender<String>) {
        info!("connection {} accepted from {}", id, addr);
        self.inner.write().insert(
            id,
            Connection {
                addr,
                state: ConnectionState::Connecting,
                outbound,
            },
        );
    }

    pub fn set_state(&self, id: u32, state: ConnectionState) {
        if let Some(connection) = self.inner.write().get_mut(&id) {
            connection.state = state;
        }
    }

    pub fn state(&self, id: u32) -> Option<ConnectionState> {
        self.inner.read().get(&id).map(|connection| connection.state)
    }

    /// Drops a connection from the table. Idempotent: removing an already
    /// removed id reports false and changes nothing.
    pub fn remove(&self, id: u32) -> bool {
        match self.inner.write().remove(&id) {
            Some(connection) => {
                info!("connection {} ({}) closed", id, connection.addr);
                true
            }
            None => false,
        }
    }

    pub fn send_to(&self, id: u32, message: &Message) {
        let line = match encode(message) {
            Ok(line) => line,
            Err(e) => {
                error!("failed to encode message for connection {}: {}", id, e);
                return;
            }
        };
        if let Some(connection) = self.inner.read().get(&id) {
            if connection.outbound.send(line).is_err() {
                debug!("outbound queue for connection {} is gone", id);
            }
        }
    }

    /// Serializes once and fans out to every live connection. A failed send
    /// is logged for that connection and delivery continues.
    pub fn broadcast(&self, message: &Message) {
        let line = match encode(message) {
            Ok(line) => line,
            Err(e) => {
                error!("failed to encode broadcast: {}", e);
                return;
            }
        };
        for (id, connection) in self.inner.read().iter() {
            if connection.state == ConnectionState::Closed {
                continue;
            }
            if connection.outbound.send(line.clone()).is_err() {
                warn!("broadcast to connection {} failed", id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Collision-event consumer that relays each overlapping pair to every
/// client as a `collision` message. Registered with the hub at startup;
/// neither side holds the other's concrete type.
pub struct CollisionRelay {
    connections: Broadcaster,
}

impl CollisionRelay {
    pub fn new(connections: Broadcaster) -> Self {
        CollisionRelay { connections }
    }
}

impl CollisionObserver for CollisionRelay {
    fn on_collision(&self, event: &CollisionEvent) -> Result<(), ServerError> {
        self.connections.broadcast(&Message::Collision {
            a_id: event.a_id,
            a_kind: event.a_kind.clone(),
            b_id: event.b_id,
            b_kind: event.b_kind.clone(),
            mid_x: event.mid_x,
            mid_y: event.mid_y,
        });
        Ok(())
    }
}

/// The accept loop. Owns the listener; spawns one connection handler per
/// accepted stream and stops when the shutdown signal fires.
pub struct Server {
    listener: TcpListener,
    hub: Arc<Hub>,
    connections: Broadcaster,
    shutdown: watch::Receiver<bool>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        hub: Arc<Hub>,
        connections: Broadcaster,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Server, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        info!("listening on {}", addr);
        Ok(Server {
            listener,
            hub,
            connections,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let hub = Arc::clone(&self.hub);
                            let connections = self.connections.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, addr, hub, connections).await;
                            });
                        }
                        Err(e) => {
                            error!("accept failed: {}", e);
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("accept loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// One connection's lifetime: welcome handshake, receive loop, teardown.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    connections: Broadcaster,
) {
    let (reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let id = hub.register_player().await;
    connections.register(id, addr, outbound_tx);

    // Writer task: owns the write half, drains the outbound queue, and ends
    // when the queue closes or the peer stops reading. Dropping the write
    // half here is the single point where the socket gets shut down.
    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                debug!("write to connection {} failed: {}", id, e);
                break;
            }
        }
    });

    connections.send_to(id, &Message::Welcome { id });
    hub.broadcast_state().await;
    connections.set_state(id, ConnectionState::Established);

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decode(&line) {
                Ok(wire) => hub.handle_message(id, wire.body).await,
                Err(e) => {
                    // Protocol errors are answered on this connection only;
                    // the connection stays open.
                    warn!("protocol error from connection {}: {}", id, e);
                    connections.send_to(
                        id,
                        &Message::Error {
                            code: "protocol".to_string(),
                            detail: e.to_string(),
                        },
                    );
                }
            },
            Ok(None) => {
                debug!("connection {} reached EOF", id);
                break;
            }
            Err(e) => {
                debug!("read from connection {} failed: {}", id, e);
                break;
            }
        }
    }

    connections.set_state(id, ConnectionState::Draining);
    hub.remove_player(id).await;
    connections.set_state(id, ConnectionState::Closed);
    connections.remove(id);
}
