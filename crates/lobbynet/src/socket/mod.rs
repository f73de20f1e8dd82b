//! Connectionless datagram sockets over network endpoints.
//!
//! - [`address`]: `VirtualAddr`, the endpoint id dressed up as a socket address
//! - [`queue`]: per-socket inbound FIFO
//! - [`connection`]: connections layered on top by the generic networking code

pub mod address;
pub mod connection;
pub mod error;
pub mod queue;

use std::fmt;
use std::sync::Arc;

use lobbynet_proto::limits::MAX_MESSAGE_SIZE;
use lobbynet_proto::types::SendOptions;
use lobbynet_proto::{EndpointId, NetworkService};
use tracing::{debug, trace, warn};

pub use address::VirtualAddr;
pub use connection::ConnectionTable;
pub use error::{SocketError, SocketErrorCode};
pub use queue::{PacketQueue, PendingPacket};

use crate::endpoint::EndpointRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connected,
}

#[derive(Debug)]
pub struct VirtualSocket {
    id: SocketId,
    queue: PacketQueue,
    last_error: SocketErrorCode,
}

impl VirtualSocket {
    fn new(id: SocketId, capacity: usize) -> Self {
        Self {
            id,
            queue: PacketQueue::new(capacity),
            last_error: SocketErrorCode::NoError,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn last_error(&self) -> SocketErrorCode {
        self.last_error
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn fail<T>(&mut self, err: SocketError) -> Result<T, SocketError> {
        if let Some(code) = err.code() {
            self.last_error = code;
        }
        Err(err)
    }
}

/// Every socket created on top of the current network.
#[derive(Debug)]
pub struct SocketSubsystem {
    prefix: Arc<str>,
    queue_capacity: usize,
    sockets: Vec<VirtualSocket>,
    next_id: u32,
    connections: ConnectionTable,
}

impl SocketSubsystem {
    pub fn new(prefix: &str, queue_capacity: usize) -> Self {
        Self {
            prefix: Arc::from(prefix),
            queue_capacity,
            sockets: Vec::new(),
            next_id: 1,
            connections: ConnectionTable::new(),
        }
    }

    pub fn create_socket(&mut self) -> SocketId {
        let id = SocketId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.sockets.push(VirtualSocket::new(id, self.queue_capacity));
        debug!(socket = %id, capacity = self.queue_capacity, "virtual socket created");
        id
    }

    pub fn destroy_socket(&mut self, id: SocketId) -> bool {
        let before = self.sockets.len();
        self.sockets.retain(|s| s.id != id);
        before != self.sockets.len()
    }

    pub fn socket(&self, id: SocketId) -> Option<&VirtualSocket> {
        self.sockets.iter().find(|s| s.id == id)
    }

    pub fn socket_mut(&mut self, id: SocketId) -> Option<&mut VirtualSocket> {
        self.sockets.iter_mut().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Queues an inbound message on the first active socket.
    pub fn deliver(&mut self, source: EndpointId, payload: Vec<u8>) {
        let Some(socket) = self.sockets.first_mut() else {
            debug!(source = %source, "no virtual socket, dropping message");
            return;
        };
        trace!(socket = %socket.id, source = %source, len = payload.len(), "message queued");
        if let Some(evicted) = socket.queue.push(PendingPacket { source, payload }) {
            warn!(
                socket = %socket.id,
                source = %evicted.source,
                "inbound queue full, oldest packet dropped"
            );
        }
    }

    pub fn address(&self, id: EndpointId) -> VirtualAddr {
        VirtualAddr::new(self.prefix.clone(), id)
    }

    pub fn local_bind_addr(&self, endpoints: &EndpointRegistry) -> Option<VirtualAddr> {
        endpoints.local_id().map(|id| self.address(id))
    }

    pub fn address_from_string(&self, text: &str) -> Option<VirtualAddr> {
        VirtualAddr::parse(&self.prefix, text)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionTable {
        &mut self.connections
    }

    /// Drops queued data and open connections; sockets themselves survive a network change.
    pub fn reset(&mut self) {
        for socket in &mut self.sockets {
            socket.queue.clear();
        }
        self.connections.clear();
    }
}

/// A socket borrowed together with what it needs to send.
pub struct SocketHandle<'a, B> {
    socket: &'a mut VirtualSocket,
    backend: &'a mut B,
    endpoints: &'a EndpointRegistry,
    prefix: &'a Arc<str>,
}

impl<'a, B: NetworkService> SocketHandle<'a, B> {
    pub(crate) fn new(
        sockets: &'a mut SocketSubsystem,
        id: SocketId,
        backend: &'a mut B,
        endpoints: &'a EndpointRegistry,
    ) -> Option<Self> {
        let SocketSubsystem {
            prefix, sockets, ..
        } = sockets;
        let socket = sockets.iter_mut().find(|s| s.id == id)?;
        Some(Self {
            socket,
            backend,
            endpoints,
            prefix,
        })
    }

    pub fn id(&self) -> SocketId {
        self.socket.id
    }

    /// Sends one datagram. Returns the number of bytes sent.
    pub fn send_to(&mut self, data: &[u8], dest: &VirtualAddr) -> Result<usize, SocketError> {
        let Some((local_id, local)) = self.endpoints.local() else {
            return self.socket.fail(SocketError::ConnectionReset);
        };
        if !dest.is_valid() {
            return self.socket.fail(SocketError::InvalidAddress(dest.clone()));
        }
        if dest.endpoint_id() == local_id {
            return self.socket.fail(SocketError::SelfSend);
        }
        let Some(target) = self.endpoints.handle(dest.endpoint_id()) else {
            return self.socket.fail(SocketError::NotConnected(dest.clone()));
        };
        if data.len() > MAX_MESSAGE_SIZE {
            return self.socket.fail(SocketError::MessageTooLarge(data.len()));
        }

        let from = local.handle;
        if let Err(e) =
            self.backend
                .send_message(from, &[target], data, SendOptions::socket_default())
        {
            return self.socket.fail(e.into());
        }
        self.socket.last_error = SocketErrorCode::NoError;
        trace!(socket = %self.socket.id, dest = %dest, len = data.len(), "datagram sent");
        Ok(data.len())
    }

    /// Reads one datagram. `Ok(None)` means nothing is queued.
    ///
    /// A datagram longer than `buf` is truncated.
    pub fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, VirtualAddr)>, SocketError> {
        let Some(packet) = self.socket.queue.pop() else {
            self.socket.last_error = SocketErrorCode::WouldBlock;
            return Ok(None);
        };
        let n = packet.payload.len().min(buf.len());
        buf[..n].copy_from_slice(&packet.payload[..n]);
        self.socket.last_error = SocketErrorCode::NoError;
        Ok(Some((n, VirtualAddr::new(self.prefix.clone(), packet.source))))
    }

    /// Size of the next queued datagram.
    pub fn has_pending_data(&self) -> Option<usize> {
        self.socket.queue.peek_len()
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.endpoints.local_id().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::NotConnected
        }
    }

    /// The local endpoint id, or 0 when there is none.
    pub fn port(&self) -> u16 {
        self.endpoints.local_id().map_or(0, EndpointId::get)
    }

    pub fn local_addr(&self) -> Option<VirtualAddr> {
        self.endpoints
            .local_id()
            .map(|id| VirtualAddr::new(self.prefix.clone(), id))
    }

    pub fn send(&mut self, _data: &[u8]) -> Result<usize, SocketError> {
        self.socket.fail(SocketError::Unsupported("send"))
    }

    pub fn recv(&mut self, _buf: &mut [u8]) -> Result<usize, SocketError> {
        self.socket.fail(SocketError::Unsupported("recv"))
    }

    pub fn last_error(&self) -> SocketErrorCode {
        self.socket.last_error
    }
}
