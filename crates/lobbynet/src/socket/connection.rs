//! Connections opened by the generic networking layer on top of the virtual sockets.
//!
//! When the service destroys an endpoint, the connection addressed to it has to be closed in the
//! same handler, before anything else can try to send through it.

use std::collections::BTreeMap;

use lobbynet_proto::EndpointId;
use tracing::debug;

use super::address::VirtualAddr;

#[derive(Debug, Default)]
pub struct ConnectionTable {
    server: Option<VirtualAddr>,
    clients: BTreeMap<EndpointId, VirtualAddr>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client side: the connection to the host.
    pub fn open_server(&mut self, remote: VirtualAddr) {
        debug!(remote = %remote, "server connection opened");
        self.server = Some(remote);
    }

    /// Host side: one connection per remote peer.
    pub fn open_client(&mut self, remote: VirtualAddr) {
        debug!(remote = %remote, "client connection opened");
        self.clients.insert(remote.endpoint_id(), remote);
    }

    pub fn server(&self) -> Option<&VirtualAddr> {
        self.server.as_ref()
    }

    pub fn client(&self, id: EndpointId) -> Option<&VirtualAddr> {
        self.clients.get(&id)
    }

    pub fn is_open(&self, remote: &VirtualAddr) -> bool {
        self.server.as_ref() == Some(remote) || self.clients.contains_key(&remote.endpoint_id())
    }

    pub fn close_server(&mut self) -> Option<VirtualAddr> {
        self.server.take()
    }

    /// Closes every connection addressed to `id`.
    pub fn close_endpoint(&mut self, id: EndpointId) -> Vec<VirtualAddr> {
        let mut closed = Vec::new();
        if self.server.as_ref().is_some_and(|s| s.endpoint_id() == id)
            && let Some(server) = self.server.take()
        {
            closed.push(server);
        }
        if let Some(client) = self.clients.remove(&id) {
            closed.push(client);
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.clients.len() + usize::from(self.server.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.server = None;
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn addr(id: u16) -> VirtualAddr {
        VirtualAddr::new(Arc::from("lobbynet."), EndpointId(id))
    }

    #[test]
    fn closing_endpoint_closes_matching_connections() {
        let mut table = ConnectionTable::new();
        table.open_server(addr(1));
        table.open_client(addr(2));
        table.open_client(addr(3));

        assert_eq!(table.close_endpoint(EndpointId(2)), vec![addr(2)]);
        assert!(!table.is_open(&addr(2)));
        assert_eq!(table.len(), 2);

        assert_eq!(table.close_endpoint(EndpointId(1)), vec![addr(1)]);
        assert!(table.server().is_none());
        assert!(table.close_endpoint(EndpointId(9)).is_empty());
    }
}
