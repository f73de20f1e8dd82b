use std::sync::Arc;

use lobbynet_proto::LobbyId;
use lobbynet_proto::types::NetworkDestroyedReason;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::SimBackend;
use crate::world::World;

/// The shared in-memory service. Clones refer to the same world.
#[derive(Clone, Default)]
pub struct SimService {
    world: Arc<Mutex<World>>,
}

impl SimService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new process (one device) and returns its service handle.
    pub fn backend(&self, name: &str) -> SimBackend {
        let process = self.world.lock().add_process(name);
        debug!(process = name, id = process, "process registered");
        SimBackend::new(Arc::clone(&self.world), process)
    }

    /// Players a queue needs before it forms a match.
    pub fn set_queue_size(&self, queue: &str, players: usize) {
        self.world
            .lock()
            .queue_sizes
            .insert(queue.to_string(), players);
    }

    /// Tears a network down for every connected process.
    pub fn destroy_network(&self, network_identifier: &str, reason: NetworkDestroyedReason) -> bool {
        self.world.lock().destroy_network(network_identifier, reason)
    }

    /// Deletes a lobby; every member process sees it disconnect.
    pub fn delete_lobby(&self, lobby: LobbyId) -> bool {
        self.world.lock().delete_lobby(lobby)
    }

    /// Fails every waiting matchmaking ticket with a timeout.
    pub fn expire_tickets(&self) -> usize {
        self.world.lock().expire_tickets()
    }

    pub fn network_ids(&self) -> Vec<String> {
        self.world.lock().networks.keys().cloned().collect()
    }

    pub fn lobby_ids(&self) -> Vec<LobbyId> {
        self.world.lock().lobbies.keys().copied().collect()
    }

    pub fn lobby_count(&self) -> usize {
        self.world.lock().lobbies.len()
    }

    pub fn network_count(&self) -> usize {
        self.world.lock().networks.len()
    }

    pub fn ticket_count(&self) -> usize {
        self.world.lock().tickets.len()
    }
}

impl std::fmt::Debug for SimService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let world = self.world.lock();
        f.debug_struct("SimService")
            .field("processes", &world.processes.len())
            .field("networks", &world.networks.len())
            .field("lobbies", &world.lobbies.len())
            .field("tickets", &world.tickets.len())
            .finish()
    }
}
