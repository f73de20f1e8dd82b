//! State shared by every simulated process.

use std::collections::{BTreeMap, HashMap, VecDeque};

use lobbynet_proto::records::{
    BackendFailure, LobbyStateChange, MatchmakingStateChange, NetworkStateChange,
};
use lobbynet_proto::types::{ThreadCategory, WorkMode};
use lobbynet_proto::{BackendError, BatchToken, DeviceId, LobbyId, StateChangeBatch, TicketId};
use tracing::trace;

use crate::faults::{Fault, FaultPlan, SimOp};
use crate::lobby::SimLobby;
use crate::matchmaking::SimTicket;
use crate::network::SimNetwork;

/// Index of one process (one `SimBackend`) in the world.
pub(crate) type ProcessId = u32;

/// One notification queue plus the batch currently handed out from it.
#[derive(Debug)]
pub(crate) struct Queue<T> {
    records: VecDeque<T>,
    outstanding: Option<BatchToken>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            outstanding: None,
        }
    }
}

impl<T> Queue<T> {
    pub fn push(&mut self, record: T) {
        self.records.push_back(record);
    }

    pub fn start(&mut self, token: BatchToken) -> Result<StateChangeBatch<T>, BackendError> {
        if self.outstanding.is_some() {
            return Err(BackendError::BatchOutstanding);
        }
        self.outstanding = Some(token);
        Ok(StateChangeBatch::new(token, self.records.drain(..).collect()))
    }

    pub fn finish(&mut self, batch: StateChangeBatch<T>) -> Result<(), BackendError> {
        if self.outstanding != Some(batch.token()) {
            return Err(BackendError::BatchMismatch(batch.token()));
        }
        self.outstanding = None;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.outstanding = None;
    }
}

#[derive(Debug)]
pub(crate) struct Process {
    pub name: String,
    pub device: DeviceId,
    pub initialized: bool,
    pub hooks_set: bool,
    pub affinity: HashMap<ThreadCategory, u64>,
    pub work_modes: HashMap<ThreadCategory, WorkMode>,
    /// Network this process connected to.
    pub network: Option<String>,
    /// Whether the local user presented the right invitation.
    pub authenticated: bool,
    pub network_queue: Queue<NetworkStateChange>,
    pub lobby_queue: Queue<LobbyStateChange>,
    pub matchmaking_queue: Queue<MatchmakingStateChange>,
    pub faults: FaultPlan,
}

impl Process {
    fn new(name: &str, device: DeviceId) -> Self {
        Self {
            name: name.to_string(),
            device,
            initialized: false,
            hooks_set: false,
            affinity: HashMap::new(),
            work_modes: HashMap::new(),
            network: None,
            authenticated: false,
            network_queue: Queue::default(),
            lobby_queue: Queue::default(),
            matchmaking_queue: Queue::default(),
            faults: FaultPlan::default(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct World {
    next_id: u64,
    pub processes: BTreeMap<ProcessId, Process>,
    pub networks: BTreeMap<String, SimNetwork>,
    pub lobbies: BTreeMap<LobbyId, SimLobby>,
    pub tickets: BTreeMap<TicketId, SimTicket>,
    /// Players needed before a queue produces a match.
    pub queue_sizes: HashMap<String, usize>,
    /// Entity id → process that last acted as that entity.
    pub entities: HashMap<String, ProcessId>,
}

impl World {
    /// Fresh id for any service object.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_process(&mut self, name: &str) -> ProcessId {
        let id = self.processes.len() as ProcessId + 1;
        self.processes.insert(id, Process::new(name, DeviceId(id)));
        id
    }

    pub fn process(&self, p: ProcessId) -> Result<&Process, BackendError> {
        self.processes
            .get(&p)
            .ok_or(BackendError::NotFound("process"))
    }

    pub fn process_mut(&mut self, p: ProcessId) -> Result<&mut Process, BackendError> {
        self.processes
            .get_mut(&p)
            .ok_or(BackendError::NotFound("process"))
    }

    /// Counts a request and resolves its injected fault: a rejection fails the call, an
    /// asynchronous failure is handed back for the completion record.
    pub fn begin(&mut self, p: ProcessId, op: SimOp) -> Result<Option<BackendFailure>, BackendError> {
        let process = self.process_mut(p)?;
        process.faults.record(op);
        if !process.initialized {
            return Err(BackendError::NotInitialized);
        }
        let fault = process.faults.take(op);
        let name: &'static str = op.into();
        trace!(process = %process.name, op = name, "request");
        match fault {
            Some(f @ Fault::Reject { .. }) => Err(f.failure(op).into()),
            Some(f @ Fault::FailAsync { .. }) => Ok(Some(f.failure(op))),
            None => Ok(None),
        }
    }

    pub fn ensure_initialized(&self, p: ProcessId) -> Result<(), BackendError> {
        if self.process(p)?.initialized {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }

    pub fn remember_entity(&mut self, p: ProcessId, entity_id: &str) {
        self.entities.insert(entity_id.to_string(), p);
    }

    pub fn push_network(&mut self, p: ProcessId, record: NetworkStateChange) {
        if let Some(process) = self.processes.get_mut(&p) {
            process.network_queue.push(record);
        }
    }

    pub fn push_lobby(&mut self, p: ProcessId, record: LobbyStateChange) {
        if let Some(process) = self.processes.get_mut(&p) {
            process.lobby_queue.push(record);
        }
    }

    pub fn push_matchmaking(&mut self, p: ProcessId, record: MatchmakingStateChange) {
        if let Some(process) = self.processes.get_mut(&p) {
            process.matchmaking_queue.push(record);
        }
    }

    pub fn initialize(&mut self, p: ProcessId) -> Result<(), BackendError> {
        let process = self.process_mut(p)?;
        if process.initialized {
            return Err(BackendError::AlreadyInitialized);
        }
        process.initialized = true;
        Ok(())
    }

    /// Drops everything the process owns, telling the other processes what they lost.
    pub fn uninitialize(&mut self, p: ProcessId) -> Result<(), BackendError> {
        self.ensure_initialized(p)?;
        self.drop_from_networks(p);
        self.drop_from_lobbies(p);
        self.tickets.retain(|_, t| t.process != p);
        self.entities.retain(|_, owner| *owner != p);

        let process = self.process_mut(p)?;
        process.initialized = false;
        process.network = None;
        process.authenticated = false;
        process.network_queue.clear();
        process.lobby_queue.clear();
        process.matchmaking_queue.clear();
        Ok(())
    }

    pub fn configure_before_init(&self, p: ProcessId, what: &str) -> Result<(), BackendError> {
        if self.process(p)?.initialized {
            return Err(BackendError::InvalidArgument(format!(
                "{what} must be set before initialize"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_checks_batch_tokens() {
        let mut queue = Queue::<u32>::default();
        queue.push(1);
        queue.push(2);

        let batch = queue.start(BatchToken(10)).unwrap();
        assert_eq!(batch.records(), &[1, 2]);
        assert_eq!(queue.start(BatchToken(11)).unwrap_err(), BackendError::BatchOutstanding);

        let stray = StateChangeBatch::new(BatchToken(99), Vec::new());
        assert_eq!(queue.finish(stray).unwrap_err(), BackendError::BatchMismatch(BatchToken(99)));
        queue.finish(batch).unwrap();
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn calls_before_initialize_are_counted_and_refused() {
        let mut world = World::default();
        let p = world.add_process("a");
        assert_eq!(world.begin(p, SimOp::JoinLobby), Err(BackendError::NotInitialized));
        assert_eq!(world.process(p).unwrap().faults.count(SimOp::JoinLobby), 1);

        world.initialize(p).unwrap();
        assert_eq!(world.initialize(p), Err(BackendError::AlreadyInitialized));
        assert_eq!(world.begin(p, SimOp::JoinLobby), Ok(None));
    }
}
