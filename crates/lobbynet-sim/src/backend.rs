use std::sync::Arc;

use lobbynet_proto::records::{LobbyStateChange, MatchmakingStateChange, NetworkStateChange};
use lobbynet_proto::types::{
    EndpointInfo, InvitationConfiguration, LobbyArrangedJoinConfig, LobbyCreateConfig,
    LobbyDataUpdate, LobbyJoinConfig, LobbySearchConfig, MatchDetails, MemoryHooks,
    NetworkConfiguration, PropertyList, SendOptions, ThreadCategory, TicketConfiguration,
    TicketStatus, WorkMode,
};
use lobbynet_proto::{
    BackendError, BatchToken, DeviceId, EndpointHandle, EntityKey, LobbyId, LobbyService,
    MatchmakingService, NetworkDescriptor, NetworkService, OperationId, StateChangeBatch,
    TicketId,
};
use parking_lot::Mutex;
use tracing::info;

use crate::faults::{Fault, SimOp};
use crate::world::{ProcessId, World};

/// One process's handle on a [`crate::SimService`].
///
/// Every request is applied to the shared world immediately; its completion records wait in
/// this process's queues until the next `start_processing_*` call.
pub struct SimBackend {
    world: Arc<Mutex<World>>,
    process: ProcessId,
}

impl SimBackend {
    pub(crate) fn new(world: Arc<Mutex<World>>, process: ProcessId) -> Self {
        Self { world, process }
    }

    pub fn name(&self) -> String {
        self.world
            .lock()
            .process(self.process)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.world.lock().process(self.process).ok().map(|p| p.device)
    }

    /// Makes the next call of `op` fail.
    pub fn inject(&self, op: SimOp, fault: Fault) {
        if let Ok(process) = self.world.lock().process_mut(self.process) {
            process.faults.inject(op, fault);
        }
    }

    /// Number of `op` calls made so far, refused calls included.
    pub fn request_count(&self, op: SimOp) -> usize {
        self.world
            .lock()
            .process(self.process)
            .map_or(0, |p| p.faults.count(op))
    }

    pub fn thread_affinity(&self, category: ThreadCategory) -> Option<u64> {
        let world = self.world.lock();
        world
            .process(self.process)
            .ok()
            .and_then(|p| p.affinity.get(&category).copied())
    }

    pub fn work_mode(&self, category: ThreadCategory) -> Option<WorkMode> {
        let world = self.world.lock();
        world
            .process(self.process)
            .ok()
            .and_then(|p| p.work_modes.get(&category).copied())
    }

    pub fn pending_network_records(&self) -> usize {
        self.world
            .lock()
            .process(self.process)
            .map_or(0, |p| p.network_queue.len())
    }

    fn token(world: &mut World) -> BatchToken {
        BatchToken(world.next_id())
    }
}

impl NetworkService for SimBackend {
    fn set_memory_hooks(&mut self, _hooks: MemoryHooks) -> Result<(), BackendError> {
        let mut world = self.world.lock();
        world.configure_before_init(self.process, "memory hooks")?;
        let process = world.process_mut(self.process)?;
        if process.hooks_set {
            return Err(BackendError::AlreadyConfigured("memory hooks"));
        }
        process.hooks_set = true;
        Ok(())
    }

    fn set_thread_affinity(
        &mut self,
        category: ThreadCategory,
        mask: u64,
    ) -> Result<(), BackendError> {
        let mut world = self.world.lock();
        world.configure_before_init(self.process, "thread affinity")?;
        world
            .process_mut(self.process)?
            .affinity
            .insert(category, mask);
        Ok(())
    }

    fn set_work_mode(&mut self, category: ThreadCategory, mode: WorkMode) -> Result<(), BackendError> {
        let mut world = self.world.lock();
        world.configure_before_init(self.process, "work mode")?;
        world
            .process_mut(self.process)?
            .work_modes
            .insert(category, mode);
        Ok(())
    }

    fn initialize(&mut self, title_id: &str) -> Result<(), BackendError> {
        if title_id.is_empty() {
            return Err(BackendError::InvalidArgument("empty title id".into()));
        }
        self.world.lock().initialize(self.process)?;
        info!(process = %self.name(), title = title_id, "service initialized");
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<(), BackendError> {
        self.world.lock().uninitialize(self.process)
    }

    fn create_new_network(
        &mut self,
        creator: &EntityKey,
        configuration: &NetworkConfiguration,
        invitation: &InvitationConfiguration,
        operation: OperationId,
    ) -> Result<NetworkDescriptor, BackendError> {
        self.world.lock().create_new_network(
            self.process,
            creator,
            configuration,
            invitation,
            operation,
        )
    }

    fn connect_to_network(
        &mut self,
        descriptor: &NetworkDescriptor,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .connect_to_network(self.process, descriptor, operation)
    }

    fn authenticate_local_user(
        &mut self,
        user: &EntityKey,
        invitation_identifier: &str,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world.lock().authenticate_local_user(
            self.process,
            user,
            invitation_identifier,
            operation,
        )
    }

    fn create_endpoint(&mut self, user: &EntityKey, operation: OperationId) -> Result<(), BackendError> {
        self.world.lock().create_endpoint(self.process, user, operation)
    }

    fn leave_network(&mut self, operation: OperationId) -> Result<(), BackendError> {
        self.world.lock().leave_network(self.process, operation)
    }

    fn endpoint_info(&self, endpoint: EndpointHandle) -> Result<EndpointInfo, BackendError> {
        self.world.lock().endpoint_info(self.process, endpoint)
    }

    fn send_message(
        &mut self,
        from: EndpointHandle,
        to: &[EndpointHandle],
        payload: &[u8],
        options: SendOptions,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .send_message(self.process, from, to, payload, options)
    }

    fn start_processing_network(
        &mut self,
    ) -> Result<StateChangeBatch<NetworkStateChange>, BackendError> {
        let mut world = self.world.lock();
        world.ensure_initialized(self.process)?;
        let token = Self::token(&mut world);
        world.process_mut(self.process)?.network_queue.start(token)
    }

    fn finish_processing_network(
        &mut self,
        batch: StateChangeBatch<NetworkStateChange>,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .process_mut(self.process)?
            .network_queue
            .finish(batch)
    }
}

impl LobbyService for SimBackend {
    fn create_and_join_lobby(
        &mut self,
        creator: &EntityKey,
        config: &LobbyCreateConfig,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        self.world
            .lock()
            .create_and_join_lobby(self.process, creator, config, join, operation)
    }

    fn join_lobby(
        &mut self,
        member: &EntityKey,
        connection_string: &str,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        self.world
            .lock()
            .join_lobby(self.process, member, connection_string, join, operation)
    }

    fn join_arranged_lobby(
        &mut self,
        member: &EntityKey,
        arrangement_string: &str,
        config: &LobbyArrangedJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        self.world.lock().join_arranged_lobby(
            self.process,
            member,
            arrangement_string,
            config,
            operation,
        )
    }

    fn add_member(
        &mut self,
        lobby: LobbyId,
        member: &EntityKey,
        member_properties: &PropertyList,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .add_member(self.process, lobby, member, member_properties, operation)
    }

    fn post_update(
        &mut self,
        lobby: LobbyId,
        member: &EntityKey,
        update: &LobbyDataUpdate,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .post_update(self.process, lobby, member, update, operation)
    }

    fn leave_lobby(
        &mut self,
        lobby: LobbyId,
        member: Option<&EntityKey>,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .leave_lobby(self.process, lobby, member, operation)
    }

    fn find_lobbies(
        &mut self,
        searcher: &EntityKey,
        config: &LobbySearchConfig,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .find_lobbies(self.process, searcher, config, operation)
    }

    fn send_invite(
        &mut self,
        lobby: LobbyId,
        sender: &EntityKey,
        invitee: &EntityKey,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .send_invite(self.process, lobby, sender, invitee, operation)
    }

    fn lobby_owner(&self, lobby: LobbyId) -> Result<Option<EntityKey>, BackendError> {
        Ok(self.world.lock().lobby(self.process, lobby)?.owner.clone())
    }

    fn lobby_members(&self, lobby: LobbyId) -> Result<Vec<EntityKey>, BackendError> {
        let world = self.world.lock();
        let lobby = world.lobby(self.process, lobby)?;
        Ok(lobby.members.iter().map(|m| m.entity.clone()).collect())
    }

    fn lobby_connection_string(&self, lobby: LobbyId) -> Result<String, BackendError> {
        Ok(self
            .world
            .lock()
            .lobby(self.process, lobby)?
            .connection_string
            .clone())
    }

    fn lobby_properties(&self, lobby: LobbyId) -> Result<Vec<(String, String)>, BackendError> {
        let world = self.world.lock();
        let lobby = world.lobby(self.process, lobby)?;
        Ok(lobby
            .lobby_props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn lobby_search_properties(
        &self,
        lobby: LobbyId,
    ) -> Result<Vec<(String, String)>, BackendError> {
        let world = self.world.lock();
        let lobby = world.lobby(self.process, lobby)?;
        Ok(lobby
            .search_props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn member_properties(
        &self,
        lobby: LobbyId,
        member: &EntityKey,
    ) -> Result<Vec<(String, String)>, BackendError> {
        self.world
            .lock()
            .member_properties(self.process, lobby, member)
    }

    fn start_processing_lobby(&mut self) -> Result<StateChangeBatch<LobbyStateChange>, BackendError> {
        let mut world = self.world.lock();
        world.ensure_initialized(self.process)?;
        let token = Self::token(&mut world);
        world.process_mut(self.process)?.lobby_queue.start(token)
    }

    fn finish_processing_lobby(
        &mut self,
        batch: StateChangeBatch<LobbyStateChange>,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .process_mut(self.process)?
            .lobby_queue
            .finish(batch)
    }
}

impl MatchmakingService for SimBackend {
    fn create_matchmaking_ticket(
        &mut self,
        members: &[EntityKey],
        attributes: &[String],
        config: &TicketConfiguration,
    ) -> Result<TicketId, BackendError> {
        self.world
            .lock()
            .create_matchmaking_ticket(self.process, members, attributes, config)
    }

    fn ticket_status(&self, ticket: TicketId) -> Result<TicketStatus, BackendError> {
        self.world.lock().ticket_status(self.process, ticket)
    }

    fn ticket_match(&self, ticket: TicketId) -> Result<MatchDetails, BackendError> {
        self.world.lock().ticket_match(self.process, ticket)
    }

    fn cancel_ticket(&mut self, ticket: TicketId) -> Result<(), BackendError> {
        self.world.lock().cancel_ticket(self.process, ticket)
    }

    fn destroy_ticket(&mut self, ticket: TicketId) -> Result<(), BackendError> {
        self.world.lock().destroy_ticket(self.process, ticket)
    }

    fn start_processing_matchmaking(
        &mut self,
    ) -> Result<StateChangeBatch<MatchmakingStateChange>, BackendError> {
        let mut world = self.world.lock();
        world.ensure_initialized(self.process)?;
        let token = Self::token(&mut world);
        world
            .process_mut(self.process)?
            .matchmaking_queue
            .start(token)
    }

    fn finish_processing_matchmaking(
        &mut self,
        batch: StateChangeBatch<MatchmakingStateChange>,
    ) -> Result<(), BackendError> {
        self.world
            .lock()
            .process_mut(self.process)?
            .matchmaking_queue
            .finish(batch)
    }
}
