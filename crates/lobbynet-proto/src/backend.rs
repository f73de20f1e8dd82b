//! Service traits for the relay/matchmaking backend.
//!
//! Requests are fire-and-forget: a call only validates and enqueues the work, and its result
//! shows up later as a record returned by the matching `start_processing_*` call. Query methods
//! (`endpoint_info`, `lobby_owner`, ...) answer synchronously from the service's local view.

use thiserror::Error;

use crate::batch::StateChangeBatch;
use crate::descriptor::NetworkDescriptor;
use crate::ids::{BatchToken, EndpointHandle, EntityKey, LobbyId, OperationId, TicketId};
use crate::records::{BackendFailure, LobbyStateChange, MatchmakingStateChange, NetworkStateChange};
use crate::types::{
    EndpointInfo, InvitationConfiguration, LobbyArrangedJoinConfig, LobbyCreateConfig,
    LobbyDataUpdate, LobbyJoinConfig, LobbySearchConfig, MatchDetails, MemoryHooks,
    NetworkConfiguration, PropertyList, SendOptions, ThreadCategory, TicketConfiguration,
    TicketStatus, WorkMode,
};

/// Synchronous failure of a service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("service not initialized")]
    NotInitialized,

    #[error("service already initialized")]
    AlreadyInitialized,

    #[error("{0} can only be configured once")]
    AlreadyConfigured(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown {0}")]
    NotFound(&'static str),

    #[error("no active network")]
    NoNetwork,

    #[error("batch {0} is not the batch most recently handed out")]
    BatchMismatch(BatchToken),

    #[error("previous batch has not been finished")]
    BatchOutstanding,

    #[error("request rejected: {0}")]
    Rejected(#[from] BackendFailure),
}

/// Process-wide configuration and the network/endpoint half of the service.
pub trait NetworkService {
    /// Installs allocation hooks. Allowed once, before [`NetworkService::initialize`].
    fn set_memory_hooks(&mut self, hooks: MemoryHooks) -> Result<(), BackendError>;

    fn set_thread_affinity(&mut self, category: ThreadCategory, mask: u64)
    -> Result<(), BackendError>;

    fn set_work_mode(&mut self, category: ThreadCategory, mode: WorkMode)
    -> Result<(), BackendError>;

    fn initialize(&mut self, title_id: &str) -> Result<(), BackendError>;

    /// Invalidates every network, endpoint, lobby and ticket owned by this process at once.
    fn uninitialize(&mut self) -> Result<(), BackendError>;

    /// Requests a new network. The returned descriptor can be connected to immediately.
    fn create_new_network(
        &mut self,
        creator: &EntityKey,
        configuration: &NetworkConfiguration,
        invitation: &InvitationConfiguration,
        operation: OperationId,
    ) -> Result<NetworkDescriptor, BackendError>;

    fn connect_to_network(
        &mut self,
        descriptor: &NetworkDescriptor,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn authenticate_local_user(
        &mut self,
        user: &EntityKey,
        invitation_identifier: &str,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn create_endpoint(&mut self, user: &EntityKey, operation: OperationId)
    -> Result<(), BackendError>;

    fn leave_network(&mut self, operation: OperationId) -> Result<(), BackendError>;

    fn endpoint_info(&self, endpoint: EndpointHandle) -> Result<EndpointInfo, BackendError>;

    fn send_message(
        &mut self,
        from: EndpointHandle,
        to: &[EndpointHandle],
        payload: &[u8],
        options: SendOptions,
    ) -> Result<(), BackendError>;

    fn start_processing_network(
        &mut self,
    ) -> Result<StateChangeBatch<NetworkStateChange>, BackendError>;

    fn finish_processing_network(
        &mut self,
        batch: StateChangeBatch<NetworkStateChange>,
    ) -> Result<(), BackendError>;
}

/// Lobby half of the service.
pub trait LobbyService {
    fn create_and_join_lobby(
        &mut self,
        creator: &EntityKey,
        config: &LobbyCreateConfig,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError>;

    fn join_lobby(
        &mut self,
        member: &EntityKey,
        connection_string: &str,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError>;

    fn join_arranged_lobby(
        &mut self,
        member: &EntityKey,
        arrangement_string: &str,
        config: &LobbyArrangedJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError>;

    fn add_member(
        &mut self,
        lobby: LobbyId,
        member: &EntityKey,
        member_properties: &PropertyList,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn post_update(
        &mut self,
        lobby: LobbyId,
        member: &EntityKey,
        update: &LobbyDataUpdate,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    /// Leaves with one member, or with every local member when `member` is `None`.
    fn leave_lobby(
        &mut self,
        lobby: LobbyId,
        member: Option<&EntityKey>,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn find_lobbies(
        &mut self,
        searcher: &EntityKey,
        config: &LobbySearchConfig,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn send_invite(
        &mut self,
        lobby: LobbyId,
        sender: &EntityKey,
        invitee: &EntityKey,
        operation: OperationId,
    ) -> Result<(), BackendError>;

    fn lobby_owner(&self, lobby: LobbyId) -> Result<Option<EntityKey>, BackendError>;

    fn lobby_members(&self, lobby: LobbyId) -> Result<Vec<EntityKey>, BackendError>;

    fn lobby_connection_string(&self, lobby: LobbyId) -> Result<String, BackendError>;

    fn lobby_properties(&self, lobby: LobbyId) -> Result<Vec<(String, String)>, BackendError>;

    /// Search-indexed properties. Visible to members and to searches.
    fn lobby_search_properties(
        &self,
        lobby: LobbyId,
    ) -> Result<Vec<(String, String)>, BackendError>;

    fn member_properties(
        &self,
        lobby: LobbyId,
        member: &EntityKey,
    ) -> Result<Vec<(String, String)>, BackendError>;

    fn start_processing_lobby(&mut self)
    -> Result<StateChangeBatch<LobbyStateChange>, BackendError>;

    fn finish_processing_lobby(
        &mut self,
        batch: StateChangeBatch<LobbyStateChange>,
    ) -> Result<(), BackendError>;
}

/// Matchmaking half of the service.
pub trait MatchmakingService {
    fn create_matchmaking_ticket(
        &mut self,
        members: &[EntityKey],
        attributes: &[String],
        config: &TicketConfiguration,
    ) -> Result<TicketId, BackendError>;

    fn ticket_status(&self, ticket: TicketId) -> Result<TicketStatus, BackendError>;

    fn ticket_match(&self, ticket: TicketId) -> Result<MatchDetails, BackendError>;

    fn cancel_ticket(&mut self, ticket: TicketId) -> Result<(), BackendError>;

    fn destroy_ticket(&mut self, ticket: TicketId) -> Result<(), BackendError>;

    fn start_processing_matchmaking(
        &mut self,
    ) -> Result<StateChangeBatch<MatchmakingStateChange>, BackendError>;

    fn finish_processing_matchmaking(
        &mut self,
        batch: StateChangeBatch<MatchmakingStateChange>,
    ) -> Result<(), BackendError>;
}

/// Everything the client layer needs from one process's service handle.
pub trait Backend: NetworkService + LobbyService + MatchmakingService {}

impl<T: NetworkService + LobbyService + MatchmakingService> Backend for T {}
