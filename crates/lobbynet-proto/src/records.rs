//! Notification records drained from the service once per tick.
//!
//! Every asynchronous request carries an [`OperationId`] that the service echoes back in the
//! matching completion record, so handlers never have to guess which request finished.

use strum::IntoStaticStr;
use thiserror::Error;

use crate::descriptor::NetworkDescriptor;
use crate::ids::{EndpointHandle, EntityKey, LobbyId, OperationId, TicketId};
use crate::types::{
    InviteListenerStatus, LobbyDisconnectingReason, LobbySearchResult, MemberRemovedReason,
    NetworkConfiguration, NetworkDestroyedReason,
};

/// Failure reported asynchronously by the service: a result code and a diagnostic string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service error {code:#010x}: {message}")]
pub struct BackendFailure {
    pub code: u32,
    pub message: String,
}

impl BackendFailure {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Outcome carried by completion records.
pub type Outcome = Result<(), BackendFailure>;

#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum NetworkStateChange {
    CreateNewNetworkCompleted {
        operation: OperationId,
        result: Outcome,
        network_identifier: String,
    },
    ConnectToNetworkCompleted {
        operation: OperationId,
        result: Outcome,
        descriptor: NetworkDescriptor,
    },
    AuthenticateLocalUserCompleted {
        operation: OperationId,
        result: Outcome,
        user: EntityKey,
    },
    CreateEndpointCompleted {
        operation: OperationId,
        result: Outcome,
    },
    LeaveNetworkCompleted {
        operation: OperationId,
        result: Outcome,
    },
    NetworkDestroyed {
        reason: NetworkDestroyedReason,
    },
    NetworkConfigurationMadeAvailable {
        configuration: Option<NetworkConfiguration>,
    },
    NetworkDescriptorChanged {
        descriptor: NetworkDescriptor,
    },
    EndpointCreated {
        endpoint: EndpointHandle,
    },
    EndpointDestroyed {
        endpoint: EndpointHandle,
    },
    EndpointMessageReceived {
        sender: EndpointHandle,
        receivers: Vec<EndpointHandle>,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum LobbyStateChange {
    CreateAndJoinLobbyCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
    },
    JoinLobbyCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        member: EntityKey,
    },
    JoinArrangedLobbyCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        member: EntityKey,
    },
    AddMemberCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        member: EntityKey,
    },
    Updated {
        lobby: LobbyId,
        owner_updated: bool,
        updated_search_keys: Vec<String>,
        updated_lobby_keys: Vec<String>,
        updated_members: Vec<EntityKey>,
    },
    MemberAdded {
        lobby: LobbyId,
        member: EntityKey,
    },
    MemberRemoved {
        lobby: LobbyId,
        member: EntityKey,
        reason: MemberRemovedReason,
    },
    PostUpdateCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        member: EntityKey,
    },
    LeaveLobbyCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        member: Option<EntityKey>,
    },
    FindLobbiesCompleted {
        operation: OperationId,
        result: Outcome,
        searching_entity: EntityKey,
        results: Vec<LobbySearchResult>,
    },
    Disconnecting {
        lobby: LobbyId,
        reason: LobbyDisconnectingReason,
    },
    Disconnected {
        lobby: LobbyId,
    },
    InviteReceived {
        listening_entity: EntityKey,
        inviting_entity: EntityKey,
        connection_string: String,
    },
    InviteListenerStatusChanged {
        listening_entity: EntityKey,
        status: InviteListenerStatus,
    },
    SendInviteCompleted {
        operation: OperationId,
        result: Outcome,
        lobby: LobbyId,
        invitee: EntityKey,
    },
}

#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum MatchmakingStateChange {
    TicketStatusChanged { ticket: TicketId },
    TicketCompleted { ticket: TicketId, result: Outcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_names() {
        let rec = NetworkStateChange::NetworkDestroyed {
            reason: NetworkDestroyedReason::Kicked,
        };
        let kind: &'static str = (&rec).into();
        assert_eq!(kind, "NetworkDestroyed");
    }

    #[test]
    fn failure_display_has_code() {
        let failure = BackendFailure::new(0x8000_0001, "boom");
        assert_eq!(failure.to_string(), "service error 0x80000001: boom");
    }
}
