//! Online subsystem error types.

use thiserror::Error;

use crate::network::NetworkState;
use crate::session::SessionState;

/// Synchronous failure of a public request.
///
/// Returned before anything is sent to the service; no state machine has been touched.
#[derive(Error, Debug)]
pub enum OnlineError {
    #[error("online subsystem not initialized")]
    NotInitialized,

    #[error("no local user available")]
    NoLocalUser,

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("invalid network state: {0:?}")]
    InvalidNetworkState(NetworkState),

    #[error("session {0} already exists")]
    SessionExists(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {name} is in state {state:?}")]
    InvalidSessionState { name: String, state: SessionState },

    #[error("no lobby for session {0}")]
    LobbyNotFound(String),

    #[error("search result has no connection string")]
    MissingConnectionString,

    #[error("matchmaking ticket already exists for session {0}")]
    TicketExists(String),

    #[error("no matchmaking ticket for session {0}")]
    TicketNotFound(String),

    #[error("at least one player is required")]
    NoPlayers,

    #[error("{0} can only be configured once")]
    AlreadyConfigured(&'static str),

    #[error("backend error: {0}")]
    Backend(#[from] lobbynet_proto::BackendError),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] lobbynet_proto::ProtoError),
}
