//! Shared vocabulary between the lobbynet client layer and the relay service backing it.
//!
//! The relay/matchmaking service is an external collaborator. Everything the client layer
//! needs to talk to it lives here:
//!
//! - [`ids`]: strongly typed opaque identifiers handed out by the service
//! - [`records`]: notification records drained once per tick
//! - [`batch`]: the start/finish drain protocol
//! - [`backend`]: service traits implemented by a real binding or by the simulator
//! - [`descriptor`]: the printable network descriptor exchanged out-of-band
//! - [`constants`] / [`limits`]: well-known names and numeric limits

pub mod backend;
pub mod batch;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod limits;
pub mod records;
pub mod types;

pub use backend::{Backend, BackendError, LobbyService, MatchmakingService, NetworkService};
pub use batch::StateChangeBatch;
pub use descriptor::NetworkDescriptor;
pub use error::ProtoError;
pub use ids::{
    BatchToken, DeviceId, EndpointHandle, EndpointId, EntityKey, LobbyId, OperationId, TicketId,
};
