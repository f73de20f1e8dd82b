//! Client-side orchestration for sessions hosted on a relay/matchmaking service.
//!
//! One [`OnlineSubsystem`] per client owns the service handle and drives three asynchronous
//! state machines from a single cooperative [`tick`](OnlineSubsystem::tick):
//!
//! - [`network`]: network create/join/leave and endpoint tracking
//! - [`lobby`]: the lobby behind each named session, with its property sync
//! - [`matchmaking`]: tickets through to the arranged lobby and network join
//!
//! The network is exposed to a generic networking layer through [`socket`], where addresses
//! carry the service's small endpoint ids instead of IP addresses.

pub mod config;
mod context;
pub mod endpoint;
pub mod error;
pub mod events;
mod flows;
pub mod identity;
pub mod lobby;
pub mod matchmaking;
pub mod network;
pub mod retry;
pub mod session;
pub mod settings;
pub mod socket;
pub mod subsystem;

pub use config::OnlineConfig;
pub use error::OnlineError;
pub use events::{OnlineEvent, SessionFailureReason};
pub use identity::{LocalUser, UserId};
pub use lobbynet_proto as proto;
pub use network::NetworkState;
pub use session::{NamedSession, SessionState};
pub use settings::{
    Advertisement, ComparisonOp, JoinResult, SearchResult, SessionFlags, SessionSearch,
    SessionSettings, SettingValue,
};
pub use socket::{SocketError, SocketErrorCode, SocketHandle, SocketId, VirtualAddr};
pub use subsystem::{InitFlags, OnlineSubsystem};
