//! In-memory relay/matchmaking service.
//!
//! A [`SimService`] is one shared world; each [`SimBackend`] taken from it plays one device.
//! Requests apply to the world at once and their notifications queue up per process, which
//! makes multi-client flows deterministic inside a single test thread.
//!
//! ```
//! use lobbynet_sim::SimService;
//!
//! let service = SimService::new();
//! let host = service.backend("host");
//! let client = service.backend("client");
//! assert_ne!(host.device(), client.device());
//! ```

mod backend;
pub mod codes;
mod faults;
pub mod filter;
mod lobby;
mod matchmaking;
mod network;
mod service;
mod world;

pub use backend::SimBackend;
pub use faults::{Fault, SimOp};
pub use filter::{Filter, FilterError};
pub use service::SimService;
