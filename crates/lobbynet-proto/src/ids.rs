//! Opaque identifiers handed out by the relay service.
//!
//! The service owns every network, endpoint, lobby and ticket. The client layer only ever
//! holds these ids and resolves them through a registry or through the service itself.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

opaque_id!(
    /// Service-side endpoint object. Stable for the endpoint's lifetime.
    EndpointHandle
);
opaque_id!(
    /// Service-side lobby object.
    LobbyId
);
opaque_id!(
    /// Service-side matchmaking ticket.
    TicketId
);
opaque_id!(
    /// Correlation token attached to an asynchronous request and echoed back in its
    /// completion record.
    OperationId
);
opaque_id!(
    /// Identifies one `start_processing` result; `finish_processing` must hand it back.
    BatchToken
);

/// Small integer endpoint identifier, unique within one network.
///
/// Zero is never assigned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub u16);

impl EndpointId {
    pub const INVALID: EndpointId = EndpointId(0);

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device participating in a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Service identity of a player (entity id plus entity type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub id: String,
    pub kind: String,
}

impl EntityKey {
    pub fn title_player(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: crate::constants::ENTITY_TYPE_TITLE_PLAYER.to_string(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Monotonic generator for [`OperationId`]s.
#[derive(Debug, Default)]
pub struct OperationCounter {
    next: u64,
}

impl OperationCounter {
    pub fn next(&mut self) -> OperationId {
        self.next = self.next.wrapping_add(1);
        OperationId(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_zero_is_invalid() {
        assert!(!EndpointId::INVALID.is_valid());
        assert!(EndpointId(7).is_valid());
    }

    #[test]
    fn operation_ids_increase() {
        let mut counter = OperationCounter::default();
        let a = counter.next();
        let b = counter.next();
        assert!(b > a);
    }
}
