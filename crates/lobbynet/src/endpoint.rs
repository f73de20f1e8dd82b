//! Endpoint id → service endpoint lookup.
//!
//! The service owns endpoint objects. The registry only keeps the handle, the owning device and
//! the local flag, keyed by the small integer id that virtual socket addresses carry.

use std::collections::BTreeMap;

use lobbynet_proto::{DeviceId, EndpointHandle, EndpointId};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointRef {
    pub handle: EndpointHandle,
    pub device: DeviceId,
    pub is_local: bool,
}

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<EndpointId, EndpointRef>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint. Returns `false` for the reserved id 0.
    pub fn insert(&mut self, id: EndpointId, endpoint: EndpointRef) -> bool {
        if !id.is_valid() {
            return false;
        }
        if let Some(previous) = self.endpoints.insert(id, endpoint)
            && previous.handle != endpoint.handle
        {
            warn!(endpoint = %id, "endpoint id reused, replacing stale entry");
        }
        true
    }

    pub fn remove(&mut self, id: EndpointId) -> Option<EndpointRef> {
        self.endpoints.remove(&id)
    }

    pub fn remove_by_handle(&mut self, handle: EndpointHandle) -> Option<(EndpointId, EndpointRef)> {
        let id = self.id_of(handle)?;
        self.endpoints.remove(&id).map(|e| (id, e))
    }

    pub fn get(&self, id: EndpointId) -> Option<&EndpointRef> {
        self.endpoints.get(&id)
    }

    pub fn handle(&self, id: EndpointId) -> Option<EndpointHandle> {
        self.endpoints.get(&id).map(|e| e.handle)
    }

    pub fn id_of(&self, handle: EndpointHandle) -> Option<EndpointId> {
        self.endpoints
            .iter()
            .find(|(_, e)| e.handle == handle)
            .map(|(id, _)| *id)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.endpoints.contains_key(&id)
    }

    /// First local endpoint (this process owns exactly one per network).
    pub fn local(&self) -> Option<(EndpointId, &EndpointRef)> {
        self.endpoints
            .iter()
            .find(|(_, e)| e.is_local)
            .map(|(id, e)| (*id, e))
    }

    pub fn local_id(&self) -> Option<EndpointId> {
        self.local().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EndpointId, &EndpointRef)> {
        self.endpoints.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.endpoints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(handle: u64, is_local: bool) -> EndpointRef {
        EndpointRef {
            handle: EndpointHandle(handle),
            device: DeviceId(1),
            is_local,
        }
    }

    #[test]
    fn zero_id_is_rejected() {
        let mut reg = EndpointRegistry::new();
        assert!(!reg.insert(EndpointId::INVALID, ep(1, true)));
        assert!(reg.is_empty());
    }

    #[test]
    fn lookup_both_ways() {
        let mut reg = EndpointRegistry::new();
        reg.insert(EndpointId(3), ep(30, false));
        reg.insert(EndpointId(5), ep(50, true));

        assert_eq!(reg.handle(EndpointId(3)), Some(EndpointHandle(30)));
        assert_eq!(reg.id_of(EndpointHandle(50)), Some(EndpointId(5)));
        assert_eq!(reg.local_id(), Some(EndpointId(5)));

        let (id, removed) = reg.remove_by_handle(EndpointHandle(30)).unwrap();
        assert_eq!(id, EndpointId(3));
        assert!(!removed.is_local);
        assert!(!reg.contains(EndpointId(3)));
    }
}
