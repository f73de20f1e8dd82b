//! Networks and endpoints.
//!
//! A network lives as long as at least one process is connected to it. Endpoint ids start at 1
//! and are never reused within a network.

use std::collections::BTreeSet;

use lobbynet_proto::limits::MAX_MESSAGE_SIZE;
use lobbynet_proto::records::{BackendFailure, NetworkStateChange};
use lobbynet_proto::types::{
    EndpointInfo, InvitationConfiguration, NetworkConfiguration, NetworkDestroyedReason,
    SendOptions,
};
use lobbynet_proto::{
    BackendError, EndpointHandle, EndpointId, EntityKey, NetworkDescriptor, OperationId,
};
use tracing::{debug, trace};

use crate::codes;
use crate::faults::SimOp;
use crate::world::{ProcessId, World};

const SIM_REGION: &str = "WestUs";

#[derive(Debug, Clone)]
pub(crate) struct SimEndpoint {
    pub handle: EndpointHandle,
    pub id: EndpointId,
    pub process: ProcessId,
}

#[derive(Debug)]
pub(crate) struct SimNetwork {
    pub invitation: InvitationConfiguration,
    pub configuration: NetworkConfiguration,
    pub connected: BTreeSet<ProcessId>,
    pub endpoints: Vec<SimEndpoint>,
    next_endpoint_id: u16,
}

impl SimNetwork {
    fn endpoint(&self, handle: EndpointHandle) -> Option<&SimEndpoint> {
        self.endpoints.iter().find(|e| e.handle == handle)
    }

    fn devices(&self) -> BTreeSet<ProcessId> {
        self.endpoints.iter().map(|e| e.process).collect()
    }
}

impl World {
    fn network_of(&self, p: ProcessId) -> Result<(&str, &SimNetwork), BackendError> {
        let id = self
            .process(p)?
            .network
            .as_deref()
            .ok_or(BackendError::NoNetwork)?;
        let network = self.networks.get(id).ok_or(BackendError::NoNetwork)?;
        Ok((id, network))
    }

    pub fn create_new_network(
        &mut self,
        p: ProcessId,
        creator: &EntityKey,
        configuration: &NetworkConfiguration,
        invitation: &InvitationConfiguration,
        operation: OperationId,
    ) -> Result<NetworkDescriptor, BackendError> {
        let failure = self.begin(p, SimOp::CreateNewNetwork)?;
        if invitation.identifier.is_empty() {
            return Err(BackendError::InvalidArgument("empty invitation identifier".into()));
        }
        self.remember_entity(p, &creator.id);

        let id = self.next_id();
        let descriptor = NetworkDescriptor {
            network_identifier: format!("net-{id:04}"),
            region_name: SIM_REGION.to_string(),
            opaque_connection_info: id.to_le_bytes().to_vec(),
        };
        let result = match failure {
            Some(failure) => Err(failure),
            None => {
                self.networks.insert(
                    descriptor.network_identifier.clone(),
                    SimNetwork {
                        invitation: invitation.clone(),
                        configuration: configuration.clone(),
                        connected: BTreeSet::new(),
                        endpoints: Vec::new(),
                        next_endpoint_id: 1,
                    },
                );
                debug!(network = %descriptor.network_identifier, "network created");
                Ok(())
            }
        };
        self.push_network(
            p,
            NetworkStateChange::CreateNewNetworkCompleted {
                operation,
                result,
                network_identifier: descriptor.network_identifier.clone(),
            },
        );
        Ok(descriptor)
    }

    pub fn connect_to_network(
        &mut self,
        p: ProcessId,
        descriptor: &NetworkDescriptor,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::ConnectToNetwork)?;
        if self.process(p)?.network.is_some() {
            return Err(BackendError::InvalidArgument("already connected to a network".into()));
        }
        let id = &descriptor.network_identifier;
        let result = match failure {
            Some(failure) => Err(failure),
            None => match self.networks.get_mut(id) {
                Some(network) => {
                    network.connected.insert(p);
                    Ok(network.configuration.clone())
                }
                None => Err(BackendFailure::new(codes::NOT_FOUND, "network does not exist")),
            },
        };
        match result {
            Ok(configuration) => {
                self.process_mut(p)?.network = Some(id.clone());
                self.push_network(
                    p,
                    NetworkStateChange::ConnectToNetworkCompleted {
                        operation,
                        result: Ok(()),
                        descriptor: descriptor.clone(),
                    },
                );
                self.push_network(
                    p,
                    NetworkStateChange::NetworkConfigurationMadeAvailable {
                        configuration: Some(configuration),
                    },
                );
            }
            Err(failure) => self.push_network(
                p,
                NetworkStateChange::ConnectToNetworkCompleted {
                    operation,
                    result: Err(failure),
                    descriptor: descriptor.clone(),
                },
            ),
        }
        Ok(())
    }

    pub fn authenticate_local_user(
        &mut self,
        p: ProcessId,
        user: &EntityKey,
        invitation: &str,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::AuthenticateLocalUser)?;
        self.remember_entity(p, &user.id);
        let result = match failure {
            Some(failure) => Err(failure),
            None => match self.network_of(p) {
                Err(_) => Err(BackendFailure::new(codes::NOT_FOUND, "not connected to a network")),
                Ok((_, network)) => {
                    let allowed = network.invitation.entity_ids.is_empty()
                        || network.invitation.entity_ids.contains(user);
                    if network.invitation.identifier == invitation && allowed {
                        Ok(())
                    } else {
                        Err(BackendFailure::new(codes::FORBIDDEN, "invitation not valid for user"))
                    }
                }
            },
        };
        if result.is_ok() {
            self.process_mut(p)?.authenticated = true;
        }
        self.push_network(
            p,
            NetworkStateChange::AuthenticateLocalUserCompleted {
                operation,
                result,
                user: user.clone(),
            },
        );
        Ok(())
    }

    /// Creates the process's endpoint. The new endpoint is announced to every connected
    /// process; the creator also learns about every endpoint created before its own.
    pub fn create_endpoint(
        &mut self,
        p: ProcessId,
        user: &EntityKey,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::CreateEndpoint)?;
        self.remember_entity(p, &user.id);
        let authenticated = self.process(p)?.authenticated;
        let handle = EndpointHandle(self.next_id());

        let created = match failure {
            Some(failure) => Err(failure),
            None if !authenticated => Err(BackendFailure::new(
                codes::FORBIDDEN,
                "local user is not authenticated",
            )),
            None => self.add_endpoint(p, handle),
        };

        match created {
            Ok((existing, peers)) => {
                for endpoint in existing {
                    self.push_network(p, NetworkStateChange::EndpointCreated { endpoint });
                }
                for peer in peers {
                    self.push_network(peer, NetworkStateChange::EndpointCreated { endpoint: handle });
                }
                self.push_network(p, NetworkStateChange::EndpointCreated { endpoint: handle });
                self.push_network(
                    p,
                    NetworkStateChange::CreateEndpointCompleted {
                        operation,
                        result: Ok(()),
                    },
                );
            }
            Err(failure) => self.push_network(
                p,
                NetworkStateChange::CreateEndpointCompleted {
                    operation,
                    result: Err(failure),
                },
            ),
        }
        Ok(())
    }

    /// Returns the endpoints that existed before and the other connected processes.
    fn add_endpoint(
        &mut self,
        p: ProcessId,
        handle: EndpointHandle,
    ) -> Result<(Vec<EndpointHandle>, Vec<ProcessId>), BackendFailure> {
        let Ok((id, _)) = self.network_of(p) else {
            return Err(BackendFailure::new(codes::NOT_FOUND, "not connected to a network"));
        };
        let id = id.to_string();
        let Some(network) = self.networks.get_mut(&id) else {
            return Err(BackendFailure::new(codes::NOT_FOUND, "network does not exist"));
        };

        let mut devices = network.devices();
        let own = network.endpoints.iter().filter(|e| e.process == p).count() as u32;
        if own >= network.configuration.max_endpoints_per_device {
            return Err(BackendFailure::new(codes::FULL, "endpoint limit reached"));
        }
        devices.insert(p);
        if devices.len() as u32 > network.configuration.max_device_count {
            return Err(BackendFailure::new(codes::FULL, "network is full"));
        }

        let existing = network.endpoints.iter().map(|e| e.handle).collect();
        let endpoint_id = EndpointId(network.next_endpoint_id);
        network.next_endpoint_id = network.next_endpoint_id.wrapping_add(1).max(1);
        network.endpoints.push(SimEndpoint {
            handle,
            id: endpoint_id,
            process: p,
        });
        let peers = network.connected.iter().copied().filter(|&q| q != p).collect();
        debug!(network = %id, endpoint = %endpoint_id, "endpoint created");
        Ok((existing, peers))
    }

    pub fn endpoint_info(
        &self,
        p: ProcessId,
        handle: EndpointHandle,
    ) -> Result<EndpointInfo, BackendError> {
        self.ensure_initialized(p)?;
        let (_, network) = self.network_of(p)?;
        let endpoint = network
            .endpoint(handle)
            .ok_or(BackendError::NotFound("endpoint"))?;
        Ok(EndpointInfo {
            id: endpoint.id,
            device: self.process(endpoint.process)?.device,
            is_local: endpoint.process == p,
        })
    }

    pub fn send_message(
        &mut self,
        p: ProcessId,
        from: EndpointHandle,
        to: &[EndpointHandle],
        payload: &[u8],
        _options: SendOptions,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::SendMessage)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(BackendError::InvalidArgument(format!(
                "payload of {} bytes exceeds the message limit",
                payload.len()
            )));
        }
        let (_, network) = self.network_of(p)?;
        match network.endpoint(from) {
            Some(endpoint) if endpoint.process == p => {}
            _ => return Err(BackendError::InvalidArgument("sender is not a local endpoint".into())),
        }
        let mut targets = BTreeSet::new();
        for handle in to {
            let endpoint = network
                .endpoint(*handle)
                .ok_or(BackendError::NotFound("endpoint"))?;
            targets.insert(endpoint.process);
        }
        if let Some(failure) = failure {
            trace!(%failure, "message dropped");
            return Ok(());
        }

        for target in targets {
            self.push_network(
                target,
                NetworkStateChange::EndpointMessageReceived {
                    sender: from,
                    receivers: to.to_vec(),
                    payload: payload.to_vec(),
                },
            );
        }
        Ok(())
    }

    pub fn leave_network(&mut self, p: ProcessId, operation: OperationId) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::LeaveNetwork)?;
        if self.process(p)?.network.is_none() {
            return Err(BackendError::NoNetwork);
        }
        let result = match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        };
        self.disconnect(p);
        self.push_network(p, NetworkStateChange::LeaveNetworkCompleted { operation, result });
        Ok(())
    }

    /// Removes the process and its endpoints from its network.
    fn disconnect(&mut self, p: ProcessId) {
        let Some(id) = self
            .processes
            .get_mut(&p)
            .and_then(|process| {
                process.authenticated = false;
                process.network.take()
            })
        else {
            return;
        };
        let Some(network) = self.networks.get_mut(&id) else {
            return;
        };

        network.connected.remove(&p);
        let (gone, kept): (Vec<_>, Vec<_>) =
            network.endpoints.drain(..).partition(|e| e.process == p);
        network.endpoints = kept;
        let peers: Vec<ProcessId> = network.connected.iter().copied().collect();
        if network.connected.is_empty() {
            debug!(network = %id, "last process left, network closed");
            self.networks.remove(&id);
        }

        for endpoint in gone {
            for &peer in &peers {
                self.push_network(
                    peer,
                    NetworkStateChange::EndpointDestroyed {
                        endpoint: endpoint.handle,
                    },
                );
            }
        }
    }

    pub fn drop_from_networks(&mut self, p: ProcessId) {
        self.disconnect(p);
    }

    /// Tears a network down for everyone connected to it.
    pub fn destroy_network(&mut self, network_identifier: &str, reason: NetworkDestroyedReason) -> bool {
        let Some(network) = self.networks.remove(network_identifier) else {
            return false;
        };
        for p in network.connected {
            if let Some(process) = self.processes.get_mut(&p) {
                process.network = None;
                process.authenticated = false;
            }
            self.push_network(p, NetworkStateChange::NetworkDestroyed { reason });
        }
        true
    }
}
