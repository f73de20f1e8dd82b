//! Network connection lifecycle.
//!
//! ```text
//! NoNetwork ─create─▶ JoiningHost ─connected─▶ JoiningHostPendingEndpoint ─┐
//!     │                                                                     ├─local endpoint─▶ Ready
//!     └──connect──▶ JoiningClient ──────────────────────────────────────────┘
//! any ─leave─▶ Leaving ─left─▶ NoNetwork
//! ```

use std::collections::BTreeSet;

use lobbynet_proto::records::NetworkStateChange;
use lobbynet_proto::types::{
    InvitationConfiguration, InvitationRevocability, NetworkConfiguration, NetworkDestroyedReason,
};
use lobbynet_proto::{Backend, BackendError, EndpointHandle, EndpointId, NetworkDescriptor, OperationId};
use strum::IntoStaticStr;
use tracing::{debug, error, info, warn};

use crate::context::Core;
use crate::endpoint::EndpointRef;
use crate::error::OnlineError;
use crate::events::{OnlineEvent, Signal};
use crate::identity::LocalUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoStaticStr)]
pub enum NetworkState {
    #[default]
    NoNetwork,
    JoiningHost,
    JoiningHostPendingEndpoint,
    JoiningClient,
    Ready,
    Leaving,
}

/// Text shown to the player when the service tears the network down.
pub fn destroyed_reason_text(reason: NetworkDestroyedReason) -> Option<&'static str> {
    match reason {
        NetworkDestroyedReason::Requested => None,
        NetworkDestroyedReason::Disconnected => {
            Some("You have lost connection to the multiplayer service.")
        }
        NetworkDestroyedReason::Kicked => Some("You were kicked from the match."),
        NetworkDestroyedReason::DeviceLostAuthentication => {
            Some("You have lost connection to the authentication service.")
        }
        NetworkDestroyedReason::CreationFailed => Some("Failed to create a match."),
    }
}

/// Fresh network/invitation identifier.
fn new_network_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

#[derive(Debug, Default)]
pub struct NetworkCoordinator {
    state: NetworkState,
    network_id: Option<String>,
    descriptor: Option<NetworkDescriptor>,
    configuration: NetworkConfiguration,
    authenticated: BTreeSet<String>,
    /// Leaves issued to undo a half-finished connect; their completions are not reported.
    abandoned: BTreeSet<OperationId>,
}

impl NetworkCoordinator {
    pub fn new(configuration: NetworkConfiguration) -> Self {
        Self {
            configuration,
            ..Self::default()
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    pub fn descriptor(&self) -> Option<&NetworkDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn configuration(&self) -> &NetworkConfiguration {
        &self.configuration
    }

    pub fn is_authenticated(&self, user: &LocalUser) -> bool {
        self.authenticated.contains(&user.entity.id)
    }

    fn transition(&mut self, next: NetworkState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "network state");
            self.state = next;
        }
    }

    /// Forgets the network without telling the service.
    pub(crate) fn reset<B>(&mut self, core: &mut Core<B>) {
        self.transition(NetworkState::NoNetwork);
        self.network_id = None;
        self.descriptor = None;
        self.authenticated.clear();
        core.endpoints.clear();
        core.sockets.reset();
    }

    /// Creates a new network and connects to it as its host.
    pub(crate) fn create_and_connect_network<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
    ) -> Result<(), OnlineError> {
        if self.state != NetworkState::NoNetwork {
            return Err(OnlineError::InvalidNetworkState(self.state));
        }

        let network_id = new_network_id();
        self.configuration = core.config.network_configuration();
        let invitation = InvitationConfiguration {
            identifier: network_id.clone(),
            revocability: InvitationRevocability::Anyone,
            entity_ids: Vec::new(),
        };

        let op = core.next_op();
        let descriptor =
            core.backend
                .create_new_network(&user.entity, &self.configuration, &invitation, op)?;
        info!(network = %network_id, user = %user.user_id, "network creation requested");

        self.connect_internal(core, user, &network_id, &descriptor)?;
        self.network_id = Some(network_id);
        self.descriptor = Some(descriptor);
        self.transition(NetworkState::JoiningHost);
        Ok(())
    }

    /// Joins an existing network from its serialized descriptor.
    pub(crate) fn connect_to_network<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
        network_id: &str,
        serialized_descriptor: &str,
    ) -> Result<(), OnlineError> {
        if self.state != NetworkState::NoNetwork {
            return Err(OnlineError::InvalidNetworkState(self.state));
        }

        let descriptor = NetworkDescriptor::deserialize(serialized_descriptor)?;
        self.connect_internal(core, user, network_id, &descriptor)?;
        info!(network = %network_id, user = %user.user_id, "connecting to network");

        self.network_id = Some(network_id.to_string());
        self.descriptor = Some(descriptor);
        self.transition(NetworkState::JoiningClient);
        Ok(())
    }

    /// Connects, authenticates and requests the local endpoint. A rejected step after the
    /// connect leaves the network again so the next attempt starts clean.
    fn connect_internal<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
        invitation: &str,
        descriptor: &NetworkDescriptor,
    ) -> Result<(), OnlineError> {
        let op = core.next_op();
        core.backend.connect_to_network(descriptor, op)?;

        if let Err(e) = Self::join_as_local_user(core, user, invitation) {
            warn!(network = %descriptor.network_identifier, "network join rejected: {e}");
            self.abandon(core);
            return Err(e.into());
        }
        Ok(())
    }

    fn join_as_local_user<B: Backend>(
        core: &mut Core<B>,
        user: &LocalUser,
        invitation: &str,
    ) -> Result<(), BackendError> {
        let op = core.next_op();
        core.backend
            .authenticate_local_user(&user.entity, invitation, op)?;
        let op = core.next_op();
        core.backend.create_endpoint(&user.entity, op)
    }

    fn abandon<B: Backend>(&mut self, core: &mut Core<B>) {
        let op = core.next_op();
        match core.backend.leave_network(op) {
            Ok(()) => {
                self.abandoned.insert(op);
            }
            Err(e) => error!("leaving an abandoned network failed: {e}"),
        }
    }

    /// Records from a connect that was rolled back, or that belongs to an earlier network.
    fn is_stale(&self, descriptor: &NetworkDescriptor) -> bool {
        self.descriptor
            .as_ref()
            .is_none_or(|d| d.network_identifier != descriptor.network_identifier)
    }

    /// Leaves the current network. A second call before completion does nothing.
    pub(crate) fn leave_network<B: Backend>(&mut self, core: &mut Core<B>) {
        match self.state {
            NetworkState::NoNetwork => {
                debug!("leave requested without a network");
                return;
            }
            NetworkState::Leaving => {
                debug!("already leaving network");
                return;
            }
            _ => {}
        }

        self.transition(NetworkState::Leaving);
        let op = core.next_op();
        if let Err(e) = core.backend.leave_network(op) {
            warn!("leave network rejected: {e}");
            self.reset(core);
        }
    }

    /// Endpoint handle for an id, logging why a lookup failed.
    pub(crate) fn party_endpoint<B>(&self, core: &Core<B>, id: EndpointId) -> Option<EndpointHandle> {
        if !id.is_valid() {
            error!("endpoint id 0 is never assigned");
            return None;
        }
        let handle = core.endpoints.handle(id);
        if handle.is_none() {
            warn!(endpoint = %id, "no endpoint with this id");
        }
        handle
    }

    /// Drains and dispatches every pending network record.
    pub(crate) fn do_work<B: Backend>(&mut self, core: &mut Core<B>) {
        let batch = match core.backend.start_processing_network() {
            Ok(batch) => batch,
            Err(e) => {
                warn!("start processing network failed: {e}");
                return;
            }
        };

        for record in &batch {
            let kind: &'static str = record.into();
            debug!(record = kind, "network state change");
            self.handle(core, record);
        }

        if let Err(e) = core.backend.finish_processing_network(batch) {
            error!("finish processing network failed: {e}");
        }
    }

    fn handle<B: Backend>(&mut self, core: &mut Core<B>, record: &NetworkStateChange) {
        match record {
            NetworkStateChange::CreateNewNetworkCompleted {
                result,
                network_identifier,
                ..
            } => match result {
                Ok(()) => info!(network = %network_identifier, "network created"),
                Err(e) => warn!(network = %network_identifier, "network creation failed: {e}"),
            },
            NetworkStateChange::ConnectToNetworkCompleted {
                result, descriptor, ..
            } => {
                if self.is_stale(descriptor) {
                    debug!(network = %descriptor.network_identifier, "stale connect completion");
                    return;
                }
                let success = result.is_ok();
                match result {
                    Ok(()) => {
                        self.descriptor = Some(descriptor.clone());
                        if self.state == NetworkState::JoiningHost {
                            self.transition(NetworkState::JoiningHostPendingEndpoint);
                        }
                    }
                    Err(e) => warn!("connect to network failed: {e}"),
                }
                core.publish(OnlineEvent::NetworkConnected { success });
            }
            NetworkStateChange::AuthenticateLocalUserCompleted { result, user, .. } => {
                if self.state == NetworkState::NoNetwork {
                    debug!(user = %user, "authentication completed without a network");
                    return;
                }
                match result {
                    Ok(()) => {
                        debug!(user = %user, "local user authenticated");
                        self.authenticated.insert(user.id.clone());
                    }
                    Err(e) => warn!(user = %user, "authentication failed: {e}"),
                }
            }
            NetworkStateChange::CreateEndpointCompleted { result, .. } => {
                if let Err(e) = result {
                    error!("endpoint creation failed: {e}");
                    self.endpoint_failed(core);
                }
            }
            NetworkStateChange::LeaveNetworkCompleted { operation, result } => {
                if self.abandoned.remove(operation) {
                    debug!("abandoned network left");
                    return;
                }
                if let Err(e) = result {
                    warn!("leave network completed with error: {e}");
                }
                self.reset(core);
                core.publish(OnlineEvent::NetworkLeft);
            }
            NetworkStateChange::NetworkDestroyed { reason } => {
                self.on_network_destroyed(core, *reason);
            }
            NetworkStateChange::NetworkConfigurationMadeAvailable { configuration } => {
                if let Some(configuration) = configuration {
                    debug!(
                        max_devices = configuration.max_device_count,
                        max_users = configuration.max_user_count,
                        "network configuration available"
                    );
                    self.configuration = configuration.clone();
                }
            }
            NetworkStateChange::NetworkDescriptorChanged { descriptor } => {
                self.descriptor = Some(descriptor.clone());
            }
            NetworkStateChange::EndpointCreated { endpoint } => {
                self.on_endpoint_created(core, *endpoint);
            }
            NetworkStateChange::EndpointDestroyed { endpoint } => {
                self.on_endpoint_destroyed(core, *endpoint);
            }
            NetworkStateChange::EndpointMessageReceived {
                sender, payload, ..
            } => match core.endpoints.id_of(*sender) {
                Some(id) => core.sockets.deliver(id, payload.clone()),
                None => warn!(sender = %sender, "message from unknown endpoint dropped"),
            },
        }
    }

    fn endpoint_failed<B>(&mut self, core: &mut Core<B>) {
        let hosting = self.state == NetworkState::JoiningHostPendingEndpoint;
        core.publish(OnlineEvent::EndpointCreated {
            success: false,
            endpoint: EndpointId::INVALID,
            hosting,
        });
        core.signal(Signal::EndpointCreated {
            success: false,
            hosting,
        });
    }

    fn on_endpoint_created<B: Backend>(&mut self, core: &mut Core<B>, handle: EndpointHandle) {
        let info = match core.backend.endpoint_info(handle) {
            Ok(info) => info,
            Err(e) => {
                error!(endpoint = %handle, "endpoint info unavailable: {e}");
                self.endpoint_failed(core);
                return;
            }
        };
        if !info.id.is_valid() {
            error!(endpoint = %handle, "endpoint created with invalid id");
            self.endpoint_failed(core);
            return;
        }

        core.endpoints.insert(
            info.id,
            EndpointRef {
                handle,
                device: info.device,
                is_local: info.is_local,
            },
        );
        debug!(endpoint = %info.id, local = info.is_local, "endpoint registered");

        if !info.is_local {
            return;
        }
        let hosting = match self.state {
            NetworkState::JoiningHostPendingEndpoint => true,
            NetworkState::JoiningClient => false,
            other => {
                warn!(state = ?other, "local endpoint created outside a join");
                return;
            }
        };
        self.transition(NetworkState::Ready);
        info!(endpoint = %info.id, hosting, "network ready");
        core.publish(OnlineEvent::EndpointCreated {
            success: true,
            endpoint: info.id,
            hosting,
        });
        core.signal(Signal::EndpointCreated {
            success: true,
            hosting,
        });
    }

    fn on_endpoint_destroyed<B>(&mut self, core: &mut Core<B>, handle: EndpointHandle) {
        let Some((id, endpoint)) = core.endpoints.remove_by_handle(handle) else {
            debug!(endpoint = %handle, "unknown endpoint destroyed");
            return;
        };
        debug!(endpoint = %id, local = endpoint.is_local, "endpoint destroyed");
        for remote in core.sockets.connections_mut().close_endpoint(id) {
            info!(remote = %remote, "closing connection to destroyed endpoint");
            core.publish(OnlineEvent::ConnectionClosed { remote });
        }
    }

    fn on_network_destroyed<B>(&mut self, core: &mut Core<B>, reason: NetworkDestroyedReason) {
        let had_network = self.state != NetworkState::NoNetwork;
        let kind: &'static str = reason.into();
        info!(reason = kind, "network destroyed");

        let server = core.sockets.connections_mut().close_server();
        self.reset(core);

        if let Some(remote) = server {
            core.publish(OnlineEvent::ConnectionClosed { remote });
        }
        if had_network && let Some(text) = destroyed_reason_text(reason) {
            core.publish(OnlineEvent::NetworkFailure {
                reason: text.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::Receiver;
    use lobbynet_proto::{EntityKey, NetworkService};
    use lobbynet_sim::{Fault, SimBackend, SimOp, SimService, codes};

    use super::*;
    use crate::config::OnlineConfig;
    use crate::identity::UserId;

    fn device(service: &SimService, name: &str) -> (Core<SimBackend>, LocalUser, Receiver<OnlineEvent>) {
        let mut core = Core::new(service.backend(name), OnlineConfig::default());
        core.backend.initialize("title").unwrap();
        let user = LocalUser {
            user_id: UserId::new(name),
            entity: EntityKey::title_player(format!("E-{name}")),
        };
        let events = core.events.subscribe();
        (core, user, events)
    }

    fn hosting(service: &SimService) -> (NetworkCoordinator, Core<SimBackend>, Receiver<OnlineEvent>) {
        let (mut core, user, events) = device(service, "alice");
        let mut network = NetworkCoordinator::default();
        network.create_and_connect_network(&mut core, &user).unwrap();
        assert_eq!(network.state(), NetworkState::JoiningHost);
        network.do_work(&mut core);
        (network, core, events)
    }

    fn endpoint_created(events: &Receiver<OnlineEvent>) -> Option<(bool, bool)> {
        events.try_iter().find_map(|e| match e {
            OnlineEvent::EndpointCreated {
                success, hosting, ..
            } => Some((success, hosting)),
            _ => None,
        })
    }

    #[test]
    fn requested_destroy_has_no_reason() {
        assert_eq!(destroyed_reason_text(NetworkDestroyedReason::Requested), None);
        assert_eq!(
            destroyed_reason_text(NetworkDestroyedReason::Kicked),
            Some("You were kicked from the match.")
        );
        assert_eq!(
            destroyed_reason_text(NetworkDestroyedReason::CreationFailed),
            Some("Failed to create a match.")
        );
    }

    #[test]
    fn network_ids_are_unique_hex() {
        let a = new_network_id();
        let b = new_network_id();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn host_and_client_reach_ready_through_their_joins() {
        let service = SimService::new();
        let (host, mut host_core, host_events) = hosting(&service);
        assert_eq!(host.state(), NetworkState::Ready);
        assert_eq!(endpoint_created(&host_events), Some((true, true)));
        assert_eq!(
            host_core.next_signal(),
            Some(Signal::EndpointCreated {
                success: true,
                hosting: true,
            })
        );

        let (mut core, user, events) = device(&service, "bob");
        let mut client = NetworkCoordinator::default();
        let descriptor = host.descriptor().unwrap().serialize().unwrap();
        client
            .connect_to_network(&mut core, &user, host.network_id().unwrap(), &descriptor)
            .unwrap();
        assert_eq!(client.state(), NetworkState::JoiningClient);
        client.do_work(&mut core);
        assert_eq!(client.state(), NetworkState::Ready);
        assert_eq!(endpoint_created(&events), Some((true, false)));
        assert_eq!(core.endpoints.len(), 2);
    }

    #[test]
    fn local_endpoint_outside_a_join_is_not_ready() {
        let service = SimService::new();
        let (mut core, user, events) = device(&service, "alice");
        let mut network = NetworkCoordinator::default();
        network.create_and_connect_network(&mut core, &user).unwrap();
        network.transition(NetworkState::Leaving);

        network.do_work(&mut core);
        assert_eq!(network.state(), NetworkState::Leaving);
        assert_eq!(endpoint_created(&events), None);
        assert_eq!(core.next_signal(), None);
    }

    #[test]
    fn second_leave_is_not_sent() {
        let service = SimService::new();
        let (mut network, mut core, events) = hosting(&service);
        let before = core.backend.request_count(SimOp::LeaveNetwork);

        network.leave_network(&mut core);
        network.leave_network(&mut core);
        assert_eq!(network.state(), NetworkState::Leaving);
        assert_eq!(core.backend.request_count(SimOp::LeaveNetwork), before + 1);

        network.do_work(&mut core);
        assert_eq!(network.state(), NetworkState::NoNetwork);
        let left = events
            .try_iter()
            .filter(|e| *e == OnlineEvent::NetworkLeft)
            .count();
        assert_eq!(left, 1);
    }

    #[test]
    fn rejected_join_steps_leave_the_network_again() {
        let service = SimService::new();
        let (mut core, user, events) = device(&service, "alice");
        let mut network = NetworkCoordinator::default();

        for op in [SimOp::AuthenticateLocalUser, SimOp::CreateEndpoint] {
            core.backend.inject(
                op,
                Fault::Reject {
                    code: codes::FORBIDDEN,
                },
            );
            assert!(network.create_and_connect_network(&mut core, &user).is_err());
            assert_eq!(network.state(), NetworkState::NoNetwork);
            assert_eq!(network.network_id(), None);
        }
        assert_eq!(core.backend.request_count(SimOp::LeaveNetwork), 2);
        assert_eq!(service.network_count(), 0);

        // retried before the rolled back records were drained
        network.create_and_connect_network(&mut core, &user).unwrap();
        network.do_work(&mut core);
        assert_eq!(network.state(), NetworkState::Ready);
        assert_eq!(service.network_count(), 1);
        let seen: Vec<OnlineEvent> = events.try_iter().collect();
        assert!(!seen.contains(&OnlineEvent::NetworkLeft));
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, OnlineEvent::NetworkConnected { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn failed_endpoint_creation_is_reported_to_the_host() {
        let service = SimService::new();
        let (mut core, user, events) = device(&service, "alice");
        core.backend.inject(
            SimOp::CreateEndpoint,
            Fault::FailAsync {
                code: codes::FULL,
            },
        );
        let mut network = NetworkCoordinator::default();
        network.create_and_connect_network(&mut core, &user).unwrap();

        network.do_work(&mut core);
        assert_eq!(network.state(), NetworkState::JoiningHostPendingEndpoint);
        assert_eq!(endpoint_created(&events), Some((false, true)));
        assert_eq!(
            core.next_signal(),
            Some(Signal::EndpointCreated {
                success: false,
                hosting: true,
            })
        );
    }
}
