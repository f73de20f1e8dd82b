use std::collections::VecDeque;

use lobbynet_proto::ids::OperationCounter;
use lobbynet_proto::OperationId;

use crate::config::OnlineConfig;
use crate::endpoint::EndpointRegistry;
use crate::error::OnlineError;
use crate::events::{EventSink, OnlineEvent, Signal};
use crate::identity::{Identities, LocalUser, UserId};
use crate::session::NamedSessionRegistry;
use crate::socket::SocketSubsystem;

/// State shared by every coordinator of one subsystem instance.
///
/// Coordinators keep only their own bookkeeping and borrow this for each call.
pub(crate) struct Core<B> {
    pub backend: B,
    pub config: OnlineConfig,
    pub identities: Identities,
    pub sessions: NamedSessionRegistry,
    pub endpoints: EndpointRegistry,
    pub sockets: SocketSubsystem,
    pub events: EventSink,
    ops: OperationCounter,
    signals: VecDeque<Signal>,
}

impl<B> Core<B> {
    pub fn new(backend: B, config: OnlineConfig) -> Self {
        let sockets = SocketSubsystem::new(&config.address_prefix, config.socket_queue_capacity());
        Self {
            backend,
            config,
            identities: Identities::new(),
            sessions: NamedSessionRegistry::new(),
            endpoints: EndpointRegistry::new(),
            sockets,
            events: EventSink::new(),
            ops: OperationCounter::default(),
            signals: VecDeque::new(),
        }
    }

    pub fn next_op(&mut self) -> OperationId {
        self.ops.next()
    }

    pub fn publish(&self, event: OnlineEvent) {
        self.events.publish(event);
    }

    pub fn signal(&mut self, signal: Signal) {
        self.signals.push_back(signal);
    }

    pub fn next_signal(&mut self) -> Option<Signal> {
        self.signals.pop_front()
    }

    pub fn clear_signals(&mut self) {
        self.signals.clear();
    }

    pub fn local_user(&self, user: &UserId) -> Result<LocalUser, OnlineError> {
        self.identities
            .local(user)
            .cloned()
            .ok_or_else(|| OnlineError::UnknownUser(user.to_string()))
    }
}
