//! The owned online subsystem: global service lifecycle plus the per-tick pump.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bitflags::bitflags;
use crossbeam_channel::Receiver;
use lobbynet_proto::types::{MemoryHooks, ThreadCategory, WorkMode};
use lobbynet_proto::{Backend, BackendError, EndpointHandle, EndpointId, EntityKey, LobbyId};
use tracing::{debug, info, warn};

use crate::config::OnlineConfig;
use crate::context::Core;
use crate::error::OnlineError;
use crate::events::{OnlineEvent, Signal};
use crate::identity::{LocalUser, UserId};
use crate::lobby::LobbyCoordinator;
use crate::matchmaking::{MatchmakingCoordinator, TicketState};
use crate::network::{NetworkCoordinator, NetworkState};
use crate::retry::JoinRetry;
use crate::session::{NamedSession, SessionState};
use crate::settings::SessionSettings;
use crate::socket::{ConnectionTable, SocketHandle, SocketId, VirtualAddr};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InitFlags: u8 {
        const PARTY_INITIALIZED       = 1 << 0;
        const MULTIPLAYER_INITIALIZED = 1 << 1;
        /// Hooks can only be installed once per service lifetime, so this survives shutdown.
        const MEMORY_HOOKS_SET        = 1 << 2;
    }
}

/// What the next local endpoint is for.
#[derive(Debug, Clone)]
pub(crate) enum EndpointPurpose {
    CreateSession {
        session: String,
        host: LocalUser,
        settings: SessionSettings,
    },
    JoinSession {
        session: String,
    },
    Matchmaking {
        session: String,
    },
}

/// One client's view of the relay/matchmaking service.
///
/// Requests return immediately; their outcomes arrive as [`OnlineEvent`]s published during a
/// later [`OnlineSubsystem::tick`].
pub struct OnlineSubsystem<B: Backend> {
    pub(crate) core: Core<B>,
    pub(crate) network: NetworkCoordinator,
    pub(crate) lobby: LobbyCoordinator,
    pub(crate) matchmaking: MatchmakingCoordinator,
    pub(crate) endpoint_purpose: Option<EndpointPurpose>,
    /// Local user joining each session through the search/join path.
    pub(crate) joiners: BTreeMap<String, LocalUser>,
    /// Sessions whose lobby leave was started by `destroy_session`.
    pub(crate) destroy_requests: BTreeSet<String>,
    pub(crate) session_join: JoinRetry,
    pub(crate) match_join: JoinRetry,
    flags: InitFlags,
    memory_hooks: Option<MemoryHooks>,
    affinity: Vec<(ThreadCategory, u64)>,
    work_modes: Vec<(ThreadCategory, WorkMode)>,
}

impl<B: Backend> OnlineSubsystem<B> {
    pub fn new(backend: B, config: OnlineConfig) -> Self {
        let interval = config.join_retry_interval();
        let attempts = config.join_retry_max_attempts;
        let network = NetworkCoordinator::new(config.network_configuration());
        Self {
            core: Core::new(backend, config),
            network,
            lobby: LobbyCoordinator::new(),
            matchmaking: MatchmakingCoordinator::new(),
            endpoint_purpose: None,
            joiners: BTreeMap::new(),
            destroy_requests: BTreeSet::new(),
            session_join: JoinRetry::new(interval, attempts),
            match_join: JoinRetry::new(interval, attempts),
            flags: InitFlags::empty(),
            memory_hooks: None,
            affinity: Vec::new(),
            work_modes: Vec::new(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stores allocation hooks for the next [`init`](Self::init). Only one set is accepted.
    pub fn set_memory_hooks(&mut self, hooks: MemoryHooks) -> Result<(), OnlineError> {
        if self.memory_hooks.is_some() || self.flags.contains(InitFlags::MEMORY_HOOKS_SET) {
            return Err(OnlineError::AlreadyConfigured("memory hooks"));
        }
        self.memory_hooks = Some(hooks);
        Ok(())
    }

    pub fn set_thread_affinity(&mut self, category: ThreadCategory, mask: u64) {
        self.affinity.retain(|(c, _)| *c != category);
        self.affinity.push((category, mask));
    }

    pub fn set_work_mode(&mut self, category: ThreadCategory, mode: WorkMode) {
        self.work_modes.retain(|(c, _)| *c != category);
        self.work_modes.push((category, mode));
    }

    pub fn flags(&self) -> InitFlags {
        self.flags
    }

    pub fn is_initialized(&self) -> bool {
        self.flags
            .contains(InitFlags::PARTY_INITIALIZED | InitFlags::MULTIPLAYER_INITIALIZED)
    }

    /// Runs the once-only service configuration and initializes the service.
    pub fn init(&mut self) -> Result<(), OnlineError> {
        if self.is_initialized() {
            warn!("online subsystem already initialized");
            return Ok(());
        }

        if !self.flags.contains(InitFlags::MEMORY_HOOKS_SET)
            && let Some(hooks) = self.memory_hooks
        {
            match self.core.backend.set_memory_hooks(hooks) {
                Ok(()) | Err(BackendError::AlreadyConfigured(_)) => {
                    self.flags.insert(InitFlags::MEMORY_HOOKS_SET);
                }
                Err(e) => return Err(e.into()),
            }
        }
        for (category, mask) in &self.affinity {
            self.core.backend.set_thread_affinity(*category, *mask)?;
        }
        for (category, mode) in &self.work_modes {
            self.core.backend.set_work_mode(*category, *mode)?;
        }

        self.core.backend.initialize(&self.core.config.title_id)?;
        self.flags.insert(InitFlags::PARTY_INITIALIZED);
        self.flags.insert(InitFlags::MULTIPLAYER_INITIALIZED);
        info!(title = %self.core.config.title_id, "online subsystem initialized");
        Ok(())
    }

    /// Drops every network, lobby, ticket and session without completion events, then
    /// uninitializes the service.
    pub fn shutdown(&mut self) {
        if !self.is_initialized() {
            debug!("shutdown without init");
            return;
        }
        self.network.reset(&mut self.core);
        self.lobby.clear();
        self.matchmaking.clear();
        self.core.sessions.clear();
        self.core.identities.clear_remote();
        self.core.clear_signals();
        self.endpoint_purpose = None;
        self.joiners.clear();
        self.destroy_requests.clear();
        self.session_join.stop();
        self.match_join.stop();

        if let Err(e) = self.core.backend.uninitialize() {
            warn!("uninitialize failed: {e}");
        }
        self.flags
            .remove(InitFlags::PARTY_INITIALIZED | InitFlags::MULTIPLAYER_INITIALIZED);
        info!("online subsystem shut down");
    }

    pub fn on_app_suspend(&mut self) {
        info!("app suspended");
        self.shutdown();
    }

    pub fn on_app_resume(&mut self) -> Result<(), OnlineError> {
        info!("app resumed");
        self.init()
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), OnlineError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(OnlineError::NotInitialized)
        }
    }

    // ========================================================================
    // Pump
    // ========================================================================

    /// Advances every state machine once: network, lobby and matchmaking drains, internal
    /// routing, then the join retry timers.
    pub fn tick(&mut self, delta: Duration) {
        if !self.is_initialized() {
            return;
        }

        self.network.do_work(&mut self.core);
        self.lobby.do_work(&mut self.core);
        self.matchmaking.do_work(&mut self.core, &mut self.lobby);

        while let Some(signal) = self.core.next_signal() {
            let kind: &'static str = (&signal).into();
            debug!(signal = kind, "routing signal");
            self.route(signal);
        }

        if self.session_join.tick(delta) {
            self.retry_session_join();
        }
        if self.match_join.tick(delta) {
            self.retry_match_join();
        }
    }

    fn route(&mut self, signal: Signal) {
        match signal {
            Signal::EndpointCreated { success, hosting } => self.on_endpoint_created(success, hosting),
            Signal::LobbyCreated { session, success } => self.on_lobby_created(&session, success),
            Signal::LobbyJoined { session, result } => self.on_lobby_joined(&session, result),
            Signal::ArrangedLobbyJoined { session, success } => {
                self.on_arranged_lobby_joined(&session, success)
            }
            Signal::LobbyUpdateCompleted {
                session,
                success,
                purpose,
            } => self.on_lobby_updated(&session, success, purpose),
            Signal::LobbyLeft { session, success } => self.on_lobby_left(&session, success),
            Signal::LobbyDisconnected { session } => self.on_lobby_disconnected(&session),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// A receiver of every [`OnlineEvent`] published from now on.
    pub fn events(&self) -> Receiver<OnlineEvent> {
        self.core.events.subscribe()
    }

    pub fn config(&self) -> &OnlineConfig {
        &self.core.config
    }

    pub fn backend(&self) -> &B {
        &self.core.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.core.backend
    }

    /// Signs a user in on this device. The first user is the default user.
    pub fn add_local_user(&mut self, user_id: impl Into<UserId>, entity: EntityKey) {
        let user_id = user_id.into();
        info!(user = %user_id, entity = %entity, "local user added");
        self.core.identities.add_local(user_id, entity);
    }

    pub fn remove_local_user(&mut self, user_id: &UserId) -> Option<LocalUser> {
        self.core.identities.remove_local(user_id)
    }

    pub fn local_users(&self) -> &[LocalUser] {
        self.core.identities.local_users()
    }

    /// Platform id of a lobby member seen by this client.
    pub fn user_for_entity(&self, entity: &EntityKey) -> Option<&UserId> {
        self.core.identities.user_for_entity(entity)
    }

    pub fn network(&self) -> &NetworkCoordinator {
        &self.network
    }

    pub fn network_state(&self) -> NetworkState {
        self.network.state()
    }

    pub fn session(&self, name: &str) -> Option<NamedSession> {
        self.core.sessions.get(name)
    }

    pub fn session_state(&self, name: &str) -> Option<SessionState> {
        self.core.sessions.state(name)
    }

    pub fn session_names(&self) -> Vec<String> {
        self.core.sessions.names()
    }

    pub fn lobby_for_session(&self, name: &str) -> Option<LobbyId> {
        self.lobby.lobby_for_session(name)
    }

    pub fn ticket_state(&self, session: &str) -> Option<TicketState> {
        self.matchmaking.ticket(session).map(|t| t.state)
    }

    pub fn party_endpoint(&self, id: EndpointId) -> Option<EndpointHandle> {
        self.network.party_endpoint(&self.core, id)
    }

    // ========================================================================
    // Virtual sockets
    // ========================================================================

    pub fn create_socket(&mut self) -> SocketId {
        self.core.sockets.create_socket()
    }

    pub fn destroy_socket(&mut self, id: SocketId) -> bool {
        self.core.sockets.destroy_socket(id)
    }

    /// Borrows a socket for I/O.
    pub fn socket(&mut self, id: SocketId) -> Option<SocketHandle<'_, B>> {
        let Core {
            sockets,
            backend,
            endpoints,
            ..
        } = &mut self.core;
        SocketHandle::new(sockets, id, backend, endpoints)
    }

    /// Address of the local endpoint, once the network is ready.
    pub fn local_bind_addr(&self) -> Option<VirtualAddr> {
        self.core.sockets.local_bind_addr(&self.core.endpoints)
    }

    pub fn address_from_string(&self, text: &str) -> Option<VirtualAddr> {
        self.core.sockets.address_from_string(text)
    }

    /// Connections opened by the networking layer on top of the sockets.
    pub fn connections(&self) -> &ConnectionTable {
        self.core.sockets.connections()
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionTable {
        self.core.sockets.connections_mut()
    }
}
