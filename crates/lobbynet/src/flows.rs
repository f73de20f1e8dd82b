//! Named-session operations and the routing that ties the coordinators together.
//!
//! Hosting: create network → local endpoint → publish network settings → create lobby.
//! Joining: join lobby → wait for the host's network settings → connect → local endpoint.
//! Matchmaking: ticket → arranged lobby → the lobby owner hosts the network, everyone else
//! joins it once the owner has published its settings.

use lobbynet_proto::constants::{
    SETTING_HOST_CONNECT_INFO, SETTING_NETWORK_DESCRIPTOR, SETTING_NETWORK_ID,
};
use lobbynet_proto::{Backend, EntityKey};
use tracing::{debug, error, info, warn};

use crate::error::OnlineError;
use crate::events::{OnlineEvent, SessionFailureReason};
use crate::identity::{LocalUser, UserId};
use crate::lobby::UpdatePurpose;
use crate::matchmaking::TicketState;
use crate::session::{NamedSession, SessionState};
use crate::settings::{Advertisement, JoinResult, SearchResult, SessionSearch, SessionSettings};
use crate::subsystem::{EndpointPurpose, OnlineSubsystem};

/// Result of one join-after-lobby attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Connecting,
    NotYet,
    Failed,
}

impl<B: Backend> OnlineSubsystem<B> {
    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Hosts a new session: creates a network, then a lobby advertising it.
    ///
    /// Publishes [`OnlineEvent::SessionCreated`].
    pub fn create_session(
        &mut self,
        host: &UserId,
        name: &str,
        settings: SessionSettings,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        if self.core.sessions.contains(name) {
            return Err(OnlineError::SessionExists(name.to_string()));
        }
        let host = self.core.local_user(host)?;
        self.network
            .create_and_connect_network(&mut self.core, &host)?;
        info!(session = %name, host = %host.user_id, "creating session");
        self.endpoint_purpose = Some(EndpointPurpose::CreateSession {
            session: name.to_string(),
            host,
            settings,
        });
        Ok(())
    }

    /// Joins a session found by [`find_sessions`](Self::find_sessions).
    ///
    /// Publishes [`OnlineEvent::SessionJoined`] once the network is joined or the join failed.
    pub fn join_session(
        &mut self,
        user: &UserId,
        name: &str,
        result: &SearchResult,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        if self.core.sessions.contains(name) {
            return Err(OnlineError::SessionExists(name.to_string()));
        }
        let user = self.core.local_user(user)?;

        let mut session = NamedSession::new(name, result.settings.clone());
        session.owner = result.owner.clone();
        session.local_owner = Some(user.user_id.clone());
        self.core.sessions.insert(session)?;

        if let Err(e) = self.lobby.join_lobby(&mut self.core, &user, name, result) {
            self.core.sessions.remove(name);
            return Err(e);
        }
        info!(session = %name, user = %user.user_id, "joining session");
        self.joiners.insert(name.to_string(), user);
        Ok(())
    }

    pub fn start_session(&mut self, name: &str) -> Result<(), OnlineError> {
        self.transition_session(
            name,
            &[SessionState::Pending, SessionState::Ended],
            SessionState::InProgress,
        )?;
        self.core.publish(OnlineEvent::SessionStarted {
            session: name.to_string(),
            success: true,
        });
        Ok(())
    }

    pub fn end_session(&mut self, name: &str) -> Result<(), OnlineError> {
        self.transition_session(name, &[SessionState::InProgress], SessionState::Ended)?;
        self.core.publish(OnlineEvent::SessionEnded {
            session: name.to_string(),
            success: true,
        });
        Ok(())
    }

    fn transition_session(
        &mut self,
        name: &str,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.core
            .sessions
            .with_mut(name, |s| {
                if !from.contains(&s.state) {
                    return Err(OnlineError::InvalidSessionState {
                        name: name.to_string(),
                        state: s.state,
                    });
                }
                debug!(session = %name, from = ?s.state, to = ?to, "session state");
                s.state = to;
                Ok(())
            })
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))?
    }

    /// Replaces the session settings and pushes them to the lobby.
    ///
    /// Publishes [`OnlineEvent::SessionUpdated`].
    pub fn update_session(
        &mut self,
        name: &str,
        settings: SessionSettings,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.core
            .sessions
            .with_mut(name, |s| {
                if matches!(s.state, SessionState::Creating | SessionState::Destroying) {
                    return Err(OnlineError::InvalidSessionState {
                        name: name.to_string(),
                        state: s.state,
                    });
                }
                s.settings = settings;
                Ok(())
            })
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))??;
        self.lobby
            .update_lobby(&mut self.core, name, UpdatePurpose::SessionUpdate)
    }

    /// Leaves the network and the lobby. Publishes [`OnlineEvent::SessionDestroyed`].
    pub fn destroy_session(&mut self, name: &str) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let state = self
            .core
            .sessions
            .state(name)
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))?;
        if state == SessionState::Destroying {
            debug!(session = %name, "session already being destroyed");
            return Ok(());
        }

        self.network.leave_network(&mut self.core);
        self.forget_session_flows(name);
        self.core
            .sessions
            .with_mut(name, |s| s.state = SessionState::Destroying);

        if self.lobby.lobby_for_session(name).is_some() {
            self.destroy_requests.insert(name.to_string());
            if let Err(e) = self.lobby.leave_lobby(&mut self.core, None, name, true) {
                warn!(session = %name, "lobby leave failed: {e}");
                self.destroy_requests.remove(name);
                self.core.sessions.remove(name);
                self.core.publish(OnlineEvent::SessionDestroyed {
                    session: name.to_string(),
                    success: false,
                });
            }
            return Ok(());
        }

        self.core.sessions.remove(name);
        self.core.publish(OnlineEvent::SessionDestroyed {
            session: name.to_string(),
            success: true,
        });
        Ok(())
    }

    fn forget_session_flows(&mut self, name: &str) {
        self.joiners.remove(name);
        if self.session_join.target() == Some(name) {
            self.session_join.stop();
        }
        if self.match_join.target() == Some(name) {
            self.match_join.stop();
        }
        let purpose_session = match &self.endpoint_purpose {
            Some(EndpointPurpose::CreateSession { session, .. })
            | Some(EndpointPurpose::JoinSession { session })
            | Some(EndpointPurpose::Matchmaking { session }) => Some(session.as_str()),
            None => None,
        };
        if purpose_session == Some(name) {
            self.endpoint_purpose = None;
        }
    }

    // ========================================================================
    // Players
    // ========================================================================

    pub fn register_players(&mut self, name: &str, players: &[UserId]) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.core
            .sessions
            .with_mut(name, |s| {
                for player in players {
                    if !s.is_registered(player) {
                        s.registered_players.push(player.clone());
                    }
                }
            })
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))?;
        self.core.publish(OnlineEvent::PlayersRegistered {
            session: name.to_string(),
            players: players.to_vec(),
            success: true,
        });
        Ok(())
    }

    pub fn unregister_players(
        &mut self,
        name: &str,
        players: &[UserId],
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.core
            .sessions
            .with_mut(name, |s| s.registered_players.retain(|p| !players.contains(p)))
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))?;
        self.core.publish(OnlineEvent::PlayersUnregistered {
            session: name.to_string(),
            players: players.to_vec(),
            success: true,
        });
        Ok(())
    }

    /// Adds another local user to the session's lobby. Publishes
    /// [`OnlineEvent::LocalPlayerRegistered`].
    pub fn register_local_player(&mut self, user: &UserId, name: &str) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let user = self.core.local_user(user)?;
        self.lobby.add_local_player(&mut self.core, name, &user)
    }

    /// Removes one local user from the session's lobby. Publishes
    /// [`OnlineEvent::LocalPlayerUnregistered`].
    pub fn unregister_local_player(
        &mut self,
        user: &UserId,
        name: &str,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let user = self.core.local_user(user)?;
        self.lobby
            .leave_lobby(&mut self.core, Some(&user), name, false)
    }

    // ========================================================================
    // Search, invites, matchmaking
    // ========================================================================

    /// Publishes [`OnlineEvent::FindSessionsComplete`].
    pub fn find_sessions(&mut self, user: &UserId, search: &SessionSearch) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let user = self.core.local_user(user)?;
        self.lobby.find_lobbies(&mut self.core, &user, search)
    }

    pub fn find_friend_sessions(&mut self, user: &UserId) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let user = self.core.local_user(user)?;
        self.lobby.find_friend_lobbies(&mut self.core, &user)
    }

    pub fn send_session_invite(
        &mut self,
        name: &str,
        sender: &UserId,
        invitee: &EntityKey,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        let sender = self.core.local_user(sender)?;
        self.lobby
            .send_invite(&mut self.core, name, &sender, invitee)
    }

    /// Queues `players` for a match. The first player joins the arranged lobby.
    ///
    /// Publishes [`OnlineEvent::MatchmakingComplete`] once the match is playable or failed.
    pub fn start_matchmaking(
        &mut self,
        players: &[UserId],
        name: &str,
        settings: SessionSettings,
        search: &SessionSearch,
    ) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.matchmaking
            .create_ticket(&mut self.core, players, name, &settings, search)
    }

    /// Publishes [`OnlineEvent::CancelMatchmakingComplete`].
    pub fn cancel_matchmaking(&mut self, name: &str) -> Result<(), OnlineError> {
        self.ensure_initialized()?;
        self.matchmaking.cancel_ticket(&mut self.core, name)
    }

    // ========================================================================
    // Signal handlers
    // ========================================================================

    pub(crate) fn on_endpoint_created(&mut self, success: bool, hosting: bool) {
        let Some(purpose) = self.endpoint_purpose.take() else {
            debug!(success, hosting, "endpoint created without a pending session flow");
            return;
        };
        match purpose {
            EndpointPurpose::CreateSession {
                session,
                host,
                settings,
            } => {
                let result = if success && hosting {
                    self.host_session(&session, &host, settings)
                } else {
                    Err(OnlineError::InvalidNetworkState(self.network.state()))
                };
                if let Err(e) = result {
                    error!(session = %session, "session creation failed: {e}");
                    self.core.sessions.remove(&session);
                    self.network.leave_network(&mut self.core);
                    self.core.publish(OnlineEvent::SessionCreated {
                        session,
                        success: false,
                    });
                }
            }
            EndpointPurpose::JoinSession { session } => {
                self.joiners.remove(&session);
                if success {
                    self.open_server_connection(&session);
                    info!(session = %session, "session joined");
                    self.core.publish(OnlineEvent::SessionJoined {
                        session,
                        result: JoinResult::Success,
                    });
                } else {
                    self.fail_session_join(&session);
                }
            }
            EndpointPurpose::Matchmaking { session } => {
                if !success {
                    self.matchmaking.complete(&mut self.core, &session, false);
                } else if hosting {
                    let result = self.write_network_settings(&session).and_then(|()| {
                        self.lobby.update_lobby(
                            &mut self.core,
                            &session,
                            UpdatePurpose::Matchmaking,
                        )
                    });
                    if let Err(e) = result {
                        error!(session = %session, "publishing match network failed: {e}");
                        self.matchmaking.complete(&mut self.core, &session, false);
                    }
                } else {
                    self.open_server_connection(&session);
                    self.matchmaking.complete(&mut self.core, &session, true);
                }
            }
        }
    }

    fn host_session(
        &mut self,
        name: &str,
        host: &LocalUser,
        settings: SessionSettings,
    ) -> Result<(), OnlineError> {
        let mut session = NamedSession::new(name, settings);
        session.hosting = true;
        session.owner = Some(host.user_id.clone());
        session.local_owner = Some(host.user_id.clone());
        self.core.sessions.insert(session)?;
        self.write_network_settings(name)?;

        let settings = self
            .core
            .sessions
            .with(name, |s| s.settings.clone())
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))?;
        self.lobby
            .create_lobby(&mut self.core, host, name, &settings)
    }

    /// Writes the network id, serialized descriptor and host address into the session.
    fn write_network_settings(&mut self, name: &str) -> Result<(), OnlineError> {
        let state = self.network.state();
        let network_id = self
            .network
            .network_id()
            .ok_or(OnlineError::InvalidNetworkState(state))?
            .to_string();
        let descriptor = self
            .network
            .descriptor()
            .ok_or(OnlineError::InvalidNetworkState(state))?
            .serialize()?;
        let host_addr = self
            .local_bind_addr()
            .ok_or(OnlineError::InvalidNetworkState(state))?
            .to_text(true);

        debug!(session = %name, network = %network_id, host = %host_addr, "publishing network settings");
        self.core
            .sessions
            .with_mut(name, |s| {
                let online = Advertisement::ViaOnlineService;
                s.settings.set(SETTING_NETWORK_ID, network_id, online);
                s.settings.set(SETTING_NETWORK_DESCRIPTOR, descriptor, online);
                s.settings.set(SETTING_HOST_CONNECT_INFO, host_addr, online);
            })
            .ok_or_else(|| OnlineError::SessionNotFound(name.to_string()))
    }

    fn open_server_connection(&mut self, name: &str) {
        let host = self
            .core
            .sessions
            .with(name, |s| {
                s.settings
                    .non_empty_str(SETTING_HOST_CONNECT_INFO)
                    .map(str::to_string)
            })
            .flatten();
        match host.and_then(|text| self.address_from_string(&text)) {
            Some(addr) => {
                debug!(session = %name, host = %addr, "server connection opened");
                self.core.sockets.connections_mut().open_server(addr);
            }
            None => warn!(session = %name, "session has no usable host address"),
        }
    }

    pub(crate) fn on_lobby_created(&mut self, session: &str, success: bool) {
        if !success {
            self.core.sessions.remove(session);
            self.network.leave_network(&mut self.core);
        }
        info!(session = %session, success, "session created");
        self.core.publish(OnlineEvent::SessionCreated {
            session: session.to_string(),
            success,
        });
    }

    pub(crate) fn on_lobby_joined(&mut self, session: &str, result: JoinResult) {
        if result == JoinResult::Success {
            debug!(session = %session, "lobby joined, waiting for host network");
            self.session_join.arm(session);
            return;
        }
        self.joiners.remove(session);
        self.network.leave_network(&mut self.core);
        self.core.sessions.remove(session);
        self.core.publish(OnlineEvent::SessionJoined {
            session: session.to_string(),
            result,
        });
    }

    fn fail_session_join(&mut self, session: &str) {
        warn!(session = %session, "could not join session network");
        self.joiners.remove(session);
        self.network.leave_network(&mut self.core);
        self.core
            .sessions
            .with_mut(session, |s| s.state = SessionState::Destroying);
        if self.lobby.lobby_for_session(session).is_none()
            || self
                .lobby
                .leave_lobby(&mut self.core, None, session, true)
                .is_err()
        {
            self.core.sessions.remove(session);
        }
        self.core.publish(OnlineEvent::SessionJoined {
            session: session.to_string(),
            result: JoinResult::CouldNotRetrieveAddress,
        });
    }

    pub(crate) fn on_arranged_lobby_joined(&mut self, session: &str, success: bool) {
        if !success {
            self.matchmaking.complete(&mut self.core, session, false);
            return;
        }
        self.matchmaking
            .set_state(session, TicketState::JoinArrangedLobbyCompleted);

        let hosting = self
            .core
            .sessions
            .with(session, |s| s.hosting)
            .unwrap_or(false);
        if !hosting {
            debug!(session = %session, "arranged lobby joined, waiting for host network");
            self.match_join.arm(session);
            return;
        }

        let Some(host) = self.matchmaking.ticket(session).map(|t| t.host.clone()) else {
            return;
        };
        match self
            .network
            .create_and_connect_network(&mut self.core, &host)
        {
            Ok(()) => {
                info!(session = %session, "hosting match network");
                self.endpoint_purpose = Some(EndpointPurpose::Matchmaking {
                    session: session.to_string(),
                });
            }
            Err(e) => {
                error!(session = %session, "could not create match network: {e}");
                self.matchmaking.complete(&mut self.core, session, false);
            }
        }
    }

    pub(crate) fn on_lobby_updated(&mut self, session: &str, success: bool, purpose: UpdatePurpose) {
        match purpose {
            UpdatePurpose::SessionUpdate => self.core.publish(OnlineEvent::SessionUpdated {
                session: session.to_string(),
                success,
            }),
            UpdatePurpose::Matchmaking => {
                self.matchmaking.complete(&mut self.core, session, success)
            }
        }
    }

    pub(crate) fn on_lobby_left(&mut self, session: &str, success: bool) {
        if self.destroy_requests.remove(session) {
            info!(session = %session, success, "session destroyed");
            self.core.publish(OnlineEvent::SessionDestroyed {
                session: session.to_string(),
                success,
            });
        }
    }

    pub(crate) fn on_lobby_disconnected(&mut self, session: &str) {
        if !self.core.sessions.contains(session) {
            return;
        }
        warn!(session = %session, "lost the lobby service connection");
        self.network.leave_network(&mut self.core);
        self.forget_session_flows(session);
        self.core.sessions.remove(session);
        self.core.publish(OnlineEvent::SessionFailure {
            session: session.to_string(),
            reason: SessionFailureReason::ServiceConnectionLost,
        });
    }

    // ========================================================================
    // Join-after-lobby retries
    // ========================================================================

    pub(crate) fn retry_session_join(&mut self) {
        let Some(session) = self.session_join.target().map(str::to_string) else {
            return;
        };
        let Some(user) = self.joiners.get(&session).cloned() else {
            self.session_join.stop();
            return;
        };
        let remaining = self.session_join.remaining();
        let purpose = EndpointPurpose::JoinSession {
            session: session.clone(),
        };
        match self.try_join_network(&session, &user, remaining, purpose) {
            Attempt::Connecting => self.session_join.stop(),
            Attempt::NotYet => {}
            Attempt::Failed => {
                self.session_join.stop();
                self.fail_session_join(&session);
            }
        }
    }

    pub(crate) fn retry_match_join(&mut self) {
        let Some(session) = self.match_join.target().map(str::to_string) else {
            return;
        };
        let Some(host) = self.matchmaking.ticket(&session).map(|t| t.host.clone()) else {
            self.match_join.stop();
            return;
        };
        let remaining = self.match_join.remaining();
        let purpose = EndpointPurpose::Matchmaking {
            session: session.clone(),
        };
        match self.try_join_network(&session, &host, remaining, purpose) {
            Attempt::Connecting => self.match_join.stop(),
            Attempt::NotYet => {}
            Attempt::Failed => {
                self.match_join.stop();
                self.matchmaking.complete(&mut self.core, &session, false);
            }
        }
    }

    /// Connects once the host's network settings are in the session. `remaining` is the number
    /// of attempts left after this one.
    fn try_join_network(
        &mut self,
        session: &str,
        user: &LocalUser,
        remaining: u32,
        purpose: EndpointPurpose,
    ) -> Attempt {
        let Some((network_id, descriptor, host)) = self.core.sessions.with(session, |s| {
            let get = |name: &str| s.settings.non_empty_str(name).map(str::to_string);
            (
                get(SETTING_NETWORK_ID),
                get(SETTING_NETWORK_DESCRIPTOR),
                get(SETTING_HOST_CONNECT_INFO),
            )
        }) else {
            warn!(session = %session, "session vanished while joining");
            return Attempt::Failed;
        };

        let (Some(network_id), Some(descriptor), Some(_)) = (network_id, descriptor, host) else {
            if remaining == 0 {
                error!(session = %session, "host never published its network");
                return Attempt::Failed;
            }
            debug!(session = %session, remaining, "host network not published yet");
            return Attempt::NotYet;
        };

        match self
            .network
            .connect_to_network(&mut self.core, user, &network_id, &descriptor)
        {
            Ok(()) => {
                self.endpoint_purpose = Some(purpose);
                Attempt::Connecting
            }
            Err(e) => {
                error!(session = %session, "connect to host network failed: {e}");
                Attempt::Failed
            }
        }
    }
}
