//! Lobby lifecycle: one lobby per named session, carrying the session's settings as lobby,
//! search and member properties.

pub mod filter;
pub mod properties;
pub mod results;
pub mod search_keys;
pub mod update;

use std::collections::HashMap;

use lobbynet_proto::constants::{
    ENTITY_TYPE_TITLE_PLAYER, FRIENDS_FILTER, SETTING_CONNECTION_STRING,
};
use lobbynet_proto::records::LobbyStateChange;
use lobbynet_proto::types::{LobbyDataUpdate, LobbyJoinConfig, LobbySearchConfig, MatchDetails};
use lobbynet_proto::{Backend, BackendError, EntityKey, LobbyId, OperationId};
use tracing::{debug, error, info, warn};

pub use update::UpdatePurpose;

use self::properties::{
    access_policy, apply_lobby_keys, apply_member_properties, apply_search_keys,
    base_member_properties, lobby_properties, member_changes, platform_id, search_properties,
};
use self::update::PendingUpdates;
use crate::context::Core;
use crate::error::OnlineError;
use crate::events::{OnlineEvent, Signal};
use crate::identity::{LocalUser, UserId};
use crate::session::SessionState;
use crate::settings::{JoinResult, SearchResult, SearchState, SessionSearch, SessionSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    Create { session: String },
    Join { session: String },
    JoinArranged { session: String },
    AddMember { session: String, user: UserId },
    Leave {
        session: String,
        destroying: bool,
        user: Option<UserId>,
    },
    Invite { session: String },
}

#[derive(Debug, Default)]
pub struct LobbyCoordinator {
    by_lobby: HashMap<LobbyId, String>,
    by_session: HashMap<String, LobbyId>,
    requests: HashMap<OperationId, Request>,
    updates: PendingUpdates,
    search: Option<OperationId>,
    search_state: SearchState,
}

impl LobbyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lobby_for_session(&self, session: &str) -> Option<LobbyId> {
        self.by_session.get(session).copied()
    }

    pub fn session_for_lobby(&self, lobby: LobbyId) -> Option<&str> {
        self.by_lobby.get(&lobby).map(String::as_str)
    }

    pub fn search_state(&self) -> SearchState {
        self.search_state
    }

    fn lobby(&self, session: &str) -> Result<LobbyId, OnlineError> {
        self.lobby_for_session(session)
            .ok_or_else(|| OnlineError::LobbyNotFound(session.to_string()))
    }

    fn bind(&mut self, lobby: LobbyId, session: &str) {
        if let Some(previous) = self.by_session.insert(session.to_string(), lobby)
            && previous != lobby
        {
            warn!(session = %session, old = %previous, new = %lobby, "session rebound to another lobby");
            self.by_lobby.remove(&previous);
        }
        self.by_lobby.insert(lobby, session.to_string());
    }

    fn unbind(&mut self, lobby: LobbyId) -> Option<String> {
        let session = self.by_lobby.remove(&lobby)?;
        self.by_session.remove(&session);
        Some(session)
    }

    /// Drops every mapping and pending request without callbacks.
    pub(crate) fn clear(&mut self) {
        self.by_lobby.clear();
        self.by_session.clear();
        self.requests.clear();
        self.updates.clear();
        self.search = None;
        self.search_state = SearchState::NotStarted;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub(crate) fn create_lobby<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        host: &LocalUser,
        session: &str,
        settings: &SessionSettings,
    ) -> Result<(), OnlineError> {
        let config = properties::create_config(settings, &host.user_id);
        let join = LobbyJoinConfig {
            member_properties: base_member_properties(&host.user_id, &core.config.platform_model),
        };
        let op = core.next_op();
        let lobby = core
            .backend
            .create_and_join_lobby(&host.entity, &config, &join, op)?;
        info!(session = %session, lobby = %lobby, policy = ?config.access_policy, "lobby creation requested");
        self.bind(lobby, session);
        self.requests.insert(
            op,
            Request::Create {
                session: session.to_string(),
            },
        );
        Ok(())
    }

    pub(crate) fn join_lobby<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
        session: &str,
        result: &SearchResult,
    ) -> Result<(), OnlineError> {
        let Some(connection_string) = result.settings.non_empty_str(SETTING_CONNECTION_STRING)
        else {
            error!(session = %session, "search result has no connection string");
            return Err(OnlineError::MissingConnectionString);
        };
        let join = properties::join_config(&result.settings, &user.user_id, &core.config.platform_model);
        let op = core.next_op();
        let lobby = core
            .backend
            .join_lobby(&user.entity, connection_string, &join, op)?;
        info!(session = %session, lobby = %lobby, "lobby join requested");
        self.bind(lobby, session);
        self.requests.insert(
            op,
            Request::Join {
                session: session.to_string(),
            },
        );
        Ok(())
    }

    pub(crate) fn join_arranged_lobby<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        session: &str,
        host: &LocalUser,
        searching_player: &UserId,
        details: &MatchDetails,
    ) -> Result<(), OnlineError> {
        let config = properties::arranged_config(
            details,
            host,
            searching_player,
            &core.config.platform_model,
        );
        let op = core.next_op();
        let lobby = core.backend.join_arranged_lobby(
            &host.entity,
            &details.lobby_arrangement_string,
            &config,
            op,
        )?;
        info!(session = %session, lobby = %lobby, match_id = %details.match_id, "arranged lobby join requested");
        self.bind(lobby, session);
        self.requests.insert(
            op,
            Request::JoinArranged {
                session: session.to_string(),
            },
        );
        Ok(())
    }

    /// Adds another local user to the session's lobby.
    pub(crate) fn add_local_player<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        session: &str,
        user: &LocalUser,
    ) -> Result<(), OnlineError> {
        if !core.sessions.contains(session) {
            return Err(OnlineError::SessionNotFound(session.to_string()));
        }
        let lobby = self.lobby(session)?;
        let props = base_member_properties(&user.user_id, &core.config.platform_model);
        let op = core.next_op();
        core.backend.add_member(lobby, &user.entity, &props, op)?;
        self.requests.insert(
            op,
            Request::AddMember {
                session: session.to_string(),
                user: user.user_id.clone(),
            },
        );
        Ok(())
    }

    /// Posts the session's current settings.
    ///
    /// Each local member whose properties changed posts its own update; the owner, if local,
    /// also posts lobby and search properties. Completion is reported once, after every post.
    pub(crate) fn update_lobby<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        session: &str,
        purpose: UpdatePurpose,
    ) -> Result<(), OnlineError> {
        let lobby = self.lobby(session)?;
        let settings = core
            .sessions
            .with(session, |s| s.settings.clone())
            .ok_or_else(|| OnlineError::SessionNotFound(session.to_string()))?;

        let local_members: Vec<(EntityKey, UserId)> = core
            .backend
            .lobby_members(lobby)?
            .into_iter()
            .filter_map(|m| {
                let user = core.identities.local_by_entity(&m)?.user_id.clone();
                Some((m, user))
            })
            .collect();

        let op = core.next_op();
        let mut posted = 0usize;
        let mut success = true;
        let mut first_error: Option<BackendError> = None;
        let mut post = |core: &mut Core<B>, member: &EntityKey, update: &LobbyDataUpdate| {
            match core.backend.post_update(lobby, member, update, op) {
                Ok(()) => posted += 1,
                Err(e) => {
                    warn!(session = %session, member = %member, "lobby update rejected: {e}");
                    success = false;
                    first_error.get_or_insert(e);
                }
            }
        };

        for (member, user) in &local_members {
            let current = core
                .backend
                .member_properties(lobby, member)
                .unwrap_or_default();
            let changes = member_changes(settings.member(user), &current);
            if changes.is_empty() {
                continue;
            }
            let update = LobbyDataUpdate {
                member_properties: changes,
                ..LobbyDataUpdate::default()
            };
            post(core, member, &update);
        }

        match core.backend.lobby_owner(lobby) {
            Ok(Some(owner)) if core.identities.is_local(&owner) => {
                let owner_user = core.identities.user_for_entity(&owner).cloned();
                let update = LobbyDataUpdate {
                    access_policy: Some(access_policy(settings.flags)),
                    lobby_properties: lobby_properties(&settings),
                    search_properties: search_properties(&settings, owner_user.as_ref()),
                    ..LobbyDataUpdate::default()
                };
                post(core, &owner, &update);
            }
            Ok(_) => debug!(session = %session, "not the lobby owner, posting member properties only"),
            Err(e) => warn!(session = %session, "lobby owner unavailable: {e}"),
        }

        if posted == 0 {
            if let Some(e) = first_error {
                return Err(e.into());
            }
            core.signal(Signal::LobbyUpdateCompleted {
                session: session.to_string(),
                success: true,
                purpose,
            });
            return Ok(());
        }
        self.updates
            .track(op, session.to_string(), purpose, posted, success);
        Ok(())
    }

    /// Leaves the session's lobby, with one player or (when destroying) with everyone local.
    pub(crate) fn leave_lobby<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        player: Option<&LocalUser>,
        session: &str,
        destroying: bool,
    ) -> Result<(), OnlineError> {
        let lobby = self.lobby(session)?;
        let op = core.next_op();
        let member = if destroying {
            None
        } else {
            Some(player.ok_or(OnlineError::NoLocalUser)?)
        };
        core.backend
            .leave_lobby(lobby, member.map(|m| &m.entity), op)?;
        debug!(session = %session, lobby = %lobby, destroying, "lobby leave requested");
        self.requests.insert(
            op,
            Request::Leave {
                session: session.to_string(),
                destroying,
                user: member.map(|m| m.user_id.clone()),
            },
        );
        Ok(())
    }

    pub(crate) fn find_lobbies<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
        search: &SessionSearch,
    ) -> Result<(), OnlineError> {
        let config = LobbySearchConfig {
            filter: filter::compose(search),
            sort: None,
            max_results: search.max_results,
        };
        self.start_search(core, user, config)
    }

    pub(crate) fn find_friend_lobbies<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
    ) -> Result<(), OnlineError> {
        let config = LobbySearchConfig {
            filter: FRIENDS_FILTER.to_string(),
            sort: None,
            max_results: 0,
        };
        self.start_search(core, user, config)
    }

    fn start_search<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        user: &LocalUser,
        config: LobbySearchConfig,
    ) -> Result<(), OnlineError> {
        if self.search.is_some() {
            warn!("a lobby search is already in progress");
            return Ok(());
        }
        let op = core.next_op();
        debug!(filter = %config.filter, "lobby search requested");
        if let Err(e) = core.backend.find_lobbies(&user.entity, &config, op) {
            self.search = None;
            self.search_state = SearchState::Failed;
            return Err(e.into());
        }
        self.search = Some(op);
        self.search_state = SearchState::InProgress;
        Ok(())
    }

    pub(crate) fn send_invite<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        session: &str,
        sender: &LocalUser,
        invitee: &EntityKey,
    ) -> Result<(), OnlineError> {
        let state = core
            .sessions
            .state(session)
            .ok_or_else(|| OnlineError::SessionNotFound(session.to_string()))?;
        if !matches!(state, SessionState::Pending | SessionState::InProgress) {
            return Err(OnlineError::InvalidSessionState {
                name: session.to_string(),
                state,
            });
        }
        let lobby = self.lobby(session)?;
        let op = core.next_op();
        core.backend.send_invite(lobby, &sender.entity, invitee, op)?;
        self.requests.insert(
            op,
            Request::Invite {
                session: session.to_string(),
            },
        );
        Ok(())
    }

    // ========================================================================
    // Session bookkeeping
    // ========================================================================

    /// Records `owner` as the session's host. Fails when the owner's platform id is unknown.
    pub(crate) fn set_host_on_session<B>(
        core: &mut Core<B>,
        session: &str,
        owner: &EntityKey,
    ) -> bool {
        if owner.kind != ENTITY_TYPE_TITLE_PLAYER {
            warn!(owner = %owner, "lobby owner is not a title player");
        }
        let Some(user) = core.identities.user_for_entity(owner).cloned() else {
            error!(session = %session, owner = %owner, "lobby owner has no known platform id");
            return false;
        };
        let local = core.identities.is_local(owner);
        core.sessions
            .with_mut(session, |s| {
                s.owner = Some(user);
                s.hosting = local;
            })
            .is_some()
    }

    /// Pulls every lobby, search and member property into the session and records every
    /// member's platform id.
    fn sync_from_lobby<B: Backend>(core: &mut Core<B>, lobby: LobbyId, session: &str) {
        let lobby_props = core.backend.lobby_properties(lobby).unwrap_or_default();
        let search_props = core.backend.lobby_search_properties(lobby).unwrap_or_default();
        let mut members = Vec::new();
        for member in core.backend.lobby_members(lobby).unwrap_or_default() {
            let props = core
                .backend
                .member_properties(lobby, &member)
                .unwrap_or_default();
            if let Some(user) = platform_id(&props) {
                core.identities.remember(&member, user.clone());
                members.push((user, props));
            }
        }

        let lobby_keys: Vec<String> = lobby_props.iter().map(|(k, _)| k.clone()).collect();
        let search_keys: Vec<String> = search_props.iter().map(|(k, _)| k.clone()).collect();
        core.sessions.with_mut(session, |s| {
            apply_lobby_keys(&mut s.settings, &lobby_keys, &lobby_props);
            apply_search_keys(&mut s.settings, &search_keys, &search_props);
            for (user, props) in &members {
                apply_member_properties(&mut s.settings, user, props);
            }
        });
    }

    fn mark_joined<B: Backend>(core: &mut Core<B>, lobby: LobbyId, session: &str) {
        let connection_string = core.backend.lobby_connection_string(lobby).ok();
        core.sessions.with_mut(session, |s| {
            s.lobby = Some(lobby);
            s.connection_string = connection_string;
            s.state = SessionState::Pending;
        });
    }

    // ========================================================================
    // Notification drain
    // ========================================================================

    pub(crate) fn do_work<B: Backend>(&mut self, core: &mut Core<B>) {
        let batch = match core.backend.start_processing_lobby() {
            Ok(batch) => batch,
            Err(e) => {
                warn!("start processing lobby failed: {e}");
                return;
            }
        };

        for record in &batch {
            let kind: &'static str = record.into();
            debug!(record = kind, "lobby state change");
            self.handle(core, record);
        }

        if let Err(e) = core.backend.finish_processing_lobby(batch) {
            error!("finish processing lobby failed: {e}");
        }
    }

    fn take_request(&mut self, op: OperationId) -> Option<Request> {
        let request = self.requests.remove(&op);
        if request.is_none() {
            warn!(operation = %op, "completion for unknown lobby request");
        }
        request
    }

    fn handle<B: Backend>(&mut self, core: &mut Core<B>, record: &LobbyStateChange) {
        match record {
            LobbyStateChange::CreateAndJoinLobbyCompleted {
                operation,
                result,
                lobby,
            } => {
                let Some(Request::Create { session }) = self.take_request(*operation) else {
                    return;
                };
                let success = match result {
                    Ok(()) => {
                        info!(session = %session, lobby = %lobby, "lobby created");
                        Self::mark_joined(core, *lobby, &session);
                        true
                    }
                    Err(e) => {
                        warn!(session = %session, "lobby creation failed: {e}");
                        self.unbind(*lobby);
                        false
                    }
                };
                core.signal(Signal::LobbyCreated { session, success });
            }
            LobbyStateChange::JoinLobbyCompleted {
                operation,
                result,
                lobby,
                ..
            } => {
                let Some(Request::Join { session }) = self.take_request(*operation) else {
                    return;
                };
                let result = match result {
                    Ok(()) => {
                        Self::sync_from_lobby(core, *lobby, &session);
                        core.sessions.with_mut(&session, |s| s.hosting = false);
                        if let Ok(Some(owner)) = core.backend.lobby_owner(*lobby) {
                            Self::set_host_on_session(core, &session, &owner);
                        }
                        Self::mark_joined(core, *lobby, &session);
                        info!(session = %session, lobby = %lobby, "lobby joined");
                        JoinResult::Success
                    }
                    Err(e) => {
                        warn!(session = %session, "lobby join failed: {e}");
                        self.unbind(*lobby);
                        JoinResult::UnknownError
                    }
                };
                core.signal(Signal::LobbyJoined { session, result });
            }
            LobbyStateChange::JoinArrangedLobbyCompleted {
                operation,
                result,
                lobby,
                ..
            } => {
                let Some(Request::JoinArranged { session }) = self.take_request(*operation) else {
                    return;
                };
                let success = match result {
                    Ok(()) => self.on_arranged_joined(core, *lobby, &session),
                    Err(e) => {
                        warn!(session = %session, "arranged lobby join failed: {e}");
                        self.unbind(*lobby);
                        false
                    }
                };
                core.signal(Signal::ArrangedLobbyJoined { session, success });
            }
            LobbyStateChange::AddMemberCompleted {
                operation, result, ..
            } => {
                let Some(Request::AddMember { session, user }) = self.take_request(*operation)
                else {
                    return;
                };
                if let Err(e) = result {
                    warn!(session = %session, user = %user, "add member failed: {e}");
                }
                core.publish(OnlineEvent::LocalPlayerRegistered {
                    session,
                    user,
                    success: result.is_ok(),
                });
            }
            LobbyStateChange::Updated {
                lobby,
                owner_updated,
                updated_search_keys,
                updated_lobby_keys,
                updated_members,
            } => self.on_updated(
                core,
                *lobby,
                *owner_updated,
                updated_search_keys,
                updated_lobby_keys,
                updated_members,
            ),
            LobbyStateChange::MemberAdded { lobby, member } => {
                let Some(session) = self.session_for_lobby(*lobby).map(str::to_string) else {
                    return;
                };
                let props = core
                    .backend
                    .member_properties(*lobby, member)
                    .unwrap_or_default();
                let Some(user) = platform_id(&props) else {
                    warn!(member = %member, "new lobby member has no platform id");
                    return;
                };
                core.identities.remember(member, user.clone());
                core.publish(OnlineEvent::ParticipantsChanged {
                    session,
                    user,
                    joined: true,
                });
            }
            LobbyStateChange::MemberRemoved {
                lobby,
                member,
                reason,
            } => {
                let Some(session) = self.session_for_lobby(*lobby).map(str::to_string) else {
                    return;
                };
                let kind: &'static str = reason.into();
                debug!(session = %session, member = %member, reason = kind, "lobby member removed");
                let Some(user) = core.identities.forget(member) else {
                    warn!(member = %member, "removed member was never mapped");
                    return;
                };
                core.publish(OnlineEvent::ParticipantsChanged {
                    session,
                    user,
                    joined: false,
                });
            }
            LobbyStateChange::PostUpdateCompleted {
                operation, result, ..
            } => {
                if let Err(e) = result {
                    warn!(operation = %operation, "lobby update failed: {e}");
                }
                if let Some(outcome) = self.updates.complete(*operation, result.is_ok()) {
                    core.signal(Signal::LobbyUpdateCompleted {
                        session: outcome.session,
                        success: outcome.success,
                        purpose: outcome.purpose,
                    });
                }
            }
            LobbyStateChange::LeaveLobbyCompleted {
                operation,
                result,
                lobby,
                ..
            } => {
                let Some(Request::Leave {
                    session,
                    destroying,
                    user,
                }) = self.take_request(*operation)
                else {
                    return;
                };
                if let Err(e) = result {
                    warn!(session = %session, "lobby leave failed: {e}");
                }
                if destroying {
                    if core.sessions.state(&session) == Some(SessionState::Destroying) {
                        core.sessions.remove(&session);
                        self.unbind(*lobby);
                        core.signal(Signal::LobbyLeft {
                            session,
                            success: result.is_ok(),
                        });
                    } else {
                        debug!(session = %session, "lobby left outside of destroy");
                    }
                } else if let Some(user) = user {
                    core.publish(OnlineEvent::LocalPlayerUnregistered {
                        session,
                        user,
                        success: result.is_ok(),
                    });
                }
            }
            LobbyStateChange::FindLobbiesCompleted {
                operation,
                result,
                results,
                ..
            } => {
                if self.search != Some(*operation) {
                    warn!(operation = %operation, "completion for unknown lobby search");
                    return;
                }
                self.search = None;
                let (success, results) = match result {
                    Ok(()) => {
                        self.search_state = SearchState::Done;
                        let converted: Vec<SearchResult> =
                            results.iter().filter_map(results::convert).collect();
                        info!(found = results.len(), joinable = converted.len(), "lobby search done");
                        (true, converted)
                    }
                    Err(e) => {
                        warn!("lobby search failed: {e}");
                        self.search_state = SearchState::Failed;
                        (false, Vec::new())
                    }
                };
                core.publish(OnlineEvent::FindSessionsComplete { success, results });
            }
            LobbyStateChange::Disconnecting { lobby, reason } => {
                let kind: &'static str = reason.into();
                info!(lobby = %lobby, reason = kind, "lobby disconnecting");
            }
            LobbyStateChange::Disconnected { lobby } => {
                if let Some(session) = self.unbind(*lobby) {
                    info!(session = %session, lobby = %lobby, "lobby disconnected");
                    core.signal(Signal::LobbyDisconnected { session });
                }
            }
            LobbyStateChange::InviteReceived {
                listening_entity,
                inviting_entity,
                connection_string,
            } => {
                let user = core
                    .identities
                    .local_by_entity(listening_entity)
                    .map(|u| u.user_id.clone());
                info!(from = %inviting_entity, "lobby invite received");
                core.publish(OnlineEvent::InviteReceived {
                    user,
                    from: inviting_entity.clone(),
                    connection_string: connection_string.clone(),
                });
            }
            LobbyStateChange::InviteListenerStatusChanged {
                listening_entity,
                status,
            } => {
                let kind: &'static str = status.into();
                debug!(entity = %listening_entity, status = kind, "invite listener status");
            }
            LobbyStateChange::SendInviteCompleted {
                operation,
                result,
                invitee,
                ..
            } => {
                let Some(Request::Invite { session }) = self.take_request(*operation) else {
                    return;
                };
                if let Err(e) = result {
                    warn!(session = %session, invitee = %invitee, "invite failed: {e}");
                }
                core.publish(OnlineEvent::InviteSent {
                    session,
                    invitee: invitee.clone(),
                    success: result.is_ok(),
                });
            }
        }
    }

    fn on_arranged_joined<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        lobby: LobbyId,
        session: &str,
    ) -> bool {
        Self::sync_from_lobby(core, lobby, session);
        let owner = match core.backend.lobby_owner(lobby) {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                error!(session = %session, "arranged lobby has no owner");
                return false;
            }
            Err(e) => {
                error!(session = %session, "arranged lobby owner unavailable: {e}");
                return false;
            }
        };
        if !Self::set_host_on_session(core, session, &owner) {
            return false;
        }
        Self::mark_joined(core, lobby, session);
        info!(
            session = %session,
            lobby = %lobby,
            hosting = core.identities.is_local(&owner),
            "arranged lobby joined"
        );
        true
    }

    fn on_updated<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        lobby: LobbyId,
        owner_updated: bool,
        search_keys: &[String],
        lobby_keys: &[String],
        members: &[EntityKey],
    ) {
        let Some(session) = self.session_for_lobby(lobby).map(str::to_string) else {
            debug!(lobby = %lobby, "update for unmapped lobby");
            return;
        };

        let lobby_props = if lobby_keys.is_empty() {
            Vec::new()
        } else {
            core.backend.lobby_properties(lobby).unwrap_or_default()
        };
        let search_props = if search_keys.is_empty() {
            Vec::new()
        } else {
            core.backend.lobby_search_properties(lobby).unwrap_or_default()
        };
        let mut member_props = Vec::new();
        for member in members {
            let Some(user) = core.identities.user_for_entity(member).cloned() else {
                error!(member = %member, "updated member has no known platform id");
                continue;
            };
            let props = core
                .backend
                .member_properties(lobby, member)
                .unwrap_or_default();
            member_props.push((user, props));
        }

        core.sessions.with_mut(&session, |s| {
            apply_lobby_keys(&mut s.settings, lobby_keys, &lobby_props);
            apply_search_keys(&mut s.settings, search_keys, &search_props);
            for (user, props) in &member_props {
                apply_member_properties(&mut s.settings, user, props);
            }
        });

        if owner_updated {
            match core.backend.lobby_owner(lobby) {
                Ok(Some(owner)) => {
                    info!(session = %session, owner = %owner, "lobby owner changed");
                    Self::set_host_on_session(core, &session, &owner);
                }
                Ok(None) => warn!(session = %session, "lobby has no owner after migration"),
                Err(e) => warn!(session = %session, "lobby owner unavailable: {e}"),
            }
        }

        core.publish(OnlineEvent::SessionSettingsChanged { session });
    }
}
