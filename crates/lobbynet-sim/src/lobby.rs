//! Lobbies, their three property namespaces and member bookkeeping.
//!
//! Membership changes are announced to the other member processes only; property updates go to
//! every member process, the poster included.

use std::collections::{BTreeMap, BTreeSet};

use lobbynet_proto::constants::{
    FRIENDS_FILTER, SEARCH_KEY_PREFIX_NUMBER, SEARCH_KEY_PREFIX_STRING,
};
use lobbynet_proto::records::{BackendFailure, LobbyStateChange, Outcome};
use lobbynet_proto::types::{
    AccessPolicy, LobbyArrangedJoinConfig, LobbyCreateConfig, LobbyDataUpdate,
    LobbyDisconnectingReason, LobbyJoinConfig, LobbySearchConfig, LobbySearchResult,
    MemberRemovedReason, OwnerMigrationPolicy, PropertyList,
};
use lobbynet_proto::{BackendError, EntityKey, LobbyId, OperationId};
use tracing::{debug, warn};

use crate::codes;
use crate::faults::SimOp;
use crate::filter::{Filter, LobbyView};
use crate::world::{ProcessId, World};

#[derive(Debug, Clone)]
pub(crate) struct SimMember {
    pub entity: EntityKey,
    pub process: ProcessId,
    pub props: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SimLobby {
    pub id: LobbyId,
    pub connection_string: String,
    pub arrangement: Option<String>,
    pub owner: Option<EntityKey>,
    pub migration: OwnerMigrationPolicy,
    pub access_policy: AccessPolicy,
    pub max_members: u32,
    pub lobby_props: BTreeMap<String, String>,
    pub search_props: BTreeMap<String, String>,
    pub members: Vec<SimMember>,
}

/// Applies a property list and returns the keys it touched.
fn apply(map: &mut BTreeMap<String, String>, list: &PropertyList) -> Vec<String> {
    let mut touched = Vec::new();
    for (key, value) in list {
        let changed = match value {
            Some(value) => map.insert(key.clone(), value.clone()).as_ref() != Some(value),
            None => map.remove(key).is_some(),
        };
        if changed {
            touched.push(key.clone());
        }
    }
    touched
}

fn is_search_key(key: &str) -> bool {
    key.starts_with(SEARCH_KEY_PREFIX_STRING) || key.starts_with(SEARCH_KEY_PREFIX_NUMBER)
}

fn props_of(list: &PropertyList) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    apply(&mut map, list);
    map
}

impl SimLobby {
    fn member(&self, entity: &EntityKey) -> Option<&SimMember> {
        self.members.iter().find(|m| &m.entity == entity)
    }

    fn is_full(&self) -> bool {
        self.members.len() as u32 >= self.max_members
    }

    /// Processes with at least one member, minus `except`.
    fn processes(&self, except: Option<ProcessId>) -> BTreeSet<ProcessId> {
        self.members
            .iter()
            .map(|m| m.process)
            .filter(|&p| Some(p) != except)
            .collect()
    }

    fn has_process(&self, p: ProcessId) -> bool {
        self.members.iter().any(|m| m.process == p)
    }

    fn search_result(&self) -> LobbySearchResult {
        LobbySearchResult {
            lobby_id: self.id,
            connection_string: Some(self.connection_string.clone()),
            owner: self.owner.clone(),
            max_member_count: self.max_members,
            current_member_count: self.members.len() as u32,
            search_properties: self
                .search_props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Removes `entity` and migrates ownership if needed. Returns whether the owner changed.
    fn remove_member(&mut self, entity: &EntityKey) -> bool {
        self.members.retain(|m| &m.entity != entity);
        if self.owner.as_ref() != Some(entity) {
            return false;
        }
        self.owner = match self.migration {
            OwnerMigrationPolicy::Automatic | OwnerMigrationPolicy::Server => {
                self.members.first().map(|m| m.entity.clone())
            }
            OwnerMigrationPolicy::Manual | OwnerMigrationPolicy::None => None,
        };
        true
    }
}

impl World {
    fn new_lobby(
        &mut self,
        owner: Option<EntityKey>,
        max_members: u32,
        migration: OwnerMigrationPolicy,
        access_policy: AccessPolicy,
    ) -> SimLobby {
        let id = LobbyId(self.next_id());
        SimLobby {
            id,
            connection_string: format!("{}-{}", id.get(), hex::encode(rand::random::<[u8; 6]>())),
            arrangement: None,
            owner,
            migration,
            access_policy,
            max_members,
            lobby_props: BTreeMap::new(),
            search_props: BTreeMap::new(),
            members: Vec::new(),
        }
    }

    pub fn lobby(&self, p: ProcessId, lobby: LobbyId) -> Result<&SimLobby, BackendError> {
        self.ensure_initialized(p)?;
        self.lobbies.get(&lobby).ok_or(BackendError::NotFound("lobby"))
    }

    fn announce(&mut self, processes: BTreeSet<ProcessId>, record: LobbyStateChange) {
        for p in processes {
            self.push_lobby(p, record.clone());
        }
    }

    /// Adds a member, announcing it to the other member processes.
    fn admit(
        &mut self,
        p: ProcessId,
        lobby: LobbyId,
        member: &EntityKey,
        props: &PropertyList,
    ) -> Outcome {
        let entry = self
            .lobbies
            .get_mut(&lobby)
            .ok_or_else(|| BackendFailure::new(codes::NOT_FOUND, "lobby does not exist"))?;
        if entry.member(member).is_some() {
            return Err(BackendFailure::new(codes::INVALID_ARGUMENT, "already a member"));
        }
        if entry.is_full() {
            return Err(BackendFailure::new(codes::FULL, "lobby is full"));
        }
        entry.members.push(SimMember {
            entity: member.clone(),
            process: p,
            props: props_of(props),
        });
        let others = entry.processes(Some(p));
        debug!(lobby = %lobby, member = %member, "member joined");
        self.announce(
            others,
            LobbyStateChange::MemberAdded {
                lobby,
                member: member.clone(),
            },
        );
        Ok(())
    }

    pub fn create_and_join_lobby(
        &mut self,
        p: ProcessId,
        creator: &EntityKey,
        config: &LobbyCreateConfig,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        let failure = self.begin(p, SimOp::CreateAndJoinLobby)?;
        if config.max_member_count == 0 {
            return Err(BackendError::InvalidArgument("max member count must be positive".into()));
        }
        if let Some((key, _)) = config.search_properties.iter().find(|(k, _)| !is_search_key(k)) {
            return Err(BackendError::InvalidArgument(format!("invalid search key {key}")));
        }
        self.remember_entity(p, &creator.id);

        let mut lobby = self.new_lobby(
            Some(creator.clone()),
            config.max_member_count,
            config.owner_migration,
            config.access_policy,
        );
        let id = lobby.id;
        let result = match failure {
            Some(failure) => Err(failure),
            None => {
                apply(&mut lobby.lobby_props, &config.lobby_properties);
                apply(&mut lobby.search_props, &config.search_properties);
                lobby.members.push(SimMember {
                    entity: creator.clone(),
                    process: p,
                    props: props_of(&join.member_properties),
                });
                debug!(lobby = %id, owner = %creator, "lobby created");
                self.lobbies.insert(id, lobby);
                Ok(())
            }
        };
        self.push_lobby(
            p,
            LobbyStateChange::CreateAndJoinLobbyCompleted {
                operation,
                result,
                lobby: id,
            },
        );
        Ok(id)
    }

    pub fn join_lobby(
        &mut self,
        p: ProcessId,
        member: &EntityKey,
        connection_string: &str,
        join: &LobbyJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        let failure = self.begin(p, SimOp::JoinLobby)?;
        if connection_string.is_empty() {
            return Err(BackendError::InvalidArgument("empty connection string".into()));
        }
        self.remember_entity(p, &member.id);

        let found = self
            .lobbies
            .values()
            .find(|l| l.connection_string == connection_string)
            .map(|l| l.id);
        let (lobby, result) = match (failure, found) {
            (Some(failure), found) => (found.unwrap_or_else(|| LobbyId(self.next_id())), Err(failure)),
            (None, None) => (
                LobbyId(self.next_id()),
                Err(BackendFailure::new(codes::NOT_FOUND, "no lobby with this connection string")),
            ),
            (None, Some(lobby)) => (lobby, self.admit(p, lobby, member, &join.member_properties)),
        };
        self.push_lobby(
            p,
            LobbyStateChange::JoinLobbyCompleted {
                operation,
                result,
                lobby,
                member: member.clone(),
            },
        );
        Ok(lobby)
    }

    /// Joins the lobby a match arranged. The first member to arrive creates it and owns it.
    pub fn join_arranged_lobby(
        &mut self,
        p: ProcessId,
        member: &EntityKey,
        arrangement: &str,
        config: &LobbyArrangedJoinConfig,
        operation: OperationId,
    ) -> Result<LobbyId, BackendError> {
        let failure = self.begin(p, SimOp::JoinArrangedLobby)?;
        if arrangement.is_empty() {
            return Err(BackendError::InvalidArgument("empty arrangement string".into()));
        }
        self.remember_entity(p, &member.id);

        let existing = self
            .lobbies
            .values()
            .find(|l| l.arrangement.as_deref() == Some(arrangement))
            .map(|l| l.id);
        let lobby = match existing {
            Some(lobby) => lobby,
            None => {
                let mut lobby = self.new_lobby(
                    None,
                    config.max_member_count.max(1),
                    config.owner_migration,
                    config.access_policy,
                );
                lobby.arrangement = Some(arrangement.to_string());
                let id = lobby.id;
                if failure.is_none() {
                    debug!(lobby = %id, arrangement, "arranged lobby created");
                    self.lobbies.insert(id, lobby);
                }
                id
            }
        };
        let result = match failure {
            Some(failure) => Err(failure),
            None => {
                let result = self.admit(p, lobby, member, &config.member_properties);
                if result.is_ok()
                    && let Some(entry) = self.lobbies.get_mut(&lobby)
                    && entry.owner.is_none()
                {
                    entry.owner = Some(member.clone());
                }
                result
            }
        };
        self.push_lobby(
            p,
            LobbyStateChange::JoinArrangedLobbyCompleted {
                operation,
                result,
                lobby,
                member: member.clone(),
            },
        );
        Ok(lobby)
    }

    pub fn add_member(
        &mut self,
        p: ProcessId,
        lobby: LobbyId,
        member: &EntityKey,
        member_properties: &PropertyList,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::AddMember)?;
        if !self.lobby(p, lobby)?.has_process(p) {
            return Err(BackendError::InvalidArgument("not a member of this lobby".into()));
        }
        self.remember_entity(p, &member.id);
        let result = match failure {
            Some(failure) => Err(failure),
            None => self.admit(p, lobby, member, member_properties),
        };
        self.push_lobby(
            p,
            LobbyStateChange::AddMemberCompleted {
                operation,
                result,
                lobby,
                member: member.clone(),
            },
        );
        Ok(())
    }

    pub fn post_update(
        &mut self,
        p: ProcessId,
        lobby: LobbyId,
        member: &EntityKey,
        update: &LobbyDataUpdate,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::PostUpdate)?;
        match self.lobby(p, lobby)?.member(member) {
            Some(m) if m.process == p => {}
            _ => return Err(BackendError::InvalidArgument(format!("{member} is not a local member"))),
        }

        let result = match failure {
            Some(failure) => Err(failure),
            None => self.apply_update(lobby, member, update),
        };
        self.push_lobby(
            p,
            LobbyStateChange::PostUpdateCompleted {
                operation,
                result,
                lobby,
                member: member.clone(),
            },
        );
        Ok(())
    }

    fn apply_update(
        &mut self,
        lobby: LobbyId,
        member: &EntityKey,
        update: &LobbyDataUpdate,
    ) -> Outcome {
        let entry = self
            .lobbies
            .get_mut(&lobby)
            .ok_or_else(|| BackendFailure::new(codes::NOT_FOUND, "lobby does not exist"))?;
        let owner_fields = update.new_owner.is_some()
            || update.access_policy.is_some()
            || !update.lobby_properties.is_empty()
            || !update.search_properties.is_empty();
        if owner_fields && entry.owner.as_ref() != Some(member) {
            return Err(BackendFailure::new(codes::FORBIDDEN, "only the owner may update the lobby"));
        }
        if let Some((key, _)) = update.search_properties.iter().find(|(k, _)| !is_search_key(k)) {
            return Err(BackendFailure::new(
                codes::INVALID_ARGUMENT,
                format!("invalid search key {key}"),
            ));
        }
        if let Some(new_owner) = &update.new_owner
            && entry.member(new_owner).is_none()
        {
            return Err(BackendFailure::new(codes::NOT_FOUND, "new owner is not a member"));
        }

        let mut owner_updated = false;
        if let Some(new_owner) = &update.new_owner
            && entry.owner.as_ref() != Some(new_owner)
        {
            entry.owner = Some(new_owner.clone());
            owner_updated = true;
        }
        if let Some(policy) = update.access_policy {
            entry.access_policy = policy;
        }
        let updated_lobby_keys = apply(&mut entry.lobby_props, &update.lobby_properties);
        let updated_search_keys = apply(&mut entry.search_props, &update.search_properties);
        let member_changed = entry
            .members
            .iter_mut()
            .find(|m| &m.entity == member)
            .map(|m| !apply(&mut m.props, &update.member_properties).is_empty())
            .unwrap_or(false);

        if owner_updated
            || member_changed
            || !updated_lobby_keys.is_empty()
            || !updated_search_keys.is_empty()
        {
            let processes = entry.processes(None);
            self.announce(
                processes,
                LobbyStateChange::Updated {
                    lobby,
                    owner_updated,
                    updated_search_keys,
                    updated_lobby_keys,
                    updated_members: if member_changed {
                        vec![member.clone()]
                    } else {
                        Vec::new()
                    },
                },
            );
        }
        Ok(())
    }

    pub fn leave_lobby(
        &mut self,
        p: ProcessId,
        lobby: LobbyId,
        member: Option<&EntityKey>,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::LeaveLobby)?;
        let entry = self.lobby(p, lobby)?;
        let leaving: Vec<EntityKey> = entry
            .members
            .iter()
            .filter(|m| m.process == p && member.is_none_or(|e| &m.entity == e))
            .map(|m| m.entity.clone())
            .collect();
        if leaving.is_empty() {
            return Err(BackendError::NotFound("member"));
        }

        let result = match failure {
            Some(failure) => Err(failure),
            None => {
                self.remove_members(lobby, &leaving);
                Ok(())
            }
        };
        self.push_lobby(
            p,
            LobbyStateChange::LeaveLobbyCompleted {
                operation,
                result,
                lobby,
                member: member.cloned(),
            },
        );
        Ok(())
    }

    /// Removes members, tells the remaining processes, and closes the lobby once it is empty.
    fn remove_members(&mut self, lobby: LobbyId, leaving: &[EntityKey]) {
        let Some(entry) = self.lobbies.get_mut(&lobby) else {
            return;
        };
        let mut owner_updated = false;
        let mut removed = Vec::new();
        for entity in leaving {
            let Some(process) = entry.member(entity).map(|m| m.process) else {
                continue;
            };
            owner_updated |= entry.remove_member(entity);
            removed.push((entity.clone(), process));
        }

        if entry.members.is_empty() {
            debug!(lobby = %lobby, "last member left, lobby closed");
            self.lobbies.remove(&lobby);
            return;
        }
        let remaining = entry.processes(None);
        for (entity, process) in removed {
            let others: BTreeSet<ProcessId> =
                remaining.iter().copied().filter(|&q| q != process).collect();
            self.announce(
                others,
                LobbyStateChange::MemberRemoved {
                    lobby,
                    member: entity,
                    reason: MemberRemovedReason::RemoteUserLeft,
                },
            );
        }
        if owner_updated {
            self.announce(
                remaining,
                LobbyStateChange::Updated {
                    lobby,
                    owner_updated: true,
                    updated_search_keys: Vec::new(),
                    updated_lobby_keys: Vec::new(),
                    updated_members: Vec::new(),
                },
            );
        }
    }

    pub fn find_lobbies(
        &mut self,
        p: ProcessId,
        searcher: &EntityKey,
        config: &LobbySearchConfig,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::FindLobbies)?;
        self.remember_entity(p, &searcher.id);
        let result = match failure {
            Some(failure) => Err(failure),
            None => self.search(searcher, config),
        };
        let (result, results) = match result {
            Ok(results) => (Ok(()), results),
            Err(failure) => (Err(failure), Vec::new()),
        };
        self.push_lobby(
            p,
            LobbyStateChange::FindLobbiesCompleted {
                operation,
                result,
                searching_entity: searcher.clone(),
                results,
            },
        );
        Ok(())
    }

    /// Public lobbies matching the filter. Every player counts as everyone's friend, so the
    /// friends filter returns every lobby that is not private.
    fn search(
        &self,
        searcher: &EntityKey,
        config: &LobbySearchConfig,
    ) -> Result<Vec<LobbySearchResult>, BackendFailure> {
        let friends = config.filter == FRIENDS_FILTER;
        let filter = if friends {
            Filter::default()
        } else {
            Filter::parse(&config.filter)
                .map_err(|e| BackendFailure::new(codes::INVALID_ARGUMENT, e.to_string()))?
        };
        let limit = match config.max_results {
            0 => usize::MAX,
            n => n as usize,
        };

        let results = self
            .lobbies
            .values()
            .filter(|l| match l.access_policy {
                AccessPolicy::Public => true,
                AccessPolicy::Friends => friends,
                AccessPolicy::Private => false,
            })
            .filter(|l| {
                filter.matches(&LobbyView {
                    search_properties: &l.search_props,
                    member_count: l.members.len(),
                    searcher_is_member: l.member(searcher).is_some(),
                })
            })
            .take(limit)
            .map(SimLobby::search_result)
            .collect();
        Ok(results)
    }

    pub fn send_invite(
        &mut self,
        p: ProcessId,
        lobby: LobbyId,
        sender: &EntityKey,
        invitee: &EntityKey,
        operation: OperationId,
    ) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::SendInvite)?;
        let entry = self.lobby(p, lobby)?;
        match entry.member(sender) {
            Some(m) if m.process == p => {}
            _ => return Err(BackendError::InvalidArgument(format!("{sender} is not a local member"))),
        }
        let connection_string = entry.connection_string.clone();

        let result = match (failure, self.entities.get(&invitee.id).copied()) {
            (Some(failure), _) => Err(failure),
            (None, None) => Err(BackendFailure::new(codes::NOT_FOUND, "invitee is not online")),
            (None, Some(target)) => {
                self.push_lobby(
                    target,
                    LobbyStateChange::InviteReceived {
                        listening_entity: invitee.clone(),
                        inviting_entity: sender.clone(),
                        connection_string,
                    },
                );
                Ok(())
            }
        };
        self.push_lobby(
            p,
            LobbyStateChange::SendInviteCompleted {
                operation,
                result,
                lobby,
                invitee: invitee.clone(),
            },
        );
        Ok(())
    }

    pub fn member_properties(
        &self,
        p: ProcessId,
        lobby: LobbyId,
        member: &EntityKey,
    ) -> Result<Vec<(String, String)>, BackendError> {
        let member = self
            .lobby(p, lobby)?
            .member(member)
            .ok_or(BackendError::NotFound("member"))?;
        Ok(member
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Removes every member the process owns, as if its connection dropped.
    pub fn drop_from_lobbies(&mut self, p: ProcessId) {
        let affected: Vec<(LobbyId, Vec<EntityKey>)> = self
            .lobbies
            .values()
            .map(|l| {
                let leaving = l
                    .members
                    .iter()
                    .filter(|m| m.process == p)
                    .map(|m| m.entity.clone())
                    .collect::<Vec<_>>();
                (l.id, leaving)
            })
            .filter(|(_, leaving)| !leaving.is_empty())
            .collect();
        for (lobby, leaving) in affected {
            self.remove_members(lobby, &leaving);
        }
    }

    /// Deletes a lobby out from under its members.
    pub fn delete_lobby(&mut self, lobby: LobbyId) -> bool {
        let Some(entry) = self.lobbies.remove(&lobby) else {
            warn!(lobby = %lobby, "delete of unknown lobby");
            return false;
        };
        for p in entry.processes(None) {
            self.push_lobby(
                p,
                LobbyStateChange::Disconnecting {
                    lobby,
                    reason: LobbyDisconnectingReason::LobbyDeleted,
                },
            );
            self.push_lobby(p, LobbyStateChange::Disconnected { lobby });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (World, ProcessId, ProcessId) {
        let mut world = World::default();
        let a = world.add_process("a");
        let b = world.add_process("b");
        world.initialize(a).unwrap();
        world.initialize(b).unwrap();
        (world, a, b)
    }

    fn drain(world: &mut World, p: ProcessId) -> Vec<LobbyStateChange> {
        let queue = &mut world.process_mut(p).unwrap().lobby_queue;
        let batch = queue.start(lobbynet_proto::BatchToken(0)).unwrap();
        let records = batch.records().to_vec();
        queue.finish(batch).unwrap();
        records
    }

    fn public_config(max: u32) -> LobbyCreateConfig {
        LobbyCreateConfig {
            max_member_count: max,
            access_policy: AccessPolicy::Public,
            search_properties: vec![("string_key30".into(), Some("Harbor".into()))],
            lobby_properties: vec![("MAPNAME".into(), Some("Harbor".into()))],
            ..LobbyCreateConfig::default()
        }
    }

    #[test]
    fn join_by_connection_string_and_owner_migration() {
        let (mut world, a, b) = world();
        let alice = EntityKey::title_player("alice");
        let bob = EntityKey::title_player("bob");
        let lobby = world
            .create_and_join_lobby(a, &alice, &public_config(4), &LobbyJoinConfig::default(), OperationId(1))
            .unwrap();
        let connection_string = world.lobbies[&lobby].connection_string.clone();

        let joined = world
            .join_lobby(b, &bob, &connection_string, &LobbyJoinConfig::default(), OperationId(2))
            .unwrap();
        assert_eq!(joined, lobby);
        assert!(drain(&mut world, a).iter().any(|r| matches!(
            r,
            LobbyStateChange::MemberAdded { member, .. } if member == &bob
        )));

        world.leave_lobby(a, lobby, None, OperationId(3)).unwrap();
        assert_eq!(world.lobbies[&lobby].owner, Some(bob.clone()));
        let records = drain(&mut world, b);
        assert!(records.iter().any(|r| matches!(r, LobbyStateChange::MemberRemoved { .. })));
        assert!(records.iter().any(|r| matches!(
            r,
            LobbyStateChange::Updated { owner_updated: true, .. }
        )));

        world.leave_lobby(b, lobby, Some(&bob), OperationId(4)).unwrap();
        assert!(world.lobbies.is_empty());
    }

    #[test]
    fn only_the_owner_updates_lobby_properties() {
        let (mut world, a, b) = world();
        let alice = EntityKey::title_player("alice");
        let bob = EntityKey::title_player("bob");
        let lobby = world
            .create_and_join_lobby(a, &alice, &public_config(4), &LobbyJoinConfig::default(), OperationId(1))
            .unwrap();
        let connection_string = world.lobbies[&lobby].connection_string.clone();
        world
            .join_lobby(b, &bob, &connection_string, &LobbyJoinConfig::default(), OperationId(2))
            .unwrap();
        drain(&mut world, a);
        drain(&mut world, b);

        let update = LobbyDataUpdate {
            lobby_properties: vec![("MAPNAME".into(), Some("Dunes".into()))],
            ..LobbyDataUpdate::default()
        };
        world.post_update(b, lobby, &bob, &update, OperationId(3)).unwrap();
        assert!(matches!(
            drain(&mut world, b).as_slice(),
            [LobbyStateChange::PostUpdateCompleted { result: Err(f), .. }] if f.code == codes::FORBIDDEN
        ));

        world.post_update(a, lobby, &alice, &update, OperationId(4)).unwrap();
        assert!(drain(&mut world, b).iter().any(|r| matches!(
            r,
            LobbyStateChange::Updated { updated_lobby_keys, .. } if updated_lobby_keys == &["MAPNAME".to_string()]
        )));
        assert_eq!(world.lobbies[&lobby].lobby_props["MAPNAME"], "Dunes");
    }

    #[test]
    fn search_skips_private_and_filtered_lobbies() {
        let (mut world, a, b) = world();
        let alice = EntityKey::title_player("alice");
        let carol = EntityKey::title_player("carol");
        let bob = EntityKey::title_player("bob");
        world
            .create_and_join_lobby(a, &alice, &public_config(4), &LobbyJoinConfig::default(), OperationId(1))
            .unwrap();
        let private = LobbyCreateConfig {
            access_policy: AccessPolicy::Private,
            ..public_config(4)
        };
        world
            .create_and_join_lobby(a, &carol, &private, &LobbyJoinConfig::default(), OperationId(2))
            .unwrap();

        let config = LobbySearchConfig {
            filter: "string_key30 eq 'Harbor' and lobby/memberCount lt 4".into(),
            sort: None,
            max_results: 10,
        };
        world.find_lobbies(b, &bob, &config, OperationId(3)).unwrap();
        let records = drain(&mut world, b);
        let [LobbyStateChange::FindLobbiesCompleted { result, results, .. }] = records.as_slice()
        else {
            panic!("expected one search completion, got {records:?}");
        };
        assert!(result.is_ok());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].owner, Some(alice));
        assert!(results[0].connection_string.is_some());
    }

    #[test]
    fn first_arranged_member_owns_the_lobby() {
        let (mut world, a, b) = world();
        let alice = EntityKey::title_player("alice");
        let bob = EntityKey::title_player("bob");
        let config = LobbyArrangedJoinConfig {
            max_member_count: 2,
            ..LobbyArrangedJoinConfig::default()
        };
        let first = world
            .join_arranged_lobby(b, &bob, "arrangement-1", &config, OperationId(1))
            .unwrap();
        let second = world
            .join_arranged_lobby(a, &alice, "arrangement-1", &config, OperationId(2))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(world.lobbies[&first].owner, Some(bob));
        assert_eq!(world.lobbies[&first].members.len(), 2);
    }

    #[test]
    fn deleted_lobby_disconnects_members() {
        let (mut world, a, _) = world();
        let alice = EntityKey::title_player("alice");
        let lobby = world
            .create_and_join_lobby(a, &alice, &public_config(2), &LobbyJoinConfig::default(), OperationId(1))
            .unwrap();
        drain(&mut world, a);
        assert!(world.delete_lobby(lobby));
        assert!(matches!(
            drain(&mut world, a).as_slice(),
            [
                LobbyStateChange::Disconnecting { .. },
                LobbyStateChange::Disconnected { .. }
            ]
        ));
    }
}
