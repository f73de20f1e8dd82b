//! Local user identities and the entity → platform id directory.

use std::collections::HashMap;
use std::fmt;

use lobbynet_proto::EntityKey;
use lobbynet_proto::constants::ENTITY_TYPE_TITLE_PLAYER;
use tracing::{debug, warn};

/// Platform-side user id, the identity title code works with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A user signed in on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub user_id: UserId,
    pub entity: EntityKey,
}

/// Users signed in locally plus every remote member seen in a lobby.
#[derive(Debug, Default)]
pub struct Identities {
    local: Vec<LocalUser>,
    /// Entity id → platform id, filled as lobby members show up.
    directory: HashMap<String, UserId>,
}

impl Identities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a local user. The first user added is the default user.
    pub fn add_local(&mut self, user_id: UserId, entity: EntityKey) {
        if entity.kind != ENTITY_TYPE_TITLE_PLAYER {
            warn!(user = %user_id, kind = %entity.kind, "local user entity is not a title player");
        }
        self.directory.insert(entity.id.clone(), user_id.clone());
        if let Some(existing) = self.local.iter_mut().find(|u| u.user_id == user_id) {
            existing.entity = entity;
            return;
        }
        debug!(user = %user_id, entity = %entity, "local user added");
        self.local.push(LocalUser { user_id, entity });
    }

    pub fn remove_local(&mut self, user_id: &UserId) -> Option<LocalUser> {
        let idx = self.local.iter().position(|u| &u.user_id == user_id)?;
        Some(self.local.remove(idx))
    }

    pub fn first(&self) -> Option<&LocalUser> {
        self.local.first()
    }

    pub fn local_users(&self) -> &[LocalUser] {
        &self.local
    }

    pub fn local(&self, user_id: &UserId) -> Option<&LocalUser> {
        self.local.iter().find(|u| &u.user_id == user_id)
    }

    pub fn local_by_entity(&self, entity: &EntityKey) -> Option<&LocalUser> {
        self.local.iter().find(|u| u.entity.id == entity.id)
    }

    pub fn is_local(&self, entity: &EntityKey) -> bool {
        self.local_by_entity(entity).is_some()
    }

    pub fn is_local_user(&self, user_id: &UserId) -> bool {
        self.local(user_id).is_some()
    }

    /// Records the platform id a lobby member advertised.
    pub fn remember(&mut self, entity: &EntityKey, user_id: UserId) {
        self.directory.insert(entity.id.clone(), user_id);
    }

    pub fn forget(&mut self, entity: &EntityKey) -> Option<UserId> {
        if self.is_local(entity) {
            return self.directory.get(&entity.id).cloned();
        }
        self.directory.remove(&entity.id)
    }

    pub fn user_for_entity(&self, entity: &EntityKey) -> Option<&UserId> {
        self.directory.get(&entity.id)
    }

    /// Drops every remote mapping, keeping local users.
    pub fn clear_remote(&mut self) {
        let local = &self.local;
        self.directory
            .retain(|entity_id, _| local.iter().any(|u| &u.entity.id == entity_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_user_is_default() {
        let mut ids = Identities::new();
        ids.add_local("alice".into(), EntityKey::title_player("E1"));
        ids.add_local("bob".into(), EntityKey::title_player("E2"));
        assert_eq!(ids.first().unwrap().user_id, UserId::new("alice"));
        assert!(ids.is_local(&EntityKey::title_player("E2")));
        assert!(!ids.is_local(&EntityKey::title_player("E3")));
    }

    #[test]
    fn remote_mappings_are_forgotten_but_local_kept() {
        let mut ids = Identities::new();
        ids.add_local("alice".into(), EntityKey::title_player("E1"));
        ids.remember(&EntityKey::title_player("R1"), "remote".into());
        assert_eq!(
            ids.user_for_entity(&EntityKey::title_player("R1")),
            Some(&UserId::new("remote"))
        );

        ids.clear_remote();
        assert!(ids.user_for_entity(&EntityKey::title_player("R1")).is_none());
        assert_eq!(
            ids.user_for_entity(&EntityKey::title_player("E1")),
            Some(&UserId::new("alice"))
        );
    }

    #[test]
    fn forgetting_local_entity_keeps_mapping() {
        let mut ids = Identities::new();
        ids.add_local("alice".into(), EntityKey::title_player("E1"));
        assert_eq!(
            ids.forget(&EntityKey::title_player("E1")),
            Some(UserId::new("alice"))
        );
        assert!(ids.user_for_entity(&EntityKey::title_player("E1")).is_some());
    }
}
