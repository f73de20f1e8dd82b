//! Named sessions and the locked registry holding them.
//!
//! Every access takes the registry lock for exactly one lookup, insert, removal or scan.
//! Closures passed to [`NamedSessionRegistry::with_mut`] run under the lock and must not touch
//! the registry again.

use lobbynet_proto::LobbyId;
use parking_lot::Mutex;
use strum::IntoStaticStr;
use tracing::debug;

use crate::error::OnlineError;
use crate::identity::UserId;
use crate::settings::SessionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum SessionState {
    Creating,
    Pending,
    InProgress,
    Ended,
    Destroying,
}

/// Metadata for one named session.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSession {
    pub name: String,
    pub state: SessionState,
    pub settings: SessionSettings,
    /// This process owns the lobby.
    pub hosting: bool,
    /// Platform id of the current lobby owner.
    pub owner: Option<UserId>,
    /// Local user that created or joined the session.
    pub local_owner: Option<UserId>,
    pub lobby: Option<LobbyId>,
    pub connection_string: Option<String>,
    pub registered_players: Vec<UserId>,
}

impl NamedSession {
    pub fn new(name: impl Into<String>, settings: SessionSettings) -> Self {
        Self {
            name: name.into(),
            state: SessionState::Creating,
            settings,
            hosting: false,
            owner: None,
            local_owner: None,
            lobby: None,
            connection_string: None,
            registered_players: Vec::new(),
        }
    }

    pub fn is_registered(&self, user: &UserId) -> bool {
        self.registered_players.contains(user)
    }
}

#[derive(Debug, Default)]
pub struct NamedSessionRegistry {
    sessions: Mutex<Vec<NamedSession>>,
}

impl NamedSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: NamedSession) -> Result<(), OnlineError> {
        let mut sessions = self.sessions.lock();
        if sessions.iter().any(|s| s.name == session.name) {
            return Err(OnlineError::SessionExists(session.name));
        }
        debug!(session = %session.name, "named session added");
        sessions.push(session);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<NamedSession> {
        let mut sessions = self.sessions.lock();
        let idx = sessions.iter().position(|s| s.name == name)?;
        debug!(session = %name, "named session removed");
        Some(sessions.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.lock().iter().any(|s| s.name == name)
    }

    /// Snapshot of one session.
    pub fn get(&self, name: &str) -> Option<NamedSession> {
        self.sessions.lock().iter().find(|s| s.name == name).cloned()
    }

    pub fn with<R>(&self, name: &str, f: impl FnOnce(&NamedSession) -> R) -> Option<R> {
        self.sessions.lock().iter().find(|s| s.name == name).map(f)
    }

    pub fn with_mut<R>(&self, name: &str, f: impl FnOnce(&mut NamedSession) -> R) -> Option<R> {
        self.sessions
            .lock()
            .iter_mut()
            .find(|s| s.name == name)
            .map(f)
    }

    pub fn state(&self, name: &str) -> Option<SessionState> {
        self.with(name, |s| s.state)
    }

    pub fn names(&self) -> Vec<String> {
        self.sessions.lock().iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sessions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = NamedSessionRegistry::new();
        registry
            .insert(NamedSession::new("Game", SessionSettings::new(4)))
            .unwrap();
        let err = registry
            .insert(NamedSession::new("Game", SessionSettings::new(2)))
            .unwrap_err();
        assert!(matches!(err, OnlineError::SessionExists(name) if name == "Game"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn mutate_in_place() {
        let registry = NamedSessionRegistry::new();
        registry
            .insert(NamedSession::new("Game", SessionSettings::new(4)))
            .unwrap();
        registry.with_mut("Game", |s| s.state = SessionState::Pending);
        assert_eq!(registry.state("Game"), Some(SessionState::Pending));
        assert!(registry.with_mut("Party", |s| s.hosting = true).is_none());

        let removed = registry.remove("Game").unwrap();
        assert_eq!(removed.state, SessionState::Pending);
        assert!(registry.is_empty());
    }
}
