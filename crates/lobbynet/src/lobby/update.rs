use std::collections::HashMap;

use lobbynet_proto::OperationId;
use tracing::warn;

/// What a lobby update was posted for; decides the event published on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePurpose {
    SessionUpdate,
    /// Host publishing network settings after a match.
    Matchmaking,
}

#[derive(Debug)]
struct PendingUpdate {
    session: String,
    purpose: UpdatePurpose,
    remaining: usize,
    success: bool,
}

/// Finished aggregate: every posted update for one operation has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub session: String,
    pub purpose: UpdatePurpose,
    pub success: bool,
}

/// Groups the posts of one `update_lobby` call under a single operation id.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    pending: HashMap<OperationId, PendingUpdate>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `posted` updates. `success` is false when some posts were already
    /// rejected synchronously.
    pub fn track(
        &mut self,
        op: OperationId,
        session: String,
        purpose: UpdatePurpose,
        posted: usize,
        success: bool,
    ) {
        self.pending.insert(
            op,
            PendingUpdate {
                session,
                purpose,
                remaining: posted,
                success,
            },
        );
    }

    /// Records one completion; returns the outcome once the last one arrives.
    pub fn complete(&mut self, op: OperationId, success: bool) -> Option<UpdateOutcome> {
        let Some(entry) = self.pending.get_mut(&op) else {
            warn!(operation = %op, "update completion for unknown operation");
            return None;
        };
        entry.success &= success;
        entry.remaining = entry.remaining.saturating_sub(1);
        if entry.remaining > 0 {
            return None;
        }
        self.pending.remove(&op).map(|e| UpdateOutcome {
            session: e.session,
            purpose: e.purpose,
            success: e.success,
        })
    }

    pub fn is_tracking(&self, op: OperationId) -> bool {
        self.pending.contains_key(&op)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_all_posts() {
        let mut updates = PendingUpdates::new();
        let op = OperationId(7);
        updates.track(op, "Game".into(), UpdatePurpose::SessionUpdate, 3, true);

        assert!(updates.complete(op, true).is_none());
        assert!(updates.complete(op, false).is_none());
        let outcome = updates.complete(op, true).unwrap();
        assert_eq!(outcome.session, "Game");
        assert!(!outcome.success);

        assert!(updates.complete(op, true).is_none());
        assert!(updates.is_empty());
    }

    #[test]
    fn initial_failure_sticks() {
        let mut updates = PendingUpdates::new();
        let op = OperationId(1);
        updates.track(op, "Game".into(), UpdatePurpose::Matchmaking, 1, false);
        let outcome = updates.complete(op, true).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.purpose, UpdatePurpose::Matchmaking);
    }
}
