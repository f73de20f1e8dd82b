//! Completion events published to title code, plus the internal signals the pump routes
//! between coordinators.

use crossbeam_channel::{Receiver, Sender, unbounded};
use lobbynet_proto::{EndpointId, EntityKey};
use strum::IntoStaticStr;
use tracing::{debug, warn};

use crate::identity::UserId;
use crate::settings::{JoinResult, SearchResult};
use crate::socket::VirtualAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum SessionFailureReason {
    ServiceConnectionLost,
}

#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum OnlineEvent {
    // Network
    NetworkConnected {
        success: bool,
    },
    EndpointCreated {
        success: bool,
        endpoint: EndpointId,
        hosting: bool,
    },
    /// The network went away for a reason the player should be told about.
    NetworkFailure {
        reason: String,
    },
    NetworkLeft,
    ConnectionClosed {
        remote: VirtualAddr,
    },

    // Session lifecycle
    SessionCreated {
        session: String,
        success: bool,
    },
    SessionJoined {
        session: String,
        result: JoinResult,
    },
    SessionStarted {
        session: String,
        success: bool,
    },
    SessionEnded {
        session: String,
        success: bool,
    },
    SessionUpdated {
        session: String,
        success: bool,
    },
    SessionDestroyed {
        session: String,
        success: bool,
    },
    SessionFailure {
        session: String,
        reason: SessionFailureReason,
    },

    // Session data and players
    SessionSettingsChanged {
        session: String,
    },
    ParticipantsChanged {
        session: String,
        user: UserId,
        joined: bool,
    },
    PlayersRegistered {
        session: String,
        players: Vec<UserId>,
        success: bool,
    },
    PlayersUnregistered {
        session: String,
        players: Vec<UserId>,
        success: bool,
    },
    LocalPlayerRegistered {
        session: String,
        user: UserId,
        success: bool,
    },
    LocalPlayerUnregistered {
        session: String,
        user: UserId,
        success: bool,
    },

    // Search, matchmaking, invites
    FindSessionsComplete {
        success: bool,
        results: Vec<SearchResult>,
    },
    MatchmakingComplete {
        session: String,
        success: bool,
    },
    CancelMatchmakingComplete {
        session: String,
        success: bool,
    },
    InviteReceived {
        user: Option<UserId>,
        from: EntityKey,
        connection_string: String,
    },
    InviteSent {
        session: String,
        invitee: EntityKey,
        success: bool,
    },
}

/// Publishing side of the [`OnlineEvent`] channel.
///
/// The sink keeps a receiver of its own, so publishing never fails even when the title has
/// dropped every receiver it was handed.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<OnlineEvent>,
    rx: Receiver<OnlineEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn publish(&self, event: OnlineEvent) {
        let kind: &'static str = (&event).into();
        debug!(event = kind, "publishing online event");
        if let Err(e) = self.tx.send(event) {
            warn!("online event dropped: {e}");
        }
    }

    pub fn subscribe(&self) -> Receiver<OnlineEvent> {
        self.rx.clone()
    }
}

/// Internal completion routed to the session-level flows after the drains.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub(crate) enum Signal {
    EndpointCreated {
        success: bool,
        hosting: bool,
    },
    LobbyCreated {
        session: String,
        success: bool,
    },
    LobbyJoined {
        session: String,
        result: JoinResult,
    },
    ArrangedLobbyJoined {
        session: String,
        success: bool,
    },
    LobbyUpdateCompleted {
        session: String,
        success: bool,
        purpose: crate::lobby::UpdatePurpose,
    },
    LobbyLeft {
        session: String,
        success: bool,
    },
    LobbyDisconnected {
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_sees_events_in_order() {
        let sink = EventSink::new();
        let rx = sink.subscribe();
        sink.publish(OnlineEvent::NetworkConnected { success: true });
        sink.publish(OnlineEvent::NetworkLeft);

        assert_eq!(rx.try_recv(), Ok(OnlineEvent::NetworkConnected { success: true }));
        assert_eq!(rx.try_recv(), Ok(OnlineEvent::NetworkLeft));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_title_receiver_is_fine() {
        let sink = EventSink::new();
        drop(sink.subscribe());
        sink.publish(OnlineEvent::NetworkLeft);
    }
}
