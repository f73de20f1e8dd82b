use lobbynet_proto::TicketId;
use lobbynet_proto::types::MatchDetails;
use strum::IntoStaticStr;

use crate::identity::{LocalUser, UserId};
use crate::settings::SessionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum TicketState {
    Created,
    MatchFound,
    JoiningArrangedLobby,
    JoinArrangedLobbyCompleted,
    Cancelled,
    Failed,
}

/// One live matchmaking request, keyed by session name in the coordinator.
#[derive(Debug, Clone)]
pub struct MatchTicket {
    pub session: String,
    pub queue_name: String,
    pub ticket: TicketId,
    pub state: TicketState,
    /// Settings the session is created from when the match is found.
    pub settings: SessionSettings,
    /// Local user whose entity joins the arranged lobby.
    pub host: LocalUser,
    pub searching_player: UserId,
    pub details: Option<MatchDetails>,
}
