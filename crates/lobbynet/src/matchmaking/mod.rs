//! Matchmaking ticket lifecycle, from ticket creation to the arranged lobby join.

pub mod ticket;

use std::collections::BTreeMap;

use lobbynet_proto::constants::{
    DEFAULT_MATCHMAKING_QUEUE, SETTING_MATCH_ATTRIBUTES, SETTING_MATCH_QUEUE_NAME,
};
use lobbynet_proto::limits::ticket_timeout_secs;
use lobbynet_proto::records::MatchmakingStateChange;
use lobbynet_proto::types::{TicketConfiguration, TicketStatus};
use lobbynet_proto::{Backend, TicketId};
use tracing::{debug, error, info, warn};

pub use ticket::{MatchTicket, TicketState};

use crate::context::Core;
use crate::error::OnlineError;
use crate::events::OnlineEvent;
use crate::identity::UserId;
use crate::lobby::LobbyCoordinator;
use crate::session::NamedSession;
use crate::settings::{SessionSearch, SessionSettings};

#[derive(Debug, Default)]
pub struct MatchmakingCoordinator {
    tickets: BTreeMap<String, MatchTicket>,
}

impl MatchmakingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self, session: &str) -> Option<&MatchTicket> {
        self.tickets.get(session)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub(crate) fn set_state(&mut self, session: &str, state: TicketState) {
        if let Some(ticket) = self.tickets.get_mut(session) {
            let from: &'static str = ticket.state.into();
            let to: &'static str = state.into();
            debug!(session = %session, from, to, "ticket state");
            ticket.state = state;
        }
    }

    /// Forgets every ticket without telling the service.
    pub(crate) fn clear(&mut self) {
        self.tickets.clear();
    }

    fn session_for_ticket(&self, ticket: TicketId) -> Option<String> {
        self.tickets
            .values()
            .find(|t| t.ticket == ticket)
            .map(|t| t.session.clone())
    }

    /// Submits a ticket for `players`. The first player hosts the arranged lobby join.
    pub(crate) fn create_ticket<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        players: &[UserId],
        session: &str,
        settings: &SessionSettings,
        search: &SessionSearch,
    ) -> Result<(), OnlineError> {
        if self.tickets.contains_key(session) {
            return Err(OnlineError::TicketExists(session.to_string()));
        }
        let first = players.first().ok_or(OnlineError::NoPlayers)?;
        let host = core.local_user(first)?;

        let entities = players
            .iter()
            .map(|p| core.local_user(p).map(|u| u.entity))
            .collect::<Result<Vec<_>, _>>()?;

        let attributes = search
            .get(SETTING_MATCH_ATTRIBUTES)
            .and_then(|v| v.as_str())
            .or_else(|| settings.get_str(SETTING_MATCH_ATTRIBUTES))
            .unwrap_or_default()
            .to_string();
        let queue_name = search
            .get(SETTING_MATCH_QUEUE_NAME)
            .and_then(|v| v.as_str())
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_MATCHMAKING_QUEUE)
            .to_string();
        let config = TicketConfiguration {
            timeout_secs: ticket_timeout_secs(search.timeout_secs),
            queue_name: queue_name.clone(),
        };

        let ticket = core.backend.create_matchmaking_ticket(
            &entities,
            &vec![attributes; entities.len()],
            &config,
        )?;
        info!(
            session = %session,
            ticket = %ticket,
            queue = %queue_name,
            timeout = config.timeout_secs,
            players = entities.len(),
            "matchmaking ticket created"
        );

        self.tickets.insert(
            session.to_string(),
            MatchTicket {
                session: session.to_string(),
                queue_name,
                ticket,
                state: TicketState::Created,
                settings: settings.clone(),
                host,
                searching_player: first.clone(),
                details: None,
            },
        );
        Ok(())
    }

    pub(crate) fn cancel_ticket<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        session: &str,
    ) -> Result<(), OnlineError> {
        let ticket = self
            .tickets
            .get(session)
            .ok_or_else(|| OnlineError::TicketNotFound(session.to_string()))?;
        core.backend.cancel_ticket(ticket.ticket)?;
        info!(session = %session, ticket = %ticket.ticket, "matchmaking cancel requested");
        Ok(())
    }

    /// Removes the ticket, releases it on the service and publishes the outcome.
    pub(crate) fn complete<B: Backend>(&mut self, core: &mut Core<B>, session: &str, success: bool) {
        let Some(ticket) = self.tickets.remove(session) else {
            warn!(session = %session, "matchmaking completion without a ticket");
            return;
        };
        if let Err(e) = core.backend.destroy_ticket(ticket.ticket) {
            debug!(ticket = %ticket.ticket, "destroy ticket failed: {e}");
        }
        info!(session = %session, success, "matchmaking complete");
        core.publish(OnlineEvent::MatchmakingComplete {
            session: session.to_string(),
            success,
        });
    }

    pub(crate) fn do_work<B: Backend>(&mut self, core: &mut Core<B>, lobby: &mut LobbyCoordinator) {
        let batch = match core.backend.start_processing_matchmaking() {
            Ok(batch) => batch,
            Err(e) => {
                warn!("start processing matchmaking failed: {e}");
                return;
            }
        };

        for record in &batch {
            let kind: &'static str = record.into();
            debug!(record = kind, "matchmaking state change");
            match record {
                MatchmakingStateChange::TicketStatusChanged { ticket } => {
                    if let Ok(status) = core.backend.ticket_status(*ticket) {
                        let status: &'static str = status.into();
                        debug!(ticket = %ticket, status, "ticket status");
                    }
                }
                MatchmakingStateChange::TicketCompleted { ticket, result } => {
                    let Some(session) = self.session_for_ticket(*ticket) else {
                        warn!(ticket = %ticket, "completion for unknown ticket");
                        continue;
                    };
                    if let Err(e) = result {
                        warn!(session = %session, "matchmaking failed: {e}");
                        self.set_state(&session, TicketState::Failed);
                        self.complete(core, &session, false);
                        continue;
                    }
                    match core.backend.ticket_status(*ticket) {
                        Ok(TicketStatus::Matched) => self.on_matched(core, lobby, &session, *ticket),
                        Ok(TicketStatus::Canceled) => self.on_cancelled(core, &session),
                        other => {
                            warn!(session = %session, status = ?other, "ticket finished without a match");
                            self.set_state(&session, TicketState::Failed);
                            self.complete(core, &session, false);
                        }
                    }
                }
            }
        }

        if let Err(e) = core.backend.finish_processing_matchmaking(batch) {
            error!("finish processing matchmaking failed: {e}");
        }
    }

    fn on_cancelled<B: Backend>(&mut self, core: &mut Core<B>, session: &str) {
        self.set_state(session, TicketState::Cancelled);
        if let Some(ticket) = self.tickets.remove(session)
            && let Err(e) = core.backend.destroy_ticket(ticket.ticket)
        {
            debug!(ticket = %ticket.ticket, "destroy ticket failed: {e}");
        }
        info!(session = %session, "matchmaking cancelled");
        core.publish(OnlineEvent::CancelMatchmakingComplete {
            session: session.to_string(),
            success: true,
        });
    }

    fn on_matched<B: Backend>(
        &mut self,
        core: &mut Core<B>,
        lobby: &mut LobbyCoordinator,
        session: &str,
        ticket: TicketId,
    ) {
        let details = match core.backend.ticket_match(ticket) {
            Ok(details) => details,
            Err(e) => {
                error!(session = %session, "match details unavailable: {e}");
                self.complete(core, session, false);
                return;
            }
        };
        info!(session = %session, match_id = %details.match_id, members = details.members.len(), "match found");

        let Some(entry) = self.tickets.get_mut(session) else {
            return;
        };
        entry.state = TicketState::MatchFound;
        entry.details = Some(details.clone());
        let host = entry.host.clone();
        let searching = entry.searching_player.clone();

        if !core.sessions.contains(session) {
            let mut created = NamedSession::new(session, entry.settings.clone());
            // the arranged lobby's owner replaces `owner` once joined
            created.owner = Some(searching.clone());
            created.local_owner = Some(searching.clone());
            if let Err(e) = core.sessions.insert(created) {
                error!(session = %session, "could not create matched session: {e}");
                self.complete(core, session, false);
                return;
            }
        }

        self.set_state(session, TicketState::JoiningArrangedLobby);
        if let Err(e) = lobby.join_arranged_lobby(core, session, &host, &searching, &details) {
            error!(session = %session, "arranged lobby join failed: {e}");
            self.set_state(session, TicketState::Failed);
            self.complete(core, session, false);
        }
    }
}
