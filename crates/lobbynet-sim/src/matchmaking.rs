//! Matchmaking queues.
//!
//! Tickets wait in their queue until enough players are queued to fill a match (two unless
//! configured otherwise); those tickets are matched together in creation order.

use lobbynet_proto::limits::MAX_TICKET_TIMEOUT_SECS;
use lobbynet_proto::records::{BackendFailure, MatchmakingStateChange};
use lobbynet_proto::types::{MatchDetails, MatchMember, TicketConfiguration, TicketStatus};
use lobbynet_proto::{BackendError, EntityKey, TicketId};
use tracing::{debug, info};

use crate::codes;
use crate::faults::SimOp;
use crate::world::{ProcessId, World};

pub(crate) const DEFAULT_QUEUE_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub(crate) struct SimTicket {
    pub id: TicketId,
    pub process: ProcessId,
    pub members: Vec<EntityKey>,
    pub attributes: Vec<String>,
    pub queue: String,
    pub status: TicketStatus,
    pub details: Option<MatchDetails>,
    pub timeout_secs: u32,
}

impl SimTicket {
    fn is_waiting(&self) -> bool {
        matches!(
            self.status,
            TicketStatus::Creating
                | TicketStatus::Joining
                | TicketStatus::WaitingForPlayers
                | TicketStatus::WaitingForMatch
        )
    }
}

impl World {
    fn ticket(&self, p: ProcessId, ticket: TicketId) -> Result<&SimTicket, BackendError> {
        self.ensure_initialized(p)?;
        self.tickets
            .get(&ticket)
            .filter(|t| t.process == p)
            .ok_or(BackendError::NotFound("ticket"))
    }

    fn finish_ticket(&mut self, ticket: TicketId, status: TicketStatus, result: Result<(), BackendFailure>) {
        let Some(entry) = self.tickets.get_mut(&ticket) else {
            return;
        };
        entry.status = status;
        let p = entry.process;
        self.push_matchmaking(p, MatchmakingStateChange::TicketStatusChanged { ticket });
        self.push_matchmaking(p, MatchmakingStateChange::TicketCompleted { ticket, result });
    }

    pub fn create_matchmaking_ticket(
        &mut self,
        p: ProcessId,
        members: &[EntityKey],
        attributes: &[String],
        config: &TicketConfiguration,
    ) -> Result<TicketId, BackendError> {
        let failure = self.begin(p, SimOp::CreateTicket)?;
        if members.is_empty() {
            return Err(BackendError::InvalidArgument("ticket needs at least one member".into()));
        }
        if attributes.len() != members.len() {
            return Err(BackendError::InvalidArgument(
                "one attribute string per member expected".into(),
            ));
        }
        if config.queue_name.is_empty() {
            return Err(BackendError::InvalidArgument("empty queue name".into()));
        }
        if config.timeout_secs > MAX_TICKET_TIMEOUT_SECS {
            return Err(BackendError::InvalidArgument(format!(
                "timeout {} exceeds {MAX_TICKET_TIMEOUT_SECS}",
                config.timeout_secs
            )));
        }
        for member in members {
            self.remember_entity(p, &member.id);
        }

        let id = TicketId(self.next_id());
        self.tickets.insert(
            id,
            SimTicket {
                id,
                process: p,
                members: members.to_vec(),
                attributes: attributes.to_vec(),
                queue: config.queue_name.clone(),
                status: TicketStatus::WaitingForMatch,
                details: None,
                timeout_secs: config.timeout_secs,
            },
        );
        debug!(ticket = %id, queue = %config.queue_name, players = members.len(), "ticket queued");

        match failure {
            Some(failure) => self.finish_ticket(id, TicketStatus::Failed, Err(failure)),
            None => {
                self.push_matchmaking(p, MatchmakingStateChange::TicketStatusChanged { ticket: id });
                self.try_match(&config.queue_name);
            }
        }
        Ok(id)
    }

    /// Matches the oldest waiting tickets of `queue` once they hold enough players.
    fn try_match(&mut self, queue: &str) {
        let size = self
            .queue_sizes
            .get(queue)
            .copied()
            .unwrap_or(DEFAULT_QUEUE_SIZE)
            .max(1);

        let mut chosen = Vec::new();
        let mut players = 0;
        for ticket in self.tickets.values().filter(|t| t.queue == queue && t.is_waiting()) {
            if players + ticket.members.len() > size {
                continue;
            }
            players += ticket.members.len();
            chosen.push(ticket.id);
            if players == size {
                break;
            }
        }
        if players < size {
            return;
        }

        let members: Vec<MatchMember> = chosen
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .flat_map(|t| {
                t.members.iter().zip(&t.attributes).map(|(entity, attributes)| MatchMember {
                    entity: entity.clone(),
                    attributes: attributes.clone(),
                })
            })
            .collect();
        let details = MatchDetails {
            match_id: format!("match-{:04}", self.next_id()),
            members,
            regions: vec!["WestUs".to_string()],
            lobby_arrangement_string: format!(
                "arranged-{}",
                hex::encode(rand::random::<[u8; 8]>())
            ),
        };
        info!(queue, match_id = %details.match_id, tickets = chosen.len(), "match formed");

        for id in chosen {
            if let Some(ticket) = self.tickets.get_mut(&id) {
                ticket.details = Some(details.clone());
            }
            self.finish_ticket(id, TicketStatus::Matched, Ok(()));
        }
    }

    pub fn ticket_status(&self, p: ProcessId, ticket: TicketId) -> Result<TicketStatus, BackendError> {
        Ok(self.ticket(p, ticket)?.status)
    }

    pub fn ticket_match(&self, p: ProcessId, ticket: TicketId) -> Result<MatchDetails, BackendError> {
        self.ticket(p, ticket)?
            .details
            .clone()
            .ok_or_else(|| BackendError::InvalidArgument("ticket has not been matched".into()))
    }

    pub fn cancel_ticket(&mut self, p: ProcessId, ticket: TicketId) -> Result<(), BackendError> {
        let failure = self.begin(p, SimOp::CancelTicket)?;
        if !self.ticket(p, ticket)?.is_waiting() {
            debug!(ticket = %ticket, "cancel of a finished ticket ignored");
            return Ok(());
        }
        match failure {
            Some(failure) => Err(failure.into()),
            None => {
                self.finish_ticket(ticket, TicketStatus::Canceled, Ok(()));
                Ok(())
            }
        }
    }

    pub fn destroy_ticket(&mut self, p: ProcessId, ticket: TicketId) -> Result<(), BackendError> {
        self.ticket(p, ticket)?;
        self.tickets.remove(&ticket);
        Ok(())
    }

    /// Fails every ticket that is still waiting, as if its timeout ran out.
    pub fn expire_tickets(&mut self) -> usize {
        let waiting: Vec<TicketId> = self
            .tickets
            .values()
            .filter(|t| t.is_waiting())
            .map(|t| t.id)
            .collect();
        for &ticket in &waiting {
            let timeout = self.tickets.get(&ticket).map_or(0, |t| t.timeout_secs);
            self.finish_ticket(
                ticket,
                TicketStatus::Failed,
                Err(BackendFailure::new(
                    codes::TIMED_OUT,
                    format!("no match within {timeout}s"),
                )),
            );
        }
        waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(queue: &str) -> TicketConfiguration {
        TicketConfiguration {
            timeout_secs: 60,
            queue_name: queue.to_string(),
        }
    }

    fn world() -> (World, ProcessId, ProcessId) {
        let mut world = World::default();
        let a = world.add_process("a");
        let b = world.add_process("b");
        world.initialize(a).unwrap();
        world.initialize(b).unwrap();
        (world, a, b)
    }

    #[test]
    fn two_tickets_in_a_queue_match() {
        let (mut world, a, b) = world();
        let alice = [EntityKey::title_player("alice")];
        let bob = [EntityKey::title_player("bob")];
        let attrs = ["{}".to_string()];

        let first = world.create_matchmaking_ticket(a, &alice, &attrs, &config("Default")).unwrap();
        assert_eq!(world.ticket_status(a, first), Ok(TicketStatus::WaitingForMatch));
        let other_queue = world.create_matchmaking_ticket(b, &bob, &attrs, &config("Ranked")).unwrap();
        let second = world.create_matchmaking_ticket(b, &bob, &attrs, &config("Default")).unwrap();

        assert_eq!(world.ticket_status(a, first), Ok(TicketStatus::Matched));
        assert_eq!(world.ticket_status(b, second), Ok(TicketStatus::Matched));
        assert_eq!(world.ticket_status(b, other_queue), Ok(TicketStatus::WaitingForMatch));
        let details = world.ticket_match(a, first).unwrap();
        assert_eq!(details, world.ticket_match(b, second).unwrap());
        assert_eq!(details.members.len(), 2);

        assert_eq!(world.ticket_status(b, first), Err(BackendError::NotFound("ticket")));
    }

    #[test]
    fn cancel_and_expire() {
        let (mut world, a, b) = world();
        world.queue_sizes.insert("Default".into(), 4);
        let attrs = ["".to_string()];
        let t1 = world
            .create_matchmaking_ticket(a, &[EntityKey::title_player("alice")], &attrs, &config("Default"))
            .unwrap();
        let t2 = world
            .create_matchmaking_ticket(b, &[EntityKey::title_player("bob")], &attrs, &config("Default"))
            .unwrap();

        world.cancel_ticket(a, t1).unwrap();
        assert_eq!(world.ticket_status(a, t1), Ok(TicketStatus::Canceled));
        assert_eq!(world.expire_tickets(), 1);
        assert_eq!(world.ticket_status(b, t2), Ok(TicketStatus::Failed));

        world.destroy_ticket(a, t1).unwrap();
        assert!(world.ticket_status(a, t1).is_err());
    }

    #[test]
    fn invalid_tickets_are_rejected() {
        let (mut world, a, _) = world();
        let alice = [EntityKey::title_player("alice")];
        assert!(matches!(
            world.create_matchmaking_ticket(a, &alice, &[], &config("Default")),
            Err(BackendError::InvalidArgument(_))
        ));
        let too_long = TicketConfiguration {
            timeout_secs: MAX_TICKET_TIMEOUT_SECS + 1,
            queue_name: "Default".into(),
        };
        assert!(matches!(
            world.create_matchmaking_ticket(a, &alice, &["".into()], &too_long),
            Err(BackendError::InvalidArgument(_))
        ));
    }
}
