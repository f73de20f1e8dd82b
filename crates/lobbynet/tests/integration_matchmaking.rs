mod common;

use common::{Peer, pump};
use lobbynet::matchmaking::TicketState;
use lobbynet::network::NetworkState;
use lobbynet::{ComparisonOp, OnlineError, OnlineEvent, SessionSearch, SessionSettings, UserId};
use lobbynet_sim::SimService;

fn matched(success: bool) -> OnlineEvent {
    OnlineEvent::MatchmakingComplete {
        session: "Match".into(),
        success,
    }
}

fn queue(peer: &mut Peer, search: &SessionSearch) {
    let user = peer.user.clone();
    peer.online
        .start_matchmaking(&[user], "Match", SessionSettings::new(2), search)
        .expect("start matchmaking");
}

#[test]
fn both_players_end_up_in_the_owners_network() {
    let service = SimService::new();
    let mut alice = Peer::new(&service, "alice");
    let mut bob = Peer::new(&service, "bob");
    queue(&mut alice, &SessionSearch::default());
    assert_eq!(
        alice.online.ticket_state("Match"),
        Some(TicketState::Created)
    );
    queue(&mut bob, &SessionSearch::default());

    assert!(pump(&mut alice, &mut bob, |a, b| a.saw(&matched(true)) && b.saw(&matched(true))));

    // alice ticked first, joined the arranged lobby first and owns it
    let host = alice.online.session("Match").expect("host session");
    assert!(host.hosting);
    assert_eq!(host.owner, Some(UserId::new("alice")));
    let guest = bob.online.session("Match").expect("guest session");
    assert!(!guest.hosting);
    assert_eq!(guest.owner, Some(UserId::new("alice")));
    assert_eq!(host.local_owner, Some(UserId::new("alice")));
    assert_eq!(guest.local_owner, Some(UserId::new("bob")));
    assert_eq!(
        guest.settings.non_empty_str("NETWORKID"),
        host.settings.non_empty_str("NETWORKID")
    );

    assert_eq!(alice.online.network_state(), NetworkState::Ready);
    assert_eq!(bob.online.network_state(), NetworkState::Ready);
    let server = bob
        .online
        .connections()
        .server()
        .cloned()
        .expect("server connection");
    let host_addr = alice.online.local_bind_addr().expect("host address");
    assert_eq!(server.endpoint_id(), host_addr.endpoint_id());

    assert!(alice.saw(&OnlineEvent::ParticipantsChanged {
        session: "Match".into(),
        user: UserId::new("bob"),
        joined: true,
    }));
    assert!(alice.online.ticket_state("Match").is_none());
    assert_eq!(service.ticket_count(), 0);
    assert_eq!(service.network_count(), 1);
}

#[test]
fn a_lone_ticket_can_be_cancelled() {
    let service = SimService::new();
    let mut alice = Peer::new(&service, "alice");
    let mut bob = Peer::new(&service, "bob");
    queue(&mut alice, &SessionSearch::default());
    assert!(matches!(
        alice.online.start_matchmaking(
            &[UserId::new("alice")],
            "Match",
            SessionSettings::new(2),
            &SessionSearch::default()
        ),
        Err(OnlineError::TicketExists(_))
    ));

    alice.online.cancel_matchmaking("Match").expect("cancel");
    let cancelled = OnlineEvent::CancelMatchmakingComplete {
        session: "Match".into(),
        success: true,
    };
    assert!(pump(&mut alice, &mut bob, |a, _| a.saw(&cancelled)));

    assert!(!alice.saw(&matched(true)));
    assert!(alice.online.session("Match").is_none());
    assert!(alice.online.ticket_state("Match").is_none());
    assert_eq!(service.ticket_count(), 0);
    assert!(matches!(
        alice.online.cancel_matchmaking("Match"),
        Err(OnlineError::TicketNotFound(_))
    ));
}

#[test]
fn tickets_in_different_queues_time_out() {
    let service = SimService::new();
    let mut alice = Peer::new(&service, "alice");
    let mut bob = Peer::new(&service, "bob");
    let mut ranked = SessionSearch::default();
    ranked.set("MATCHMAKINGQUEUE", "Ranked", ComparisonOp::Equals);
    queue(&mut alice, &ranked);
    queue(&mut bob, &SessionSearch::default());

    assert!(!pump(&mut alice, &mut bob, |a, b| {
        a.saw(&matched(true)) || b.saw(&matched(true))
    }));
    assert_eq!(service.expire_tickets(), 2);
    assert!(pump(&mut alice, &mut bob, |a, b| a.saw(&matched(false)) && b.saw(&matched(false))));

    assert!(alice.online.session("Match").is_none());
    assert_eq!(service.ticket_count(), 0);
    assert_eq!(service.lobby_count(), 0);
}
