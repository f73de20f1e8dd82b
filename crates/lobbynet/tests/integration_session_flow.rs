mod common;

use common::{Peer, pump};
use lobbynet::network::NetworkState;
use lobbynet::{
    Advertisement, JoinResult, OnlineError, OnlineEvent, SearchResult, SessionFailureReason,
    SessionFlags, SessionSearch, SessionSettings, SessionState, UserId,
};
use lobbynet_sim::SimService;

fn game_settings() -> SessionSettings {
    let mut settings = SessionSettings::new(4);
    settings.flags = SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_JOIN_IN_PROGRESS;
    settings.set("MODE", "ffa", Advertisement::ViaOnlineService);
    settings
}

fn created(session: &str) -> OnlineEvent {
    OnlineEvent::SessionCreated {
        session: session.to_string(),
        success: true,
    }
}

fn joined(session: &str, result: JoinResult) -> OnlineEvent {
    OnlineEvent::SessionJoined {
        session: session.to_string(),
        result,
    }
}

fn host_game(host: &mut Peer, client: &mut Peer) {
    host.online
        .create_session(&host.user, "Game", game_settings())
        .expect("create session");
    assert!(pump(host, client, |h, _| h.saw(&created("Game"))));
}

fn search(host: &mut Peer, client: &mut Peer) -> Vec<SearchResult> {
    client
        .online
        .find_sessions(&client.user, &SessionSearch::default())
        .expect("find sessions");
    assert!(pump(host, client, |_, c| c
        .seen
        .iter()
        .any(|e| matches!(e, OnlineEvent::FindSessionsComplete { .. }))));
    client
        .seen
        .iter()
        .find_map(|e| match e {
            OnlineEvent::FindSessionsComplete {
                success: true,
                results,
            } => Some(results.clone()),
            _ => None,
        })
        .expect("successful search")
}

/// Host creates "Game", the client finds and joins it.
fn joined_game(service: &SimService) -> (Peer, Peer) {
    let mut host = Peer::new(service, "alice");
    let mut client = Peer::new(service, "bob");
    host_game(&mut host, &mut client);

    let results = search(&mut host, &mut client);
    assert_eq!(results.len(), 1);
    client
        .online
        .join_session(&client.user, "Game", &results[0])
        .expect("join session");

    let bob_joined = OnlineEvent::ParticipantsChanged {
        session: "Game".into(),
        user: UserId::new("bob"),
        joined: true,
    };
    assert!(pump(&mut host, &mut client, |h, c| {
        c.saw(&joined("Game", JoinResult::Success)) && h.saw(&bob_joined)
    }));
    host.forget_events();
    client.forget_events();
    (host, client)
}

#[test]
fn host_publishes_network_settings_with_the_lobby() {
    let service = SimService::new();
    let mut host = Peer::new(&service, "alice");
    let mut client = Peer::new(&service, "bob");
    host_game(&mut host, &mut client);

    let session = host.online.session("Game").expect("session");
    assert!(session.hosting);
    assert_eq!(session.state, SessionState::Pending);
    assert_eq!(session.owner, Some(UserId::new("alice")));
    assert!(session.settings.non_empty_str("NETWORKID").is_some());
    assert!(session.settings.non_empty_str("NETWORKDESCRIPTOR").is_some());
    assert!(session.settings.non_empty_str("HOSTCONNECTINFO").is_some());

    assert_eq!(host.online.network_state(), NetworkState::Ready);
    assert!(host.online.lobby_for_session("Game").is_some());
    assert_eq!(service.lobby_count(), 1);
    assert_eq!(service.network_count(), 1);

    let again = host
        .online
        .create_session(&host.user, "Game", game_settings());
    assert!(matches!(again, Err(OnlineError::SessionExists(_))));
}

#[test]
fn private_sessions_are_not_found() {
    let service = SimService::new();
    let mut host = Peer::new(&service, "alice");
    let mut client = Peer::new(&service, "bob");

    host.online
        .create_session(&host.user, "Private", SessionSettings::new(2))
        .expect("create session");
    assert!(pump(&mut host, &mut client, |h, _| h.saw(&created("Private"))));

    assert!(search(&mut host, &mut client).is_empty());
}

#[test]
fn client_joins_through_the_hosts_network() {
    let service = SimService::new();
    let (host, client) = joined_game(&service);

    let session = client.online.session("Game").expect("session");
    assert!(!session.hosting);
    assert_eq!(session.owner, Some(UserId::new("alice")));
    assert_eq!(session.settings.get_str("MODE"), Some("ffa"));
    assert_eq!(client.online.network_state(), NetworkState::Ready);

    let server = client
        .online
        .connections()
        .server()
        .cloned()
        .expect("server connection");
    let host_addr = host.online.local_bind_addr().expect("host address");
    assert_eq!(server.endpoint_id(), host_addr.endpoint_id());
    assert_eq!(service.network_count(), 1);
}

#[test]
fn datagrams_travel_both_ways() {
    let service = SimService::new();
    let (mut host, mut client) = joined_game(&service);
    let server = client
        .online
        .connections()
        .server()
        .cloned()
        .expect("server connection");

    {
        let mut socket = client.online.socket(client.socket).expect("client socket");
        assert_eq!(socket.send_to(b"hello", &server), Ok(5));
    }

    host.tick();
    let extra = host.online.create_socket();
    // inbound datagrams land on the first socket
    let extra_pending = host.online.socket(extra).expect("extra socket").has_pending_data();
    assert!(extra_pending.is_none());
    let mut buf = [0u8; 64];
    let (n, from) = host
        .online
        .socket(host.socket)
        .expect("host socket")
        .recv_from(&mut buf)
        .expect("recv")
        .expect("datagram");
    assert_eq!(&buf[..n], b"hello");
    let client_addr = client.online.local_bind_addr().expect("client address");
    assert_eq!(from.endpoint_id(), client_addr.endpoint_id());

    host.online
        .socket(host.socket)
        .expect("host socket")
        .send_to(b"welcome", &from)
        .expect("reply");
    client.tick();
    let (n, from) = client
        .online
        .socket(client.socket)
        .expect("client socket")
        .recv_from(&mut buf)
        .expect("recv")
        .expect("datagram");
    assert_eq!(&buf[..n], b"welcome");
    assert_eq!(from.endpoint_id(), server.endpoint_id());
}

#[test]
fn settings_updates_reach_the_other_member() {
    let service = SimService::new();
    let (mut host, mut client) = joined_game(&service);

    let mut settings = host.online.session("Game").expect("session").settings;
    settings.set("MODE", "ctf", Advertisement::ViaOnlineService);
    host.online.update_session("Game", settings).expect("update");

    let updated = OnlineEvent::SessionUpdated {
        session: "Game".into(),
        success: true,
    };
    let changed = OnlineEvent::SessionSettingsChanged {
        session: "Game".into(),
    };
    assert!(pump(&mut host, &mut client, |h, c| h.saw(&updated) && c.saw(&changed)));

    let session = client.online.session("Game").expect("session");
    assert_eq!(session.settings.get_str("MODE"), Some("ctf"));
}

#[test]
fn destroying_a_joined_session_leaves_lobby_and_network() {
    let service = SimService::new();
    let (mut host, mut client) = joined_game(&service);

    client.online.destroy_session("Game").expect("destroy");
    let destroyed = OnlineEvent::SessionDestroyed {
        session: "Game".into(),
        success: true,
    };
    let bob_left = OnlineEvent::ParticipantsChanged {
        session: "Game".into(),
        user: UserId::new("bob"),
        joined: false,
    };
    assert!(pump(&mut host, &mut client, |h, c| {
        c.saw(&destroyed) && c.saw(&OnlineEvent::NetworkLeft) && h.saw(&bob_left)
    }));

    assert!(client.online.session("Game").is_none());
    assert!(client.online.lobby_for_session("Game").is_none());
    assert_eq!(client.online.network_state(), NetworkState::NoNetwork);
    assert!(host.online.session("Game").is_some());
    assert_eq!(service.lobby_count(), 1);
}

#[test]
fn losing_the_hosts_endpoint_closes_the_server_connection() {
    let service = SimService::new();
    let (mut host, mut client) = joined_game(&service);
    let server = client
        .online
        .connections()
        .server()
        .cloned()
        .expect("server connection");

    host.online.destroy_session("Game").expect("destroy");
    client.tick();

    assert!(client.online.connections().server().is_none());
    let closed: Vec<&OnlineEvent> = client
        .seen
        .iter()
        .filter(|e| matches!(e, OnlineEvent::ConnectionClosed { .. }))
        .collect();
    assert_eq!(closed, vec![&OnlineEvent::ConnectionClosed { remote: server }]);
}

#[test]
fn deleted_lobby_fails_the_session_for_everyone() {
    let service = SimService::new();
    let (mut host, mut client) = joined_game(&service);
    let lobby = host.online.lobby_for_session("Game").expect("lobby");

    assert!(service.delete_lobby(lobby));
    let failure = OnlineEvent::SessionFailure {
        session: "Game".into(),
        reason: SessionFailureReason::ServiceConnectionLost,
    };
    assert!(pump(&mut host, &mut client, |h, c| h.saw(&failure) && c.saw(&failure)));

    assert!(host.online.session("Game").is_none());
    assert!(client.online.session("Game").is_none());
}

#[test]
fn joining_a_vanished_lobby_reports_failure() {
    let service = SimService::new();
    let mut host = Peer::new(&service, "alice");
    let mut client = Peer::new(&service, "bob");
    host_game(&mut host, &mut client);
    let results = search(&mut host, &mut client);
    let lobby = host.online.lobby_for_session("Game").expect("lobby");
    assert!(service.delete_lobby(lobby));

    client
        .online
        .join_session(&client.user, "Game", &results[0])
        .expect("join request");
    assert!(pump(&mut host, &mut client, |_, c| {
        c.saw(&joined("Game", JoinResult::UnknownError))
    }));
    assert!(client.online.session("Game").is_none());
}
