use lobbynet_proto::records::{LobbyStateChange, NetworkStateChange};
use lobbynet_proto::types::{
    AccessPolicy, InvitationConfiguration, InvitationRevocability, LobbyCreateConfig,
    LobbyJoinConfig, NetworkConfiguration, NetworkDestroyedReason, SendOptions, ThreadCategory,
    WorkMode,
};
use lobbynet_proto::{
    BackendError, EndpointHandle, EntityKey, LobbyService, NetworkService, OperationId,
};
use lobbynet_sim::{Fault, SimBackend, SimOp, SimService};

fn started(service: &SimService, name: &str) -> SimBackend {
    let mut backend = service.backend(name);
    backend.initialize("title").unwrap();
    backend
}

fn network_records(backend: &mut SimBackend) -> Vec<NetworkStateChange> {
    let batch = backend.start_processing_network().unwrap();
    let records = batch.records().to_vec();
    backend.finish_processing_network(batch).unwrap();
    records
}

fn lobby_records(backend: &mut SimBackend) -> Vec<LobbyStateChange> {
    let batch = backend.start_processing_lobby().unwrap();
    let records = batch.records().to_vec();
    backend.finish_processing_lobby(batch).unwrap();
    records
}

fn local_endpoint(backend: &mut SimBackend) -> EndpointHandle {
    network_records(backend)
        .into_iter()
        .filter_map(|r| match r {
            NetworkStateChange::EndpointCreated { endpoint } => Some(endpoint),
            _ => None,
        })
        .find(|e| backend.endpoint_info(*e).is_ok_and(|info| info.is_local))
        .expect("local endpoint")
}

fn join(backend: &mut SimBackend, user: &EntityKey, descriptor: &lobbynet_proto::NetworkDescriptor) {
    backend.connect_to_network(descriptor, OperationId(10)).unwrap();
    backend
        .authenticate_local_user(user, "invite-1", OperationId(11))
        .unwrap();
    backend.create_endpoint(user, OperationId(12)).unwrap();
}

#[test]
fn configuration_is_only_accepted_before_initialize() {
    let service = SimService::new();
    let mut backend = service.backend("a");
    backend
        .set_thread_affinity(ThreadCategory::Networking, 0b10)
        .unwrap();
    backend
        .set_work_mode(ThreadCategory::Audio, WorkMode::Manual)
        .unwrap();
    backend.initialize("title").unwrap();

    assert_eq!(backend.thread_affinity(ThreadCategory::Networking), Some(0b10));
    assert_eq!(backend.work_mode(ThreadCategory::Audio), Some(WorkMode::Manual));
    assert!(matches!(
        backend.set_thread_affinity(ThreadCategory::Audio, 1),
        Err(BackendError::InvalidArgument(_))
    ));
    assert_eq!(backend.initialize("title"), Err(BackendError::AlreadyInitialized));
}

#[test]
fn batches_must_be_finished_before_the_next_drain() {
    let service = SimService::new();
    let mut backend = started(&service, "a");
    let first = backend.start_processing_network().unwrap();
    assert_eq!(
        backend.start_processing_network().unwrap_err(),
        BackendError::BatchOutstanding
    );
    backend.finish_processing_network(first).unwrap();
    let second = backend.start_processing_network().unwrap();
    assert!(second.is_empty());
    backend.finish_processing_network(second).unwrap();
}

#[test]
fn two_devices_exchange_messages() {
    let service = SimService::new();
    let mut host = started(&service, "host");
    let mut client = started(&service, "client");
    let alice = EntityKey::title_player("alice");
    let bob = EntityKey::title_player("bob");

    let invitation = InvitationConfiguration {
        identifier: "invite-1".into(),
        revocability: InvitationRevocability::Anyone,
        entity_ids: Vec::new(),
    };
    let descriptor = host
        .create_new_network(&alice, &NetworkConfiguration::default(), &invitation, OperationId(1))
        .unwrap();
    join(&mut host, &alice, &descriptor);
    let host_endpoint = local_endpoint(&mut host);

    // The serialized form is what travels through lobby properties.
    let text = descriptor.serialize().unwrap();
    let descriptor = lobbynet_proto::NetworkDescriptor::deserialize(&text).unwrap();
    join(&mut client, &bob, &descriptor);
    let client_endpoint = local_endpoint(&mut client);

    let host_view = host.endpoint_info(client_endpoint).unwrap();
    assert!(!host_view.is_local);
    assert_eq!(Some(host_view.device), client.device());

    client
        .send_message(client_endpoint, &[host_endpoint], b"ping", SendOptions::socket_default())
        .unwrap();
    let received: Vec<Vec<u8>> = network_records(&mut host)
        .into_iter()
        .filter_map(|r| match r {
            NetworkStateChange::EndpointMessageReceived { sender, payload, .. }
                if sender == client_endpoint =>
            {
                Some(payload)
            }
            _ => None,
        })
        .collect();
    assert_eq!(received, vec![b"ping".to_vec()]);

    assert!(service.destroy_network(&descriptor.network_identifier, NetworkDestroyedReason::Kicked));
    assert!(network_records(&mut client).contains(&NetworkStateChange::NetworkDestroyed {
        reason: NetworkDestroyedReason::Kicked
    }));
    assert_eq!(service.network_count(), 0);
}

#[test]
fn injected_faults_surface_sync_and_async() {
    let service = SimService::new();
    let mut backend = started(&service, "a");
    let alice = EntityKey::title_player("alice");
    let config = LobbyCreateConfig {
        max_member_count: 4,
        access_policy: AccessPolicy::Public,
        ..LobbyCreateConfig::default()
    };

    backend.inject(SimOp::CreateAndJoinLobby, Fault::Reject { code: 7 });
    backend.inject(SimOp::CreateAndJoinLobby, Fault::FailAsync { code: 8 });

    let rejected = backend.create_and_join_lobby(&alice, &config, &LobbyJoinConfig::default(), OperationId(1));
    assert!(matches!(rejected, Err(BackendError::Rejected(f)) if f.code == 7));

    backend
        .create_and_join_lobby(&alice, &config, &LobbyJoinConfig::default(), OperationId(2))
        .unwrap();
    assert!(matches!(
        lobby_records(&mut backend).as_slice(),
        [LobbyStateChange::CreateAndJoinLobbyCompleted { result: Err(f), .. }] if f.code == 8
    ));
    assert_eq!(service.lobby_count(), 0);

    let lobby = backend
        .create_and_join_lobby(&alice, &config, &LobbyJoinConfig::default(), OperationId(3))
        .unwrap();
    assert_eq!(backend.lobby_owner(lobby), Ok(Some(alice)));
    assert_eq!(backend.request_count(SimOp::CreateAndJoinLobby), 3);
}

#[test]
fn uninitialize_drops_the_process_from_shared_state() {
    let service = SimService::new();
    let mut host = started(&service, "host");
    let mut client = started(&service, "client");
    let alice = EntityKey::title_player("alice");
    let bob = EntityKey::title_player("bob");

    let config = LobbyCreateConfig {
        max_member_count: 4,
        access_policy: AccessPolicy::Public,
        ..LobbyCreateConfig::default()
    };
    let lobby = host
        .create_and_join_lobby(&alice, &config, &LobbyJoinConfig::default(), OperationId(1))
        .unwrap();
    let connection_string = host.lobby_connection_string(lobby).unwrap();
    client
        .join_lobby(&bob, &connection_string, &LobbyJoinConfig::default(), OperationId(2))
        .unwrap();
    lobby_records(&mut client);

    host.uninitialize().unwrap();
    assert_eq!(client.lobby_owner(lobby), Ok(Some(bob.clone())));
    assert!(lobby_records(&mut client).iter().any(|r| matches!(
        r,
        LobbyStateChange::MemberRemoved { member, .. } if member == &alice
    )));
    assert_eq!(
        host.start_processing_lobby().unwrap_err(),
        BackendError::NotInitialized
    );
}
