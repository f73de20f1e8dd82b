//! Two clients sharing one in-memory service, ticked in lock step.

#![allow(dead_code)]

use std::time::Duration;

use crossbeam_channel::Receiver;
use lobbynet::proto::EntityKey;
use lobbynet::{OnlineConfig, OnlineEvent, OnlineSubsystem, SocketId, UserId};
use lobbynet_sim::{SimBackend, SimService};

pub const DELTA: Duration = Duration::from_millis(2500);
pub const MAX_ROUNDS: usize = 20;

pub struct Peer {
    pub user: UserId,
    pub online: OnlineSubsystem<SimBackend>,
    pub socket: SocketId,
    events: Receiver<OnlineEvent>,
    pub seen: Vec<OnlineEvent>,
}

impl Peer {
    pub fn new(service: &SimService, user: &str) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut online = OnlineSubsystem::new(service.backend(user), OnlineConfig::default());
        online.init().expect("init");
        online.add_local_user(user, EntityKey::title_player(format!("E-{user}")));
        let socket = online.create_socket();
        let events = online.events();
        Self {
            user: UserId::new(user),
            online,
            socket,
            events,
            seen: Vec::new(),
        }
    }

    pub fn tick(&mut self) {
        self.online.tick(DELTA);
        self.seen.extend(self.events.try_iter());
    }

    pub fn saw(&self, wanted: &OnlineEvent) -> bool {
        self.seen.contains(wanted)
    }

    pub fn forget_events(&mut self) {
        self.seen.clear();
    }
}

/// Ticks both peers until `done` holds, at most [`MAX_ROUNDS`] times.
pub fn pump(a: &mut Peer, b: &mut Peer, done: impl Fn(&Peer, &Peer) -> bool) -> bool {
    for _ in 0..MAX_ROUNDS {
        a.tick();
        b.tick();
        if done(a, b) {
            return true;
        }
    }
    false
}
