use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use crossbeam_channel::Receiver;
use lobbynet::proto::EntityKey;
use lobbynet::{
    Advertisement, JoinResult, OnlineConfig, OnlineEvent, OnlineSubsystem, SessionFlags,
    SessionSearch, SessionSettings, SocketId, UserId,
};
use lobbynet_sim::{SimBackend, SimService};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

const SESSION: &str = "Game";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// One client hosts, the other finds the session and joins it
    HostJoin,
    /// Both clients queue for a match
    Matchmaking,
}

/// Two clients meeting over the in-memory relay service
#[derive(Parser, Debug)]
#[command(name = "lobbynet-demo")]
#[command(about = "Runs a two-client session over the in-memory relay service", long_about = None)]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::HostJoin)]
    scenario: Scenario,

    /// Pump interval in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Ticks before the demo gives up
    #[arg(long, default_value_t = 400)]
    ticks: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(flatten)]
    online: OnlineConfig,
}

struct Client {
    name: &'static str,
    user: UserId,
    online: OnlineSubsystem<SimBackend>,
    events: Receiver<OnlineEvent>,
    socket: SocketId,
}

impl Client {
    fn start(service: &SimService, name: &'static str, config: &OnlineConfig) -> anyhow::Result<Self> {
        let mut online = OnlineSubsystem::new(service.backend(name), config.clone());
        online
            .init()
            .with_context(|| format!("{name}: service initialization failed"))?;
        online.add_local_user(name, EntityKey::title_player(format!("player-{name}")));
        let socket = online.create_socket();
        let events = online.events();
        Ok(Self {
            name,
            user: UserId::new(name),
            online,
            events,
            socket,
        })
    }

    fn tick(&mut self, delta: Duration) -> Vec<OnlineEvent> {
        self.online.tick(delta);
        let events: Vec<OnlineEvent> = self.events.try_iter().collect();
        for event in &events {
            let kind: &'static str = event.into();
            info!(client = self.name, event = kind, "{event:?}");
        }
        events
    }

    /// Reads every queued datagram.
    fn receive(&mut self) -> anyhow::Result<Vec<(Vec<u8>, lobbynet::VirtualAddr)>> {
        let mut socket = self
            .online
            .socket(self.socket)
            .context("virtual socket vanished")?;
        let mut buf = [0u8; 1024];
        let mut received = Vec::new();
        while let Some((n, from)) = socket.recv_from(&mut buf)? {
            received.push((buf[..n].to_vec(), from));
        }
        Ok(received)
    }

    fn send(&mut self, payload: &[u8], to: &lobbynet::VirtualAddr) -> anyhow::Result<()> {
        let sent = self
            .online
            .socket(self.socket)
            .context("virtual socket vanished")?
            .send_to(payload, to)?;
        debug!(client = self.name, to = %to, bytes = sent, "datagram sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Joined,
    Pinged,
    Done,
}

struct Demo {
    scenario: Scenario,
    host: Client,
    guest: Client,
    phase: Phase,
    matched: [bool; 2],
}

impl Demo {
    fn start(&mut self) -> anyhow::Result<()> {
        match self.scenario {
            Scenario::HostJoin => {
                let mut settings = SessionSettings::new(4);
                settings.flags = SessionFlags::SHOULD_ADVERTISE | SessionFlags::ALLOW_JOIN_IN_PROGRESS;
                settings.set("MAPNAME", "Harbor", Advertisement::ViaOnlineService);
                self.host
                    .online
                    .create_session(&self.host.user, SESSION, settings)?;
            }
            Scenario::Matchmaking => {
                for client in [&mut self.host, &mut self.guest] {
                    let user = client.user.clone();
                    client.online.start_matchmaking(
                        &[user],
                        SESSION,
                        SessionSettings::new(2),
                        &SessionSearch::default(),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn on_host_event(&mut self, event: OnlineEvent) -> anyhow::Result<()> {
        match event {
            OnlineEvent::SessionCreated { success: true, .. } => {
                self.guest
                    .online
                    .find_sessions(&self.guest.user, &SessionSearch::default())?;
            }
            OnlineEvent::SessionCreated { success: false, .. } => bail!("hosting failed"),
            OnlineEvent::MatchmakingComplete { success, .. } => self.on_matched(0, success)?,
            OnlineEvent::SessionFailure { session, reason } => {
                bail!("host lost session {session}: {reason:?}")
            }
            _ => {}
        }
        Ok(())
    }

    fn on_guest_event(&mut self, event: OnlineEvent) -> anyhow::Result<()> {
        match event {
            OnlineEvent::FindSessionsComplete { success, results } => {
                let Some(found) = results.first().filter(|_| success) else {
                    bail!("no joinable session found");
                };
                info!(
                    lobby = %found.lobby_id,
                    open = found.open_public_connections,
                    "joining found session"
                );
                self.guest
                    .online
                    .join_session(&self.guest.user, SESSION, found)?;
            }
            OnlineEvent::SessionJoined { result, .. } if result == JoinResult::Success => {
                self.phase = Phase::Joined;
            }
            OnlineEvent::SessionJoined { result, .. } => bail!("join failed: {result:?}"),
            OnlineEvent::MatchmakingComplete { success, .. } => self.on_matched(1, success)?,
            OnlineEvent::SessionFailure { session, reason } => {
                bail!("guest lost session {session}: {reason:?}")
            }
            _ => {}
        }
        Ok(())
    }

    fn on_matched(&mut self, client: usize, success: bool) -> anyhow::Result<()> {
        if !success {
            bail!("matchmaking failed");
        }
        self.matched[client] = true;
        if self.matched.iter().all(|m| *m) {
            self.phase = Phase::Joined;
        }
        Ok(())
    }

    /// Guest pings the host over the server connection; the host answers every datagram.
    fn exchange(&mut self) -> anyhow::Result<()> {
        if self.phase == Phase::Joined {
            let server = self
                .guest
                .online
                .connections()
                .server()
                .cloned()
                .context("guest has no server connection")?;
            self.guest.send(b"ping", &server)?;
            self.phase = Phase::Pinged;
        }

        for (payload, from) in self.host.receive()? {
            info!(from = %from, payload = %String::from_utf8_lossy(&payload), "host received");
            self.host.send(b"pong", &from)?;
        }
        for (payload, from) in self.guest.receive()? {
            info!(from = %from, payload = %String::from_utf8_lossy(&payload), "guest received");
            if payload == b"pong" {
                self.phase = Phase::Done;
            }
        }
        Ok(())
    }

    async fn run(&mut self, tick: Duration, max_ticks: u32) -> anyhow::Result<()> {
        self.start()?;
        let mut interval = tokio::time::interval(tick);
        for _ in 0..max_ticks {
            interval.tick().await;
            for event in self.host.tick(tick) {
                self.on_host_event(event)?;
            }
            for event in self.guest.tick(tick) {
                self.on_guest_event(event)?;
            }
            self.exchange()?;
            if self.phase == Phase::Done {
                return Ok(());
            }
        }
        bail!("gave up after {max_ticks} ticks in phase {:?}", self.phase)
    }

    /// Destroys both sessions and lets the leaves complete.
    async fn finish(&mut self, tick: Duration) {
        for client in [&mut self.host, &mut self.guest] {
            if let Err(e) = client.online.destroy_session(SESSION) {
                warn!(client = client.name, "destroy failed: {e}");
            }
        }
        let mut interval = tokio::time::interval(tick);
        for _ in 0..10 {
            interval.tick().await;
            self.host.tick(tick);
            self.guest.tick(tick);
        }
        self.host.online.shutdown();
        self.guest.online.shutdown();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let service = SimService::new();
    let mut demo = Demo {
        scenario: args.scenario,
        host: Client::start(&service, "alice", &args.online)?,
        guest: Client::start(&service, "bob", &args.online)?,
        phase: Phase::Setup,
        matched: [false; 2],
    };

    info!(scenario = ?args.scenario, tick_ms = args.tick_ms, "demo started");
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let outcome = demo.run(tick, args.ticks).await;
    demo.finish(tick).await;
    info!(?service, "demo finished");
    outcome
}
