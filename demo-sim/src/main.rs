use std::collections::BTreeMap;
use std::fs;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bitstream::{BitBuffer, PackLimits};
use clap::Parser;
use codec::{EntityId, HostWorld, PeerId, PeerScope, Tick};
use demo_schema::{registry, Pawn, PawnCommand, PawnSim, ARENA, PAWN};
use playback::{
    ClockConfig, ClockStats, ObjectMode, PeerSession, PlaybackError, PredictionConfig, SessionStats,
    Simulation, SyncConfig,
};
use schema::{FieldValue, StateSchema};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wire::decode_commands;

// No larger than the peer dejitter window, so a keepalive basis is still held.
const HOST_HISTORY: usize = 32;
const INPUT_HOLD_TICKS: u32 = 12;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Loopback host and peers over a simulated lossy network"
)]
struct Cli {
    /// Number of connected peers, each controlling one pawn.
    #[arg(long, default_value_t = 4)]
    peers: u32,
    /// Number of host ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Host ticks between snapshots.
    #[arg(long, default_value_t = 1)]
    send_rate: u32,
    /// One-way latency in ticks.
    #[arg(long, default_value_t = 3)]
    latency: u32,
    /// Extra random delay in ticks, up to this many.
    #[arg(long, default_value_t = 2)]
    jitter: u32,
    /// Probability that a datagram is lost.
    #[arg(long, default_value_t = 0.05)]
    loss: f64,
    /// JSON file with a `SyncConfig`; derived from the network otherwise.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the summary here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Fail if p95 snapshot size exceeds this many bytes.
    #[arg(long)]
    max_p95_packet_bytes: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let send_rate = NonZeroU32::new(cli.send_rate).context("send rate must be non-zero")?;
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => derived_config(&cli)?,
    };
    let network = Network {
        latency: cli.latency,
        jitter: cli.jitter,
        loss: cli.loss,
    };

    let registry = Arc::new(registry().context("build pawn registry")?);
    let schema = registry.get(PAWN).context("pawn schema missing")?.clone();
    let sim = PawnSim::new(schema.clone());
    let history = NonZeroUsize::new(HOST_HISTORY).context("history capacity")?;
    let mut host = HostWorld::new(registry.clone(), send_rate, history);
    let mut rng = Rng::new(cli.seed);

    let mut peers = Vec::with_capacity(cli.peers as usize);
    for index in 0..cli.peers {
        let id = PeerId::new(index + 1);
        let pawn = host.spawn(PAWN).context("spawn pawn")?;
        host.set(pawn, "color", FieldValue::UInt(index % 8))?;
        host.set(pawn, "x", FieldValue::Float(rng.range_f32(-ARENA / 2.0, ARENA / 2.0)))?;
        host.set(pawn, "y", FieldValue::Float(rng.range_f32(-ARENA / 2.0, ARENA / 2.0)))?;
        host.set_controller(pawn, Some(id))?;
        let session = PeerSession::new(registry.clone(), sim.clone(), config)
            .context("create peer session")?;
        peers.push(Peer::new(id, pawn, session));
    }
    info!(peers = cli.peers, ticks = cli.ticks, seed = cli.seed, "simulation started");

    let limits = config.limits;
    let command_limits = PackLimits::new(512, 64);
    let mut summary = Summary::new(&cli);

    for step in 0..cli.ticks {
        // host: inputs and acks that arrived by now
        for peer in &mut peers {
            for bytes in peer.uplink.deliver(step) {
                let mut buffer = BitBuffer::from_bytes(&bytes);
                match decode_commands::<PawnCommand>(&mut buffer) {
                    Ok(commands) => {
                        for entry in commands {
                            peer.received.insert(entry.tick, entry.command);
                        }
                    }
                    Err(err) => warn!(peer = peer.id.raw(), %err, "bad command envelope"),
                }
            }
            for tick in peer.acks.deliver(step) {
                peer.scope.ack(tick);
            }
        }

        // host: simulate and send
        let tick = host.tick();
        for peer in &mut peers {
            let command = peer.received.get(&tick.raw()).copied();
            if let Some(state) = host.state_mut(peer.pawn) {
                sim.step(state, command.as_ref());
            }
            peer.received = peer.received.split_off(&tick.next().raw());
        }
        if host.commit() {
            for peer in &mut peers {
                let packet = host
                    .build_packet(&mut peer.scope, &limits)
                    .context("build snapshot packet")?;
                if !packet.deferred.is_empty() {
                    debug!(peer = peer.id.raw(), deferred = packet.deferred.len(), "packet full");
                }
                let bytes = packet.buffer.to_bytes();
                summary.push_packet(bytes.len() as u64);
                peer.downlink.send(step, bytes, &network, &mut rng);
            }
        }
        for entity in host.advance() {
            for peer in &mut peers {
                peer.scope.forget(entity);
            }
        }

        // peers: receive, step, send input
        for peer in &mut peers {
            for bytes in peer.downlink.deliver(step) {
                match peer.session.receive(&bytes) {
                    Ok(report) => peer.acks.send(step, report.tick, &network, &mut rng),
                    Err(err) => warn!(peer = peer.id.raw(), %err, "dropped snapshot"),
                }
            }
            if step % INPUT_HOLD_TICKS == 0 {
                peer.input = random_input(&mut rng);
            }
            peer.session.step(Some(peer.input));
            let (buffer, _) = peer
                .session
                .outgoing_commands(command_limits)
                .context("encode commands")?;
            peer.uplink.send(step, buffer.to_bytes(), &network, &mut rng);

            peer.measure(&host, &schema);
        }
    }

    for peer in &peers {
        summary.push_peer(peer);
    }
    summary.finalize();
    info!(
        avg_packet_bytes = summary.packets.avg_bytes,
        p95_packet_bytes = summary.packets.p95_bytes,
        "simulation finished"
    );
    summary.assert_budgets(cli.max_p95_packet_bytes)?;
    write_summary(cli.out.as_deref(), &summary)?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: SyncConfig =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    config.validate().context("invalid sync config")?;
    Ok(config)
}

/// Buffers enough delay for the jitter and leads far enough for commands
/// to reach the host before it simulates their tick.
fn derived_config(cli: &Cli) -> Result<SyncConfig, PlaybackError> {
    let delay_min = cli.send_rate + cli.jitter;
    let delay_max = delay_min + 2 * (cli.send_rate + cli.jitter);
    let lead = 2 * cli.latency + cli.jitter + 1;
    let mut config = SyncConfig::default();
    config.clock = ClockConfig::new(cli.send_rate, delay_min, delay_max)?;
    config.prediction = PredictionConfig::new(lead, config.prediction.command_capacity);
    if let Some(divisor) = NonZeroU32::new(cli.send_rate) {
        config.dejitter.divisor = divisor;
    }
    Ok(config)
}

fn random_input(rng: &mut Rng) -> PawnCommand {
    let axis = |rng: &mut Rng| rng.range_u32(0, 2) as i8 - 1;
    let dx = axis(rng);
    let dy = axis(rng);
    PawnCommand::new(dx, dy, rng.chance(0.1))
}

fn write_summary(out: Option<&Path>, summary: &Summary) -> Result<()> {
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    match out {
        Some(path) => fs::write(path, contents).with_context(|| format!("write {}", path.display())),
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}

struct Network {
    latency: u32,
    jitter: u32,
    loss: f64,
}

/// One direction of a simulated datagram channel.
struct Link<T> {
    in_flight: Vec<(u32, T)>,
    sent: u64,
    lost: u64,
}

impl<T> Link<T> {
    fn new() -> Self {
        Self {
            in_flight: Vec::new(),
            sent: 0,
            lost: 0,
        }
    }

    fn send(&mut self, now: u32, item: T, network: &Network, rng: &mut Rng) {
        self.sent += 1;
        if rng.chance(network.loss) {
            self.lost += 1;
            return;
        }
        let arrival = now + network.latency + rng.range_u32(0, network.jitter);
        self.in_flight.push((arrival, item));
    }

    /// Items due by `now`, in arrival order.
    fn deliver(&mut self, now: u32) -> Vec<T> {
        let (mut ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|(arrival, _)| *arrival <= now);
        self.in_flight = waiting;
        ready.sort_by_key(|(arrival, _)| *arrival);
        ready.into_iter().map(|(_, item)| item).collect()
    }
}

struct Peer {
    id: PeerId,
    pawn: EntityId,
    scope: PeerScope,
    session: PeerSession<PawnSim>,
    downlink: Link<Vec<u8>>,
    uplink: Link<Vec<u8>>,
    acks: Link<Tick>,
    /// Commands the host has received from this peer, by raw tick.
    received: BTreeMap<u32, PawnCommand>,
    input: PawnCommand,
    error_max: f32,
    error_total: f64,
    error_samples: u64,
    not_ready: u64,
}

impl Peer {
    fn new(id: PeerId, pawn: EntityId, session: PeerSession<PawnSim>) -> Self {
        Self {
            id,
            pawn,
            scope: PeerScope::new(id),
            session,
            downlink: Link::new(),
            uplink: Link::new(),
            acks: Link::new(),
            received: BTreeMap::new(),
            input: PawnCommand::default(),
            error_max: 0.0,
            error_total: 0.0,
            error_samples: 0,
            not_ready: 0,
        }
    }

    /// Compares the peer's prediction of its pawn with the host's newest
    /// record, and counts objects it cannot show yet.
    fn measure(&mut self, host: &HostWorld, schema: &StateSchema) {
        let authoritative = host.history(self.pawn).and_then(|history| history.latest());
        let predicted = self.session.object(self.pawn).and_then(|object| match object.mode() {
            ObjectMode::Predicting(predictor) => Some(predictor),
            ObjectMode::Smoothing(_) => None,
        });
        if let (Some(authoritative), Some(predictor)) = (authoritative, predicted) {
            let host_pawn = Pawn::read(schema, &authoritative.state);
            let peer_pawn = predictor
                .predicted_at(authoritative.tick)
                .and_then(|record| Pawn::read(schema, &record.state));
            if let (Some(host_pawn), Some(peer_pawn)) = (host_pawn, peer_pawn) {
                let error = host_pawn.distance(&peer_pawn);
                self.error_max = self.error_max.max(error);
                self.error_total += f64::from(error);
                self.error_samples += 1;
            }
        }

        for entity in host.entities() {
            match self.session.present(entity, 0.5) {
                Ok(presentation) if presentation.is_ready() => {}
                _ => self.not_ready += 1,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct PeerReport {
    peer: u32,
    clock: ClockStats,
    session: SessionStats,
    snapshots_sent: u64,
    snapshots_lost: u64,
    commands_sent: u64,
    commands_lost: u64,
    prediction_error_max: f32,
    prediction_error_avg: f64,
    not_ready_samples: u64,
}

#[derive(Debug, Serialize, Default)]
struct PacketSummary {
    count: u64,
    bytes_total: u64,
    avg_bytes: u64,
    p95_bytes: u64,
    max_bytes: u64,
    #[serde(skip)]
    sizes: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct Summary {
    peers: u32,
    ticks: u32,
    seed: u64,
    send_rate: u32,
    latency: u32,
    jitter: u32,
    loss: f64,
    packets: PacketSummary,
    peer_reports: Vec<PeerReport>,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            peers: cli.peers,
            ticks: cli.ticks,
            seed: cli.seed,
            send_rate: cli.send_rate,
            latency: cli.latency,
            jitter: cli.jitter,
            loss: cli.loss,
            packets: PacketSummary::default(),
            peer_reports: Vec::new(),
        }
    }

    fn push_packet(&mut self, bytes: u64) {
        self.packets.count += 1;
        self.packets.bytes_total += bytes;
        self.packets.sizes.push(bytes);
    }

    fn push_peer(&mut self, peer: &Peer) {
        let avg = if peer.error_samples > 0 {
            peer.error_total / peer.error_samples as f64
        } else {
            0.0
        };
        self.peer_reports.push(PeerReport {
            peer: peer.id.raw(),
            clock: peer.session.clock().stats(),
            session: peer.session.stats(),
            snapshots_sent: peer.downlink.sent,
            snapshots_lost: peer.downlink.lost,
            commands_sent: peer.uplink.sent,
            commands_lost: peer.uplink.lost,
            prediction_error_max: peer.error_max,
            prediction_error_avg: avg,
            not_ready_samples: peer.not_ready,
        });
    }

    fn finalize(&mut self) {
        let packets = &mut self.packets;
        if packets.count == 0 {
            return;
        }
        packets.avg_bytes = packets.bytes_total / packets.count;
        packets.sizes.sort_unstable();
        let idx = ((packets.sizes.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(packets.sizes.len() - 1);
        packets.p95_bytes = packets.sizes[idx];
        packets.max_bytes = packets.sizes.last().copied().unwrap_or(0);
    }

    fn assert_budgets(&self, max_p95: Option<u64>) -> Result<()> {
        if let Some(max_p95) = max_p95 {
            if self.packets.p95_bytes > max_p95 {
                anyhow::bail!(
                    "p95 packet bytes {} exceeds budget {}",
                    self.packets.p95_bytes,
                    max_p95
                );
            }
        }
        Ok(())
    }
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    /// Uniform in `[min, max]`.
    fn range_u32(&mut self, min: u32, max: u32) -> u32 {
        let span = u64::from(max.saturating_sub(min)) + 1;
        min + (u64::from(self.next_u32()) % span) as u32
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        let unit = self.next_u32() as f32 / u32::MAX as f32;
        min + (max - min) * unit
    }

    fn chance(&mut self, probability: f64) -> bool {
        f64::from(self.next_u32()) / f64::from(u32::MAX) < probability
    }
}
