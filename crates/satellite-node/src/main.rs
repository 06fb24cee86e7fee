//! satellite-node: runs the satellite lifecycle against a local sled store.
//!
//! Startup sequence:
//!   1. Load the node config (JSON) and open the state database
//!   2. Wire the local staking, client, consensus and channel services
//!   3. Execute the subcommand: `run` drives one block per tick, the others
//!      register, stop or describe satellites and exit

mod config;
mod local;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use satellite_core::params::{InitializationParameters, PowerShapingParameters, SatelliteMetadata};
use satellite_core::types::{Height, Phase, SatelliteId, ValidatorAddress, ZERO_TIME};
use satellite_lifecycle::snapshot::revision_number;
use satellite_lifecycle::{BlockHeader, ExecCtx, LifecycleKeeper, LifecycleQuery};
use satellite_store::SledStore;

use crate::config::NodeConfig;

#[derive(Parser, Debug)]
#[command(
    name = "satellite-node",
    version,
    about = "Satellite chain lifecycle node: launches and retires chains secured by the provider set"
)]
struct Args {
    /// Path to the node config JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the data directory from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce a block every tick, launching and removing due satellites.
    Run {
        /// Stop after this many blocks.
        #[arg(long)]
        blocks: Option<u64>,
    },

    /// Register a satellite, optionally scheduling its launch.
    Register {
        #[arg(long)]
        chain_id: String,

        #[arg(long, default_value = "")]
        name: String,

        /// Seconds from now until spawn. Without it the chain stays registered.
        #[arg(long)]
        spawn_in: Option<i64>,

        /// Percentage of active power automatically opted in (0 or 50..=100).
        #[arg(long, default_value_t = 0)]
        top_n: u32,

        /// Hex provider addresses to opt in (comma-separated).
        #[arg(long, value_delimiter = ',')]
        opt_in: Vec<String>,
    },

    /// Stop a launched satellite and schedule its removal.
    Stop {
        #[arg(long)]
        id: String,
    },

    /// Print the state of one satellite, or of all of them.
    Status {
        #[arg(long)]
        id: Option<String>,
    },
}

const HEIGHT_KEY: &[u8] = b"height";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,satellite=debug".into()),
        )
        .init();

    let args = Args::parse();
    info!("satellite node starting");

    let config = NodeConfig::load(args.config.as_deref()).context("loading node config")?;

    // ── State database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(args.data_dir.as_ref().unwrap_or(&config.data_dir));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let mut store = SledStore::open(&data_dir).context("opening state database")?;
    let meta = store.open_tree("node").context("opening node tree")?;

    // ── Local services ────────────────────────────────────────────────────────
    let validators = config.provider_validators()?;
    if validators.is_empty() {
        warn!("no validators configured; satellites will not launch");
    }
    let collaborators = local::collaborators(
        validators,
        config.lifecycle.max_provider_consensus_validators,
        Duration::from_secs(config.unbonding_period_secs),
        store.open_tree("clients").context("opening clients tree")?,
    )?;
    let keeper = LifecycleKeeper::new(config.lifecycle.clone(), collaborators)
        .context("building lifecycle keeper")?;

    let mut chain = LocalChain {
        chain_id: config.provider_chain_id.clone(),
        meta,
    };

    match args.command {
        Command::Run { blocks } => {
            run(&keeper, &mut store, &mut chain, config.tick_interval_secs, blocks).await?
        }
        Command::Register {
            chain_id,
            name,
            spawn_in,
            top_n,
            opt_in,
        } => {
            let header = chain.current_header()?;
            let spawn_time = match spawn_in {
                Some(secs) => header.time.saturating_add(secs),
                None => ZERO_TIME,
            };
            let init = InitializationParameters {
                initial_height: Height::new(revision_number(&chain_id), 1),
                spawn_time,
                ..Default::default()
            };
            let shaping = PowerShapingParameters {
                top_n,
                ..Default::default()
            };
            let metadata = SatelliteMetadata {
                name,
                ..Default::default()
            };
            let providers = opt_in
                .iter()
                .map(|s| ValidatorAddress::from_hex(s).with_context(|| format!("opt-in address {s}")))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut ctx = ExecCtx::new(&mut store, header);
            let id = keeper
                .register(&mut ctx, &chain_id, metadata, Some(init), shaping)
                .context("registering satellite")?;
            for provider in &providers {
                keeper
                    .opt_in(&mut ctx, &id, provider, None)
                    .with_context(|| format!("opting in {provider}"))?;
            }
            store.flush()?;
            println!("{id}");
        }
        Command::Stop { id } => {
            let header = chain.current_header()?;
            let id = SatelliteId::new(id);
            let mut ctx = ExecCtx::new(&mut store, header);
            let removal_time = keeper
                .prepare_for_removal(&mut ctx, &id)
                .with_context(|| format!("stopping satellite {id}"))?;
            store.flush()?;
            println!("satellite {id} stopped; removal at {removal_time}");
        }
        Command::Status { id } => {
            let now = chrono::Utc::now().timestamp();
            let query = LifecycleQuery::new(&store);
            let ids = match id {
                Some(id) => vec![SatelliteId::new(id)],
                None => {
                    let mut all = Vec::new();
                    for phase in [
                        Phase::Registered,
                        Phase::Initialized,
                        Phase::Launched,
                        Phase::Stopped,
                        Phase::Deleted,
                    ] {
                        all.extend(query.satellites_in_phase(phase)?);
                    }
                    all
                }
            };
            for id in &ids {
                println!("{}", query.describe(id, now)?);
            }
        }
    }

    Ok(())
}

// ── Block loop ────────────────────────────────────────────────────────────────

/// Height bookkeeping of the local provider chain. Heights survive restarts
/// in the `node` tree.
struct LocalChain {
    chain_id: String,
    meta: sled::Tree,
}

impl LocalChain {
    fn height(&self) -> anyhow::Result<u64> {
        let Some(bytes) = self.meta.get(HEIGHT_KEY).context("reading height")? else {
            return Ok(0);
        };
        let arr: [u8; 8] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| anyhow::anyhow!("stored height has {} bytes", bytes.len()))?;
        Ok(u64::from_be_bytes(arr))
    }

    /// Header of the last committed block, at wall-clock time.
    fn current_header(&self) -> anyhow::Result<BlockHeader> {
        Ok(BlockHeader {
            chain_id: self.chain_id.clone(),
            height: self.height()?,
            time: chrono::Utc::now().timestamp(),
        })
    }

    fn next_header(&self) -> anyhow::Result<BlockHeader> {
        let mut header = self.current_header()?;
        header.height += 1;
        Ok(header)
    }

    fn commit(&mut self, height: u64) -> anyhow::Result<()> {
        self.meta
            .insert(HEIGHT_KEY, height.to_be_bytes().to_vec())
            .context("writing height")?;
        Ok(())
    }
}

async fn run(
    keeper: &LifecycleKeeper,
    store: &mut SledStore,
    chain: &mut LocalChain,
    tick_secs: u64,
    blocks: Option<u64>,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
    let mut produced = 0u64;

    info!(chain_id = %chain.chain_id, height = chain.height()?, "node ready");
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }

        let header = chain.next_header()?;
        let height = header.height;
        let (report, events) = {
            let mut ctx = ExecCtx::new(store, header);
            let report = keeper.begin_block(&mut ctx);
            (report, ctx.take_events())
        };
        chain.commit(height)?;
        store.flush().context("flushing state")?;

        for event in &events {
            info!(height, kind = %event.kind, attributes = ?event.attributes, "event");
        }
        if !report.launches.is_empty() || !report.removals.is_empty() {
            info!(
                height,
                launched = report.launches.succeeded.len(),
                launch_retries = report.launches.requeued.len(),
                launch_drops = report.launches.dropped.len(),
                removed = report.removals.succeeded.len(),
                removal_retries = report.removals.requeued.len(),
                removal_drops = report.removals.dropped.len(),
                "block processed"
            );
        }

        produced += 1;
        if blocks.is_some_and(|limit| produced >= limit) {
            break;
        }
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
