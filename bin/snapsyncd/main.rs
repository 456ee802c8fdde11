//! snapsyncd - a standalone driver for the snap-sync state-healing and
//! range-fetch engine.
//!
//! Real peer discovery and the rlpx transport are external collaborators
//! (see DESIGN.md); this binary wires the engine up against a small
//! synthetic network fixture (`demo`) so the whole account/storage/bytecode
//! range-fetch-plus-heal loop runs end to end from the command line.

mod demo;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapsync_p2p::peer::Buddy;
use snapsync_p2p::wire::WireClient;
use snapsync_p2p::{Config, Engine};
use snapsync_storage::{InMemoryKvStore, KvStore, PivotSnapshot};
use snapsync_trie::TrieDB;

use demo::build_demo_world;

/// CLI surface: a datadir, a peer budget, and a JWT secret path, the same
/// shape `cmd/ethrex`'s flags take.
#[derive(Parser, Debug)]
#[command(name = "snapsyncd")]
#[command(about = "Snap-sync state-healing and range-fetch engine")]
struct Args {
    /// Where persisted state lives. The in-memory backend used here ignores
    /// the path's contents but still demonstrates the boundary a production
    /// KV engine would bind to.
    #[arg(long, default_value = "snapsyncd-data")]
    data_dir: PathBuf,

    /// Upper bound on concurrent peer buddies.
    #[arg(long, default_value_t = 8)]
    max_peers: usize,

    /// Size of the synthetic state the demo peer serves.
    #[arg(long, default_value_t = 5_000)]
    demo_accounts: usize,

    /// Path to the authrpc JWT secret; generated on first run if absent.
    #[arg(long, default_value = "jwtsecret.hex")]
    jwt_secret_path: PathBuf,

    /// Tracing filter directive, e.g. "info" or "snapsync_p2p=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

const SNAPSHOT_INTERVAL_ROUNDS: u64 = 50;
const MAX_ROUNDS: u64 = 200_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    std::fs::create_dir_all(&args.data_dir)?;
    let _jwt_secret = read_or_generate_jwt_secret(&args.jwt_secret_path);

    let store = Arc::new(InMemoryKvStore::new());
    let trie_db: Arc<dyn TrieDB> = Arc::new(snapsync_storage::kv::KvTrieDB::new(store.clone()));
    let config = Config { max_peers: args.max_peers.max(1), ..Config::default() };
    let mut engine = Engine::new(store.clone(), trie_db, config.clone());

    if let Some(snapshot) = PivotSnapshot::load(store.as_ref())? {
        info!(state_root = ?snapshot.state_root, ranges = snapshot.processed.len(), "resumed pivot snapshot from previous run");
    }

    let world = build_demo_world(args.demo_accounts);
    let state_root = world.header.state_root;
    info!(?state_root, accounts = args.demo_accounts, "built synthetic demo world");

    engine.set_pivot(world.header);
    let wire = WireClient::new(world.peer);
    let mut heal_source = world.heal_source;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received ctrl-c, finishing the current round before exit");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut buddies: Vec<Buddy> = (0..config.max_peers).map(|i| Buddy::new(format!("peer-{i}"))).collect();
    let mut ignore_contracts = HashSet::new();
    let mut ignore_heal_accounts = HashSet::new();
    let mut rounds = 0u64;

    while !engine.is_complete() && !shutdown.load(Ordering::Relaxed) && rounds < MAX_ROUNDS {
        let mut made_progress = false;

        for buddy in buddies.iter_mut() {
            buddy.maybe_unban();
            if !buddy.is_runnable() || buddy.is_banned() {
                continue;
            }

            match engine.account_round(&wire, &buddy.peer_id).await {
                Ok(outcome) => {
                    buddy.record_success();
                    made_progress |= outcome.accounts_imported > 0;
                }
                Err(err) => {
                    warn!(peer = %buddy.peer_id, error = %err, "account round failed");
                    buddy.record_error(&err, config.ban_after_failures, config.ban_duration);
                }
            }

            match engine.storage_full_round(&wire, &buddy.peer_id).await {
                Ok(outcome) => {
                    buddy.record_success();
                    made_progress |= outcome.slot_lists_imported > 0 || outcome.accounts_completed > 0;
                }
                Err(err) => {
                    warn!(peer = %buddy.peer_id, error = %err, "storage range round failed");
                    buddy.record_error(&err, config.ban_after_failures, config.ban_duration);
                }
            }

            match engine.storage_partial_round(&wire, &buddy.peer_id).await {
                Ok(outcome) => {
                    buddy.record_success();
                    made_progress |= outcome.slot_lists_imported > 0 || outcome.accounts_completed > 0;
                }
                Err(err) => {
                    warn!(peer = %buddy.peer_id, error = %err, "partial storage round failed");
                    buddy.record_error(&err, config.ban_after_failures, config.ban_duration);
                }
            }

            match engine.contract_round(&wire, &buddy.peer_id, &mut ignore_contracts).await {
                Ok(outcome) => {
                    buddy.record_success();
                    made_progress |= outcome.codes_imported > 0;
                }
                Err(err) => {
                    warn!(peer = %buddy.peer_id, error = %err, "contract round failed");
                    buddy.record_error(&err, config.ban_after_failures, config.ban_duration);
                }
            }
        }

        match engine.heal_accounts_round(&mut heal_source, &mut ignore_heal_accounts) {
            Ok(outcome) => made_progress |= outcome.nodes_fetched > 0,
            Err(err) => warn!(error = %err, "account healing round failed"),
        }

        rounds += 1;
        if rounds % SNAPSHOT_INTERVAL_ROUNDS == 0 {
            report_progress(&engine, rounds);
            persist_snapshot(&engine, store.as_ref())?;
        }

        if !made_progress {
            warn!(rounds, "a full pass made no progress; stopping rather than spinning");
            break;
        }
    }

    report_progress(&engine, rounds);
    persist_snapshot(&engine, store.as_ref())?;

    if engine.is_complete() {
        info!("snap sync complete");
    } else {
        info!("snap sync stopped before completion; snapshot saved for the next run");
    }

    Ok(())
}

fn report_progress<S: KvStore>(engine: &Engine<S>, rounds: u64) {
    let Some(handle) = engine.current() else { return };
    info!(
        rounds,
        accounts = handle.pivot.n_accounts,
        slot_lists = handle.pivot.n_slot_lists,
        contracts = handle.pivot.n_contracts,
        coverage = engine.covered_accounts().full_factor(),
        "sync progress",
    );
}

fn persist_snapshot<S: KvStore>(engine: &Engine<S>, store: &S) -> anyhow::Result<()> {
    let Some(handle) = engine.current() else { return Ok(()) };
    let processed = handle.pivot.fetch_accounts.processed.iter().map(|iv| (iv.start, iv.end)).collect();
    let snapshot = PivotSnapshot { state_root: handle.pivot.state_root, processed };
    snapshot.save(store)?;
    Ok(())
}

/// Mirrors `cmd/ethrex`'s `init_tracing`: an `EnvFilter` built from the CLI's
/// log-level default, layered onto a plain `fmt` subscriber.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

/// Mirrors `cmd/ethrex`'s `read_jwtsecret_file`/`write_jwtsecret_file`: reuse
/// whatever is on disk, otherwise generate 32 random bytes and persist them,
/// demonstrating the CLI/file boundary the (out-of-scope) authrpc surface needs.
fn read_or_generate_jwt_secret(path: &PathBuf) -> Vec<u8> {
    match std::fs::read_to_string(path) {
        Ok(hex_str) => hex::decode(hex_str.trim()).unwrap_or_else(|_| generate_and_write_jwt_secret(path)),
        Err(_) => generate_and_write_jwt_secret(path),
    }
}

fn generate_and_write_jwt_secret(path: &PathBuf) -> Vec<u8> {
    info!(path = %path.display(), "JWT secret not found, generating a new one");
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut secret = [0u8; 32];
    rng.fill(&mut secret);
    let encoded = hex::encode(secret);
    let _ = std::fs::write(path, &encoded);
    secret.to_vec()
}
