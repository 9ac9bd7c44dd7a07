use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tokio::sync::Semaphore;

use pactempo::config::Config;
use pactempo::logger::Logger;
use pactempo::queue::SessionQueue;
use pactempo::scoreboard::Scoreboard;
use pactempo::{registrar, signals, worker};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "server",
    version,
    about = "Multi-client arcade session server",
    long_about = "Listens on a well-known rendezvous FIFO for client connect requests, \
                  admits up to <max_games> concurrent sessions, and runs each through its \
                  own level set until victory, death, or disconnect."
)]
struct Args {
    /// Directory of `*.lvl` files, scanned fresh for every session
    levels_dir: PathBuf,

    /// Maximum number of sessions that may run concurrently
    max_games: usize,

    /// Path of the rendezvous FIFO clients connect through
    fifo_registo: PathBuf,

    /// Where the top-5 leaderboard is written on a dump signal
    /// (defaults to `scores.log` in the current working directory)
    #[arg(long)]
    scores_log: Option<PathBuf>,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log = Arc::new(Logger::new(args.verbose));

    let config =
        Arc::new(Config::new(args.levels_dir, args.max_games, args.fifo_registo, args.scores_log));
    log.info(format!(
        "Starting with levels_dir={}, max_games={}, fifo_registo={}, scores_log_path={}",
        config.levels_dir.display(),
        config.max_games,
        config.fifo_registo.display(),
        config.scores_log_path.display()
    ));

    let admission = Arc::new(Semaphore::new(config.max_games));
    let queue = Arc::new(SessionQueue::new());
    let scoreboard = Arc::new(Scoreboard::new());

    let worker_handles = worker::spawn_pool(
        config.max_games,
        Arc::clone(&queue),
        Arc::clone(&scoreboard),
        Arc::clone(&log),
    );

    tokio::spawn(signals::run_dump_on_sigusr1(
        Arc::clone(&scoreboard),
        config.scores_log_path.clone(),
        Arc::clone(&log),
    ));

    if let Err(e) = registrar::run(config, admission, queue, scoreboard, Arc::clone(&log)).await {
        log.warn(format!("registrar exited: {e:#}"));
    }

    for handle in worker_handles {
        handle.abort();
    }
}
