//! SIGUSR1-triggered leaderboard dump.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::logger::Logger;
use crate::scoreboard::Scoreboard;

/// Listens for SIGUSR1 for the rest of the process lifetime, dumping the
/// current top-5 leaderboard to `scores_log_path` on every delivery.
pub async fn run_dump_on_sigusr1(scoreboard: Arc<Scoreboard>, scores_log_path: PathBuf, log: Arc<Logger>) {
    let mut stream = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            log.warn(format!("failed to install SIGUSR1 handler: {e}"));
            return;
        }
    };

    loop {
        stream.recv().await;
        match scoreboard.dump(&scores_log_path) {
            Ok(()) => log.info(format!("leaderboard dumped to {}", scores_log_path.display())),
            Err(e) => log.warn(format!("leaderboard dump failed: {e}")),
        }
    }
}
