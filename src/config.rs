//! Process configuration assembled once at startup from CLI arguments.

use std::path::PathBuf;

/// Everything the registrar, the worker pool, and the signal handler need,
/// gathered in one place so `main` builds it once and hands out `Arc`s.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for `*.lvl` files, one session at a time.
    pub levels_dir: PathBuf,
    /// Size of the worker pool; also the number of admission permits.
    pub max_games: usize,
    /// Path of the well-known rendezvous FIFO clients connect through.
    pub fifo_registo: PathBuf,
    /// Where the top-5 leaderboard is written on a dump signal.
    pub scores_log_path: PathBuf,
}

impl Config {
    /// `scores_log_override` is the `--scores-log` CLI flag; when absent,
    /// `scores_log_path` defaults to `scores.log` in the current working
    /// directory, not anywhere derived from `fifo_registo`.
    pub fn new(
        levels_dir: PathBuf,
        max_games: usize,
        fifo_registo: PathBuf,
        scores_log_override: Option<PathBuf>,
    ) -> Self {
        let scores_log_path = scores_log_override.unwrap_or_else(|| PathBuf::from("scores.log"));
        Self { levels_dir, max_games: max_games.max(1), fifo_registo, scores_log_path }
    }
}
