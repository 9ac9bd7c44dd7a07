//! Per-session orchestration: the level loop, the input reader/dispatcher,
//! and termination.
//!
//! A [`SessionContext`] is created by the registrar and handed to a worker
//! through the [`crate::queue::SessionQueue`]; the worker runs it to
//! completion and then drops it, which is also when the admission permit
//! (held for the session's whole lifetime) is returned to the pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tokio::sync::Mutex as AsyncMutex;

use crate::board::{Board, BoardInner};
use crate::level;
use crate::logger::Logger;
use crate::protocol::{self, BoardMessage, ClientMessage};
use crate::scoreboard::Scoreboard;

/// One client's pipe endpoints plus everything the worker needs to run its
/// game to completion. Destroyed (dropped) when the worker's call to
/// [`run_session`] returns.
pub struct SessionContext {
    pub session_id: u32,
    pub levels_dir: PathBuf,
    request_pipe: pipe::Receiver,
    notif_pipe: pipe::Sender,
    /// Held for the whole session lifetime; dropping it returns the slot to
    /// the admission semaphore.
    _admission_permit: tokio::sync::OwnedSemaphorePermit,
}

impl SessionContext {
    pub fn new(
        session_id: u32,
        levels_dir: PathBuf,
        request_pipe: pipe::Receiver,
        notif_pipe: pipe::Sender,
        admission_permit: tokio::sync::OwnedSemaphorePermit,
    ) -> Self {
        Self { session_id, levels_dir, request_pipe, notif_pipe, _admission_permit: admission_permit }
    }

    #[cfg(test)]
    pub async fn for_test(session_id: u32) -> Self {
        let dir = Box::leak(Box::new(tempfile::tempdir().unwrap()));
        let req_path = dir.path().join("req");
        let notif_path = dir.path().join("notif");
        crate::pipes::create_fifo(&req_path).unwrap();
        crate::pipes::create_fifo(&notif_path).unwrap();
        // Keep both ends open ourselves so neither side ever observes EOF.
        let request_pipe = crate::pipes::open_receiver(&req_path).await.unwrap();
        let _req_writer = Box::leak(Box::new(crate::pipes::open_sender(&req_path).await.unwrap()));
        let _notif_reader = Box::leak(Box::new(crate::pipes::open_receiver(&notif_path).await.unwrap()));
        let notif_pipe = crate::pipes::open_sender(&notif_path).await.unwrap();

        let semaphore = Arc::new(tokio::sync::Semaphore::new(1));
        let permit = semaphore.try_acquire_owned().unwrap();
        Self {
            session_id,
            levels_dir: PathBuf::new(),
            request_pipe,
            notif_pipe,
            _admission_permit: permit,
        }
    }
}

/// Runs every `.lvl` file in `ctx.levels_dir` to completion, updating
/// `scoreboard` every tick and cleaning the client out of it on exit.
pub async fn run_session(mut ctx: SessionContext, scoreboard: Arc<Scoreboard>, log: Arc<Logger>) {
    let levels = match level::list_level_files(&ctx.levels_dir) {
        Ok(levels) if !levels.is_empty() => levels,
        Ok(_) => {
            log.warn(format!("[session {}] no levels found, ending session", ctx.session_id));
            scoreboard.remove(ctx.session_id);
            return;
        }
        Err(e) => {
            log.warn(format!("[session {}] failed to list levels: {e:#}", ctx.session_id));
            scoreboard.remove(ctx.session_id);
            return;
        }
    };

    let mut carry_points: i64 = 0;

    for (level_index, level_path) in levels.iter().enumerate() {
        let is_final_level = level_index + 1 == levels.len();

        let inner = match level::load_level(level_path, carry_points) {
            Ok(inner) => inner,
            Err(e) => {
                log.warn(format!(
                    "[session {}] failed to load {}: {e:#}",
                    ctx.session_id,
                    level_path.display()
                ));
                break;
            }
        };

        let outcome = run_level(&mut ctx, inner, &scoreboard, &log).await;
        carry_points = outcome.final_points;

        let transitioning = !is_final_level && outcome.victory;
        if is_final_level || !outcome.victory {
            let _ = send_final_board(&mut ctx, outcome.final_points, true).await;
        } else if transitioning {
            let _ = send_final_board(&mut ctx, outcome.final_points, false).await;
        }

        level::unload_level(outcome.board);

        if !transitioning {
            break;
        }
    }

    scoreboard.remove(ctx.session_id);
}

struct LevelOutcome {
    victory: bool,
    final_points: i64,
    board: BoardInner,
}

/// One level: spawns the pacman/ghost actors, runs the dispatch loop to
/// completion, joins the actors, and reports the outcome.
async fn run_level(
    ctx: &mut SessionContext,
    inner: BoardInner,
    scoreboard: &Arc<Scoreboard>,
    log: &Arc<Logger>,
) -> LevelOutcome {
    let n_ghosts = inner.n_ghosts();
    let board = Arc::new(Board::new(inner));
    let pending_cmd = Arc::new(AsyncMutex::new(0u8));

    let pacman_handle = tokio::spawn(crate::actors::pacman_actor(Arc::clone(&board), Arc::clone(&pending_cmd)));
    let ghost_handles: Vec<_> = (0..n_ghosts)
        .map(|i| {
            let rng = SmallRng::from_rng(&mut rand::rng());
            tokio::spawn(crate::actors::ghost_actor(Arc::clone(&board), i, rng))
        })
        .collect();

    dispatch_loop(ctx, &board, &pending_cmd, scoreboard, log).await;

    {
        let mut w = board.write().await;
        w.stop = true;
    }
    let _ = pacman_handle.await;
    for h in ghost_handles {
        let _ = h.await;
    }

    let board = Arc::try_unwrap(board).unwrap_or_else(|_| unreachable!("actors already joined")).into_inner();
    LevelOutcome { victory: board.victory, final_points: board.accumulated_points, board }
}

/// The per-tick read-inputs/snapshot-and-send loop.
async fn dispatch_loop(
    ctx: &mut SessionContext,
    board: &Arc<Board>,
    pending_cmd: &Arc<AsyncMutex<u8>>,
    scoreboard: &Arc<Scoreboard>,
    log: &Arc<Logger>,
) {
    let mut read_buf = [0u8; 32];

    loop {
        // (a) Read up to 32 bytes from the request pipe, non-blocking. No
        // board lock is held across this read.
        match ctx.request_pipe.try_read(&mut read_buf) {
            Ok(0) => {
                let mut w = board.write().await;
                w.set_game_over();
                w.stop = true;
            }
            Ok(n) => {
                for msg in protocol::parse_client_messages(&read_buf[..n]) {
                    match msg {
                        ClientMessage::Play(payload) => {
                            let mut slot = pending_cmd.lock().await;
                            *slot = payload.to_ascii_uppercase();
                        }
                        ClientMessage::Disconnect => {
                            let mut w = board.write().await;
                            w.set_game_over();
                            w.stop = true;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No input this tick.
            }
            Err(e) => {
                log.warn(format!("[session {}] request pipe read error: {e}", ctx.session_id));
            }
        }

        // (b) Under the read lock, snapshot and serialize the board to the
        // notif pipe in one write call.
        let (points, should_stop, tempo_ms, write_result) = {
            let r = board.read().await;
            let message = BoardMessage { header: r.header(), cells: r.render_cells() };
            let result = ctx.notif_pipe.write_all(&message.encode()).await;
            (r.accumulated_points, r.victory || r.game_over, r.tempo, result)
        };

        if let Err(e) = write_result {
            if !is_broken_pipe(&e) {
                log.warn(format!("[session {}] notif pipe write error: {e}", ctx.session_id));
            }
            let mut w = board.write().await;
            w.stop = true;
            return;
        }

        // (c) Update the scoreboard with the snapshot just sent.
        scoreboard.update(ctx.session_id, points);

        // (d) Stop once victory or game_over has been observed.
        if should_stop {
            let mut w = board.write().await;
            w.stop = true;
            return;
        }

        // (e) Pace the next tick by the level's tempo.
        tokio::time::sleep(Duration::from_millis(tempo_ms as u64)).await;
    }
}

fn is_broken_pipe(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::BrokenPipe
}

/// Final board update after a level ends: `game_over=1` if
/// this was the final level or the outcome was a death; `game_over=0` if a
/// non-final level was cleared (signalling transition to the next level). A
/// broken pipe here is not fatal (the session is already ending).
async fn send_final_board(ctx: &mut SessionContext, points: i64, game_over: bool) -> std::io::Result<()> {
    let message = BoardMessage {
        header: protocol::BoardHeader {
            width: 0,
            height: 0,
            tempo: 0,
            victory: !game_over,
            game_over,
            accumulated_points: points as i32,
        },
        cells: Vec::new(),
    };
    ctx.notif_pipe.write_all(&message.encode()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn write_level(dir: &tempfile::TempDir, name: &str, text: &str) {
        std::fs::write(dir.path().join(name), text).unwrap();
    }

    /// End-to-end scenario: a session plays one level
    /// with a single dot and a portal, then disconnects, and the final
    /// board shows `game_over=1`.
    #[tokio::test]
    async fn session_sends_boards_then_final_game_over_on_disconnect() {
        let levels_dir = tempfile::tempdir().unwrap();
        write_level(&levels_dir, "01.lvl", "###\n#P#\n###\n").await;

        let req_dir = tempfile::tempdir().unwrap();
        let req_path = req_dir.path().join("req");
        let notif_path = req_dir.path().join("notif");
        crate::pipes::create_fifo(&req_path).unwrap();
        crate::pipes::create_fifo(&notif_path).unwrap();

        let request_pipe = crate::pipes::open_receiver(&req_path).await.unwrap();
        let mut client_req_writer = crate::pipes::open_sender(&req_path).await.unwrap();
        let mut client_notif_reader = crate::pipes::open_receiver(&notif_path).await.unwrap();
        let notif_pipe = crate::pipes::open_sender(&notif_path).await.unwrap();

        let semaphore = Arc::new(tokio::sync::Semaphore::new(1));
        let permit = semaphore.try_acquire_owned().unwrap();
        let ctx = SessionContext::new(7, levels_dir.path().to_path_buf(), request_pipe, notif_pipe, permit);

        let scoreboard = Arc::new(Scoreboard::new());
        scoreboard.add(7);
        let log = Arc::new(Logger::new(0));

        let session = tokio::spawn(run_session(ctx, Arc::clone(&scoreboard), log));

        // First board update for level 1.
        let mut header = [0u8; protocol::BoardHeader::WIRE_LEN];
        client_notif_reader.read_exact(&mut header).await.unwrap();
        let decoded = protocol::BoardHeader::decode(&header).unwrap();
        assert_eq!(decoded.width, 3);
        assert_eq!(decoded.height, 3);
        assert!(!decoded.game_over);
        let mut cells = vec![0u8; 9];
        client_notif_reader.read_exact(&mut cells).await.unwrap();

        // Disconnect.
        use protocol::OP_CODE_DISCONNECT;
        use tokio::io::AsyncWriteExt as _;
        client_req_writer.write_all(&[OP_CODE_DISCONNECT]).await.unwrap();

        // Final board: game_over=1.
        let mut final_header = [0u8; protocol::BoardHeader::WIRE_LEN];
        loop {
            client_notif_reader.read_exact(&mut final_header).await.unwrap();
            let decoded = protocol::BoardHeader::decode(&final_header).unwrap();
            if decoded.width == 0 {
                assert!(decoded.game_over);
                break;
            }
            let mut cells = vec![0u8; (decoded.width * decoded.height) as usize];
            client_notif_reader.read_exact(&mut cells).await.unwrap();
        }

        session.await.unwrap();
        assert_eq!(scoreboard.current_points(7), None, "session cleans itself out of the scoreboard");
    }
}
