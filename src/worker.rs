//! Fixed-size worker pool: each worker loops forever, pulling one admitted
//! session off the queue and running it to completion before asking for the
//! next one.

use std::sync::Arc;

use crate::logger::Logger;
use crate::queue::SessionQueue;
use crate::scoreboard::Scoreboard;
use crate::session;

/// Spawns `count` worker tasks and returns their join handles. `count`
/// matches the admission semaphore's capacity, so every admitted session is
/// guaranteed a worker to run on without unbounded task growth.
pub fn spawn_pool(
    count: usize,
    queue: Arc<SessionQueue>,
    scoreboard: Arc<Scoreboard>,
    log: Arc<Logger>,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = Arc::clone(&queue);
            let scoreboard = Arc::clone(&scoreboard);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                loop {
                    let ctx = queue.dequeue().await;
                    let session_id = ctx.session_id;
                    log.verbose(format!("[worker {worker_id}] running session {session_id}"));
                    session::run_session(ctx, Arc::clone(&scoreboard), Arc::clone(&log)).await;
                    log.verbose(format!("[worker {worker_id}] session {session_id} finished"));
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionContext;
    use std::time::Duration;

    /// `for_test` sessions point at an invalid levels dir, so `run_session`
    /// returns almost immediately once dequeued. Enqueueing more than the
    /// ring's capacity only succeeds if the workers keep dequeuing and
    /// looping back rather than exiting after their first session.
    #[tokio::test]
    async fn pool_drains_queue_and_keeps_looping() {
        let queue = Arc::new(SessionQueue::new());
        let scoreboard = Arc::new(Scoreboard::new());
        let log = Arc::new(Logger::new(0));

        let handles = spawn_pool(2, Arc::clone(&queue), Arc::clone(&scoreboard), Arc::clone(&log));

        let total = crate::queue::BUFFER_SIZE + 10;
        tokio::time::timeout(Duration::from_secs(5), async {
            for id in 0..total as u32 {
                queue.enqueue(SessionContext::for_test(id).await).await;
            }
        })
        .await
        .expect("worker pool should keep draining the queue past its own capacity");

        for handle in handles {
            assert!(!handle.is_finished(), "workers should keep looping, not exit after one session");
            handle.abort();
        }
    }

    #[tokio::test]
    async fn spawn_pool_returns_requested_worker_count() {
        let queue = Arc::new(SessionQueue::new());
        let scoreboard = Arc::new(Scoreboard::new());
        let log = Arc::new(Logger::new(0));

        let handles = spawn_pool(4, queue, scoreboard, log);
        assert_eq!(handles.len(), 4);
        for handle in handles {
            handle.abort();
        }
    }
}
