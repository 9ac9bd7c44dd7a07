//! Bounded session queue: a fixed-capacity ring buffer of pending
//! sessions, paced by two counting semaphores exactly as specified —
//! `empty` starts full (capacity permits to produce), `full` starts empty
//! (no permits to consume until something is enqueued) — with a mutex
//! guarding the `in`/`out` cursors.
//!
//! FIFO between producers (there is only ever one: the registrar) and FIFO
//! delivery to consumers (any idle worker may win).

use std::sync::Mutex;

use tokio::sync::Semaphore;

use crate::session::SessionContext;

pub const BUFFER_SIZE: usize = 25;

struct Ring {
    slots: Vec<Option<SessionContext>>,
    head: usize, // next slot to dequeue from
    tail: usize, // next slot to enqueue into
}

pub struct SessionQueue {
    ring: Mutex<Ring>,
    empty: Semaphore,
    full: Semaphore,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                slots: (0..BUFFER_SIZE).map(|_| None).collect(),
                head: 0,
                tail: 0,
            }),
            empty: Semaphore::new(BUFFER_SIZE),
            full: Semaphore::new(0),
        }
    }

    /// Blocks until a slot is free, then publishes `session`.
    pub async fn enqueue(&self, session: SessionContext) {
        let permit = self.empty.acquire().await.expect("empty semaphore never closes");
        permit.forget();
        {
            let mut ring = self.ring.lock().unwrap();
            let tail = ring.tail;
            ring.slots[tail] = Some(session);
            ring.tail = (tail + 1) % BUFFER_SIZE;
        }
        self.full.add_permits(1);
    }

    /// Blocks until a session is available, then removes and returns it.
    pub async fn dequeue(&self) -> SessionContext {
        let permit = self.full.acquire().await.expect("full semaphore never closes");
        permit.forget();
        let session = {
            let mut ring = self.ring.lock().unwrap();
            let head = ring.head;
            let session = ring.slots[head].take().expect("full permit implies a filled slot");
            ring.head = (head + 1) % BUFFER_SIZE;
            session
        };
        self.empty.add_permits(1);
        session
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionContext;
    use std::sync::Arc;

    async fn dummy_session(id: u32) -> SessionContext {
        SessionContext::for_test(id).await
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = SessionQueue::new();
        q.enqueue(dummy_session(1).await).await;
        q.enqueue(dummy_session(2).await).await;
        q.enqueue(dummy_session(3).await).await;

        assert_eq!(q.dequeue().await.session_id, 1);
        assert_eq!(q.dequeue().await.session_id, 2);
        assert_eq!(q.dequeue().await.session_id, 3);
    }

    #[tokio::test]
    async fn dequeue_blocks_until_enqueue() {
        let q = Arc::new(SessionQueue::new());
        let q2 = Arc::clone(&q);
        let handle = tokio::spawn(async move { q2.dequeue().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        q.enqueue(dummy_session(42).await).await;
        let session = handle.await.unwrap();
        assert_eq!(session.session_id, 42);
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let q = Arc::new(SessionQueue::new());
        for i in 0..BUFFER_SIZE {
            q.enqueue(dummy_session(i as u32).await).await;
        }
        let q2 = Arc::clone(&q);
        let handle = tokio::spawn(async move { q2.enqueue(dummy_session(999).await).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "enqueue should block when the ring is full");

        q.dequeue().await;
        handle.await.unwrap();
    }
}
