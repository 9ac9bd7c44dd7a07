//! Process-wide client→points map and top-5 peak-score leaderboard.
//!
//! A single [`std::sync::Mutex`] serializes every operation, including the
//! signal-triggered `dump`. The mutex is never held across an `.await`, so
//! it is safe for the dump to run synchronously inside the signal task
//! (the signal handler acquires the scoreboard mutex and writes the
//! file synchronously").

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

pub const MAX_CLIENTS: usize = 25;
const TOP_N: usize = 5;

/// One slot of the top-5 array. `id == 0` marks an empty placeholder, per
/// zero entries are placeholders with id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestRecord {
    pub id: u32,
    pub points: i64,
}

impl BestRecord {
    const EMPTY: BestRecord = BestRecord { id: 0, points: 0 };

    fn is_empty(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for BestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client {}: {} points", self.id, self.points)
    }
}

struct Inner {
    clients: HashMap<u32, i64>,
    best: [BestRecord; TOP_N],
}

pub struct Scoreboard {
    inner: Mutex<Inner>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                clients: HashMap::with_capacity(MAX_CLIENTS),
                best: [BestRecord::EMPTY; TOP_N],
            }),
        }
    }

    /// Idempotent: resets the client's current score to 0 whether or not a
    /// record already existed.
    pub fn add(&self, id: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.clients.insert(id, 0);
    }

    pub fn remove(&self, id: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.clients.remove(&id);
    }

    /// Sets the client's current score and, if it is a new peak, updates and
    /// re-sorts the top-5.
    pub fn update(&self, id: u32, pts: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.clients.insert(id, pts);

        if pts <= 0 {
            return;
        }

        if let Some(slot) = inner.best.iter_mut().find(|b| b.id == id) {
            if pts > slot.points {
                slot.points = pts;
            } else {
                return;
            }
        } else {
            // Insert at the first cell where `pts > cell.points` or the cell
            // is an empty placeholder, shifting lower entries down.
            let insert_at = inner
                .best
                .iter()
                .position(|b| b.is_empty() || pts > b.points);
            let Some(at) = insert_at else { return };
            for i in (at + 1..TOP_N).rev() {
                inner.best[i] = inner.best[i - 1];
            }
            inner.best[at] = BestRecord { id, points: pts };
        }

        // Stable sort: ties keep earlier insertion order. Placeholders
        // (points == 0) always sort last since every real entry has
        // points > 0 by this point.
        inner.best.sort_by_key(|b| std::cmp::Reverse(b.points));
    }

    pub fn current_points(&self, id: u32) -> Option<i64> {
        self.inner.lock().unwrap().clients.get(&id).copied()
    }

    pub fn active_client_count(&self) -> usize {
        self.inner.lock().unwrap().clients.len()
    }

    pub fn top5(&self) -> [BestRecord; TOP_N] {
        self.inner.lock().unwrap().best
    }

    /// Header line + one line per non-empty top-5 entry, exactly as written
    /// to `scores.log` by `dump`.
    pub fn render(&self) -> String {
        let best = self.top5();
        let mut out = String::from("=== TOP 5 CLIENTS ===\n");
        for record in best.iter().filter(|b| !b.is_empty()) {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }

    /// Overwrites `path` with the current top-5 rendering. Invoked by the
    /// signal handler; idempotent when called twice with no
    /// intervening `update` (testable property 8).
    pub fn dump(&self, path: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(path, self.render())
    }
}

impl Default for Scoreboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_resets_score() {
        let sb = Scoreboard::new();
        sb.add(1);
        sb.update(1, 50);
        sb.add(1);
        assert_eq!(sb.current_points(1), Some(0));
        // Peak score in top-5 is unaffected by re-adding.
        assert_eq!(sb.top5()[0], BestRecord { id: 1, points: 50 });
    }

    #[test]
    fn top5_sorted_descending_size_capped() {
        let sb = Scoreboard::new();
        for (id, pts) in [(1, 10), (2, 50), (3, 20), (4, 5), (5, 40), (6, 1)] {
            sb.add(id);
            sb.update(id, pts);
        }
        let top = sb.top5();
        let points: Vec<i64> = top.iter().map(|b| b.points).collect();
        assert_eq!(points, vec![50, 40, 20, 10, 5]);
        assert!(top.iter().filter(|b| !b.is_empty()).count() <= 5);
    }

    #[test]
    fn duplicate_ids_never_appear_twice_in_top5() {
        let sb = Scoreboard::new();
        sb.add(1);
        sb.update(1, 10);
        sb.update(1, 90);
        sb.update(1, 5); // lower than peak, must not regress the peak
        let top = sb.top5();
        let occurrences = top.iter().filter(|b| b.id == 1).count();
        assert_eq!(occurrences, 1);
        assert_eq!(top[0], BestRecord { id: 1, points: 90 });
    }

    #[test]
    fn non_positive_initial_scores_do_not_create_top5_entry() {
        let sb = Scoreboard::new();
        sb.add(9);
        sb.update(9, 0);
        sb.update(9, -3);
        assert!(sb.top5().iter().all(|b| b.id != 9));
    }

    #[test]
    fn dump_is_idempotent_s4_leaderboard_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.log");
        let sb = Scoreboard::new();
        for (id, pts) in [(10, 10), (20, 50), (30, 20)] {
            sb.add(id);
            sb.update(id, pts);
            sb.remove(id);
        }
        sb.dump(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        sb.dump(&path).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "=== TOP 5 CLIENTS ===");
        assert_eq!(lines[1], "Client 20: 50 points");
        assert_eq!(lines[2], "Client 30: 20 points");
        assert_eq!(lines[3], "Client 10: 10 points");
    }
}
