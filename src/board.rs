//! Board state and the reader/writer discipline guarding it.
//!
//! `Board` wraps a single rwlock-guarded struct: the
//! mutable fields live in [`BoardInner`], reached only through
//! [`Board::read`]/[`Board::write`], which return `tokio::sync::RwLock`
//! guards. Every actor that needs a coherent view across fields (the
//! serializer) takes the read guard; every actor that mutates (pacman
//! ticker, ghost tickers, the dispatch loop's termination logic) takes the
//! write guard for the whole step it performs.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::protocol::BoardHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub wall: bool,
    pub has_dot: bool,
    pub has_portal: bool,
}

impl Cell {
    pub fn floor() -> Self {
        Self { wall: false, has_dot: true, has_portal: false }
    }

    pub fn wall() -> Self {
        Self { wall: true, has_dot: false, has_portal: false }
    }

    pub fn portal() -> Self {
        Self { wall: false, has_dot: false, has_portal: true }
    }

    pub fn empty() -> Self {
        Self { wall: false, has_dot: false, has_portal: false }
    }
}

#[derive(Debug, Clone)]
pub struct Pacman {
    pub x: i32,
    pub y: i32,
    pub alive: bool,
    /// Step modifier: effective actor period is `tempo * (1 + passo)`.
    pub passo: u32,
    /// A pre-recorded move list, if any (`n_moves() > 0` means "driven by
    /// script, not by client input").
    pub moves: Vec<u8>,
    pub current_move: usize,
}

impl Pacman {
    pub fn n_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn next_scripted_move(&mut self) -> u8 {
        let n = self.n_moves();
        let mv = self.moves[self.current_move % n];
        self.current_move += 1;
        mv
    }
}

#[derive(Debug, Clone)]
pub struct Ghost {
    pub x: i32,
    pub y: i32,
    /// A ghost in its transient aggressive state renders `'G'`; otherwise `'M'`.
    pub charged: bool,
    pub passo: u32,
    pub moves: Vec<u8>,
    pub current_move: usize,
}

impl Ghost {
    pub fn n_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn next_scripted_move(&mut self) -> u8 {
        let n = self.n_moves();
        if n == 0 {
            return 0;
        }
        let mv = self.moves[self.current_move % n];
        self.current_move += 1;
        mv
    }
}

/// Fields mutated under the write lock, read coherently under the read lock.
pub struct BoardInner {
    pub width: i32,
    pub height: i32,
    pub tempo: u32,
    pub cells: Vec<Cell>,
    pub pacmans: Vec<Pacman>,
    pub ghosts: Vec<Ghost>,
    pub accumulated_points: i64,
    /// Monotonic within a level: once true, never cleared until the next
    /// level begins (a fresh `BoardInner` is built for each level).
    pub victory: bool,
    pub game_over: bool,
    pub level_name: String,
    /// Session-runtime termination flag. Co-located with the board (rather
    /// than behind its own lock) so actors can test it "under the same
    /// lock" they already hold at the top of each iteration
    /// Cancellation), with no separate lock acquisition or ordering to
    /// reason about.
    pub stop: bool,
}

impl BoardInner {
    pub fn cell_index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn cell(&self, x: i32, y: i32) -> Option<&Cell> {
        self.cell_index(x, y).map(|i| &self.cells[i])
    }

    pub fn dots_remaining(&self) -> usize {
        self.cells.iter().filter(|c| c.has_dot).count()
    }

    pub fn n_ghosts(&self) -> usize {
        self.ghosts.len()
    }

    /// `accumulated_points` only ever grows within a level.
    pub fn credit_points(&mut self, amount: i64) {
        debug_assert!(amount >= 0, "points must be credited, never debited");
        self.accumulated_points += amount.max(0);
    }

    pub fn set_victory(&mut self) {
        self.victory = true;
    }

    pub fn set_game_over(&mut self) {
        self.game_over = true;
    }

    /// Rendering priority: charged ghost > plain
    /// ghost > live pacman > wall > portal > dot > empty.
    pub fn render_cells(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.cells.len()];
        for (i, cell) in self.cells.iter().enumerate() {
            out[i] = if cell.wall {
                b'#'
            } else if cell.has_portal {
                b'@'
            } else if cell.has_dot {
                b'.'
            } else {
                b' '
            };
        }
        for pacman in &self.pacmans {
            if pacman.alive && let Some(i) = self.cell_index(pacman.x, pacman.y) {
                out[i] = b'C';
            }
        }
        for ghost in &self.ghosts {
            if let Some(i) = self.cell_index(ghost.x, ghost.y) {
                out[i] = if ghost.charged { b'G' } else { b'M' };
            }
        }
        out
    }

    pub fn header(&self) -> BoardHeader {
        BoardHeader {
            width: self.width,
            height: self.height,
            tempo: self.tempo as i32,
            victory: self.victory,
            game_over: self.game_over,
            accumulated_points: self.accumulated_points as i32,
        }
    }
}

/// A board, exclusively owned by one session, guarded by a
/// single reader/writer lock.
pub struct Board {
    state_lock: RwLock<BoardInner>,
}

impl Board {
    pub fn new(inner: BoardInner) -> Self {
        Self { state_lock: RwLock::new(inner) }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, BoardInner> {
        self.state_lock.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, BoardInner> {
        self.state_lock.write().await
    }

    /// Unwraps the lock, consuming `self`. Used once all actor tasks
    /// touching this board have been joined.
    pub fn into_inner(self) -> BoardInner {
        self.state_lock.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_board() -> BoardInner {
        BoardInner {
            width: 3,
            height: 1,
            tempo: 100,
            cells: vec![Cell::floor(), Cell::wall(), Cell::portal()],
            pacmans: vec![Pacman { x: 0, y: 0, alive: true, passo: 0, moves: vec![], current_move: 0 }],
            ghosts: vec![Ghost { x: 2, y: 0, charged: false, passo: 0, moves: vec![], current_move: 0 }],
            accumulated_points: 0,
            victory: false,
            game_over: false,
            level_name: "test".to_string(),
            stop: false,
        }
    }

    #[test]
    fn rendering_priority_ghost_beats_pacman_beats_static() {
        let mut b = tiny_board();
        b.ghosts[0].x = 0; // stand on the pacman
        b.ghosts[0].charged = true;
        let rendered = b.render_cells();
        assert_eq!(rendered[0], b'G');
        assert_eq!(rendered[1], b'#');
        // ghost no longer at 2,0; portal tile shows through
        assert_eq!(rendered[2], b'@');
    }

    #[test]
    fn uncharged_ghost_renders_m() {
        let b = tiny_board();
        let rendered = b.render_cells();
        assert_eq!(rendered[2], b'M');
        assert_eq!(rendered[0], b'C');
    }

    #[test]
    fn credit_points_is_monotonic() {
        let mut b = tiny_board();
        b.credit_points(5);
        b.credit_points(3);
        assert_eq!(b.accumulated_points, 8);
    }

    #[tokio::test]
    async fn board_write_guard_is_exclusive_with_reads() {
        let board = Board::new(tiny_board());
        {
            let mut w = board.write().await;
            w.credit_points(10);
        }
        let r = board.read().await;
        assert_eq!(r.accumulated_points, 10);
    }
}
