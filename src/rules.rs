//! Movement rules: `move_pacman`/`move_ghost`.
//!
//! These are deliberately out of scope of the wire protocol and concurrency
//! engine — named as external collaborators the session engine calls through
//! a narrow interface. This module is that interface's minimal concrete
//! backer: simple enough to exercise the concurrency engine end to end, not
//! a complete pacman ruleset. See `DESIGN.md`.

use rand::Rng;

use crate::board::BoardInner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Continue,
    ReachedPortal,
    DeadPacman,
}

fn direction(command: u8) -> Option<(i32, i32)> {
    match command.to_ascii_uppercase() {
        b'W' => Some((0, -1)),
        b'S' => Some((0, 1)),
        b'A' => Some((-1, 0)),
        b'D' => Some((1, 0)),
        _ => None,
    }
}

const POINTS_PER_DOT: i64 = 10;

/// Moves `board.pacmans[index]` one cell per `command` (`W`/`A`/`S`/`D`).
/// Wall moves are rejected in place (no outcome change). Landing on a dot
/// consumes it and credits `POINTS_PER_DOT`. Landing on the portal yields
/// [`MoveOutcome::ReachedPortal`]; landing on a ghost's cell yields
/// [`MoveOutcome::DeadPacman`].
pub fn move_pacman(board: &mut BoardInner, index: usize, command: u8) -> MoveOutcome {
    let Some((dx, dy)) = direction(command) else {
        return MoveOutcome::Continue;
    };
    let (x, y) = (board.pacmans[index].x, board.pacmans[index].y);
    let (nx, ny) = (x + dx, y + dy);

    let Some(cell) = board.cell(nx, ny).copied() else {
        return MoveOutcome::Continue;
    };
    if cell.wall {
        return MoveOutcome::Continue;
    }

    if board.ghosts.iter().any(|g| g.x == nx && g.y == ny) {
        board.pacmans[index].alive = false;
        return MoveOutcome::DeadPacman;
    }

    board.pacmans[index].x = nx;
    board.pacmans[index].y = ny;

    let portal = cell.has_portal;
    let had_dot = cell.has_dot;
    if let Some(i) = board.cell_index(nx, ny) {
        board.cells[i].has_dot = false;
    }
    if had_dot {
        board.credit_points(POINTS_PER_DOT);
    }
    if portal {
        return MoveOutcome::ReachedPortal;
    }
    MoveOutcome::Continue
}

/// Moves `board.ghosts[index]` per its scripted move list if it has one;
/// otherwise steps one cell toward the nearest live pacman, sidestepping
/// randomly when blocked by a wall. Reports [`MoveOutcome::DeadPacman`] on
/// colliding with a live pacman.
pub fn move_ghost(board: &mut BoardInner, index: usize, command: u8, rng: &mut impl Rng) -> MoveOutcome {
    let (dx, dy) = direction(command).unwrap_or_else(|| chase_direction(board, index, rng));
    let (x, y) = (board.ghosts[index].x, board.ghosts[index].y);
    let (nx, ny) = (x + dx, y + dy);

    let Some(cell) = board.cell(nx, ny) else {
        return MoveOutcome::Continue;
    };
    if cell.wall {
        return MoveOutcome::Continue;
    }

    board.ghosts[index].x = nx;
    board.ghosts[index].y = ny;

    if let Some(p) = board.pacmans.iter_mut().find(|p| p.alive && p.x == nx && p.y == ny) {
        p.alive = false;
        return MoveOutcome::DeadPacman;
    }
    MoveOutcome::Continue
}

fn chase_direction(board: &BoardInner, index: usize, rng: &mut impl Rng) -> (i32, i32) {
    let ghost = &board.ghosts[index];
    let target = board.pacmans.iter().find(|p| p.alive);
    let candidates: [(i32, i32); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

    let Some(target) = target else {
        let i = rng.random_range(0..candidates.len());
        return candidates[i];
    };

    let mut best = candidates[rng.random_range(0..candidates.len())];
    let mut best_dist = i64::MAX;
    for &(dx, dy) in &candidates {
        let (nx, ny) = (ghost.x + dx, ghost.y + dy);
        if board.cell(nx, ny).map(|c| c.wall).unwrap_or(true) {
            continue;
        }
        let dist = ((nx - target.x) as i64).pow(2) + ((ny - target.y) as i64).pow(2);
        if dist < best_dist {
            best_dist = dist;
            best = (dx, dy);
        }
    }
    best
}
