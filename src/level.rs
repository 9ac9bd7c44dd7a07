//! Level file loading.
//!
//! Out of scope of the wire protocol and concurrency engine, treated as an
//! external collaborator, interface only.
//!
//! A `.lvl` file is a minimal ASCII grid: `#` wall, `.` dot, `@` portal, `P`
//! pacman start, `G` ghost start, ` ` empty floor. Lines may be ragged; short
//! lines are padded with empty floor to the widest line in the file. This
//! format is a deliberately small stand-in for the real level parser the
//! spec scopes out — see `DESIGN.md`.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::board::{BoardInner, Cell, Ghost, Pacman};

pub const MAX_LEVELS: usize = 64;
const DEFAULT_TEMPO_MS: u32 = 200;
const GHOST_PASSO: u32 = 1;

/// Parses `path` into a fresh board, carrying `carry_points` into
/// `accumulated_points`: the initial `accumulated_points` of level k+1
/// equals the final value of level k.
pub fn load_level(path: &Path, carry_points: i64) -> Result<BoardInner> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading level file {}", path.display()))?;

    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        bail!("level file {} is empty", path.display());
    }
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) as i32;
    let height = lines.len() as i32;
    if width == 0 {
        bail!("level file {} has no columns", path.display());
    }

    let mut cells = vec![Cell::empty(); (width * height) as usize];
    let mut pacmans = Vec::new();
    let mut ghosts = Vec::new();

    for (y, line) in lines.iter().enumerate() {
        for x in 0..width as usize {
            let ch = line.as_bytes().get(x).copied().unwrap_or(b' ');
            let idx = y * width as usize + x;
            cells[idx] = match ch {
                b'#' => Cell::wall(),
                b'.' => Cell::floor(),
                b'@' => Cell::portal(),
                b'P' => {
                    pacmans.push(Pacman {
                        x: x as i32,
                        y: y as i32,
                        alive: true,
                        passo: 0,
                        moves: Vec::new(),
                        current_move: 0,
                    });
                    Cell::empty()
                }
                b'G' => {
                    ghosts.push(Ghost {
                        x: x as i32,
                        y: y as i32,
                        charged: false,
                        passo: GHOST_PASSO,
                        moves: Vec::new(),
                        current_move: 0,
                    });
                    Cell::empty()
                }
                _ => Cell::empty(),
            };
        }
    }

    if pacmans.is_empty() {
        bail!("level file {} has no pacman start ('P')", path.display());
    }

    Ok(BoardInner {
        width,
        height,
        tempo: DEFAULT_TEMPO_MS,
        cells,
        pacmans,
        ghosts,
        accumulated_points: carry_points,
        victory: false,
        game_over: false,
        level_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        stop: false,
    })
}

/// A no-op: Rust owns `BoardInner` by value, so there is no manual free to
/// perform. Kept as a named function so call sites mirror an explicit
/// "unload level" step.
pub fn unload_level(_board: BoardInner) {}

/// Every `*.lvl` file directly inside `levels_dir`, ascending byte-wise by
/// filename, capped at [`MAX_LEVELS`]. Case-sensitive suffix match, no
/// recursion.
pub fn list_level_files(levels_dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(levels_dir)
        .with_context(|| format!("reading levels directory {}", levels_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == "lvl").unwrap_or(false))
        .collect();
    files.sort();
    files.truncate(MAX_LEVELS);
    Ok(files)
}
