//! Wire protocol shared by the rendezvous pipe, the per-client request pipe,
//! and the per-client notification pipe.
//!
//! Every multi-byte integer is little-endian, pinned explicitly rather than
//! left as native/unaligned host order.

use std::fmt;

/// Every client pipe path the rendezvous handshake carries must fit here.
pub const MAX_PIPE_PATH_LENGTH: usize = 40;

pub const OP_CODE_CONNECT: u8 = 1;
pub const OP_CODE_PLAY: u8 = 2;
pub const OP_CODE_DISCONNECT: u8 = 3;
pub const OP_CODE_BOARD: u8 = 4;

/// `1 + 40 + 40` — opcode, NUL-padded request-pipe path, NUL-padded notif-pipe path.
pub const CONNECT_REQUEST_LEN: usize = 1 + MAX_PIPE_PATH_LENGTH + MAX_PIPE_PATH_LENGTH;

/// A connect request read from the rendezvous pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub request_pipe_path: String,
    pub notif_pipe_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    WrongLength(usize),
    BadOpcode(u8),
    NotUtf8,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::WrongLength(n) => {
                write!(f, "connect request was {n} bytes, expected {CONNECT_REQUEST_LEN}")
            }
            ConnectError::BadOpcode(op) => write!(f, "expected OP_CODE_CONNECT, got {op}"),
            ConnectError::NotUtf8 => write!(f, "pipe path was not valid UTF-8"),
        }
    }
}

impl std::error::Error for ConnectError {}

impl ConnectRequest {
    /// Decode a connect request. Framing contract: the caller must hand us
    /// exactly `CONNECT_REQUEST_LEN` bytes — anything else is a silent
    /// discard at the call site, surfaced here as an error variant
    /// so the registrar can log-and-continue.
    pub fn decode(buf: &[u8]) -> Result<Self, ConnectError> {
        if buf.len() != CONNECT_REQUEST_LEN {
            return Err(ConnectError::WrongLength(buf.len()));
        }
        if buf[0] != OP_CODE_CONNECT {
            return Err(ConnectError::BadOpcode(buf[0]));
        }
        let req = &buf[1..1 + MAX_PIPE_PATH_LENGTH];
        let notif = &buf[1 + MAX_PIPE_PATH_LENGTH..CONNECT_REQUEST_LEN];
        Ok(Self {
            request_pipe_path: decode_padded_path(req)?,
            notif_pipe_path: decode_padded_path(notif)?,
        })
    }

    pub fn encode(&self) -> [u8; CONNECT_REQUEST_LEN] {
        let mut buf = [0u8; CONNECT_REQUEST_LEN];
        buf[0] = OP_CODE_CONNECT;
        encode_padded_path(&self.request_pipe_path, &mut buf[1..1 + MAX_PIPE_PATH_LENGTH]);
        encode_padded_path(
            &self.notif_pipe_path,
            &mut buf[1 + MAX_PIPE_PATH_LENGTH..CONNECT_REQUEST_LEN],
        );
        buf
    }

    /// Parse the client id out of `request_pipe_path`, which must match
    /// `/tmp/<id>_request`.
    pub fn client_id(&self) -> Option<u32> {
        parse_client_id(&self.request_pipe_path)
    }
}

pub fn parse_client_id(request_pipe_path: &str) -> Option<u32> {
    let file_name = request_pipe_path.strip_prefix("/tmp/")?;
    let digits = file_name.strip_suffix("_request")?;
    digits.parse().ok()
}

fn decode_padded_path(field: &[u8]) -> Result<String, ConnectError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_string)
        .map_err(|_| ConnectError::NotUtf8)
}

fn encode_padded_path(path: &str, field: &mut [u8]) {
    let bytes = path.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    for b in &mut field[n..] {
        *b = 0;
    }
}

/// The two-byte connect response written back over the notif pipe.
pub struct ConnectResponse {
    pub status: u8,
}

impl ConnectResponse {
    pub const ACCEPTED: ConnectResponse = ConnectResponse { status: 0 };

    pub fn encode(&self) -> [u8; 2] {
        [OP_CODE_CONNECT, self.status]
    }
}

/// One `(opcode, payload)` record parsed out of a request-pipe read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Play(u8),
    Disconnect,
}

/// Parses a batch read from the request pipe into a sequence of
/// `(opcode, optional-payload)` records: walk the buffer
/// in pairs, `OP_CODE_PLAY` consumes a payload byte, `OP_CODE_DISCONNECT`
/// does not, and an unrecognised opcode terminates the walk for this read.
pub fn parse_client_messages(buf: &[u8]) -> Vec<ClientMessage> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            OP_CODE_PLAY => {
                let Some(&cmd) = buf.get(i + 1) else { break };
                out.push(ClientMessage::Play(cmd));
                i += 2;
            }
            OP_CODE_DISCONNECT => {
                out.push(ClientMessage::Disconnect);
                i += 1;
            }
            _ => break,
        }
    }
    out
}

/// Header fields of an `OP_CODE_BOARD` message, everything before the
/// rendered cell bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardHeader {
    pub width: i32,
    pub height: i32,
    pub tempo: i32,
    pub victory: bool,
    pub game_over: bool,
    pub accumulated_points: i32,
}

impl BoardHeader {
    pub const WIRE_LEN: usize = 1 + 4 * 6;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0] = OP_CODE_BOARD;
        let mut o = 1;
        for v in [
            self.width,
            self.height,
            self.tempo,
            self.victory as i32,
            self.game_over as i32,
            self.accumulated_points,
        ] {
            buf[o..o + 4].copy_from_slice(&v.to_le_bytes());
            o += 4;
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::WIRE_LEN || buf[0] != OP_CODE_BOARD {
            return None;
        }
        let read_i32 = |o: usize| i32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        Some(Self {
            width: read_i32(1),
            height: read_i32(5),
            tempo: read_i32(9),
            victory: read_i32(13) != 0,
            game_over: read_i32(17) != 0,
            accumulated_points: read_i32(21),
        })
    }
}

/// A full `OP_CODE_BOARD` message: header plus one rendered character per cell.
pub struct BoardMessage {
    pub header: BoardHeader,
    pub cells: Vec<u8>,
}

impl BoardMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BoardHeader::WIRE_LEN + self.cells.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.cells);
        buf
    }
}
