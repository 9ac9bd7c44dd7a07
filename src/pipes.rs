//! Named-pipe (FIFO) plumbing shared by the registrar and the session
//! runtime.
//!
//! `tokio::net::unix::pipe` gives us non-blocking FIFO halves directly —
//! the async equivalent of the original's manual `O_NONBLOCK` opens — so
//! the only piece this module adds on top is FIFO *creation*, which tokio
//! does not do for you. `nix::unistd::mkfifo` covers that: mode
//! 0666, unlinking any stale file first.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use tokio::net::unix::pipe;

const ENXIO_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Creates a FIFO at `path` with mode 0666, removing any stale file first.
/// Idempotent with respect to a previous crashed run leaving the path
/// behind.
pub fn create_fifo(path: &Path) -> Result<()> {
    let _ = std::fs::remove_file(path);
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666))
        .with_context(|| format!("mkfifo {}", path.display()))?;
    Ok(())
}

pub async fn open_receiver(path: &Path) -> std::io::Result<pipe::Receiver> {
    pipe::OpenOptions::new().open_receiver(path)
}

/// Opens the writing end of a FIFO. A `Sender` open fails with `ENXIO` if no
/// reader has opened the file yet; per `OpenOptions::open_sender`'s own
/// documented pattern, that error is expected and transient, so we sleep and
/// retry until the peer's reader shows up instead of surfacing it.
pub async fn open_sender(path: &Path) -> std::io::Result<pipe::Sender> {
    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(tx) => return Ok(tx),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                tokio::time::sleep(ENXIO_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Opens both a receiver and a sender on the same FIFO path. Used for the
/// rendezvous pipe so the server end never sees EOF when all clients close
/// their writer end. The POSIX `O_RDWR` idiom doesn't exist for named pipes
/// opened through `tokio::net::unix::pipe`, so we reproduce the same effect
/// by holding our own sender open for the process lifetime.
pub async fn open_receiver_with_keepalive_writer(
    path: &Path,
) -> std::io::Result<(pipe::Receiver, pipe::Sender)> {
    let receiver = open_receiver(path).await?;
    let sender = open_sender(path).await?;
    Ok((receiver, sender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rendezvous_pipe_never_sees_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registo");
        create_fifo(&path).unwrap();

        let (mut rx, _keepalive_tx) = open_receiver_with_keepalive_writer(&path).await.unwrap();

        // A client opens, writes, and closes its own writer end...
        {
            let mut tx = open_sender(&path).await.unwrap();
            use tokio::io::AsyncWriteExt;
            tx.write_all(b"hi").await.unwrap();
        }

        // ...and the server's read still returns real data, not EOF, because
        // `_keepalive_tx` keeps a writer open.
        let mut buf = [0u8; 2];
        use tokio::io::AsyncReadExt;
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf, b"hi");

        // All external writers are gone now, yet a further read must not
        // report EOF (Ok(0)) — it should simply have nothing ready.
        let mut probe = [0u8; 1];
        match rx.try_read(&mut probe) {
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            other => panic!("expected WouldBlock, got {other:?}"),
        }
    }
}
