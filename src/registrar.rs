//! The rendezvous loop: reads connect requests off the well-known FIFO,
//! gates admission through a semaphore, opens each client's own pipe pair,
//! and hands the resulting session off to the worker pool's queue.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::logger::Logger;
use crate::pipes;
use crate::protocol::{self, ConnectRequest, ConnectResponse};
use crate::queue::SessionQueue;
use crate::scoreboard::Scoreboard;
use crate::session::SessionContext;

enum Event {
    Listening { path: String },
    ConnectRequest { client_id: u32 },
    AdmissionFull { client_id: u32 },
    Admitted { client_id: u32 },
    MalformedRequest { reason: String },
    OpenPipesFailed { client_id: u32, reason: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { path } => write!(f, "Rendezvous pipe open at {path}"),
            Event::ConnectRequest { client_id } => write!(f, "Connect request from client {client_id}"),
            Event::AdmissionFull { client_id } => {
                write!(f, "Admission full, client {client_id} waiting for a slot")
            }
            Event::Admitted { client_id } => write!(f, "Client {client_id} admitted and queued"),
            Event::MalformedRequest { reason } => write!(f, "Malformed connect request: {reason}"),
            Event::OpenPipesFailed { client_id, reason } => {
                write!(f, "Failed to open pipes for client {client_id}: {reason}")
            }
        }
    }
}

/// Runs forever, reading one fixed-size connect request at a time from the
/// rendezvous pipe and dispatching each admitted client onto `queue`.
pub async fn run(
    config: Arc<Config>,
    admission: Arc<Semaphore>,
    queue: Arc<SessionQueue>,
    scoreboard: Arc<Scoreboard>,
    log: Arc<Logger>,
) -> anyhow::Result<()> {
    pipes::create_fifo(&config.fifo_registo)?;
    let (mut rendezvous, _keepalive) =
        pipes::open_receiver_with_keepalive_writer(&config.fifo_registo).await?;
    log.info(Event::Listening { path: config.fifo_registo.display().to_string() });

    let mut buf = [0u8; protocol::CONNECT_REQUEST_LEN];
    loop {
        rendezvous.read_exact(&mut buf).await?;

        let request = match ConnectRequest::decode(&buf) {
            Ok(request) => request,
            Err(e) => {
                log.warn(Event::MalformedRequest { reason: e.to_string() });
                continue;
            }
        };
        let Some(client_id) = request.client_id() else {
            log.warn(Event::MalformedRequest {
                reason: format!("unparseable client id in {}", request.request_pipe_path),
            });
            continue;
        };
        log.verbose(Event::ConnectRequest { client_id });

        if admission.available_permits() == 0 {
            log.verbose(Event::AdmissionFull { client_id });
        }
        let permit = match Arc::clone(&admission).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Ok(()), // semaphore closed: shutting down
        };

        let config = Arc::clone(&config);
        let queue = Arc::clone(&queue);
        let scoreboard = Arc::clone(&scoreboard);
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            admit(client_id, request, config, permit, queue, scoreboard, &log).await;
        });
    }
}

/// Opens the client's own request/notif pipes, registers it with the
/// scoreboard, answers the handshake, and enqueues the session. The
/// admission permit passed in is threaded into the [`SessionContext`] so it
/// stays held for the whole session lifetime, not just the handshake.
async fn admit(
    client_id: u32,
    request: ConnectRequest,
    config: Arc<Config>,
    permit: tokio::sync::OwnedSemaphorePermit,
    queue: Arc<SessionQueue>,
    scoreboard: Arc<Scoreboard>,
    log: &Logger,
) {
    let request_path = std::path::Path::new(&request.request_pipe_path);
    let notif_path = std::path::Path::new(&request.notif_pipe_path);

    let mut notif_pipe = match pipes::open_sender(notif_path).await {
        Ok(pipe) => pipe,
        Err(e) => {
            log.warn(Event::OpenPipesFailed { client_id, reason: e.to_string() });
            return;
        }
    };
    let request_pipe = match pipes::open_receiver(request_path).await {
        Ok(pipe) => pipe,
        Err(e) => {
            log.warn(Event::OpenPipesFailed { client_id, reason: e.to_string() });
            return;
        }
    };

    scoreboard.add(client_id);

    if let Err(e) = notif_pipe.write_all(&ConnectResponse::ACCEPTED.encode()).await {
        log.warn(Event::OpenPipesFailed { client_id, reason: e.to_string() });
        scoreboard.remove(client_id);
        return;
    }

    log.info(Event::Admitted { client_id });
    let ctx = SessionContext::new(client_id, config.levels_dir.clone(), request_pipe, notif_pipe, permit);
    queue.enqueue(ctx).await;
}
