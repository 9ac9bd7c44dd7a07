use std::fmt;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use pactempo::logger::Logger;
use pactempo::pipes;
use pactempo::protocol::{self, BoardHeader, ConnectRequest};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "client",
    version,
    about = "Terminal client for a running arcade session server",
    long_about = "Registers with the server over its rendezvous FIFO, then relays \
                  w/a/s/d moves typed at the prompt and renders board updates as they \
                  arrive. Type q to disconnect."
)]
struct Args {
    /// Path of the server's rendezvous FIFO
    fifo_registo: PathBuf,

    /// This client's id; its own pipes are named `/tmp/<id>_request` and `/tmp/<id>_notif`
    client_id: u32,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

enum Event<'a> {
    Connecting { fifo_registo: &'a str },
    Connected,
    Rejected { status: u8 },
    BoardUpdate { header: BoardHeader },
    SessionEnded { game_over: bool },
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Connecting { fifo_registo } => write!(f, "Connecting via {fifo_registo}…"),
            Event::Connected => write!(f, "Connected"),
            Event::Rejected { status } => write!(f, "Connect request rejected, status={status}"),
            Event::BoardUpdate { header } => write!(
                f,
                "{}x{} tempo={} points={}{}{}",
                header.width,
                header.height,
                header.tempo,
                header.accumulated_points,
                if header.victory { " VICTORY" } else { "" },
                if header.game_over { " GAME_OVER" } else { "" },
            ),
            Event::SessionEnded { game_over } => write!(f, "Session ended (game_over={game_over})"),
        }
    }
}

fn render_board(width: i32, height: i32, cells: &[u8]) -> String {
    let mut out = String::with_capacity(cells.len() + height as usize);
    for row in 0..height {
        let start = (row * width) as usize;
        let end = start + width as usize;
        out.push_str(&String::from_utf8_lossy(&cells[start..end]));
        out.push('\n');
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log = Logger::new(args.verbose);

    let request_path = format!("/tmp/{}_request", args.client_id);
    let notif_path = format!("/tmp/{}_notif", args.client_id);
    pipes::create_fifo(std::path::Path::new(&request_path))?;
    pipes::create_fifo(std::path::Path::new(&notif_path))?;

    log.info(Event::Connecting { fifo_registo: &args.fifo_registo.display().to_string() });
    let request = ConnectRequest {
        request_pipe_path: request_path.clone(),
        notif_pipe_path: notif_path.clone(),
    };
    {
        let mut rendezvous = pipes::open_sender(&args.fifo_registo).await?;
        rendezvous.write_all(&request.encode()).await?;
    }

    let (mut notif, mut request_sender) = tokio::try_join!(
        pipes::open_receiver(std::path::Path::new(&notif_path)),
        pipes::open_sender(std::path::Path::new(&request_path)),
    )?;

    let mut response = [0u8; 2];
    notif.read_exact(&mut response).await?;
    if response[1] != 0 {
        log.warn(Event::Rejected { status: response[1] });
        return Ok(());
    }
    log.info(Event::Connected);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut header_buf = [0u8; BoardHeader::WIRE_LEN];

    loop {
        tokio::select! {
            header_result = notif.read_exact(&mut header_buf) => {
                header_result?;
                let header = BoardHeader::decode(&header_buf)
                    .ok_or_else(|| anyhow::anyhow!("malformed board header"))?;
                log.info(Event::BoardUpdate { header });

                if header.width == 0 {
                    log.info(Event::SessionEnded { game_over: header.game_over });
                    break;
                }
                let mut cells = vec![0u8; (header.width * header.height) as usize];
                notif.read_exact(&mut cells).await?;
                print!("{}", render_board(header.width, header.height, &cells));
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let cmd = line.trim();
                if cmd.eq_ignore_ascii_case("q") {
                    request_sender.write_all(&[protocol::OP_CODE_DISCONNECT]).await?;
                } else if let Some(&byte) = cmd.as_bytes().first() {
                    request_sender.write_all(&[protocol::OP_CODE_PLAY, byte.to_ascii_uppercase()]).await?;
                }
            }
        }
    }

    Ok(())
}
