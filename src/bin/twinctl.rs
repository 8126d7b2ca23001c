//! twinctl - line-mode client for poking a running floor-twin server
//!
//! Connects to the frame socket, optionally sends one raw JSON command,
//! then prints every received frame until interrupted.
//!
//! Usage:
//!   twinctl --addr 127.0.0.1:3001
//!   twinctl --addr 127.0.0.1:3001 \
//!     --send '{"type":"layout_command","command":"validate_zone","zoneId":"A1"}'

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "twinctl", version, about)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    addr: String,

    /// Raw JSON command frame to send after connecting
    #[arg(short, long)]
    send: Option<String>,

    /// Exit after printing this many frames (0 = run until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.addr).await?;
    eprintln!("connected to {}", args.addr);
    let (read_half, mut write_half) = stream.into_split();

    if let Some(command) = &args.send {
        // Sanity check before putting it on the wire
        serde_json::from_str::<serde_json::Value>(command)
            .map_err(|e| format!("--send is not valid JSON: {e}"))?;
        write_half.write_all(command.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
    }

    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();
    let mut printed = 0usize;

    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(frame) => println!("{}", serde_json::to_string_pretty(&frame)?),
            Err(_) => println!("{line}"),
        }
        printed += 1;
        if args.count > 0 && printed >= args.count {
            break;
        }
    }

    Ok(())
}
