//! Glyph cache daemon - host-side stand-in for the device's glyph link

mod frame;
mod handler;
mod link;

use anyhow::Result;
use bytes::BytesMut;
use clap::Parser;
use glyphcache::{CacheConfig, DirStorage, GlyphCache, DEFAULT_CAPACITY};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::frame::Frame;
use crate::handler::CommandHandler;
use crate::link::Outbox;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:7420")]
    bind: String,

    /// Cache directory
    #[arg(short, long, default_value = "./remote_fonts")]
    data: String,

    /// Cache capacity (number of glyphs)
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Keep glyphs from a previous run instead of starting cold
    #[arg(long)]
    warm: bool,

    /// Health check mode
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting glyph cache daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache directory: {}", args.data);
    info!("Cache capacity: {}", args.capacity);

    let config = CacheConfig::new(args.capacity).with_cold_start(!args.warm);
    let cache = Arc::new(GlyphCache::open(&args.data, config)?);
    info!(size = cache.len(), "Glyph cache ready");

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Listening on {}", args.bind);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Peer connected: {}", addr);
                let cache = Arc::clone(&cache);

                tokio::spawn(async move {
                    if let Err(e) = handle_peer(stream, cache).await {
                        error!("Error handling peer {}: {}", addr, e);
                    }
                    info!("Peer disconnected: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_peer(mut stream: TcpStream, cache: Arc<GlyphCache<DirStorage>>) -> Result<()> {
    let handler = CommandHandler::new(cache);
    let mut outbox = Outbox::new();
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buffer).await?;

        if n == 0 {
            // Connection closed
            return Ok(());
        }

        loop {
            match Frame::parse(&mut buffer) {
                Ok(Some(frame)) => {
                    let response = handler.handle(frame, &mut outbox);

                    // Requests raised while handling go out ahead of the reply
                    for request in outbox.drain() {
                        send(&mut stream, request).await?;
                    }
                    send(&mut stream, response).await?;
                }
                Ok(None) => {
                    // Need more data
                    break;
                }
                Err(e) => {
                    // The bad frame is already consumed; keep going with the rest
                    warn!("Frame error: {}", e);
                    send(&mut stream, Frame::Error(e)).await?;
                }
            }
        }
    }
}

async fn send(stream: &mut TcpStream, frame: Frame) -> Result<()> {
    let bytes = match frame.serialize() {
        Ok(bytes) => bytes,
        Err(e) => Frame::Error(e).serialize().map_err(anyhow::Error::msg)?,
    };
    stream.write_all(&bytes).await?;
    Ok(())
}
