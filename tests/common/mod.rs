//! Shared local HTTP fixtures for sampler integration tests
//!
//! A tiny hand-rolled HTTP/1.1 server on an ephemeral loopback port. Each
//! fixture answers every connection with one canned behavior, which keeps the
//! tests deterministic and entirely off the real network. Only the slivers of
//! HTTP/1.1 the samplers actually exercise are implemented: fixed-length and
//! close-delimited response bodies, and chunked request body draining.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a fixture connection does with an incoming request
#[derive(Clone)]
pub enum Behavior {
    /// Serve `total` zero bytes with a Content-Length header, written in
    /// `piece`-sized slices separated by `delay_ms` so the transfer spans
    /// several sampling intervals
    Download {
        total: usize,
        piece: usize,
        delay_ms: u64,
    },
    /// Serve a body without announcing Content-Length (close-delimited)
    DownloadWithoutLength { total: usize },
    /// Announce a zero-length body
    EmptyDownload,
    /// Answer with the given status line and no body
    Status(&'static str),
    /// Drain the chunked request body, count its payload bytes, then answer
    /// with the given status line; a non-zero `drain_delay_ms` throttles the
    /// drain to backpressure the uploader
    UploadSink {
        status: &'static str,
        drain_delay_ms: u64,
    },
    /// Read a little of the request body, then drop the connection
    UploadDisconnect { after_bytes: usize },
}

/// Local HTTP fixture listening on an ephemeral loopback port
pub struct FixtureServer {
    addr: SocketAddr,
    received_bytes: Arc<AtomicU64>,
}

impl FixtureServer {
    /// Starts a fixture that answers every connection with `behavior`
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture listener address");
        let received_bytes = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&received_bytes);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let behavior = behavior.clone();
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, behavior, counter).await;
                });
            }
        });

        Self {
            addr,
            received_bytes,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Payload bytes the upload behaviors have drained so far
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes.load(Ordering::Acquire)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    behavior: Behavior,
    received: Arc<AtomicU64>,
) -> std::io::Result<()> {
    let (head, leftover) = read_request_head(&mut stream).await?;

    match behavior {
        Behavior::Download {
            total,
            piece,
            delay_ms,
        } => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(header.as_bytes()).await?;

            let buffer = vec![0u8; piece.max(1)];
            let mut sent = 0usize;
            while sent < total {
                let len = buffer.len().min(total - sent);
                stream.write_all(&buffer[..len]).await?;
                sent += len;
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
        Behavior::DownloadWithoutLength { total } => {
            let header = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n";
            stream.write_all(header.as_bytes()).await?;
            stream.write_all(&vec![0u8; total]).await?;
        }
        Behavior::EmptyDownload => {
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await?;
        }
        Behavior::Status(status_line) => {
            let header =
                format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(header.as_bytes()).await?;
        }
        Behavior::UploadSink {
            status,
            drain_delay_ms,
        } => {
            let payload = drain_request_body(&mut stream, &head, leftover, drain_delay_ms).await?;
            received.fetch_add(payload, Ordering::AcqRel);
            let header =
                format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(header.as_bytes()).await?;
        }
        Behavior::UploadDisconnect { after_bytes } => {
            let mut seen = leftover.len();
            let mut buffer = [0u8; 16 * 1024];
            while seen < after_bytes {
                let n = stream.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                seen += n;
            }
            // Dropping the stream here closes the connection mid-request
        }
    }

    Ok(())
}

/// Reads the request head and returns it together with any body bytes that
/// arrived in the same segments
async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<(String, Vec<u8>)> {
    let mut collected = Vec::new();
    let mut buffer = [0u8; 4 * 1024];
    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request head",
            ));
        }
        collected.extend_from_slice(&buffer[..n]);
        if let Some(end) = collected.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&collected[..end]).into_owned();
            let leftover = collected[end + 4..].to_vec();
            return Ok((head, leftover));
        }
    }
}

/// Drains a request body and returns its payload byte count
///
/// Streamed uploads arrive with `Transfer-Encoding: chunked`; a fixed
/// Content-Length body is handled as well for completeness.
async fn drain_request_body(
    stream: &mut TcpStream,
    head: &str,
    leftover: Vec<u8>,
    drain_delay_ms: u64,
) -> std::io::Result<u64> {
    let head_lower = head.to_ascii_lowercase();
    let mut pending = leftover;

    if head_lower.contains("transfer-encoding: chunked") {
        let mut payload = 0u64;
        loop {
            let size_line = read_line(stream, &mut pending).await?;
            let size = usize::from_str_radix(size_line.trim(), 16).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk size line")
            })?;
            if size == 0 {
                // Trailer-less end: one final CRLF
                let _ = read_line(stream, &mut pending).await;
                return Ok(payload);
            }
            consume_exact(stream, &mut pending, size).await?;
            consume_exact(stream, &mut pending, 2).await?; // chunk CRLF
            payload += size as u64;
            if drain_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(drain_delay_ms)).await;
            }
        }
    }

    let declared = head_lower
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    // consume_exact drains the buffered leftover first, so the count is the
    // whole declared length, not the remainder past the buffer.
    consume_exact(stream, &mut pending, declared).await?;
    Ok(declared as u64)
}

/// Reads one CRLF-terminated line through the pending buffer
async fn read_line(stream: &mut TcpStream, pending: &mut Vec<u8>) -> std::io::Result<String> {
    loop {
        if let Some(pos) = pending.windows(2).position(|w| w == b"\r\n") {
            let line = String::from_utf8_lossy(&pending[..pos]).into_owned();
            pending.drain(..pos + 2);
            return Ok(line);
        }
        if fill(stream, pending).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "body ended mid-line",
            ));
        }
    }
}

/// Discards exactly `count` body bytes, refilling from the socket as needed
async fn consume_exact(
    stream: &mut TcpStream,
    pending: &mut Vec<u8>,
    mut count: usize,
) -> std::io::Result<()> {
    loop {
        let take = count.min(pending.len());
        pending.drain(..take);
        count -= take;
        if count == 0 {
            return Ok(());
        }
        if fill(stream, pending).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "body ended early",
            ));
        }
    }
}

async fn fill(stream: &mut TcpStream, pending: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut buffer = [0u8; 16 * 1024];
    let n = stream.read(&mut buffer).await?;
    pending.extend_from_slice(&buffer[..n]);
    Ok(n)
}
