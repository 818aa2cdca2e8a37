//! Line-delimited JSON transport to the pool
//!
//! The read half is owned by the receive loop. The write half is shared by
//! the handshake and the share submitter, so every write happens under an
//! async mutex and a line is never interleaved with another.

use crate::error::{Error, Result};
use crate::stratum::protocol::{PoolMessage, StratumRequest};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;

/// Longest line accepted from the pool
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Open a TCP connection to `address` (`host:port`) and split it
pub async fn connect(address: &str) -> Result<(PoolReader<OwnedReadHalf>, PoolWriter<OwnedWriteHalf>)> {
    debug!(address = %address, "Connecting to pool");

    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| Error::network(format!("failed to connect to {}: {}", address, e)))?;
    stream.set_nodelay(true)?;

    debug!(address = %address, "Connected to pool");

    let (read_half, write_half) = stream.into_split();
    Ok((PoolReader::new(read_half), PoolWriter::new(write_half)))
}

/// Reads newline-terminated messages from the pool
pub struct PoolReader<R> {
    lines: FramedRead<R, LinesCodec>,
}

impl<R: AsyncRead + Unpin> PoolReader<R> {
    /// Wrap a byte stream
    pub fn new(inner: R) -> Self {
        Self {
            lines: FramedRead::new(inner, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
        }
    }

    /// Read the next non-empty line.
    ///
    /// End of stream is reported as [`Error::Disconnected`]. An over-long line
    /// ends the session with [`Error::Network`].
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            match self.lines.next().await {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!(line = %line, "recv from pool");
                    return Ok(line.to_string());
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    return Err(Error::network(format!(
                        "pool sent a line longer than {} bytes",
                        MAX_LINE_LENGTH
                    )))
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                None => return Err(Error::Disconnected),
            }
        }
    }

    /// Read and decode the next message.
    ///
    /// Used during the handshake, where an undecodable reply is fatal.
    pub async fn next_message(&mut self) -> Result<PoolMessage> {
        let line = self.next_line().await?;
        PoolMessage::from_json(&line)
    }
}

/// Serialized writer shared by every task that talks to the pool
pub struct PoolWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> PoolWriter<W> {
    /// Wrap a byte sink
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Write one request as a single line
    pub async fn send(&self, request: &StratumRequest) -> Result<()> {
        let line = request.to_line()?;

        let mut writer = self.inner.lock().await;
        debug!(line = %line.trim_end(), "write to pool");
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}
