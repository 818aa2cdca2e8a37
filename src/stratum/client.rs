//! Stratum pool session
//!
//! The session connects, performs the subscribe/authorize handshake and then
//! runs a receive loop that applies `mining.set_target` and `mining.notify` to
//! the shared [`SessionState`] and counts submit acknowledgements. Shares are
//! written by a separate [`ShareSubmitter`] through the same serialized writer.

use crate::error::{Error, Result};
use crate::stratum::connection::{self, PoolReader, PoolWriter};
use crate::stratum::protocol::{
    check_authorize_response, PoolEvent, PoolMessage, StratumRequest, SubmitOutcome, Subscription,
};
use crate::stratum::state::SessionState;
use crate::worker::Share;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Identifier sent as the first `mining.subscribe` parameter
pub const CLIENT_ID: &str = concat!("stratum-mining-client/", env!("CARGO_PKG_VERSION"));

/// Pool session settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pool address as `host:port`
    pub address: String,
    /// Worker name used for authorize and submit
    pub username: String,
    /// Worker password
    pub password: String,
    /// Client identifier for subscribe
    pub client_id: String,
}

impl ClientConfig {
    /// Settings with the default client identifier
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            client_id: CLIENT_ID.to_string(),
        }
    }
}

/// A connection to the pool and the state it drives
pub struct StratumClient<R, W> {
    config: ClientConfig,
    reader: PoolReader<R>,
    writer: Arc<PoolWriter<W>>,
    state: Arc<SessionState>,
}

impl StratumClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Open a TCP connection to the configured pool
    pub async fn connect(config: ClientConfig, state: Arc<SessionState>) -> Result<Self> {
        info!(pool = %config.address, "Connecting to pool");
        let (reader, writer) = connection::connect(&config.address).await?;
        Ok(Self {
            config,
            reader,
            writer: Arc::new(writer),
            state,
        })
    }
}

impl<R, W> StratumClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Run a session over an already established byte stream
    pub fn new(config: ClientConfig, reader: R, writer: W, state: Arc<SessionState>) -> Self {
        Self {
            config,
            reader: PoolReader::new(reader),
            writer: Arc::new(PoolWriter::new(writer)),
            state,
        }
    }

    /// Shared session state
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Subscribe, then authorize.
    ///
    /// Each request is answered by exactly the next line from the pool. Any
    /// failure here ends the session.
    pub async fn handshake(&mut self) -> Result<()> {
        self.writer
            .send(&StratumRequest::subscribe(&self.config.client_id))
            .await?;
        let reply = self.handshake_reply("subscribe").await?;
        let subscription = Subscription::from_response(&reply)?;

        info!(
            subscription_id = %subscription.subscription_id,
            nonce1 = %subscription.nonce1,
            nonce2_size = %subscription.nonce2_size,
            "Subscribed"
        );
        self.state.set_subscription(subscription)?;

        self.writer
            .send(&StratumRequest::authorize(
                &self.config.username,
                &self.config.password,
            ))
            .await?;
        let reply = self.handshake_reply("authorize").await?;
        check_authorize_response(&reply)?;

        info!(username = %self.config.username, "Authorized");
        Ok(())
    }

    async fn handshake_reply(&mut self, step: &str) -> Result<PoolMessage> {
        self.reader.next_message().await.map_err(|e| match e {
            Error::Json(e) => Error::handshake(format!("undecodable {} reply: {}", step, e)),
            other => other,
        })
    }

    /// Submitter sharing this session's writer
    pub fn submitter(&self) -> ShareSubmitter<W> {
        ShareSubmitter {
            writer: Arc::clone(&self.writer),
            username: self.config.username.clone(),
        }
    }

    /// Receive loop.
    ///
    /// Only returns on a fatal error: a read failure or the pool closing the
    /// connection. Problems with a single message are logged and skipped.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let line = self.reader.next_line().await?;
            if let Err(e) = self.handle_line(&line) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, category = e.category(), line = %line, "Ignoring pool message");
            }
        }
    }

    /// Apply one post-handshake line to the session state
    pub fn handle_line(&self, line: &str) -> Result<()> {
        let message = PoolMessage::from_json(line)?;

        match PoolEvent::from_message(&message)? {
            PoolEvent::SetTarget(None) => {
                debug!("set_target without parameters, keeping current target");
            }
            PoolEvent::SetTarget(Some(target)) => {
                info!(target = %target.to_hex(), "Set target");
                self.state.set_target(target);
            }
            PoolEvent::Notify(job) => {
                info!(job_id = %job.job_id(), pow_hash = %job.pow_hash(), "New job");
                if let Some(previous) = self.state.jobs().publish(job) {
                    debug!(
                        job_id = %previous.job_id(),
                        nonces = previous.nonces_claimed(),
                        "Job superseded"
                    );
                }
            }
            PoolEvent::SubmitResult(SubmitOutcome::Accepted) => {
                self.state.stats().shares.record_accepted();
                info!("Share accepted");
            }
            PoolEvent::SubmitResult(SubmitOutcome::Rejected(reason)) => {
                self.state.stats().shares.record_rejected();
                warn!(reason = %reason, "Share rejected");
            }
            PoolEvent::Unknown(method) => {
                warn!(method = %method, "Unhandled pool method");
            }
        }

        Ok(())
    }
}

/// Writes `mining.submit` requests for shares found by the workers
pub struct ShareSubmitter<W> {
    writer: Arc<PoolWriter<W>>,
    username: String,
}

impl<W: AsyncWrite + Unpin> ShareSubmitter<W> {
    /// Submit one share
    pub async fn submit(&self, share: &Share) -> Result<()> {
        debug!(job_id = %share.job_id, nonce2 = %share.nonce2, "Submitting share");
        self.writer
            .send(&StratumRequest::submit(
                &self.username,
                &share.job_id,
                &share.nonce2,
            ))
            .await
    }

    /// Submit shares as they arrive.
    ///
    /// Returns `Ok` once every worker has dropped its sender, or the first
    /// write error, which is fatal to the session.
    pub async fn run(self, mut shares: mpsc::UnboundedReceiver<Share>) -> Result<()> {
        while let Some(share) = shares.recv().await {
            if let Err(e) = self.submit(&share).await {
                error!(error = %e, job_id = %share.job_id, "Failed to submit share");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratum::nonce::{Nonce2, NonceSize};
    use crate::types::Target;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn config() -> ClientConfig {
        ClientConfig::new("127.0.0.1:3333", "alice.rig1", "x")
    }

    /// Client over an in-memory pipe, plus the pool's end of it
    fn pipe() -> (StratumClient<DuplexStream, DuplexStream>, DuplexStream, DuplexStream) {
        let (client_read, pool_write) = tokio::io::duplex(8192);
        let (client_write, pool_read) = tokio::io::duplex(8192);
        let client = StratumClient::new(
            config(),
            client_read,
            client_write,
            Arc::new(SessionState::new()),
        );
        (client, pool_write, pool_read)
    }

    async fn read_request(lines: &mut tokio::io::Lines<BufReader<DuplexStream>>) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn handshake_ready() -> StratumClient<DuplexStream, DuplexStream> {
        let (client, _, _) = pipe();
        client
    }

    #[tokio::test]
    async fn test_handshake() {
        let (mut client, mut pool_write, pool_read) = pipe();
        let mut requests = BufReader::new(pool_read).lines();

        pool_write
            .write_all(b"{\"id\":0,\"result\":[\"sub1\",\"1234abcd\",4],\"error\":null}\n{\"id\":0,\"result\":true,\"error\":null}\n")
            .await
            .unwrap();

        client.handshake().await.unwrap();

        assert_eq!(
            read_request(&mut requests).await,
            json!({"id": 0, "method": "mining.subscribe", "params": [CLIENT_ID, null]})
        );
        assert_eq!(
            read_request(&mut requests).await,
            json!({"id": 0, "method": "mining.authorize", "params": ["alice.rig1", "x"]})
        );

        let subscription = client.state().subscription().unwrap();
        assert_eq!(subscription.subscription_id, "sub1");
        assert_eq!(subscription.nonce1.as_hex(), "1234abcd");
        assert_eq!(subscription.nonce2_size.as_bytes(), 4);
    }

    #[tokio::test]
    async fn test_handshake_subscribe_error_is_fatal() {
        let (mut client, mut pool_write, _pool_read) = pipe();
        pool_write
            .write_all(b"{\"id\":0,\"result\":null,\"error\":[20,\"Other/Unknown\",null]}\n")
            .await
            .unwrap();

        let err = client.handshake().await.unwrap_err();
        assert_matches!(err, Error::Handshake { .. });
        assert!(err.is_fatal());
        assert!(client.state().subscription().is_none());
    }

    #[tokio::test]
    async fn test_handshake_authorize_error_is_fatal() {
        let (mut client, mut pool_write, _pool_read) = pipe();
        pool_write
            .write_all(b"{\"id\":0,\"result\":[\"sub1\",\"1234abcd\",4]}\n{\"id\":0,\"result\":null,\"error\":[24,\"Unauthorized worker\",null]}\n")
            .await
            .unwrap();

        assert_matches!(
            client.handshake().await,
            Err(Error::Handshake { message }) if message.contains("Unauthorized worker")
        );
    }

    #[tokio::test]
    async fn test_handshake_garbage_reply() {
        let (mut client, mut pool_write, _pool_read) = pipe();
        pool_write.write_all(b"this is not json\n").await.unwrap();

        assert_matches!(client.handshake().await, Err(Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_handshake_pool_closes() {
        let (mut client, pool_write, _pool_read) = pipe();
        drop(pool_write);

        assert_matches!(client.handshake().await, Err(Error::Disconnected));
    }

    #[tokio::test]
    async fn test_handle_set_target() {
        let client = handshake_ready();

        client
            .handle_line(r#"{"id":null,"method":"mining.set_target","params":["ff"]}"#)
            .unwrap();
        assert_eq!(*client.state().target(), Target::from_hex("ff").unwrap());

        // Empty params keep the current target
        client
            .handle_line(r#"{"id":null,"method":"mining.set_target","params":[]}"#)
            .unwrap();
        assert_eq!(*client.state().target(), Target::from_hex("ff").unwrap());

        // Malformed target is local; current target unchanged
        assert!(client
            .handle_line(r#"{"method":"mining.set_target","params":["xyz"]}"#)
            .is_err());
        assert_eq!(*client.state().target(), Target::from_hex("ff").unwrap());
    }

    #[tokio::test]
    async fn test_handle_notify() {
        let client = handshake_ready();

        client
            .handle_line(r#"{"id":null,"method":"mining.notify","params":["job42","deadbeef"]}"#)
            .unwrap();
        let job = client.state().current_job().unwrap();
        assert_eq!(job.job_id(), "job42");

        assert!(client
            .handle_line(r#"{"method":"mining.notify","params":["job43","nothex"]}"#)
            .is_err());
        assert_eq!(client.state().current_job().unwrap().job_id(), "job42");

        client
            .handle_line(r#"{"method":"mining.notify","params":["job44","00ff"]}"#)
            .unwrap();
        assert_eq!(client.state().current_job().unwrap().job_id(), "job44");
    }

    #[tokio::test]
    async fn test_handle_submit_results() {
        let client = handshake_ready();

        client.handle_line(r#"{"id":0,"result":true,"error":null}"#).unwrap();
        client
            .handle_line(r#"{"id":0,"result":false,"error":[21,"stale share"]}"#)
            .unwrap();
        client
            .handle_line(r#"{"method":"client.reconnect","params":[]}"#)
            .unwrap();

        let shares = client.state().stats().shares.snapshot();
        assert_eq!(shares.accepted, 1);
        assert_eq!(shares.rejected, 1);
    }

    #[tokio::test]
    async fn test_rejected_share_keeps_target_and_job() {
        let client = handshake_ready();
        let target = Target::from_hex("00ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").unwrap();
        client.state().set_target(target.clone());
        client
            .handle_line(r#"{"id":null,"method":"mining.notify","params":["job7","deadbeef"]}"#)
            .unwrap();
        let job = client.state().current_job().unwrap();
        job.claim_nonce(NonceSize::new(4).unwrap());

        client
            .handle_line(r#"{"result":false,"error":[21,"stale share"]}"#)
            .unwrap();

        assert_eq!(*client.state().target(), target);
        let current = client.state().current_job().unwrap();
        assert!(Arc::ptr_eq(&current, &job));
        assert_eq!(current.nonces_claimed(), 1);
        assert_eq!(client.state().stats().shares.snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn test_run_survives_bad_lines_and_ends_on_close() {
        let (client, mut pool_write, _pool_read) = pipe();
        let state = Arc::clone(client.state());

        pool_write
            .write_all(b"garbage\n{\"method\":\"mining.notify\",\"params\":[\"j1\"]}\n{\"method\":\"mining.notify\",\"params\":[\"j2\",\"abcd\"]}\n")
            .await
            .unwrap();
        drop(pool_write);

        assert_matches!(client.run().await, Err(Error::Disconnected));
        assert_eq!(state.current_job().unwrap().job_id(), "j2");
    }

    #[tokio::test]
    async fn test_submitter_writes_submit_requests() {
        let (client, _pool_write, pool_read) = pipe();
        let mut requests = BufReader::new(pool_read).lines();
        let submitter = client.submitter();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Share {
            job_id: "job42".to_string(),
            nonce2: Nonce2::new(NonceSize::new(4).unwrap(), 0x2a).unwrap(),
            hash: [0u8; 32],
        })
        .unwrap();
        drop(tx);

        submitter.run(rx).await.unwrap();

        assert_eq!(
            read_request(&mut requests).await,
            json!({"id": 0, "method": "mining.submit", "params": ["alice.rig1", "job42", "0000002a"]})
        );
    }
}
