//! Network Client
//!
//! Outbound leg of a ring node: keeps trying to reach the neighbor until it
//! answers, then writes messages to it in order.

use futures::SinkExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::FramedWrite;

use super::{shutdown_requested, RingCodec};
use crate::error::{Error, Result};
use crate::protocol::Message;

/// Connector for the outbound neighbor
pub struct OutboundConnector {
    /// Neighbor address
    address: String,
    /// Delay between connection attempts
    retry_delay: Duration,
}

impl OutboundConnector {
    /// Create a new connector
    pub fn new(address: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            address: address.into(),
            retry_delay,
        }
    }

    /// Connect to the neighbor, retrying indefinitely
    ///
    /// Returns `None` as soon as shutdown is requested, including while
    /// waiting out the retry delay.
    pub async fn connect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<OutboundStream>> {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                result = self.try_connect() => result,
                _ = shutdown_requested(shutdown) => return Ok(None),
            };

            match result {
                Ok(stream) => {
                    tracing::info!("Connected to neighbor at {}", self.address);
                    return Ok(Some(OutboundStream::new(stream, self.address.clone())));
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(
                        "Connection to neighbor {} failed, retrying in {:?} (attempt {}): {}",
                        self.address,
                        self.retry_delay,
                        attempt,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = shutdown_requested(shutdown) => return Ok(None),
            }
        }
    }

    /// Single connection attempt
    async fn try_connect(&self) -> Result<TcpStream> {
        match TcpStream::connect(&self.address).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Err(e) => Err(Error::ConnectionFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Established outbound connection
pub struct OutboundStream {
    frames: FramedWrite<TcpStream, RingCodec>,
    address: String,
}

impl OutboundStream {
    fn new(stream: TcpStream, address: String) -> Self {
        Self {
            frames: FramedWrite::new(stream, RingCodec::new()),
            address,
        }
    }

    /// Neighbor address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Write one message and flush it
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.frames.send(*message).await?;
        tracing::info!("Sent: {}", message);
        Ok(())
    }
}
