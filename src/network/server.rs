//! Network Server
//!
//! Inbound leg of a ring node: listens on the configured address, accepts
//! the first connection to arrive and turns its byte stream into messages.

use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::FramedRead;

use super::{shutdown_requested, RingCodec};
use crate::error::Result;
use crate::protocol::Message;

/// Outcome of waiting for the next inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete message arrived
    Message(Message),
    /// The peer closed the connection
    Closed,
    /// Shutdown was requested while waiting
    Cancelled,
}

/// Listener for the single inbound peer
pub struct InboundListener {
    listener: TcpListener,
}

impl InboundListener {
    /// Bind and listen on an address
    pub async fn bind(address: &str) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// Get the bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the first connection, consuming the listener
    ///
    /// Returns `None` if shutdown is requested first.
    pub async fn accept(
        self,
        shutdown: &mut watch::Receiver<bool>,
        receive_timeout: Duration,
    ) -> Result<Option<InboundStream>> {
        tokio::select! {
            result = self.listener.accept() => {
                let (socket, addr) = result?;
                tracing::info!("Accepted connection from {}", addr);
                Ok(Some(InboundStream::new(socket, addr, receive_timeout)))
            }
            _ = shutdown_requested(shutdown) => Ok(None),
        }
    }
}

/// Accepted inbound connection
pub struct InboundStream {
    frames: FramedRead<TcpStream, RingCodec>,
    peer_addr: SocketAddr,
    receive_timeout: Duration,
}

impl InboundStream {
    fn new(socket: TcpStream, peer_addr: SocketAddr, receive_timeout: Duration) -> Self {
        Self {
            frames: FramedRead::new(socket, RingCodec::new()),
            peer_addr,
            receive_timeout,
        }
    }

    /// Address of the upstream peer
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Wait for the next whole message
    ///
    /// Idle periods longer than the receive timeout just poll again;
    /// partially received records stay buffered across them.
    pub async fn recv(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Received> {
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.receive_timeout, self.frames.next()) => next,
                _ = shutdown_requested(shutdown) => return Ok(Received::Cancelled),
            };

            match next {
                Ok(Some(Ok(msg))) => return Ok(Received::Message(msg)),
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => return Ok(Received::Closed),
                Err(_) => {
                    tracing::trace!("No data from {} yet", self.peer_addr);
                }
            }
        }
    }
}
