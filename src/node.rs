//! Ring Node
//!
//! Wires the inbound listener, the outbound connector and the election
//! tracker together. A node runs two tasks:
//!
//! - inbound: accept the upstream peer, then feed every received message to
//!   the election tracker and queue whatever it decides to forward
//! - outbound: connect to the neighbor (retrying), then write queued
//!   messages in order
//!
//! Once both legs are up the node sends its own identity into the ring.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::RingConfig;
use crate::error::Result;
use crate::id::NodeId;
use crate::network::{
    shutdown_requested, InboundListener, OutboundConnector, Received,
};
use crate::protocol::Message;
use crate::state::{ElectionState, ElectionTracker};

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    /// Created, tasks not started
    Starting,
    /// Tasks running
    Running,
    /// Shutdown requested, waiting for tasks to exit
    ShuttingDown,
    /// Both tasks have exited
    Stopped,
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePhase::Starting => write!(f, "STARTING"),
            NodePhase::Running => write!(f, "RUNNING"),
            NodePhase::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            NodePhase::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// A ring election node
pub struct RingNode {
    id: NodeId,
    config: RingConfig,
    listener: InboundListener,
    election: Arc<ElectionTracker>,
    shutdown: Arc<watch::Sender<bool>>,
    phase: Arc<watch::Sender<NodePhase>>,
}

/// Cloneable handle for observing and stopping a running node
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    election: Arc<ElectionTracker>,
    shutdown: Arc<watch::Sender<bool>>,
    phase: watch::Receiver<NodePhase>,
}

impl RingNode {
    /// Create a node with a fresh identity, binding its listen address
    pub async fn bind(config: RingConfig) -> Result<Self> {
        config.validate()?;
        let id = NodeId::generate();
        tracing::info!("Node initialized with UUID: {}", id);

        let listener = InboundListener::bind(config.listen_address()).await?;
        Ok(Self::from_parts(config, id, listener))
    }

    /// Create a node around an already bound listener
    pub fn with_listener(config: RingConfig, id: NodeId, listener: TcpListener) -> Self {
        tracing::info!("Node initialized with UUID: {}", id);
        Self::from_parts(config, id, InboundListener::from_listener(listener))
    }

    fn from_parts(config: RingConfig, id: NodeId, listener: InboundListener) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (phase, _) = watch::channel(NodePhase::Starting);

        Self {
            id,
            config,
            listener,
            election: Arc::new(ElectionTracker::new(id)),
            shutdown: Arc::new(shutdown),
            phase: Arc::new(phase),
        }
    }

    /// Get a handle to the node
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            id: self.id,
            election: Arc::clone(&self.election),
            shutdown: Arc::clone(&self.shutdown),
            phase: self.phase.subscribe(),
        }
    }

    /// Run until both legs finish or shutdown is requested
    pub async fn run(self) -> Result<()> {
        let RingNode {
            id,
            config,
            listener,
            election,
            shutdown,
            phase,
        } = self;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<Message>();
        let (accepted_tx, accepted_rx) = oneshot::channel::<()>();
        let (connected_tx, connected_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = watch::channel(false);

        let inbound = tokio::spawn(run_inbound(
            listener,
            Arc::clone(&election),
            queue_tx.clone(),
            shutdown.subscribe(),
            accepted_tx,
            started_rx,
            config.receive_timeout(),
        ));

        let outbound = tokio::spawn(run_outbound(
            OutboundConnector::new(config.neighbor_address(), config.retry_delay()),
            queue_rx,
            shutdown.subscribe(),
            connected_tx,
        ));

        set_phase(&phase, NodePhase::Running);
        let mut shutdown_rx = shutdown.subscribe();

        // Both legs must be up before the first election message goes out
        let ready = tokio::select! {
            ready = async { accepted_rx.await.is_ok() && connected_rx.await.is_ok() } => ready,
            _ = shutdown_requested(&mut shutdown_rx) => false,
        };

        if ready {
            tracing::info!("Ring connected. Sending initial message.");
            if queue_tx.send(Message::election(id)).is_err() {
                tracing::warn!("Outbound task exited before the initial message was queued");
            }
            started_tx.send_replace(true);
        }
        drop(queue_tx);
        drop(started_tx);

        let joined = async { tokio::join!(inbound, outbound) };
        tokio::pin!(joined);

        let finished = tokio::select! {
            results = &mut joined => Some(results),
            _ = shutdown_requested(&mut shutdown_rx) => None,
        };

        let (inbound_result, outbound_result) = match finished {
            Some(results) => results,
            None => {
                set_phase(&phase, NodePhase::ShuttingDown);
                tracing::info!("Cleaning up resources...");
                joined.await
            }
        };

        for (leg, result) in [("inbound", inbound_result), ("outbound", outbound_result)] {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("{} task failed: {}", leg, e),
                Err(e) => tracing::error!("{} task panicked: {}", leg, e),
            }
        }

        set_phase(&phase, NodePhase::Stopped);
        match election.leader().await {
            Some(leader) => tracing::info!("Shutdown complete. Leader was {}", leader),
            None => tracing::info!("Shutdown complete. No leader was determined"),
        }

        Ok(())
    }
}

impl NodeHandle {
    /// This node's identity
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Request graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> NodePhase {
        *self.phase.borrow()
    }

    /// Wait until the node reaches a phase
    pub async fn wait_for_phase(&mut self, target: NodePhase) {
        let _ = self.phase.wait_for(|phase| *phase == target).await;
    }

    /// Current election state
    pub async fn state(&self) -> ElectionState {
        self.election.state().await
    }

    /// Known leader, if any
    pub async fn leader(&self) -> Option<NodeId> {
        self.election.leader().await
    }

    /// Check whether this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.election.is_leader().await
    }

    /// Wait until this node learns the leader
    pub async fn wait_for_leader(&self) -> Option<NodeId> {
        self.election.wait_for_leader().await
    }
}

fn set_phase(phase: &watch::Sender<NodePhase>, next: NodePhase) {
    let previous = phase.send_replace(next);
    tracing::debug!("Node phase {} -> {}", previous, next);
}

/// Inbound task: accept the upstream peer and process its messages
async fn run_inbound(
    listener: InboundListener,
    election: Arc<ElectionTracker>,
    queue: mpsc::UnboundedSender<Message>,
    mut shutdown: watch::Receiver<bool>,
    accepted: oneshot::Sender<()>,
    mut started: watch::Receiver<bool>,
    receive_timeout: Duration,
) -> Result<()> {
    let mut stream = match listener.accept(&mut shutdown, receive_timeout).await? {
        Some(stream) => stream,
        None => return Ok(()),
    };
    let _ = accepted.send(());

    tracing::info!("Server task waiting for outbound connection...");
    let go = tokio::select! {
        go = async { started.wait_for(|s| *s).await.is_ok() } => go,
        _ = shutdown_requested(&mut shutdown) => false,
    };

    if go {
        loop {
            match stream.recv(&mut shutdown).await {
                Ok(Received::Message(msg)) => {
                    let decision = election.observe(&msg).await;
                    if let Some(out) = decision.outgoing {
                        if queue.send(out).is_err() {
                            tracing::warn!("Outbound connection is gone, dropping {}", out);
                        }
                    }
                }
                Ok(Received::Closed) => {
                    tracing::info!("Upstream peer {} closed the connection", stream.peer_addr());
                    break;
                }
                Ok(Received::Cancelled) => break,
                Err(e) if e.is_connection_local() => {
                    tracing::warn!("Error reading from {}: {}", stream.peer_addr(), e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }

    tracing::info!("Ending listen loop.");
    Ok(())
}

/// Outbound task: connect to the neighbor and drain the send queue
async fn run_outbound(
    connector: OutboundConnector,
    mut queue: mpsc::UnboundedReceiver<Message>,
    mut shutdown: watch::Receiver<bool>,
    connected: oneshot::Sender<()>,
) -> Result<()> {
    let mut stream = match connector.connect(&mut shutdown).await? {
        Some(stream) => stream,
        None => return Ok(()),
    };
    let _ = connected.send(());

    loop {
        let msg = tokio::select! {
            msg = queue.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = shutdown_requested(&mut shutdown) => break,
        };

        let sent = tokio::select! {
            sent = stream.send(&msg) => sent,
            _ = shutdown_requested(&mut shutdown) => break,
        };

        if let Err(e) = sent {
            tracing::error!(
                "Error sending message to {}: {}; dropping {}",
                stream.address(),
                e,
                msg
            );
            break;
        }
    }

    tracing::info!("Ending send loop.");
    Ok(())
}
