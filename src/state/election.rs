//! Leader Election
//!
//! Implements ring election by comparison: a node forwards only tokens
//! larger than its own identity, so the maximum identity is the only token
//! that survives a full circuit. When a node sees its own token come back it
//! becomes leader and sends an announcement around the ring. Every node that
//! receives the announcement while undecided records the leader and forwards
//! it once; the announcement stops at the leader.

use std::cmp::Ordering;
use tokio::sync::{watch, Mutex};

use crate::id::NodeId;
use crate::protocol::Message;

/// Election state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// No leader known yet
    Undecided,
    /// The leader is known; terminal for this run
    LeaderKnown,
}

impl ElectionState {
    /// Numeric form used in the log (0 = undecided, 1 = leader known)
    pub fn as_u8(&self) -> u8 {
        match self {
            ElectionState::Undecided => 0,
            ElectionState::LeaderKnown => 1,
        }
    }
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// What a node did with a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Leader already known, message discarded
    Ignored,
    /// Token larger than ours, passed on unchanged
    Forwarded,
    /// Token smaller than ours, discarded
    Dropped,
    /// Our own token came back: we are the leader
    Elected,
    /// Announcement recorded and passed on
    Adopted,
}

/// Result of feeding one message to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub state: ElectionState,
    pub leader: Option<NodeId>,
    pub outgoing: Option<Message>,
    pub verdict: Verdict,
}

/// Decide the next state and outgoing message for a received message
pub fn on_message(
    own: NodeId,
    state: ElectionState,
    leader: Option<NodeId>,
    msg: &Message,
) -> Decision {
    if state == ElectionState::LeaderKnown {
        return Decision {
            state,
            leader,
            outgoing: None,
            verdict: Verdict::Ignored,
        };
    }

    if msg.announcement {
        return Decision {
            state: ElectionState::LeaderKnown,
            leader: Some(msg.token),
            outgoing: Some(*msg),
            verdict: Verdict::Adopted,
        };
    }

    match msg.token.cmp(&own) {
        Ordering::Greater => Decision {
            state,
            leader,
            outgoing: Some(*msg),
            verdict: Verdict::Forwarded,
        },
        Ordering::Less => Decision {
            state,
            leader,
            outgoing: None,
            verdict: Verdict::Dropped,
        },
        Ordering::Equal => Decision {
            state: ElectionState::LeaderKnown,
            leader: Some(own),
            outgoing: Some(Message::announcement(own)),
            verdict: Verdict::Elected,
        },
    }
}

/// Word used in the log for how a token compares to ours
pub fn comparison(token: NodeId, own: NodeId) -> &'static str {
    match token.cmp(&own) {
        Ordering::Greater => "greater",
        Ordering::Less => "less",
        Ordering::Equal => "same",
    }
}

/// State and leader, always read and written together
#[derive(Debug, Clone, Copy)]
struct ElectionRecord {
    state: ElectionState,
    leader: Option<NodeId>,
}

/// Owns the election state of one node
pub struct ElectionTracker {
    /// This node's ID
    node_id: NodeId,
    /// Current state and leader
    record: Mutex<ElectionRecord>,
    /// Publishes the leader once it is known
    leader_tx: watch::Sender<Option<NodeId>>,
}

impl ElectionTracker {
    /// Create a new tracker in the undecided state
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            record: Mutex::new(ElectionRecord {
                state: ElectionState::Undecided,
                leader: None,
            }),
            leader_tx: watch::channel(None).0,
        }
    }

    /// Get current state
    pub async fn state(&self) -> ElectionState {
        self.record.lock().await.state
    }

    /// Get the known leader, if any
    pub async fn leader(&self) -> Option<NodeId> {
        self.record.lock().await.leader
    }

    /// Check whether this node won the election
    pub async fn is_leader(&self) -> bool {
        self.record.lock().await.leader == Some(self.node_id)
    }

    /// Wait until the leader is known
    pub async fn wait_for_leader(&self) -> Option<NodeId> {
        let mut rx = self.leader_tx.subscribe();
        let leader = rx.wait_for(Option::is_some).await.ok().and_then(|l| *l);
        leader
    }

    /// Log a received message, run it through the state machine and apply
    /// the result. The returned decision carries the message to forward.
    pub async fn observe(&self, msg: &Message) -> Decision {
        let mut record = self.record.lock().await;

        let cmp = comparison(msg.token, self.node_id);
        match (record.state, record.leader) {
            (ElectionState::LeaderKnown, Some(leader)) => tracing::info!(
                "Received: {}, {}, state={}, leader_id={}",
                msg,
                cmp,
                record.state,
                leader
            ),
            _ => tracing::info!("Received: {}, {}, state={}", msg, cmp, record.state),
        }

        let decision = on_message(self.node_id, record.state, record.leader, msg);
        if decision.leader != record.leader {
            self.leader_tx.send_replace(decision.leader);
        }
        record.state = decision.state;
        record.leader = decision.leader;

        match decision.verdict {
            Verdict::Ignored => {
                if let Some(leader) = record.leader {
                    tracing::info!("Message ignored: leader is already known to be {}", leader);
                }
            }
            Verdict::Dropped => {
                tracing::info!(
                    "Message ignored: received uuid {} is smaller than my uuid {}",
                    msg.token,
                    self.node_id
                );
            }
            Verdict::Forwarded => {
                tracing::debug!("Forwarding larger uuid {}", msg.token);
            }
            Verdict::Elected => {
                tracing::info!(
                    "LEADER: my own uuid {} has returned, I am the leader",
                    self.node_id
                );
                tracing::info!("leader is {}", self.node_id);
            }
            Verdict::Adopted => {
                tracing::info!("leader is {}", msg.token);
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LogCapture;
    use std::collections::VecDeque;

    fn id(n: u128) -> NodeId {
        NodeId::from_u128(n)
    }

    #[test]
    fn test_forwards_only_larger_tokens() {
        let own = id(50);

        let larger = on_message(own, ElectionState::Undecided, None, &Message::election(id(60)));
        assert_eq!(larger.verdict, Verdict::Forwarded);
        assert_eq!(larger.outgoing, Some(Message::election(id(60))));
        assert_eq!(larger.state, ElectionState::Undecided);
        assert_eq!(larger.leader, None);

        let smaller = on_message(own, ElectionState::Undecided, None, &Message::election(id(40)));
        assert_eq!(smaller.verdict, Verdict::Dropped);
        assert_eq!(smaller.outgoing, None);
        assert_eq!(smaller.state, ElectionState::Undecided);
    }

    #[test]
    fn test_own_token_elects() {
        let own = id(50);
        let decision = on_message(own, ElectionState::Undecided, None, &Message::election(own));

        assert_eq!(decision.verdict, Verdict::Elected);
        assert_eq!(decision.state, ElectionState::LeaderKnown);
        assert_eq!(decision.leader, Some(own));
        assert_eq!(decision.outgoing, Some(Message::announcement(own)));
    }

    #[test]
    fn test_leader_known_short_circuits() {
        let own = id(50);
        for msg in [
            Message::election(id(60)),
            Message::election(id(40)),
            Message::election(own),
            Message::announcement(own),
        ] {
            let decision = on_message(own, ElectionState::LeaderKnown, Some(own), &msg);
            assert_eq!(decision.verdict, Verdict::Ignored);
            assert_eq!(decision.outgoing, None);
            assert_eq!(decision.leader, Some(own));
        }
    }

    #[test]
    fn test_announcement_adopted_and_forwarded_once() {
        let own = id(10);
        let leader = id(99);
        let msg = Message::announcement(leader);

        let first = on_message(own, ElectionState::Undecided, None, &msg);
        assert_eq!(first.verdict, Verdict::Adopted);
        assert_eq!(first.leader, Some(leader));
        assert_eq!(first.state, ElectionState::LeaderKnown);
        assert_eq!(first.outgoing, Some(msg));

        let second = on_message(own, first.state, first.leader, &msg);
        assert_eq!(second.verdict, Verdict::Ignored);
        assert_eq!(second.outgoing, None);
    }

    #[test]
    fn test_comparison_words() {
        assert_eq!(comparison(id(2), id(1)), "greater");
        assert_eq!(comparison(id(1), id(2)), "less");
        assert_eq!(comparison(id(1), id(1)), "same");
    }

    /// Drive a ring to quiescence. `ids[i]` sends to `ids[(i + 1) % n]`.
    fn simulate_ring(ids: &[NodeId]) -> Vec<(ElectionState, Option<NodeId>, usize)> {
        let n = ids.len();
        let mut nodes: Vec<(ElectionState, Option<NodeId>, usize)> =
            vec![(ElectionState::Undecided, None, 0); n];
        // (receiver index, message)
        let mut in_flight: VecDeque<(usize, Message)> = (0..n)
            .map(|i| ((i + 1) % n, Message::election(ids[i])))
            .collect();

        while let Some((to, msg)) = in_flight.pop_front() {
            let (state, leader, _) = nodes[to];
            let decision = on_message(ids[to], state, leader, &msg);
            nodes[to].0 = decision.state;
            nodes[to].1 = decision.leader;
            if decision.verdict == Verdict::Elected {
                nodes[to].2 += 1;
            }
            if let Some(out) = decision.outgoing {
                in_flight.push_back(((to + 1) % n, out));
            }
        }

        nodes
    }

    #[test]
    fn test_three_node_ring() {
        // Ring A -> B -> C -> A with A < B < C.
        let (a, b, c) = (id(1), id(2), id(3));

        assert_eq!(on_message(b, ElectionState::Undecided, None, &Message::election(a)).verdict, Verdict::Dropped);
        assert_eq!(on_message(c, ElectionState::Undecided, None, &Message::election(b)).verdict, Verdict::Dropped);
        assert_eq!(on_message(a, ElectionState::Undecided, None, &Message::election(c)).verdict, Verdict::Forwarded);
        assert_eq!(on_message(b, ElectionState::Undecided, None, &Message::election(c)).verdict, Verdict::Forwarded);
        assert_eq!(on_message(c, ElectionState::Undecided, None, &Message::election(c)).verdict, Verdict::Elected);

        let nodes = simulate_ring(&[a, b, c]);
        assert_eq!(nodes[2].2, 1);
        for (state, leader, _) in &nodes {
            assert_eq!(*state, ElectionState::LeaderKnown);
            assert_eq!(*leader, Some(c));
        }
    }

    #[test]
    fn test_random_rings_elect_maximum() {
        for n in 1..=12 {
            let ids: Vec<NodeId> = (0..n).map(|_| NodeId::generate()).collect();
            let max = *ids.iter().max().unwrap();

            let nodes = simulate_ring(&ids);

            let elected: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| node.2 > 0)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(elected.len(), 1, "ring of {} elected {:?}", n, elected);
            assert_eq!(ids[elected[0]], max);
            assert_eq!(nodes[elected[0]].2, 1);

            for (state, leader, _) in &nodes {
                assert_eq!(*state, ElectionState::LeaderKnown);
                assert_eq!(*leader, Some(max));
            }
        }
    }

    #[tokio::test]
    async fn test_tracker_applies_decisions() {
        let own = id(50);
        let tracker = ElectionTracker::new(own);
        assert_eq!(tracker.state().await, ElectionState::Undecided);
        assert_eq!(tracker.leader().await, None);

        let decision = tracker.observe(&Message::election(id(70))).await;
        assert_eq!(decision.verdict, Verdict::Forwarded);
        assert_eq!(tracker.state().await, ElectionState::Undecided);

        let decision = tracker.observe(&Message::election(own)).await;
        assert_eq!(decision.verdict, Verdict::Elected);
        assert!(tracker.is_leader().await);
        assert_eq!(tracker.leader().await, Some(own));

        let decision = tracker.observe(&Message::announcement(own)).await;
        assert_eq!(decision.verdict, Verdict::Ignored);
        assert_eq!(tracker.state().await, ElectionState::LeaderKnown);
        assert_eq!(tracker.wait_for_leader().await, Some(own));
    }

    #[tokio::test]
    async fn test_observe_logs_decisions() {
        let (logs, _guard) = LogCapture::install();
        let (a, b, c) = (id(1), id(2), id(3));

        let middle = ElectionTracker::new(b);
        middle.observe(&Message::election(a)).await;
        logs.assert_line(&[&format!("Received: uuid={}, flag=0, less, state=0", a)]);
        logs.assert_line(&[&format!(
            "Message ignored: received uuid {} is smaller than my uuid {}",
            a, b
        )]);

        middle.observe(&Message::election(c)).await;
        logs.assert_line(&[&format!("Received: uuid={}, flag=0, greater, state=0", c)]);
        logs.assert_line(&[&format!("Forwarding larger uuid {}", c)]);

        middle.observe(&Message::announcement(c)).await;
        logs.assert_line(&[&format!("Received: uuid={}, flag=1, greater, state=0", c)]);
        logs.assert_line(&[&format!("leader is {}", c)]);

        middle.observe(&Message::election(a)).await;
        logs.assert_line(&[&format!(
            "Received: uuid={}, flag=0, less, state=1, leader_id={}",
            a, c
        )]);
        logs.assert_line(&[&format!("Message ignored: leader is already known to be {}", c)]);

        let largest = ElectionTracker::new(c);
        largest.observe(&Message::election(c)).await;
        logs.assert_line(&[&format!("Received: uuid={}, flag=0, same, state=0", c)]);
        logs.assert_line(&[&format!(
            "LEADER: my own uuid {} has returned, I am the leader",
            c
        )]);
    }

    #[tokio::test]
    async fn test_wait_for_leader_wakes_on_announcement() {
        let tracker = std::sync::Arc::new(ElectionTracker::new(id(5)));
        let waiter = {
            let tracker = std::sync::Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_for_leader().await })
        };

        tokio::task::yield_now().await;
        tracker.observe(&Message::announcement(id(9))).await;

        let leader = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leader, Some(id(9)));
        assert!(!tracker.is_leader().await);
    }
}
