//! Per-connection dashboard session

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use votechain_cli::Snapshot;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribed,
    /// Terminal
    Closed,
}

/// Snapshot tagged with the number of ledger entries it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedSnapshot {
    pub sequence: u64,
    pub snapshot: Snapshot,
}

impl SequencedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            sequence: snapshot.ballot_count(),
            snapshot,
        }
    }
}

/// Only the snapshot itself goes on the wire.
impl Serialize for SequencedSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot.serialize(serializer)
    }
}

pub type Delivery = Arc<SequencedSnapshot>;

/// Sending half registered with a broadcaster group.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub sender: mpsc::Sender<Delivery>,
}

/// Receiving half owned by the connection task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    last_sequence: Option<u64>,
    receiver: mpsc::Receiver<Delivery>,
    handle: Option<SessionHandle>,
}

impl Session {
    pub(crate) fn new(id: SessionId, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        Self {
            id,
            state: SessionState::Connecting,
            last_sequence: None,
            receiver,
            handle: Some(SessionHandle { id, sender }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub(crate) fn take_handle(&mut self) -> Option<SessionHandle> {
        self.handle.take()
    }

    pub(crate) fn mark_subscribed(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Subscribed;
        }
    }

    pub(crate) fn close(&mut self) {
        self.state = SessionState::Closed;
        self.handle = None;
        self.receiver.close();
    }

    /// Records `delivery` as the latest seen unless it is not newer than
    /// what was already delivered.
    pub fn accept(&mut self, delivery: &SequencedSnapshot) -> bool {
        match self.last_sequence {
            Some(last) if delivery.sequence <= last => false,
            _ => {
                self.last_sequence = Some(delivery.sequence);
                true
            }
        }
    }

    /// Next snapshot newer than anything delivered so far. `None` once the
    /// session is closed or dropped by its broadcaster.
    pub async fn recv(&mut self) -> Option<Delivery> {
        while let Some(delivery) = self.receiver.recv().await {
            if self.accept(&delivery) {
                return Some(delivery);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use votechain_cli::BallotSchema;

    fn sequenced(sequence: u64) -> SequencedSnapshot {
        let schema = BallotSchema::from_json(r#"{"President":["Alice"]}"#).unwrap();
        SequencedSnapshot {
            sequence,
            snapshot: Snapshot::build(&schema, &[]),
        }
    }

    #[test]
    fn test_stale_snapshots_are_discarded() {
        let mut session = Session::new(1, 4);
        assert!(session.accept(&sequenced(0)));
        assert!(session.accept(&sequenced(2)));
        assert!(!session.accept(&sequenced(1)));
        assert!(!session.accept(&sequenced(2)));
        assert!(session.accept(&sequenced(3)));
        assert_eq!(session.last_sequence(), Some(3));
    }

    #[tokio::test]
    async fn test_recv_skips_out_of_order_deliveries() {
        let mut session = Session::new(1, 4);
        let handle = session.take_handle().unwrap();
        for sequence in [5, 4, 6] {
            handle.sender.send(Arc::new(sequenced(sequence))).await.unwrap();
        }
        drop(handle);

        assert_eq!(session.recv().await.unwrap().sequence, 5);
        assert_eq!(session.recv().await.unwrap().sequence, 6);
        assert!(session.recv().await.is_none());
    }

    #[test]
    fn test_wire_form_is_the_bare_snapshot() {
        let json = serde_json::to_value(sequenced(0)).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 2);
        assert!(json["tally"].is_array());
        assert!(json["ledger"].is_array());
    }

    #[test]
    fn test_state_transitions() {
        let mut session = Session::new(1, 1);
        assert_eq!(session.state(), SessionState::Connecting);
        session.mark_subscribed();
        assert_eq!(session.state(), SessionState::Subscribed);
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        session.mark_subscribed();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
