use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use super::session::{Delivery, SessionHandle, SessionId};
use crate::error::Error;

/// Group pub/sub transport for dashboard sessions.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    fn subscribe(&self, group: &str, handle: SessionHandle);

    /// Idempotent. Returns whether the session was registered.
    fn unsubscribe(&self, session: SessionId) -> bool;

    /// Best-effort delivery to every session in `group`. Returns one error per
    /// session that could not take the message.
    async fn publish(&self, group: &str, message: Delivery) -> Vec<Error>;

    /// Delivery to a single registered session.
    async fn send_to(&self, session: SessionId, message: Delivery) -> Result<(), Error>;

    fn group_size(&self, group: &str) -> usize;

    fn session_count(&self) -> usize;
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, (String, SessionHandle)>,
    groups: HashMap<String, HashSet<SessionId>>,
}

impl Registry {
    fn remove(&mut self, session: SessionId) -> bool {
        let Some((group, _)) = self.sessions.remove(&session) else {
            return false;
        };
        if let Some(members) = self.groups.get_mut(&group) {
            members.remove(&session);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
        true
    }
}

/// Broadcaster over bounded in-process channels. A full channel fails that
/// delivery only; a closed channel also drops the session from its group.
#[derive(Default)]
pub struct InProcessBroadcaster {
    registry: Mutex<Registry>,
}

impl InProcessBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn deliver(handle: &SessionHandle, message: Delivery) -> Result<(), (Error, bool)> {
    match handle.sender.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => Err((
            Error::Broadcast {
                session: handle.id,
                reason: "session buffer full".into(),
            },
            false,
        )),
        Err(TrySendError::Closed(_)) => Err((
            Error::Broadcast {
                session: handle.id,
                reason: "session closed".into(),
            },
            true,
        )),
    }
}

#[async_trait]
impl Broadcaster for InProcessBroadcaster {
    fn subscribe(&self, group: &str, handle: SessionHandle) {
        let mut registry = self.registry();
        let id = handle.id;
        registry.remove(id);
        registry
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(id);
        registry.sessions.insert(id, (group.to_string(), handle));
        debug!("Session {} joined group {}", id, group);
    }

    fn unsubscribe(&self, session: SessionId) -> bool {
        self.registry().remove(session)
    }

    async fn publish(&self, group: &str, message: Delivery) -> Vec<Error> {
        let mut registry = self.registry();
        let members: Vec<SessionId> = registry
            .groups
            .get(group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();

        let mut failures = Vec::new();
        for id in members {
            let Some((_, handle)) = registry.sessions.get(&id) else {
                continue;
            };
            if let Err((err, closed)) = deliver(handle, message.clone()) {
                if closed {
                    registry.remove(id);
                }
                failures.push(err);
            }
        }
        failures
    }

    async fn send_to(&self, session: SessionId, message: Delivery) -> Result<(), Error> {
        let mut registry = self.registry();
        let Some((_, handle)) = registry.sessions.get(&session) else {
            return Err(Error::Broadcast {
                session,
                reason: "session not subscribed".into(),
            });
        };
        deliver(handle, message).map_err(|(err, closed)| {
            if closed {
                registry.remove(session);
            }
            err
        })
    }

    fn group_size(&self, group: &str) -> usize {
        self.registry().groups.get(group).map_or(0, HashSet::len)
    }

    fn session_count(&self) -> usize {
        self.registry().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::session::{SequencedSnapshot, Session};
    use std::sync::Arc;
    use votechain_cli::{BallotSchema, Snapshot};

    fn delivery(sequence: u64) -> Delivery {
        let schema = BallotSchema::from_json(r#"{"President":["Alice"]}"#).unwrap();
        Arc::new(SequencedSnapshot {
            sequence,
            snapshot: Snapshot::build(&schema, &[]),
        })
    }

    fn join(broadcaster: &InProcessBroadcaster, group: &str, id: SessionId, buffer: usize) -> Session {
        let mut session = Session::new(id, buffer);
        broadcaster.subscribe(group, session.take_handle().unwrap());
        session
    }

    #[tokio::test]
    async fn test_publish_reaches_only_the_group() {
        let broadcaster = InProcessBroadcaster::new();
        let mut a = join(&broadcaster, "e1", 1, 4);
        let mut b = join(&broadcaster, "e1", 2, 4);
        let mut other = join(&broadcaster, "e2", 3, 4);

        assert!(broadcaster.publish("e1", delivery(1)).await.is_empty());
        assert_eq!(a.recv().await.unwrap().sequence, 1);
        assert_eq!(b.recv().await.unwrap().sequence, 1);

        broadcaster.unsubscribe(3);
        assert!(other.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dead_session_does_not_block_others() {
        let broadcaster = InProcessBroadcaster::new();
        let mut alive = join(&broadcaster, "e1", 1, 4);
        let dead = join(&broadcaster, "e1", 2, 4);
        drop(dead);

        let failures = broadcaster.publish("e1", delivery(1)).await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], Error::Broadcast { session: 2, .. }));
        assert_eq!(alive.recv().await.unwrap().sequence, 1);
        assert_eq!(broadcaster.group_size("e1"), 1);
    }

    #[tokio::test]
    async fn test_full_session_keeps_its_subscription() {
        let broadcaster = InProcessBroadcaster::new();
        let mut slow = join(&broadcaster, "e1", 1, 1);

        assert!(broadcaster.publish("e1", delivery(1)).await.is_empty());
        assert_eq!(broadcaster.publish("e1", delivery(2)).await.len(), 1);
        assert_eq!(broadcaster.group_size("e1"), 1);

        assert_eq!(slow.recv().await.unwrap().sequence, 1);
        assert!(broadcaster.publish("e1", delivery(3)).await.is_empty());
        assert_eq!(slow.recv().await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broadcaster = InProcessBroadcaster::new();
        let _session = join(&broadcaster, "e1", 1, 4);
        assert!(broadcaster.unsubscribe(1));
        assert!(!broadcaster.unsubscribe(1));
        assert_eq!(broadcaster.session_count(), 0);
        assert_eq!(broadcaster.group_size("e1"), 0);
        assert!(broadcaster.send_to(1, delivery(0)).await.is_err());
    }
}
