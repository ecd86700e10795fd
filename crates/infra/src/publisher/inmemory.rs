//! An in-process `Publisher` reference implementation: commits are pushed
//! onto a shared, mutex-guarded queue rather than handed to a real
//! transport. Exercises spec.md scenario S6 ("publish acknowledges exactly
//! once") without a broker, and is what this crate's own tests use as a
//! stand-in for `queue_region::QueueRegionPublisher`.

use std::sync::{Arc, Mutex};

use escore_events::commit::EventCommit;
use escore_events::publisher::{AckHandler, PubAck, Publisher, PublisherError};

/// One accepted publish, captured for inspection by a test.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedCommit {
    pub namespace: String,
    pub commit: EventCommit,
}

/// Publishes by appending to an in-memory log and immediately acking.
/// Never fails — there is no transport to fail against.
#[derive(Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<PublishedCommit>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<PublishedCommit> {
        self.published.lock().expect("publisher lock poisoned").clone()
    }
}

impl Publisher for InMemoryPublisher {
    fn publish(&self, namespace: &str, commit: EventCommit, ack: AckHandler) -> Result<(), PublisherError> {
        let pub_ack = PubAck {
            version: commit.version,
            namespace: namespace.to_string(),
            commit_id: commit.commit_id.clone(),
            instance_id: commit.instance_id.clone(),
            aggregate_id: commit.aggregate_id.clone(),
            response: None,
        };
        self.published
            .lock()
            .expect("publisher lock poisoned")
            .push(PublishedCommit { namespace: namespace.to_string(), commit });
        ack(pub_ack);
        Ok(())
    }
}
