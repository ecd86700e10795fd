//! A queue-region-routed `Publisher` binding: target names are registered
//! against a queue URL, the region is parsed out of that URL, and publish
//! looks the target back up before handing an encoded commit to the sink
//! for that region.
//!
//! Grounded on `examples/original_source/publishers/sqs/sqs.go`'s
//! `SQSPublisher`: `AddSQSRegion`/`getSQSRegion`/`RegionFromURL`, a
//! mutex-guarded `regions` map, and the three target/region error cases.
//! Generalized away from the AWS SDK (not part of the teacher's stack) by
//! routing through a `QueueSink` trait — a concrete sink (SQS, an HTTP
//! queue, a test double) plugs in per region.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::instrument;

use escore_events::codec::{Encoder, JsonCodec};
use escore_events::commit::EventCommit;
use escore_events::publisher::{AckHandler, PubAck, Publisher, PublisherError};

/// Delivers an already-encoded commit body to one concrete queue region.
/// Implementations own whatever connection/client the transport needs.
pub trait QueueSink: Send + Sync {
    fn send(&self, queue_url: &str, body: &[u8]) -> Result<Option<serde_json::Value>, String>;
}

/// Parses the region out of a queue URL of the form
/// `https://<service>.<region>.<host>/...`, matching `RegionFromURL` in the
/// Go source: split on `.` and take the second piece.
pub fn region_from_url(url: &str) -> Option<&str> {
    let pieces: Vec<&str> = url.split('.').collect();
    if pieces.len() > 2 {
        Some(pieces[1])
    } else {
        None
    }
}

struct Region<S> {
    url: String,
    sink: S,
}

/// A `Publisher` that fans out to one sink per region, addressed by a
/// caller-chosen target name (spec.md §6's `namespace` argument to
/// `Publish`).
pub struct QueueRegionPublisher<S, F> {
    encoder: JsonCodec,
    new_sink: F,
    regions: Mutex<HashMap<String, Region<S>>>,
}

impl<S, F> QueueRegionPublisher<S, F>
where
    S: QueueSink,
    F: Fn(&str) -> Result<S, String>,
{
    /// `new_sink` builds a region's sink the first time that region is
    /// registered (mirrors `NewServiceFunc` in the Go source).
    pub fn new(new_sink: F) -> Self {
        Self {
            encoder: JsonCodec,
            new_sink,
            regions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `target_name` against `queue_url`. Fails if the name is
    /// already taken, if the URL carries no discernible region, or if the
    /// sink for that region cannot be constructed.
    pub fn add_region(&self, target_name: &str, queue_url: &str) -> Result<(), PublisherError> {
        let mut regions = self.regions.lock().expect("queue region lock poisoned");
        if regions.contains_key(target_name) {
            return Err(PublisherError::TargetNameAssigned(target_name.to_string()));
        }

        let region = region_from_url(queue_url)
            .ok_or_else(|| PublisherError::URLHasNoRegion(queue_url.to_string()))?;
        let sink = (self.new_sink)(region)
            .map_err(PublisherError::TransportFailed)?;

        regions.insert(
            target_name.to_string(),
            Region { url: queue_url.to_string(), sink },
        );
        Ok(())
    }
}

impl<S, F> Publisher for QueueRegionPublisher<S, F>
where
    S: QueueSink,
    F: Fn(&str) -> Result<S, String>,
{
    #[instrument(skip(self, commit, ack))]
    fn publish(&self, namespace: &str, commit: EventCommit, ack: AckHandler) -> Result<(), PublisherError> {
        let response = {
            let regions = self.regions.lock().expect("queue region lock poisoned");
            let region = regions
                .get(namespace)
                .ok_or_else(|| PublisherError::NoRegionWithTarget(namespace.to_string()))?;

            let body = self.encoder.encode(&commit)?;
            region
                .sink
                .send(&region.url, &body)
                .map_err(PublisherError::TransportFailed)?
        };

        ack(PubAck {
            version: commit.version,
            namespace: namespace.to_string(),
            commit_id: commit.commit_id,
            instance_id: commit.instance_id,
            aggregate_id: commit.aggregate_id,
            response,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escore_core::{AggregateId, CommitId, InstanceId};
    use escore_events::event::Event;
    use escore_events::payload::Payload;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl QueueSink for RecordingSink {
        fn send(&self, queue_url: &str, _body: &[u8]) -> Result<Option<serde_json::Value>, String> {
            self.sent.lock().unwrap().push(queue_url.to_string());
            Ok(Some(serde_json::json!({"message_id": "m1"})))
        }
    }

    fn sample_commit() -> EventCommit {
        EventCommit {
            commit_id: CommitId::new("c1").unwrap(),
            aggregate_id: AggregateId::new("agg").unwrap(),
            instance_id: InstanceId::new("inst").unwrap(),
            version: escore_core::Version::new(1),
            command: "Cmd".to_string(),
            events: vec![Event::new("e", "Created", Payload::json(serde_json::json!({})))],
            created: chrono::Utc::now(),
            header: Default::default(),
        }
    }

    #[test]
    fn region_from_url_matches_go_source_splitting_rule() {
        assert_eq!(
            region_from_url("https://sqs.us-east-2.amazonaws.com/123/MyQueue"),
            Some("us-east-2")
        );
        assert_eq!(region_from_url("https://localhost/queue"), None);
    }

    #[test]
    fn add_region_rejects_duplicate_target_names() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let publisher = QueueRegionPublisher::new({
            let sent = sent.clone();
            move |_region: &str| Ok(RecordingSink { sent: sent.clone() })
        });
        publisher
            .add_region("orders", "https://sqs.us-east-2.amazonaws.com/1/orders")
            .unwrap();
        assert!(matches!(
            publisher.add_region("orders", "https://sqs.us-west-1.amazonaws.com/1/orders"),
            Err(PublisherError::TargetNameAssigned(_))
        ));
    }

    #[test]
    fn add_region_rejects_urls_without_a_region() {
        let publisher = QueueRegionPublisher::new(|_: &str| Ok(RecordingSink { sent: Arc::new(Mutex::new(Vec::new())) }));
        assert!(matches!(
            publisher.add_region("orders", "https://localhost/orders"),
            Err(PublisherError::URLHasNoRegion(_))
        ));
    }

    #[test]
    fn publish_against_unregistered_target_fails() {
        let publisher = QueueRegionPublisher::new(|_: &str| Ok(RecordingSink { sent: Arc::new(Mutex::new(Vec::new())) }));
        let result = publisher.publish("orders", sample_commit(), Box::new(|_| {}));
        assert!(matches!(result, Err(PublisherError::NoRegionWithTarget(_))));
    }

    #[test]
    fn publish_sends_and_acks_exactly_once() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let publisher = QueueRegionPublisher::new({
            let sent = sent.clone();
            move |_region: &str| Ok(RecordingSink { sent: sent.clone() })
        });
        publisher
            .add_region("orders", "https://sqs.us-east-2.amazonaws.com/1/orders")
            .unwrap();

        let acked = Arc::new(AtomicBool::new(false));
        let acked_clone = acked.clone();
        publisher
            .publish(
                "orders",
                sample_commit(),
                Box::new(move |pub_ack| {
                    assert_eq!(pub_ack.namespace, "orders");
                    assert_eq!(pub_ack.commit_id.as_str(), "c1");
                    acked_clone.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(acked.load(Ordering::SeqCst));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}
