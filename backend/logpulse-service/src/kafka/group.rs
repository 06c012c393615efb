//! Consumer-group runtime.
//!
//! The group coordinator assigns partitions to this process. Each assigned
//! partition gets its own worker task that runs
//! [`ConsumerGroupHandler::consume_claim`] over a bounded channel of
//! messages, so batching state is never shared across partitions.
//!
//! The rdkafka driver reads the single subscription stream, dispatches every
//! message to the worker owning its partition, and applies rebalance events
//! reported by the consumer context. Offsets are stored per message through
//! [`ClaimSession::mark_message`] and committed by librdkafka's auto-commit.
//!
//! Revocation cancels the affected claims from inside the rebalance callback,
//! before librdkafka hands the partitions to another member. A cancelled
//! claim handles no further messages; the driver then joins it.

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, ClientContext, TopicPartitionList};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;

/// Messages buffered per partition before the driver waits on the worker.
const CLAIM_CHANNEL_CAPACITY: usize = 256;

/// Pause after a broker error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConsumerGroupError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

type PartitionId = (String, i32);

/// A message as handed to a partition worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl ClaimMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            // A tombstone has no payload; the handler treats it as poison.
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    fn partition_id(&self) -> PartitionId {
        (self.topic.clone(), self.partition)
    }
}

/// Records consumed offsets for the next commit.
pub trait OffsetStore: Send + Sync {
    fn mark(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumerGroupError>;
}

/// Per-claim handle given to the handler: offset marking and cancellation.
pub struct ClaimSession {
    offsets: Arc<dyn OffsetStore>,
    cancel: watch::Receiver<bool>,
}

impl ClaimSession {
    pub fn new(offsets: Arc<dyn OffsetStore>, cancel: watch::Receiver<bool>) -> Self {
        Self { offsets, cancel }
    }

    /// Mark a message consumed; it will be included in the next commit.
    pub fn mark_message(&self, message: &ClaimMessage) {
        if let Err(e) = self
            .offsets
            .mark(&message.topic, message.partition, message.offset)
        {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to store offset"
            );
        }
    }

    /// A receiver that flips to `true` when the claim is revoked or the
    /// process is shutting down.
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }
}

/// Resolves once `cancel` is set, or its sender is gone.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// The stream of messages for one assigned partition.
pub struct PartitionClaim {
    topic: String,
    partition: i32,
    messages: mpsc::Receiver<ClaimMessage>,
}

impl PartitionClaim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        messages: mpsc::Receiver<ClaimMessage>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Next message, or `None` once the runtime closed the claim.
    pub async fn recv(&mut self) -> Option<ClaimMessage> {
        self.messages.recv().await
    }
}

/// Group session hooks.
///
/// `setup` runs before claims of a new assignment start, `cleanup` after the
/// claims of a revoked assignment (or all claims at shutdown) have returned.
#[async_trait]
pub trait ConsumerGroupHandler: Send + Sync + 'static {
    async fn setup(&self) -> Result<(), ConsumerGroupError> {
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: ClaimSession,
        claim: PartitionClaim,
    ) -> Result<(), ConsumerGroupError>;

    async fn cleanup(&self) -> Result<(), ConsumerGroupError> {
        Ok(())
    }
}

/// Cancellation flags of live claims, shared with the rebalance callback.
#[derive(Default)]
pub struct ClaimCancellations {
    flags: Mutex<HashMap<PartitionId, watch::Sender<bool>>>,
}

impl ClaimCancellations {
    fn flags(&self) -> MutexGuard<'_, HashMap<PartitionId, watch::Sender<bool>>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, partition: PartitionId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.flags().insert(partition, tx);
        rx
    }

    /// Flip the flags of `partitions`; claims observe it on their next poll.
    pub fn cancel(&self, partitions: &[(String, i32)]) {
        let flags = self.flags();
        for partition in partitions {
            if let Some(flag) = flags.get(partition) {
                flag.send_replace(true);
            }
        }
    }

    pub fn is_cancelled(&self, partition: &(String, i32)) -> bool {
        self.flags()
            .get(partition)
            .map(|flag| *flag.borrow())
            .unwrap_or(false)
    }

    fn remove(&self, partition: &PartitionId) {
        self.flags().remove(partition);
    }
}

struct PartitionWorker {
    messages: mpsc::Sender<ClaimMessage>,
    handle: JoinHandle<()>,
}

/// Owns the partition workers of this group member.
pub struct ClaimDispatcher<H: ConsumerGroupHandler> {
    handler: Arc<H>,
    offsets: Arc<dyn OffsetStore>,
    cancellations: Arc<ClaimCancellations>,
    workers: HashMap<PartitionId, PartitionWorker>,
    capacity: usize,
}

impl<H: ConsumerGroupHandler> ClaimDispatcher<H> {
    pub fn new(handler: Arc<H>, offsets: Arc<dyn OffsetStore>, capacity: usize) -> Self {
        Self::with_cancellations(handler, offsets, Arc::default(), capacity)
    }

    pub fn with_cancellations(
        handler: Arc<H>,
        offsets: Arc<dyn OffsetStore>,
        cancellations: Arc<ClaimCancellations>,
        capacity: usize,
    ) -> Self {
        Self {
            handler,
            offsets,
            cancellations,
            workers: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn cancellations(&self) -> Arc<ClaimCancellations> {
        self.cancellations.clone()
    }

    /// Currently claimed partitions, sorted.
    pub fn claimed(&self) -> Vec<(String, i32)> {
        let mut claimed: Vec<_> = self.workers.keys().cloned().collect();
        claimed.sort();
        claimed
    }

    pub async fn assign(&mut self, partitions: Vec<(String, i32)>) {
        if partitions.is_empty() {
            return;
        }
        if let Err(e) = self.handler.setup().await {
            error!(error = %e, "Consumer group setup hook failed");
        }
        for partition in partitions {
            if !self.workers.contains_key(&partition) {
                self.spawn_worker(partition);
            }
        }
    }

    /// Stop the workers for `partitions`; each flushes before returning.
    pub async fn revoke(&mut self, partitions: &[(String, i32)]) {
        self.cancellations.cancel(partitions);

        let mut stopped = 0;
        for partition in partitions {
            if let Some(worker) = self.workers.remove(partition) {
                self.stop_worker(partition, worker).await;
                stopped += 1;
            }
        }
        if stopped > 0 {
            if let Err(e) = self.handler.cleanup().await {
                error!(error = %e, "Consumer group cleanup hook failed");
            }
        }
    }

    /// Route a message to its partition's claim.
    ///
    /// Messages for partitions that are not assigned, or are being revoked,
    /// are dropped; the partition's next owner reads them again.
    pub async fn dispatch(&mut self, message: ClaimMessage) {
        let partition = message.partition_id();
        if self.cancellations.is_cancelled(&partition) {
            debug!(
                topic = %partition.0,
                partition = partition.1,
                offset = message.offset,
                "Dropping message for revoked partition"
            );
            return;
        }
        let Some(worker) = self.workers.get(&partition) else {
            warn!(
                topic = %partition.0,
                partition = partition.1,
                offset = message.offset,
                "Dropping message for unassigned partition"
            );
            return;
        };

        let sent = worker.messages.send(message).await;
        if let Err(mpsc::error::SendError(message)) = sent {
            // The previous claim returned early; start a fresh one.
            warn!(
                topic = %partition.0,
                partition = partition.1,
                "Partition worker exited, restarting claim"
            );
            if let Some(old) = self.workers.remove(&partition) {
                self.stop_worker(&partition, old).await;
            }
            self.spawn_worker(partition.clone());
            if let Some(worker) = self.workers.get(&partition) {
                if worker.messages.send(message).await.is_err() {
                    error!(
                        topic = %partition.0,
                        partition = partition.1,
                        "Dropping message: partition worker unavailable"
                    );
                }
            }
        }
    }

    /// Cancel every claim, wait for them, then run the cleanup hook.
    pub async fn shutdown(&mut self) {
        let workers: Vec<_> = self.workers.drain().collect();
        let partitions: Vec<_> = workers.iter().map(|(p, _)| p.clone()).collect();
        self.cancellations.cancel(&partitions);

        for (partition, worker) in workers {
            self.stop_worker(&partition, worker).await;
        }
        if let Err(e) = self.handler.cleanup().await {
            error!(error = %e, "Consumer group cleanup hook failed");
        }
    }

    fn spawn_worker(&mut self, partition: PartitionId) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel_rx = self.cancellations.register(partition.clone());
        let session = ClaimSession::new(self.offsets.clone(), cancel_rx);
        let claim = PartitionClaim::new(partition.0.clone(), partition.1, rx);
        let handler = self.handler.clone();
        let (topic, number) = partition.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = handler.consume_claim(session, claim).await {
                error!(topic = %topic, partition = number, error = %e, "Partition claim failed");
            }
        });

        debug!(topic = %partition.0, partition = partition.1, "Partition claim started");
        self.workers.insert(
            partition,
            PartitionWorker {
                messages: tx,
                handle,
            },
        );
    }

    /// Cancel the claim and wait for it. Messages still queued for it are
    /// discarded with the channel.
    async fn stop_worker(&self, partition: &PartitionId, worker: PartitionWorker) {
        self.cancellations.cancel(std::slice::from_ref(partition));
        drop(worker.messages);
        if let Err(e) = worker.handle.await {
            error!(topic = %partition.0, partition = partition.1, error = %e, "Partition worker panicked");
        }
        self.cancellations.remove(partition);
        debug!(topic = %partition.0, partition = partition.1, "Partition claim stopped");
    }
}

#[derive(Debug)]
enum RebalanceEvent {
    Assigned(Vec<PartitionId>),
    Revoked(Vec<PartitionId>),
}

fn partition_ids(list: &TopicPartitionList) -> Vec<PartitionId> {
    list.elements()
        .iter()
        .map(|elem| (elem.topic().to_string(), elem.partition()))
        .collect()
}

/// Forwards rebalance callbacks to the driver loop.
struct RebalanceContext {
    events: mpsc::UnboundedSender<RebalanceEvent>,
    cancellations: Arc<ClaimCancellations>,
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(list) = rebalance {
            let partitions = partition_ids(list);
            info!(count = partitions.len(), "Partitions revoked");
            // Runs before librdkafka unassigns; the driver joins the claims later.
            self.cancellations.cancel(&partitions);
            let _ = self.events.send(RebalanceEvent::Revoked(partitions));
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(list) => {
                let partitions = partition_ids(list);
                info!(count = partitions.len(), "Partitions assigned");
                let _ = self.events.send(RebalanceEvent::Assigned(partitions));
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(e) => warn!("Rebalance error: {}", e),
        }
    }
}

type GroupConsumer = StreamConsumer<RebalanceContext>;

struct KafkaOffsetStore {
    consumer: Arc<GroupConsumer>,
}

impl OffsetStore for KafkaOffsetStore {
    fn mark(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumerGroupError> {
        self.consumer.store_offset(topic, partition, offset)?;
        Ok(())
    }
}

/// A subscribed member of the indexing consumer group.
pub struct KafkaConsumerGroup {
    consumer: Arc<GroupConsumer>,
    events: mpsc::UnboundedReceiver<RebalanceEvent>,
    cancellations: Arc<ClaimCancellations>,
    topic: String,
}

impl KafkaConsumerGroup {
    /// Create the consumer and subscribe; fails fast on bad configuration.
    pub fn new(config: &KafkaConfig) -> Result<Self, ConsumerGroupError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancellations = Arc::new(ClaimCancellations::default());

        let consumer: GroupConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            // Only offsets marked by a claim are committed.
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .set("enable.partition.eof", "false")
            .create_with_context(RebalanceContext {
                events: tx,
                cancellations: cancellations.clone(),
            })?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer group member subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            events: rx,
            cancellations,
            topic: config.topic.clone(),
        })
    }

    /// Drive the group until `shutdown` flips, then stop every claim.
    pub async fn run<H: ConsumerGroupHandler>(
        mut self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let offsets: Arc<dyn OffsetStore> = Arc::new(KafkaOffsetStore {
            consumer: self.consumer.clone(),
        });
        let mut dispatcher = ClaimDispatcher::with_cancellations(
            handler,
            offsets,
            self.cancellations.clone(),
            CLAIM_CHANNEL_CAPACITY,
        );

        info!(topic = %self.topic, "Consumer group loop started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if should_stop(changed, &shutdown) {
                        info!("Consumer group shutdown signal received");
                        break;
                    }
                }
                Some(event) = self.events.recv() => match event {
                    RebalanceEvent::Assigned(partitions) => dispatcher.assign(partitions).await,
                    RebalanceEvent::Revoked(partitions) => dispatcher.revoke(&partitions).await,
                },
                result = self.consumer.recv() => match result {
                    Ok(msg) => {
                        let message = ClaimMessage::from_borrowed(&msg);
                        dispatcher.dispatch(message).await;
                    }
                    Err(e) => {
                        error!("Kafka consumer error: {}", e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                },
            }
        }

        dispatcher.shutdown().await;
        info!(topic = %self.topic, "Consumer group loop stopped");
    }
}

/// A dropped shutdown sender stops the driver like an explicit signal.
fn should_stop(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOffsets;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Marks every message and records which partition saw which offsets.
    #[derive(Default)]
    struct EchoHandler {
        seen: Mutex<Vec<(i32, i64)>>,
        setups: AtomicUsize,
        cleanups: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl ConsumerGroupHandler for EchoHandler {
        async fn setup(&self) -> Result<(), ConsumerGroupError> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn consume_claim(
            &self,
            session: ClaimSession,
            mut claim: PartitionClaim,
        ) -> Result<(), ConsumerGroupError> {
            let mut cancel = session.cancellation();
            loop {
                tokio::select! {
                    biased;

                    _ = cancelled(&mut cancel) => break,
                    message = claim.recv() => {
                        let Some(message) = message else { break };
                        assert_eq!(message.partition, claim.partition());
                        self.seen.lock().unwrap().push((message.partition, message.offset));
                        session.mark_message(&message);
                    }
                }
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(&self) -> Result<(), ConsumerGroupError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn message(partition: i32, offset: i64) -> ClaimMessage {
        ClaimMessage {
            topic: "logs".into(),
            partition,
            offset,
            payload: b"{}".to_vec(),
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn assignment_runs_setup_and_one_worker_per_partition() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets, 8);

        dispatcher
            .assign(vec![("logs".into(), 0), ("logs".into(), 1)])
            .await;

        assert_eq!(handler.setups.load(Ordering::SeqCst), 1);
        assert_eq!(
            dispatcher.claimed(),
            vec![("logs".to_string(), 0), ("logs".to_string(), 1)]
        );
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn messages_reach_their_partition_worker_and_are_marked() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets.clone(), 8);

        dispatcher
            .assign(vec![("logs".into(), 0), ("logs".into(), 1)])
            .await;
        dispatcher.dispatch(message(0, 10)).await;
        dispatcher.dispatch(message(1, 20)).await;
        dispatcher.dispatch(message(0, 11)).await;
        settle().await;

        let seen = handler.seen.lock().unwrap().clone();
        let p0: Vec<i64> = seen.iter().filter(|(p, _)| *p == 0).map(|(_, o)| *o).collect();
        assert_eq!(p0, vec![10, 11]);
        assert_eq!(offsets.marked().len(), 3);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn revoke_stops_only_revoked_claims() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets, 8);

        dispatcher
            .assign(vec![("logs".into(), 0), ("logs".into(), 1)])
            .await;
        dispatcher.revoke(&[("logs".into(), 0)]).await;

        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
        assert_eq!(handler.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.claimed(), vec![("logs".to_string(), 1)]);

        dispatcher.shutdown().await;
        assert_eq!(handler.finished.load(Ordering::SeqCst), 2);
        assert_eq!(handler.cleanups.load(Ordering::SeqCst), 2);
        assert!(dispatcher.claimed().is_empty());
    }

    #[tokio::test]
    async fn revoking_unknown_partition_skips_cleanup() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets, 8);

        dispatcher.revoke(&[("logs".into(), 7)]).await;
        assert_eq!(handler.cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unassigned_and_revoked_partitions_get_no_worker() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets.clone(), 8);

        dispatcher.dispatch(message(3, 1)).await;
        assert!(dispatcher.claimed().is_empty());

        dispatcher.assign(vec![("logs".into(), 0)]).await;
        dispatcher.revoke(&[("logs".into(), 0)]).await;
        dispatcher.dispatch(message(0, 2)).await;
        settle().await;

        assert!(dispatcher.claimed().is_empty());
        assert!(handler.seen.lock().unwrap().is_empty());
        assert!(offsets.marked().is_empty());
        assert_eq!(handler.setups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rebalance_cancellation_stops_routing_before_revoke_is_handled() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets.clone(), 8);
        let partition: PartitionId = ("logs".into(), 0);

        dispatcher.assign(vec![partition.clone()]).await;
        dispatcher.dispatch(message(0, 1)).await;
        settle().await;

        // What the rebalance callback does ahead of the driver.
        dispatcher.cancellations().cancel(std::slice::from_ref(&partition));
        assert!(dispatcher.cancellations().is_cancelled(&partition));
        dispatcher.dispatch(message(0, 2)).await;
        settle().await;

        assert_eq!(handler.seen.lock().unwrap().clone(), vec![(0, 1)]);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);

        dispatcher.revoke(std::slice::from_ref(&partition)).await;
        assert!(dispatcher.claimed().is_empty());
        assert!(!dispatcher.cancellations().is_cancelled(&partition));
    }

    #[tokio::test]
    async fn reassigned_partition_starts_uncancelled() {
        let handler = Arc::new(EchoHandler::default());
        let offsets = Arc::new(RecordingOffsets::default());
        let mut dispatcher = ClaimDispatcher::new(handler.clone(), offsets, 8);

        dispatcher.assign(vec![("logs".into(), 0)]).await;
        dispatcher.revoke(&[("logs".into(), 0)]).await;
        dispatcher.assign(vec![("logs".into(), 0)]).await;
        dispatcher.dispatch(message(0, 5)).await;
        settle().await;

        assert_eq!(handler.seen.lock().unwrap().clone(), vec![(0, 5)]);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn driver_stops_when_shutdown_sender_is_dropped() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(false).unwrap();
        let changed = rx.changed().await;
        assert!(!should_stop(changed, &rx));

        drop(tx);
        let changed = rx.changed().await;
        assert!(should_stop(changed, &rx));
    }

    #[tokio::test]
    async fn cancellation_resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        cancelled(&mut rx).await;
    }
}
