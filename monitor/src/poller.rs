/*
Drives the relay for one remote program run. The poller resolves the logical topic keys,
then repeatedly sends one combined fetch request for every topic, republishes what comes
back into the local message store and commits the new offsets.

    STARTING -> POLLING <-> BACKOFF -> STOPPING -> STOPPED
                   \
                    -> FAILED

Messages are always republished before the offset that covers them is committed, so a
crash can replay messages but never skip one. A stop request abandons whatever the
poller is waiting on, including an in-flight fetch, and nothing is committed after it.
*/

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, warn};
use runtime_relay_net::{
    contracts::v1::{
        requests::{ConsumeRequest, ConsumeRequests, TopicKeys},
        responses::TopicMessages,
    },
    data_types::{MessageId, TopicKey, TopicName},
};
use runtime_relay_storage::{message_store::MessageStore, offset_store::OffsetStore};
use tokio::{sync::watch, task::JoinHandle, time};

use crate::{
    backoff::Backoff,
    errors::{RelayError, RelayResult},
    settings::{RelaySettings, TopicNotFoundPolicy},
    transport::{BatchSink, RelayTransport},
};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Polling,
    Backoff,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MonitorState::Starting => "STARTING",
            MonitorState::Polling => "POLLING",
            MonitorState::Backoff => "BACKOFF",
            MonitorState::Stopping => "STOPPING",
            MonitorState::Stopped => "STOPPED",
            MonitorState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How the monitor ended. A failed monitor did not call the remote shutdown endpoint,
/// its owner decides whether to restart the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Stopped,
    Failed(RelayError),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleSummary {
    pub message_count: usize,
    /// Some topic returned as many messages as it asked for, so more are probably waiting
    pub drain: bool,
    pub topics_not_found: Vec<TopicKey>,
}

struct TopicProgress {
    remote_topic: TopicName,
    local_topic: TopicName,
    last_message_id: Option<MessageId>,
    not_found_count: u32,
}

/// Handles the elements of one fetch response as they are decoded
struct CycleSink<'a> {
    topics: &'a mut BTreeMap<TopicKey, TopicProgress>,
    local_store: &'a dyn MessageStore,
    offset_store: &'a dyn OffsetStore,
    subscriber: &'a str,
    stop_receiver: &'a watch::Receiver<bool>,
    received: BTreeMap<TopicKey, usize>,
    not_found: BTreeSet<TopicKey>,
    remote_failures: BTreeSet<TopicKey>,
}

impl<'a> BatchSink for CycleSink<'a> {
    fn accept(self: &mut Self, batch: TopicMessages) -> RelayResult<()> {
        if *self.stop_receiver.borrow() {
            return Err(RelayError::Stopped);
        }

        let progress = match self.topics.get_mut(&batch.topic) {
            Some(progress) => progress,
            None => {
                return Err(RelayError::malformed(format!(
                    "Response contains topic {} which was not requested",
                    batch.topic
                )))
            }
        };

        if let Some(error) = &batch.error {
            if batch.is_topic_not_found() {
                self.not_found.insert(batch.topic.clone());
            } else {
                warn!("RuntimeMonitor: Remote failed to read {}: {}", batch.topic, error);
                self.remote_failures.insert(batch.topic.clone());
            }
            return Ok(());
        }

        for message in &batch.messages {
            self.local_store
                .publish(&progress.local_topic, &message.payload)
                .map_err(RelayError::store)?;
        }

        if let Some(last_id) = batch.last_message_id() {
            if progress.last_message_id.as_ref() != Some(last_id) {
                self.offset_store
                    .put(&progress.remote_topic, self.subscriber, last_id)
                    .map_err(RelayError::store)?;
                progress.last_message_id = Some(last_id.clone());
            }
        }

        let count = batch.messages.len();
        *self.received.entry(batch.topic).or_insert(0) += count;
        Ok(())
    }
}

pub struct RuntimeMonitor {
    settings: RelaySettings,
    transport: Arc<dyn RelayTransport>,
    local_store: Arc<dyn MessageStore>,
    offset_store: Arc<dyn OffsetStore>,
    topics: BTreeMap<TopicKey, TopicProgress>,
    unresolved: TopicKeys,
    dropped: TopicKeys,
    backoff: Backoff,
    shutdown_timeout: Duration,
    state_sender: watch::Sender<MonitorState>,
    stop_receiver: watch::Receiver<bool>,
}

impl RuntimeMonitor {
    pub fn new(
        settings: RelaySettings,
        transport: Arc<dyn RelayTransport>,
        local_store: Arc<dyn MessageStore>,
        offset_store: Arc<dyn OffsetStore>,
    ) -> Self {
        let unresolved = settings
            .topics
            .iter()
            .filter(|key| !key.trim().is_empty())
            .cloned()
            .collect();
        let backoff = Backoff::new(
            settings.initial_backoff(),
            settings.max_backoff(),
            settings.max_consecutive_failures,
        );
        let (state_sender, _) = watch::channel(MonitorState::Starting);
        let (_, stop_receiver) = watch::channel(false);

        Self {
            settings,
            transport,
            local_store,
            offset_store,
            topics: BTreeMap::new(),
            unresolved,
            dropped: TopicKeys::new(),
            backoff,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            state_sender,
            stop_receiver,
        }
    }

    /// Upper bound on the best effort shutdown call made when stopping
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn state(self: &Self) -> MonitorState {
        *self.state_sender.borrow()
    }

    /// Keys that the remote has not resolved yet
    pub fn unresolved_topics(self: &Self) -> Vec<TopicKey> {
        self.unresolved.iter().cloned().collect()
    }

    /// Keys given up on under the drop-topic policy
    pub fn dropped_topics(self: &Self) -> Vec<TopicKey> {
        self.dropped.iter().cloned().collect()
    }

    /// Remote topic name and last committed message id for each resolved key
    pub fn resolved_topics(self: &Self) -> BTreeMap<TopicKey, (TopicName, Option<MessageId>)> {
        self.topics
            .iter()
            .map(|(key, progress)| {
                (key.clone(), (progress.remote_topic.clone(), progress.last_message_id.clone()))
            })
            .collect()
    }

    /// Runs the monitor on the tokio runtime until it is stopped or fails
    pub fn start(mut self) -> MonitorHandle {
        let (stop_sender, stop_receiver) = watch::channel(false);
        self.stop_receiver = stop_receiver;
        let state_receiver = self.state_sender.subscribe();

        MonitorHandle {
            stop_sender: Arc::new(stop_sender),
            state_receiver,
            task: Some(tokio::spawn(self.run())),
            outcome: None,
        }
    }

    /// Asks the remote for the keys that are not resolved yet and loads the last
    /// committed offset of every newly resolved topic. Returns how many were resolved.
    pub async fn resolve_topics(self: &mut Self) -> RelayResult<usize> {
        if self.unresolved.is_empty() {
            return Ok(0);
        }

        let mapping = self.transport.resolve_topics(&self.unresolved).await?;

        let mut resolved = 0;
        for (key, remote_topic) in mapping {
            if remote_topic.trim().is_empty() || !self.unresolved.contains(&key) {
                continue;
            }

            let last_message_id = self
                .offset_store
                .get(&remote_topic, &self.settings.subscriber)
                .map_err(RelayError::store)?;

            info!(
                "RuntimeMonitor: Resolved {key} to {remote_topic}, resuming after {}",
                last_message_id.as_deref().unwrap_or("the beginning")
            );

            self.unresolved.remove(&key);
            self.topics.insert(
                key.clone(),
                TopicProgress {
                    local_topic: self.settings.local_topic(&key),
                    remote_topic,
                    last_message_id,
                    not_found_count: 0,
                },
            );
            resolved += 1;
        }

        if !self.unresolved.is_empty() {
            debug!("RuntimeMonitor: Still waiting for {:?} to be resolved", self.unresolved);
        }
        Ok(resolved)
    }

    /// Fetches once for every resolved topic, republishes the messages locally and
    /// commits offsets as each element of the response is handled
    pub async fn poll_cycle(self: &mut Self) -> RelayResult<CycleSummary> {
        if self.topics.is_empty() {
            return Ok(CycleSummary::default());
        }

        let limit = self.settings.batch_limit;
        let requests: ConsumeRequests = self
            .topics
            .iter()
            .map(|(key, progress)| {
                (key.clone(), ConsumeRequest::new(progress.last_message_id.clone(), limit))
            })
            .collect();

        let transport = Arc::clone(&self.transport);
        let mut sink = CycleSink {
            topics: &mut self.topics,
            local_store: self.local_store.as_ref(),
            offset_store: self.offset_store.as_ref(),
            subscriber: &self.settings.subscriber,
            stop_receiver: &self.stop_receiver,
            received: BTreeMap::new(),
            not_found: BTreeSet::new(),
            remote_failures: BTreeSet::new(),
        };

        let result = transport.fetch(&requests, &mut sink).await;
        let CycleSink {
            received,
            not_found,
            remote_failures,
            ..
        } = sink;
        result?;

        let mut summary = CycleSummary::default();
        for count in received.values() {
            summary.message_count += count;
            if *count >= limit as usize {
                summary.drain = true;
            }
        }

        for (key, progress) in self.topics.iter_mut() {
            if not_found.contains(key) {
                progress.not_found_count += 1;
            } else {
                progress.not_found_count = 0;
            }
        }

        for key in &not_found {
            self.topic_not_found(key)?;
        }
        summary.topics_not_found = not_found.into_iter().collect();

        #[cfg(debug_assertions)]
        debug!(
            "RuntimeMonitor: Relayed {} messages for {} topics",
            summary.message_count,
            received.len()
        );

        if !remote_failures.is_empty() {
            let topics: Vec<TopicKey> = remote_failures.into_iter().collect();
            return Err(RelayError::transient(format!(
                "Remote store failed to read {}",
                topics.join(", ")
            )));
        }

        Ok(summary)
    }

    fn topic_not_found(self: &mut Self, key: &str) -> RelayResult<()> {
        let count = match self.topics.get(key) {
            Some(progress) => progress.not_found_count,
            None => return Ok(()),
        };
        warn!("RuntimeMonitor: Topic {key} was not found on the remote {count} times in a row");

        if count < self.settings.topic_not_found_threshold {
            return Ok(());
        }

        match self.settings.topic_not_found_policy {
            TopicNotFoundPolicy::Retry => Ok(()),
            TopicNotFoundPolicy::DropTopic => {
                warn!("RuntimeMonitor: No longer relaying {key}");
                self.topics.remove(key);
                self.dropped.insert(key.to_owned());
                Ok(())
            }
            TopicNotFoundPolicy::Fail => Err(RelayError::TopicNotFound {
                topic: key.to_owned(),
            }),
        }
    }

    async fn run(mut self) -> MonitorOutcome {
        let mut stop_receiver = self.stop_receiver.clone();

        let failure = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_receiver) => None,
            failure = self.relay() => Some(failure),
        };

        // A stop can land while the relay branch is still handling a response
        let failure = match failure {
            Some(RelayError::Stopped) => None,
            Some(_) if *self.stop_receiver.borrow() => None,
            failure => failure,
        };

        match failure {
            Some(err) => {
                error!("RuntimeMonitor: Relay failed: {err}");
                self.set_state(MonitorState::Failed);
                MonitorOutcome::Failed(err)
            }
            None => {
                self.set_state(MonitorState::Stopping);
                self.request_remote_shutdown().await;
                self.set_state(MonitorState::Stopped);
                MonitorOutcome::Stopped
            }
        }
    }

    /// Only returns when the relay cannot carry on
    async fn relay(self: &mut Self) -> RelayError {
        if let Err(err) = self.start_topics().await {
            return err;
        }

        loop {
            self.set_state(MonitorState::Polling);

            let delay = match self.poll_cycle().await {
                Ok(summary) => {
                    self.backoff.reset();
                    if summary.drain {
                        continue;
                    }
                    self.settings.poll_interval()
                }
                Err(err) => match self.retry_delay(err) {
                    Ok(delay) => delay,
                    Err(err) => return err,
                },
            };

            self.set_state(MonitorState::Backoff);
            if let Err(err) = self.resolve_topics().await {
                warn!("RuntimeMonitor: Unable to resolve {:?}: {err}", self.unresolved);
            }
            time::sleep(delay).await;
        }
    }

    /// Stays in STARTING until at least one key resolves
    async fn start_topics(self: &mut Self) -> RelayResult<()> {
        self.set_state(MonitorState::Starting);
        if let Some(msg) = self.settings.validate() {
            return Err(RelayError::InvalidSettings { msg });
        }
        if self.unresolved.is_empty() && self.topics.is_empty() {
            return Err(RelayError::Internal {
                msg: String::from("No topics are configured"),
            });
        }

        loop {
            let delay = match self.resolve_topics().await {
                Ok(_) if !self.topics.is_empty() => {
                    self.backoff.reset();
                    return Ok(());
                }
                Ok(_) => {
                    info!(
                        "RuntimeMonitor: None of {:?} are available on the remote yet",
                        self.unresolved
                    );
                    self.settings.poll_interval()
                }
                Err(err) => self.retry_delay(err)?,
            };
            time::sleep(delay).await;
        }
    }

    fn retry_delay(self: &mut Self, err: RelayError) -> RelayResult<Duration> {
        if !err.is_retryable() {
            return Err(err);
        }
        match self.backoff.failure() {
            Some(delay) => {
                warn!(
                    "RuntimeMonitor: {err}, retrying in {delay:?} after {} consecutive failures",
                    self.backoff.failures()
                );
                Ok(delay)
            }
            None => Err(RelayError::TooManyFailures {
                count: self.backoff.failures(),
                last: err.to_string(),
            }),
        }
    }

    async fn request_remote_shutdown(self: &Self) {
        match time::timeout(self.shutdown_timeout, self.transport.shutdown()).await {
            Ok(Ok(result)) => info!(
                "RuntimeMonitor: Remote shutdown accepted={} first={}",
                result.accepted, result.first
            ),
            Ok(Err(err)) => warn!("RuntimeMonitor: Remote shutdown request failed: {err}"),
            Err(_) => warn!("RuntimeMonitor: Remote shutdown request timed out"),
        }
    }

    fn set_state(self: &Self, state: MonitorState) {
        let previous = self.state_sender.send_replace(state);
        if previous != state {
            info!("RuntimeMonitor: {previous} -> {state}");
        }
    }
}

/// Completes when a stop is requested or every handle to the monitor has been dropped
async fn stop_requested(receiver: &mut watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

/// Requests a stop without needing the handle, for example from another task
#[derive(Clone)]
pub struct MonitorStopper {
    stop_sender: Arc<watch::Sender<bool>>,
}

impl MonitorStopper {
    pub fn stop(self: &Self) {
        self.stop_sender.send_replace(true);
    }
}

/// Owner's view of a running monitor
pub struct MonitorHandle {
    stop_sender: Arc<watch::Sender<bool>>,
    state_receiver: watch::Receiver<MonitorState>,
    task: Option<JoinHandle<MonitorOutcome>>,
    outcome: Option<MonitorOutcome>,
}

impl MonitorHandle {
    /// Returns immediately, use `wait` to find out when the monitor has stopped
    pub fn stop(self: &Self) {
        self.stop_sender.send_replace(true);
    }

    /// Stoppers keep the monitor running after the handle is dropped, until they are
    /// dropped as well
    pub fn stopper(self: &Self) -> MonitorStopper {
        MonitorStopper {
            stop_sender: Arc::clone(&self.stop_sender),
        }
    }

    pub fn state(self: &Self) -> MonitorState {
        *self.state_receiver.borrow()
    }

    /// Receiver that is notified of every state change
    pub fn subscribe(self: &Self) -> watch::Receiver<MonitorState> {
        self.state_receiver.clone()
    }

    pub async fn wait(self: &mut Self) -> MonitorOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match self.task.as_mut() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(err) => MonitorOutcome::Failed(RelayError::Internal {
                    msg: format!("Monitor task ended abnormally: {err}"),
                }),
            },
            None => MonitorOutcome::Failed(RelayError::Internal {
                msg: String::from("Monitor task is missing"),
            }),
        };

        self.task = None;
        self.outcome = Some(outcome.clone());
        outcome
    }

    pub async fn stop_and_wait(self: &mut Self) -> MonitorOutcome {
        self.stop();
        self.wait().await
    }
}
