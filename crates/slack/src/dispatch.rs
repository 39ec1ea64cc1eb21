use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use issuebot_core::{ApplicationError, ClassificationError, Resolution};
use issuebot_store::Resolver;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::events::{Classification, EventClassifier, InboundRequest};
use crate::webhook::{OutboundMessage, WebhookSender};

/// Body of the synchronous acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncReply {
    Challenge(String),
    Empty,
}

impl SyncReply {
    pub fn body(&self) -> &str {
        match self {
            Self::Challenge(challenge) => challenge,
            Self::Empty => "",
        }
    }
}

/// Work left for after the acknowledgement has been sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowUp {
    pub correlation_id: String,
    pub trigger_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acknowledgement {
    pub classification: Classification,
    pub reply: SyncReply,
    pub follow_up: Option<FollowUp>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    NoMatch,
    BackendUnavailable,
    DeliveryFailed,
}

/// What was left of the follow-up work when a drain finished.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub outcomes: Vec<DispatchOutcome>,
    pub panicked: usize,
    pub abandoned: usize,
}

/// Phase-two tasks still in flight. Shared by every request handler so a
/// shutdown can wait for replies that were already acknowledged.
#[derive(Clone, Default)]
pub struct FollowUpTasks {
    tasks: Arc<Mutex<JoinSet<DispatchOutcome>>>,
}

impl FollowUpTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn(&self, coordinator: Arc<DispatchCoordinator>, follow_up: FollowUp) {
        let mut tasks = self.lock();
        // finished tasks are reaped here so the set stays small while serving
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { coordinator.process(follow_up).await });
    }

    /// Waits up to `grace` for every pending task. Whatever is still running
    /// afterwards is aborted and counted as abandoned.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        let mut pending = mem::take(&mut *self.lock());
        let mut report = DrainReport::default();

        let waited = tokio::time::timeout(grace, async {
            while let Some(joined) = pending.join_next().await {
                match joined {
                    Ok(outcome) => report.outcomes.push(outcome),
                    Err(join_error) => {
                        warn!(
                            event_name = "slack.dispatch.follow_up_panicked",
                            correlation_id = "shutdown",
                            error = %join_error,
                            "follow-up task ended abnormally"
                        );
                        report.panicked += 1;
                    }
                }
            }
        })
        .await;

        if waited.is_err() {
            report.abandoned = pending.len();
            pending.abort_all();
            warn!(
                event_name = "slack.dispatch.follow_ups_abandoned",
                correlation_id = "shutdown",
                abandoned = report.abandoned,
                "grace period elapsed with follow-up work still running"
            );
        }
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<DispatchOutcome>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct DispatchCoordinator {
    classifier: EventClassifier,
    resolver: Resolver,
    webhook: Arc<dyn WebhookSender>,
}

impl DispatchCoordinator {
    pub fn new(
        classifier: EventClassifier,
        resolver: Resolver,
        webhook: Arc<dyn WebhookSender>,
    ) -> Self {
        Self { classifier, resolver, webhook }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Phase one: classify and decide the reply without touching the backend.
    pub fn acknowledge(&self, request: &InboundRequest) -> Acknowledgement {
        let correlation_id = request.correlation_id();
        let classification = self.classifier.classify(request);

        let (reply, follow_up) = match &classification {
            Classification::Handshake { challenge } => {
                info!(
                    event_name = "slack.dispatch.handshake",
                    correlation_id = %correlation_id,
                    "answering url verification"
                );
                (SyncReply::Challenge(challenge.clone()), None)
            }
            Classification::DuplicateRetry { count, reason } => {
                info!(
                    event_name = "slack.dispatch.duplicate_retry",
                    correlation_id = %correlation_id,
                    retry_num = %count,
                    retry_reason = reason.as_deref().unwrap_or(""),
                    "acknowledging redelivered event without processing"
                );
                (SyncReply::Empty, None)
            }
            Classification::ApplicationMismatch { expected, received } => {
                let fatal = ClassificationError::ApplicationMismatch {
                    expected: expected.clone(),
                    received: received.clone(),
                };
                error!(
                    event_name = "slack.dispatch.application_mismatch",
                    correlation_id = %correlation_id,
                    error = %fatal,
                    fatal = true,
                    "rejecting event for unknown application"
                );
                (SyncReply::Empty, None)
            }
            Classification::NotActionable(reason) => {
                debug!(
                    event_name = "slack.dispatch.ignored",
                    correlation_id = %correlation_id,
                    reason = reason.as_str(),
                    "event not actionable"
                );
                (SyncReply::Empty, None)
            }
            Classification::Actionable { text } => {
                info!(
                    event_name = "slack.dispatch.accepted",
                    correlation_id = %correlation_id,
                    "message queued for resolution"
                );
                let follow_up = FollowUp { correlation_id, trigger_text: text.clone() };
                (SyncReply::Empty, Some(follow_up))
            }
        };

        Acknowledgement { classification, reply, follow_up }
    }

    /// Phase two: resolve and deliver. Failures end here as a logged outcome.
    pub async fn process(&self, follow_up: FollowUp) -> DispatchOutcome {
        let FollowUp { correlation_id, trigger_text } = follow_up;

        let text = match self.resolver.resolve(&trigger_text).await {
            Ok(Resolution::Found(text)) => text,
            Ok(Resolution::NotFound) => {
                info!(
                    event_name = "slack.dispatch.no_match",
                    correlation_id = %correlation_id,
                    trigger = %trigger_text,
                    "no response configured for message"
                );
                return DispatchOutcome::NoMatch;
            }
            Err(store_error) => {
                let retryable = store_error.is_retryable();
                let application_error = ApplicationError::from(store_error);
                error!(
                    event_name = "slack.dispatch.backend_unavailable",
                    correlation_id = %correlation_id,
                    backend = %self.resolver.backend(),
                    retryable,
                    error = %application_error,
                    "issue lookup failed"
                );
                return DispatchOutcome::BackendUnavailable;
            }
        };

        match self.webhook.send(&OutboundMessage::new(text)).await {
            Ok(()) => {
                info!(
                    event_name = "slack.dispatch.delivered",
                    correlation_id = %correlation_id,
                    "response posted"
                );
                DispatchOutcome::Delivered
            }
            Err(webhook_error) => {
                let application_error = ApplicationError::from(webhook_error);
                error!(
                    event_name = "slack.dispatch.delivery_failed",
                    correlation_id = %correlation_id,
                    error = %application_error,
                    "webhook delivery failed"
                );
                DispatchOutcome::DeliveryFailed
            }
        }
    }

    /// Runs phase one inline and hands phase two to `tasks`, so the reply is
    /// ready before any backend or webhook I/O starts.
    pub fn dispatch(
        self: &Arc<Self>,
        request: &InboundRequest,
        tasks: &FollowUpTasks,
    ) -> SyncReply {
        let acknowledgement = self.acknowledge(request);
        if let Some(follow_up) = acknowledgement.follow_up {
            tasks.spawn(Arc::clone(self), follow_up);
        }
        acknowledgement.reply
    }
}
