//! Slack Events API ingress for issuebot
//!
//! - **Events** (`events`) - payload types and the pure `EventClassifier`
//! - **Dispatch** (`dispatch`) - ack-then-process coordinator
//! - **Webhook** (`webhook`) - outbound incoming-webhook sender
//!
//! # Flow
//!
//! ```text
//! HTTP body + retry headers → InboundRequest → EventClassifier
//!        ↓ (phase 1, synchronous)
//!   SyncReply (challenge | empty)
//!        ↓ (phase 2, spawned into FollowUpTasks)
//!   Resolver → IssueStore → WebhookSender
//! ```
//!
//! The acknowledgement never waits on the backend or the webhook, so the
//! platform's delivery deadline is met even when either is slow.

pub mod dispatch;
pub mod events;
pub mod webhook;

pub use dispatch::{
    Acknowledgement, DispatchCoordinator, DispatchOutcome, DrainReport, FollowUp, FollowUpTasks,
    SyncReply,
};
pub use events::{Classification, EventClassifier, IgnoreReason, InboundRequest, RetryMetadata};
pub use webhook::{
    IncomingWebhookClient, MemoryWebhook, OutboundMessage, WebhookError, WebhookSender,
};
