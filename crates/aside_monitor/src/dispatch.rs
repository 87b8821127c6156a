//! Per-event dispatch: decide, compose, deliver, commit.

use crate::ledger::DedupLedger;
use aside_core::{Allowlist, CanonicalIdentity, ContextProvider, Event, MessageSender, ReplyComposer};
use std::sync::Arc;

/// What happened to one detected event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    SkippedNotWhitelisted,
    SkippedAlreadyHandled,
    Failed,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Sent => "sent",
            Outcome::SkippedNotWhitelisted => "not-whitelisted",
            Outcome::SkippedAlreadyHandled => "already-handled",
            Outcome::Failed => "failed",
        }
    }
}

pub struct ReplyDispatcher {
    allowlist: Arc<Allowlist>,
    context: Arc<dyn ContextProvider>,
    composer: Arc<dyn ReplyComposer>,
    sender: Arc<dyn MessageSender>,
}

impl ReplyDispatcher {
    pub fn new(
        allowlist: Arc<Allowlist>,
        context: Arc<dyn ContextProvider>,
        composer: Arc<dyn ReplyComposer>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            allowlist,
            context,
            composer,
            sender,
        }
    }

    /// Handle one event. Side effect ordering is load-bearing: compose,
    /// then deliver, and only on confirmed delivery commit the key to the
    /// ledger. A failed delivery leaves the ledger untouched so the event
    /// is retried on a later tick while it stays within its recency
    /// window. Non-whitelisted events are never remembered: the ledger
    /// records deliveries, nothing else.
    pub async fn handle(
        &self,
        ledger: &mut DedupLedger,
        event: &Event,
        identity: &CanonicalIdentity,
    ) -> Outcome {
        let key = event.dedup_key(identity);
        if ledger.has_handled(&key) {
            return Outcome::SkippedAlreadyHandled;
        }

        if !self.allowlist.contains(identity).await {
            tracing::info!(channel = %event.channel, identity = %identity, "ignoring event from non-whitelisted identity");
            return Outcome::SkippedNotWhitelisted;
        }

        // Context is best-effort: a failed calendar lookup degrades to
        // "no commitment", it does not block the reply.
        let commitment = match self.context.current_commitment().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "calendar lookup failed, composing without context");
                None
            }
        };

        let text = match self.composer.compose(event, commitment.as_ref()).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "could not compose reply");
                return Outcome::Failed;
            }
        };

        let recipient = event.recipient();
        match self.sender.deliver(recipient, &text).await {
            Ok(()) => {
                ledger.mark_handled(key);
                tracing::info!(channel = %event.channel, recipient, "auto-reply sent");
                Outcome::Sent
            }
            Err(e) => {
                tracing::warn!(channel = %event.channel, recipient, error = %e, "delivery failed, will retry while fresh");
                Outcome::Failed
            }
        }
    }
}
