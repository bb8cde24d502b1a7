//! Subscriber-side types: options and the owned subscription stream.

// Layer 1: Standard library imports
use std::collections::HashSet;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use botsys_model::Path;

use crate::mailbox::MailboxReceiver;
use crate::message::{Envelope, PayloadKind};
use crate::util::SubscriptionId;

/// Options supplied at subscribe time.
///
/// The default subscription is unbounded and unfiltered. A payload-kind
/// filter restricts delivery to the listed kinds; a bounded capacity opts
/// into backpressure where the oldest queued envelope is discarded on
/// overflow, keeping the latest samples.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Restrict delivery to these payload kinds; `None` admits all.
    pub message_types: Option<HashSet<PayloadKind>>,
    /// Bound the subscriber mailbox; `None` keeps it unbounded.
    pub capacity: Option<usize>,
}

impl SubscribeOptions {
    /// Unbounded, unfiltered subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: admit only the given payload kinds.
    pub fn with_message_types<I: IntoIterator<Item = PayloadKind>>(mut self, kinds: I) -> Self {
        self.message_types = Some(kinds.into_iter().collect());
        self
    }

    /// Builder: bound the subscriber mailbox at `capacity` messages;
    /// overflow discards the oldest queued message.
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Owned receiving end of one subscription.
///
/// Dropping the subscription closes its mailbox; the router prunes the
/// dead entry lazily on a later publish.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    prefix: Path,
    receiver: MailboxReceiver<Envelope>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        prefix: Path,
        receiver: MailboxReceiver<Envelope>,
    ) -> Self {
        Self {
            id,
            prefix,
            receiver,
        }
    }

    /// Identifier used with `unsubscribe`.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The prefix this subscription matches.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Receive the next matching envelope; `None` once unsubscribed and
    /// drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv()
    }
}
