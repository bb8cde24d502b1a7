//! Prefix-matching router with per-subscriber payload-kind filters.
//!
//! A publish to path `P` reaches every subscription whose prefix `Q` is a
//! leading run of `P`'s tokens and whose type filter admits the payload.
//! Delivery is at-most-once per subscriber, per-publisher FIFO, and never
//! blocks the publisher; dead subscribers are pruned lazily.

// Layer 1: Standard library imports
use std::collections::HashSet;

// Layer 2: Third-party crate imports
use tracing::{debug, trace};

// Layer 3: Internal module imports
use botsys_model::Path;

use crate::mailbox::{mailbox, MailboxSender, OverflowPolicy, SendError};
use crate::message::{Envelope, PayloadKind};
use crate::registry::DuplicateRegistry;
use crate::pubsub::subscription::{SubscribeOptions, Subscription};
use crate::util::SubscriptionId;

/// One subscriber as stored in the duplicate-keyspace table.
#[derive(Clone)]
struct SubEntry {
    id: SubscriptionId,
    kinds: Option<HashSet<PayloadKind>>,
    sender: MailboxSender<Envelope>,
}

impl SubEntry {
    fn admits(&self, kind: PayloadKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Hierarchical pub/sub router.
///
/// Cheap to clone; all clones share the same subscription table, which
/// lives in a duplicate-keyspace registry keyed by prefix.
///
/// # Example
/// ```rust
/// use botsys_model::Path;
/// use botsys_rt::message::{DiagnosticEvent, DiagnosticLevel, Envelope, Payload};
/// use botsys_rt::pubsub::{PubSubRouter, SubscribeOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let router = PubSubRouter::new();
/// let mut sub = router.subscribe(Path::from(["diagnostic"]), SubscribeOptions::new());
///
/// let envelope = Envelope::new(
///     "base",
///     Payload::Diagnostic(DiagnosticEvent::new("imu", DiagnosticLevel::Ok, "")),
/// ).unwrap();
/// router.publish(&Path::from(["diagnostic", "imu"]), envelope);
///
/// assert!(sub.recv().await.is_some());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct PubSubRouter {
    table: DuplicateRegistry<Path, SubEntry>,
}

impl PubSubRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every path extending `prefix`.
    ///
    /// The empty prefix subscribes to everything. Bounded subscriptions
    /// overflow by discarding their oldest queued envelope, so a slow
    /// subscriber always holds the freshest samples.
    pub fn subscribe(&self, prefix: Path, options: SubscribeOptions) -> Subscription {
        let id = SubscriptionId::new();
        let (sender, receiver) = mailbox(options.capacity, OverflowPolicy::DropOldest);
        self.table.register(
            prefix.clone(),
            SubEntry {
                id,
                kinds: options.message_types,
                sender,
            },
        );
        trace!(%prefix, %id, "subscribed");
        Subscription::new(id, prefix, receiver)
    }

    /// Remove a subscription by id. Returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = 0;
        for (prefix, entries) in self.table.entries() {
            if entries.iter().any(|entry| entry.id == id) {
                removed += self.table.remove_where(&prefix, |entry| entry.id == id);
            }
        }
        removed > 0
    }

    /// Subscription ids registered exactly at `prefix` (introspection).
    pub fn subscribers(&self, prefix: &Path) -> Vec<SubscriptionId> {
        self.table
            .get(prefix)
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Publish `envelope` on `path`.
    ///
    /// Returns the number of subscribers the envelope was enqueued to.
    /// Never blocks: bounded subscriber mailboxes discard their oldest
    /// queued envelope on overflow, and sends to dead subscribers remove
    /// the subscription.
    pub fn publish(&self, path: &Path, envelope: Envelope) -> usize {
        let kind = envelope.kind();
        let mut delivered = 0;
        let mut dead: Vec<(Path, SubscriptionId)> = Vec::new();

        self.table.for_each(|prefix, entries| {
            if !path.starts_with(prefix) {
                return;
            }
            for entry in entries {
                if !entry.admits(kind) {
                    continue;
                }
                match entry.sender.try_send(envelope.clone()) {
                    Ok(true) => delivered += 1,
                    Ok(false) => {
                        debug!(%path, subscriber = %entry.id, "subscriber mailbox full, envelope dropped");
                    }
                    Err(SendError::Full) => {
                        debug!(%path, subscriber = %entry.id, "subscriber mailbox full, envelope dropped");
                    }
                    Err(SendError::Closed) => {
                        dead.push((prefix.clone(), entry.id));
                    }
                }
            }
        });

        for (prefix, id) in dead {
            self.table.remove_where(&prefix, |entry| entry.id == id);
            trace!(%prefix, %id, "pruned dead subscriber");
        }

        delivered
    }
}
