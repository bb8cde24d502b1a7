//! Unified bounded/unbounded mailboxes with an explicit overflow policy.
//!
//! Every actor and every pub/sub subscription owns exactly one receiver;
//! senders are cheap clones. Bounded mailboxes choose what happens when
//! the queue is full: block the (async) sender, discard the oldest queued
//! message to keep the latest, discard the incoming message, or fail the
//! send. Streaming consumers (pub/sub subscriptions) use drop-oldest so a
//! slow subscriber always holds the freshest samples.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

// Layer 3: Internal module imports
// (none)

/// What a full bounded mailbox does with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Asynchronous sends wait for room; synchronous sends fail with
    /// [`SendError::Full`].
    Block,
    /// The oldest queued message is discarded and the incoming one is
    /// enqueued (keep-latest semantics).
    DropOldest,
    /// The incoming (newest) message is discarded.
    DropNewest,
    /// The send fails with [`SendError::Full`].
    Fail,
}

impl Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Mailbox send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The receiver was dropped; the owning actor is gone.
    #[error("mailbox closed")]
    Closed,
    /// The mailbox is bounded, full, and the policy does not drop.
    #[error("mailbox full")]
    Full,
}

// ---- drop-oldest ring --------------------------------------------------
//
// tokio's mpsc cannot discard from the sender side, so the drop-oldest
// policy is backed by a small ring: a mutex-guarded VecDeque that pops the
// front before pushing when full, plus a Notify to wake the receiver.

struct RingState<T> {
    queue: VecDeque<T>,
    receiver_alive: bool,
    senders: usize,
}

struct RingShared<T> {
    capacity: usize,
    state: Mutex<RingState<T>>,
    notify: Notify,
}

struct RingSender<T> {
    shared: Arc<RingShared<T>>,
}

impl<T> Clone for RingSender<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for RingSender<T> {
    fn drop(&mut self) {
        let last = {
            let mut state = self.shared.state.lock();
            state.senders -= 1;
            state.senders == 0
        };
        if last {
            // Wake a receiver blocked on an empty queue so it observes
            // the closed-and-drained condition.
            self.shared.notify.notify_one();
        }
    }
}

impl<T> RingSender<T> {
    fn try_send(&self, message: T) -> Result<bool, SendError> {
        {
            let mut state = self.shared.state.lock();
            if !state.receiver_alive {
                return Err(SendError::Closed);
            }
            if state.queue.len() == self.shared.capacity {
                state.queue.pop_front();
            }
            state.queue.push_back(message);
        }
        self.shared.notify.notify_one();
        Ok(true)
    }

    fn is_closed(&self) -> bool {
        !self.shared.state.lock().receiver_alive
    }
}

struct RingReceiver<T> {
    shared: Arc<RingShared<T>>,
}

impl<T> Drop for RingReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_alive = false;
        state.queue.clear();
    }
}

impl<T> RingReceiver<T> {
    async fn recv(&mut self) -> Option<T> {
        loop {
            // Register interest before the emptiness check so a send
            // landing in between still wakes this receiver.
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(message) = state.queue.pop_front() {
                    return Some(message);
                }
                if state.senders == 0 || !state.receiver_alive {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn try_recv(&mut self) -> Option<T> {
        self.shared.state.lock().queue.pop_front()
    }

    fn close(&mut self) {
        self.shared.state.lock().receiver_alive = false;
    }
}

fn ring<T>(capacity: usize) -> (RingSender<T>, RingReceiver<T>) {
    let shared = Arc::new(RingShared {
        capacity,
        state: Mutex::new(RingState {
            queue: VecDeque::with_capacity(capacity),
            receiver_alive: true,
            senders: 1,
        }),
        notify: Notify::new(),
    });
    (
        RingSender {
            shared: Arc::clone(&shared),
        },
        RingReceiver { shared },
    )
}

// ---- unified sender/receiver -------------------------------------------

enum SenderInner<T> {
    Bounded {
        sender: mpsc::Sender<T>,
        policy: OverflowPolicy,
    },
    Ring(RingSender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for SenderInner<T> {
    fn clone(&self) -> Self {
        match self {
            SenderInner::Bounded { sender, policy } => SenderInner::Bounded {
                sender: sender.clone(),
                policy: *policy,
            },
            SenderInner::Ring(sender) => SenderInner::Ring(sender.clone()),
            SenderInner::Unbounded(sender) => SenderInner::Unbounded(sender.clone()),
        }
    }
}

/// Cloneable sending half of a mailbox.
pub struct MailboxSender<T> {
    inner: SenderInner<T>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            SenderInner::Bounded { policy, .. } => {
                write!(f, "MailboxSender::Bounded({policy})")
            }
            SenderInner::Ring(_) => f.write_str("MailboxSender::Ring(drop_oldest)"),
            SenderInner::Unbounded(_) => f.write_str("MailboxSender::Unbounded"),
        }
    }
}

impl<T: Send + 'static> MailboxSender<T> {
    /// Send asynchronously. With [`OverflowPolicy::Block`] this waits for
    /// room; the other policies behave exactly like [`Self::try_send`].
    ///
    /// Returns `Ok(true)` when the message was enqueued and `Ok(false)`
    /// when it was dropped by policy.
    pub async fn send(&self, message: T) -> Result<bool, SendError> {
        match &self.inner {
            SenderInner::Bounded { sender, policy } => match policy {
                OverflowPolicy::Block => sender
                    .send(message)
                    .await
                    .map(|()| true)
                    .map_err(|_| SendError::Closed),
                OverflowPolicy::DropOldest
                | OverflowPolicy::DropNewest
                | OverflowPolicy::Fail => self.try_send(message),
            },
            SenderInner::Ring(sender) => sender.try_send(message),
            SenderInner::Unbounded(sender) => sender
                .send(message)
                .map(|()| true)
                .map_err(|_| SendError::Closed),
        }
    }

    /// Send without waiting.
    ///
    /// Returns `Ok(true)` when enqueued (with [`OverflowPolicy::DropOldest`]
    /// this may have displaced the oldest queued message), `Ok(false)` when
    /// the incoming message was dropped by [`OverflowPolicy::DropNewest`],
    /// and an error when closed or full.
    pub fn try_send(&self, message: T) -> Result<bool, SendError> {
        match &self.inner {
            SenderInner::Bounded { sender, policy } => match sender.try_send(message) {
                Ok(()) => Ok(true),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
                Err(mpsc::error::TrySendError::Full(_)) => match policy {
                    OverflowPolicy::DropNewest => Ok(false),
                    OverflowPolicy::Block | OverflowPolicy::Fail => Err(SendError::Full),
                    // Drop-oldest mailboxes are ring-backed, never mpsc.
                    OverflowPolicy::DropOldest => Err(SendError::Full),
                },
            },
            SenderInner::Ring(sender) => sender.try_send(message),
            SenderInner::Unbounded(sender) => {
                sender.send(message).map(|()| true).map_err(|_| SendError::Closed)
            }
        }
    }

    /// Whether the receiving half is gone.
    pub fn is_closed(&self) -> bool {
        match &self.inner {
            SenderInner::Bounded { sender, .. } => sender.is_closed(),
            SenderInner::Ring(sender) => sender.is_closed(),
            SenderInner::Unbounded(sender) => sender.is_closed(),
        }
    }
}

enum ReceiverInner<T> {
    Bounded(mpsc::Receiver<T>),
    Ring(RingReceiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// Exclusively owned receiving half of a mailbox.
pub struct MailboxReceiver<T> {
    inner: ReceiverInner<T>,
}

impl<T> fmt::Debug for MailboxReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ReceiverInner::Bounded(_) => f.write_str("MailboxReceiver::Bounded"),
            ReceiverInner::Ring(_) => f.write_str("MailboxReceiver::Ring"),
            ReceiverInner::Unbounded(_) => f.write_str("MailboxReceiver::Unbounded"),
        }
    }
}

impl<T> MailboxReceiver<T> {
    /// Receive the next message; `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        match &mut self.inner {
            ReceiverInner::Bounded(receiver) => receiver.recv().await,
            ReceiverInner::Ring(receiver) => receiver.recv().await,
            ReceiverInner::Unbounded(receiver) => receiver.recv().await,
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        match &mut self.inner {
            ReceiverInner::Bounded(receiver) => receiver.try_recv().ok(),
            ReceiverInner::Ring(receiver) => receiver.try_recv(),
            ReceiverInner::Unbounded(receiver) => receiver.try_recv().ok(),
        }
    }

    /// Close the mailbox; pending messages can still be drained.
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Bounded(receiver) => receiver.close(),
            ReceiverInner::Ring(receiver) => receiver.close(),
            ReceiverInner::Unbounded(receiver) => receiver.close(),
        }
    }
}

/// Create a mailbox. `capacity = None` means unbounded (the policy is
/// ignored); `Some(n)` bounds the queue at `n` messages.
pub fn mailbox<T: Send + 'static>(
    capacity: Option<usize>,
    policy: OverflowPolicy,
) -> (MailboxSender<T>, MailboxReceiver<T>) {
    match capacity {
        Some(n) if policy == OverflowPolicy::DropOldest => {
            let (sender, receiver) = ring(n.max(1));
            (
                MailboxSender {
                    inner: SenderInner::Ring(sender),
                },
                MailboxReceiver {
                    inner: ReceiverInner::Ring(receiver),
                },
            )
        }
        Some(n) => {
            let (sender, receiver) = mpsc::channel(n.max(1));
            (
                MailboxSender {
                    inner: SenderInner::Bounded { sender, policy },
                },
                MailboxReceiver {
                    inner: ReceiverInner::Bounded(receiver),
                },
            )
        }
        None => {
            let (sender, receiver) = mpsc::unbounded_channel();
            (
                MailboxSender {
                    inner: SenderInner::Unbounded(sender),
                },
                MailboxReceiver {
                    inner: ReceiverInner::Unbounded(receiver),
                },
            )
        }
    }
}
