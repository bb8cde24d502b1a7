//! Actor and subscription mailboxes over tokio channels.

pub mod queue;

pub use queue::{mailbox, MailboxReceiver, MailboxSender, OverflowPolicy, SendError};
