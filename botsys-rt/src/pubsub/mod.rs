//! Hierarchical pub/sub fabric keyed by path prefixes.

pub mod router;
pub mod subscription;

pub use router::PubSubRouter;
pub use subscription::{SubscribeOptions, Subscription};
