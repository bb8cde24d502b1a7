//! Message envelope carried across the pub/sub fabric and direct sends.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use botsys_model::Name;

use crate::error::RuntimeError;
use crate::message::payload::{Payload, PayloadKind};
use crate::util::clock::monotonic_ns;

/// Stamped, frame-tagged payload.
///
/// The stamp is signed 64-bit monotonic nanoseconds (process epoch); the
/// frame id names the coordinate frame the payload is measured in. The
/// payload is validated at construction, so a received envelope never
/// carries a malformed payload.
///
/// # Example
/// ```rust
/// use botsys_rt::message::{Envelope, Payload, Pose};
/// use botsys_model::{Quaternion, Vec3};
///
/// let envelope = Envelope::new(
///     "base",
///     Payload::Pose(Pose {
///         position: Vec3::new(0.1, 0.0, 0.3),
///         orientation: Quaternion::identity(),
///     }),
/// )?;
/// assert_eq!(envelope.frame_id.as_str(), "base");
/// # Ok::<(), botsys_rt::error::RuntimeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Monotonic nanoseconds since process epoch.
    pub stamp_ns: i64,
    /// Coordinate frame the payload is measured in.
    pub frame_id: Name,
    /// Validated payload.
    pub payload: Payload,
}

impl Envelope {
    /// Stamp `payload` with the current monotonic time, validating it.
    pub fn new(frame_id: impl Into<Name>, payload: Payload) -> Result<Self, RuntimeError> {
        payload.validate()?;
        Ok(Self {
            stamp_ns: monotonic_ns(),
            frame_id: frame_id.into(),
            payload,
        })
    }

    /// Construct with an explicit stamp (replays, tests).
    pub fn with_stamp(
        stamp_ns: i64,
        frame_id: impl Into<Name>,
        payload: Payload,
    ) -> Result<Self, RuntimeError> {
        payload.validate()?;
        Ok(Self {
            stamp_ns,
            frame_id: frame_id.into(),
            payload,
        })
    }

    /// Discriminant of the carried payload.
    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }
}
