use crate::error::Result;
use crate::models::{CommitResult, PushPack};

/// Transport to the remote a repository pushes to.
///
/// A non-fast-forward rejection is a regular `Ok` result with
/// [`PushStatus::RejectedNonFastForward`](crate::models::PushStatus); `Err` is
/// reserved for transport failures.
pub trait Remote: Send + Sync {
    fn push(&self, pack: &PushPack) -> Result<CommitResult>;
}
