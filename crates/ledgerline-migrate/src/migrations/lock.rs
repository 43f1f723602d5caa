//! Migration lock
//!
//! At most one process may mutate a ledger at a time. Backends hand out a
//! [`MigrationLock`] guard; the runner releases it on every exit path.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MigrationResult;

/// Delay between attempts to take a lock held by someone else
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A held migration lock
#[async_trait]
pub trait MigrationLock: Send {
    /// Give the lock back. Implementations must also free the lock when
    /// dropped without being released.
    async fn release(self: Box<Self>) -> MigrationResult<()>;
}

/// Stable 64-bit FNV-1a hash of `scope`, used as the advisory lock key
pub fn advisory_lock_key(scope: &str) -> i64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = scope.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    });
    hash as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_is_stable() {
        // FNV-1a of the empty string is the offset basis
        assert_eq!(advisory_lock_key(""), 0xcbf2_9ce4_8422_2325_u64 as i64);
        assert_eq!(advisory_lock_key("a"), 0xaf63_dc4c_8601_ec8c_u64 as i64);
        assert_eq!(advisory_lock_key("migrations"), advisory_lock_key("migrations"));
    }

    #[test]
    fn test_lock_key_differs_per_ledger() {
        assert_ne!(advisory_lock_key("migrations"), advisory_lock_key("tenant_migrations"));
    }
}
