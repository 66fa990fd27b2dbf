//! Mount tracking for query subscriptions.
//!
//! A `MountToken` is shared between a subscription handle and every refresh
//! task it spawns. Once the handle unmounts, tasks that are still in flight
//! observe it and skip publishing state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared "is this subscription still mounted" flag.
///
/// Clones share state: unmounting any clone unmounts all of them.
///
/// # Example
///
/// ```
/// use silent_cache::lifecycle::MountToken;
///
/// let token = MountToken::new();
/// let in_flight = token.clone();
///
/// token.unmount();
/// assert!(!in_flight.is_mounted());
/// ```
#[derive(Debug, Clone)]
pub struct MountToken {
    mounted: Arc<AtomicBool>,
}

impl MountToken {
    /// Create a token in the mounted state.
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the subscription as gone. Idempotent.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

impl Default for MountToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_mounted() {
        assert!(MountToken::new().is_mounted());
        assert!(MountToken::default().is_mounted());
    }

    #[test]
    fn test_unmount_is_shared() {
        let token = MountToken::new();
        let clone = token.clone();

        clone.unmount();

        assert!(!token.is_mounted());
        assert!(!clone.is_mounted());
    }

    #[test]
    fn test_unmount_twice() {
        let token = MountToken::new();
        token.unmount();
        token.unmount();
        assert!(!token.is_mounted());
    }
}
