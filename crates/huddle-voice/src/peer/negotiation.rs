//! Politeness and the in-flight offer flag.

use std::sync::atomic::{AtomicBool, Ordering};

use super::transport::SignalingState;

/// `true` when `local` yields on offer collisions with `remote`.
///
/// The smaller id is polite. Both sides compute the same answer from the
/// same pair of ids; ids are unique per connection, so exactly one side
/// of a pair is polite.
pub fn is_polite(local_user_id: &str, remote_user_id: &str) -> bool {
    local_user_id < remote_user_id
}

/// Coarse negotiation progress of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// No offer/answer exchange has completed or started.
    Idle,
    Negotiating,
    Stable,
}

impl NegotiationPhase {
    pub(crate) fn derive(state: SignalingState, making_offer: bool, exchanged: bool) -> Self {
        if making_offer || state != SignalingState::Stable {
            Self::Negotiating
        } else if exchanged {
            Self::Stable
        } else {
            Self::Idle
        }
    }
}

/// Holds `making_offer` for the lifetime of one offer attempt.
pub(crate) struct MakingOfferGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> MakingOfferGuard<'a> {
    /// Returns `None` if another attempt already holds the flag.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for MakingOfferGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn politeness_is_antisymmetric() {
        assert!(is_polite("alice", "bob"));
        assert!(!is_polite("bob", "alice"));
        let ids = ["3f2a", "a01c", "zz", "A"];
        for a in ids {
            for b in ids {
                if a != b {
                    assert_ne!(is_polite(a, b), is_polite(b, a), "{a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = MakingOfferGuard::acquire(&flag).unwrap();
            assert!(flag.load(Ordering::Acquire));
            assert!(MakingOfferGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(MakingOfferGuard::acquire(&flag).is_some());
    }

    #[test]
    fn phase_derivation() {
        use SignalingState::*;
        assert_eq!(NegotiationPhase::derive(Stable, false, false), NegotiationPhase::Idle);
        assert_eq!(NegotiationPhase::derive(Stable, true, false), NegotiationPhase::Negotiating);
        assert_eq!(NegotiationPhase::derive(LocalOffer, false, true), NegotiationPhase::Negotiating);
        assert_eq!(NegotiationPhase::derive(RemoteOffer, false, false), NegotiationPhase::Negotiating);
        assert_eq!(NegotiationPhase::derive(Stable, false, true), NegotiationPhase::Stable);
    }
}
