//! Last-write-wins conflict resolution.
//!
//! Resolution consults nothing but the two `updated_at` timestamps. Client
//! clocks are not assumed to agree; a skewed clock can make LWW discard a
//! genuinely later edit. That limitation is accepted rather than papered
//! over with vector clocks.

use caresync_codec::Timestamp;

/// Which side's record survives a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The local record wins; its payload is pushed to the remote store.
    Local,
    /// The remote record wins; it overwrites the local copy.
    Remote,
}

/// Resolves a conflict between a local and a remote copy of the same record.
///
/// The local side wins ties: the device running the resolution keeps its
/// own edit when both sides carry the same timestamp. The whole record is
/// taken from the winner; fields are never merged.
#[must_use]
pub fn resolve(local: Timestamp, remote: Timestamp) -> Winner {
    if local >= remote {
        Winner::Local
    } else {
        Winner::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn newer_local_wins() {
        assert_eq!(
            resolve(Timestamp::from_millis(200), Timestamp::from_millis(100)),
            Winner::Local
        );
    }

    #[test]
    fn newer_remote_wins() {
        assert_eq!(
            resolve(Timestamp::from_millis(100), Timestamp::from_millis(200)),
            Winner::Remote
        );
    }

    #[test]
    fn ties_go_to_local() {
        let ts = Timestamp::from_millis(150);
        assert_eq!(resolve(ts, ts), Winner::Local);
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic_and_total(local in any::<i64>(), remote in any::<i64>()) {
            let local = Timestamp::from_millis(local);
            let remote = Timestamp::from_millis(remote);

            let first = resolve(local, remote);
            let second = resolve(local, remote);
            prop_assert_eq!(first, second);

            match first {
                Winner::Local => prop_assert!(local >= remote),
                Winner::Remote => prop_assert!(remote > local),
            }
        }
    }
}
