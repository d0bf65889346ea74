use crate::rank::Rank;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered pair of ranks between which a metric is measured.
///
/// The `source` initiates the exchange (sends first) and owns the
/// resulting measurement; the `destination` answers. Direction matters:
/// `(a, b)` and `(b, a)` are two distinct measurements over the same
/// physical cable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pair {
    pub source: Rank,
    pub destination: Rank,
}

impl Pair {
    pub const fn new(source: Rank, destination: Rank) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Whether the given rank participates in this pair, on either side.
    #[inline]
    pub fn involves(&self, rank: Rank) -> bool {
        self.source == rank || self.destination == rank
    }

    /// The other end of the pair, from `rank`'s point of view.
    ///
    /// Returns `None` if `rank` is not part of the pair.
    pub fn peer_of(&self, rank: Rank) -> Option<Rank> {
        if self.source == rank {
            Some(self.destination)
        } else if self.destination == rank {
            Some(self.source)
        } else {
            None
        }
    }

    /// The direction-less identity of the cable under this pair.
    pub fn link_key(&self) -> LinkKey {
        LinkKey::new((self.source, self.destination))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

/// Unique identifier of the physical link between two ranks.
///
/// The link is bidirectional and is unique for two ranks. I.e.
/// for all ranks `r1` and `r2` the identifier `(r1, r2)` is the
/// same as the identifier `(r2, r1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey {
    smaller_id: Rank,
    larger_id: Rank,
}

impl LinkKey {
    pub fn new((a, b): (Rank, Rank)) -> Self {
        if a < b {
            Self {
                smaller_id: a,
                larger_id: b,
            }
        } else {
            Self {
                smaller_id: b,
                larger_id: a,
            }
        }
    }

    /// The [`Rank`]s that compose this link identifier, smaller first.
    #[inline]
    pub fn into_ranks(self) -> (Rank, Rank) {
        (self.smaller_id, self.larger_id)
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.smaller_id, self.larger_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r1r2_eq_r2r1() {
        let r1 = Rank::ZERO;
        let r2 = Rank::ONE;

        assert_eq!(
            LinkKey::new((r1, r2)),
            // ==
            LinkKey::new((r2, r1)),
        );
    }

    #[test]
    fn ordered_pairs_differ() {
        let forward = Pair::new(Rank::ZERO, Rank::ONE);
        let reverse = Pair::new(Rank::ONE, Rank::ZERO);

        assert_ne!(forward, reverse);
        assert_eq!(forward.link_key(), reverse.link_key());
    }

    #[test]
    fn peer_of() {
        let pair = Pair::new(Rank::new(3), Rank::new(7));

        assert_eq!(pair.peer_of(Rank::new(3)), Some(Rank::new(7)));
        assert_eq!(pair.peer_of(Rank::new(7)), Some(Rank::new(3)));
        assert_eq!(pair.peer_of(Rank::new(5)), None);
        assert!(pair.involves(Rank::new(3)));
        assert!(!pair.involves(Rank::new(5)));
    }
}
