//! Stale-write detection
//!
//! A write to a column is fresh only if its `occurred_at` is newer than the
//! ledger's `last_changed_on` for that column. What happens on an exact tie
//! is a policy, [`TieBreak`].

use upsync_core::Timestamp;

/// Policy for `occurred_at == last_changed_on`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Equal timestamps are stale; replaying an applied batch reports
    /// `OutdatedChange` for every update
    #[default]
    RejectEqual,
    /// Equal timestamps are fresh
    AcceptEqual,
}

impl TieBreak {
    /// Policy from the `reject_equal_timestamps` setting
    pub fn from_reject_equal(reject_equal: bool) -> Self {
        if reject_equal {
            TieBreak::RejectEqual
        } else {
            TieBreak::AcceptEqual
        }
    }

    /// True if a write at `occurred_at` supersedes one at `last_changed_on`
    #[inline]
    pub fn supersedes(&self, occurred_at: Timestamp, last_changed_on: Timestamp) -> bool {
        match self {
            TieBreak::RejectEqual => occurred_at > last_changed_on,
            TieBreak::AcceptEqual => occurred_at >= last_changed_on,
        }
    }
}

/// Verdict on one incoming column write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The write may proceed
    Fresh {
        /// Ledger timestamp it supersedes; `None` for the first write
        previous: Option<Timestamp>,
    },
    /// The ledger already holds a newer (or, per policy, equal) write
    Stale {
        /// Ledger timestamp that wins
        last_changed_on: Timestamp,
    },
}

impl Freshness {
    /// Decide freshness of a write at `occurred_at` against the ledger state
    pub fn evaluate(
        last_changed_on: Option<Timestamp>,
        occurred_at: Timestamp,
        tie_break: TieBreak,
    ) -> Self {
        match last_changed_on {
            None => Freshness::Fresh { previous: None },
            Some(last) if tie_break.supersedes(occurred_at, last) => Freshness::Fresh {
                previous: Some(last),
            },
            Some(last) => Freshness::Stale {
                last_changed_on: last,
            },
        }
    }

    /// True for `Fresh`
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }

    /// True for `Stale`
    pub fn is_stale(&self) -> bool {
        !self.is_fresh()
    }
}
