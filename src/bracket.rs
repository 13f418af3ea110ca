//! Bracket data as the monitor sees it, independent of the start.gg wire format.

use {
    std::cmp::Reverse,
    chrono::prelude::*,
    crate::{
        prelude::*,
        seed_rank::Seed,
        startgg::ID,
    },
};

/// Seeds of a phase's entrants, keyed by entrant ID.
pub(crate) type SeedTable = HashMap<ID, Seed>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Phase {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) phase_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entrant {
    pub(crate) id: ID,
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Standing {
    /// 1 for the winner, 2 for the loser. Other values are ignored.
    pub(crate) placement: Option<i64>,
    /// Game count as reported. A disqualification is reported as a score of −1.
    pub(crate) score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Slot {
    /// `None` for a slot that hasn't been filled yet.
    pub(crate) entrant: Option<Entrant>,
    pub(crate) standing: Option<Standing>,
}

/// A start.gg set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    pub(crate) id: ID,
    /// Positive in the winners bracket, zero or negative in the losers bracket.
    pub(crate) round: i64,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) slots: Vec<Slot>,
}

/// Orders matches from most to least recently completed, with matches that aren't completed last.
pub(crate) fn sort_by_recency(matches: &mut [Match]) {
    matches.sort_by_key(|m| Reverse(m.completed_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: &str, timestamp: Option<i64>) -> Match {
        Match {
            id: ID::from(id),
            round: 1,
            completed_at: timestamp.and_then(|timestamp| DateTime::from_timestamp(timestamp, 0)),
            slots: Vec::default(),
        }
    }

    #[test]
    fn most_recent_first_and_unfinished_last() {
        let mut matches = vec![
            completed("old", Some(1_000)),
            completed("pending", None),
            completed("new", Some(3_000)),
            completed("middle", Some(2_000)),
        ];
        sort_by_recency(&mut matches);
        let order = matches.iter().map(|m| m.id.to_string()).collect::<Vec<_>>();
        assert_eq!(order, ["new", "middle", "old", "pending"]);
    }
}
