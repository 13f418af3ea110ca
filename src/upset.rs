//! Upset scoring and the notifications the monitor sends.

use crate::{
    bracket::{
        Entrant,
        Match,
    },
    outcome::Competitor,
    prelude::*,
    seed_rank::Seed,
    startgg::ID,
};

/// How many seed placement ranks the winner was below the loser.
pub(crate) fn upset_factor(winner_seed: Seed, loser_seed: Seed) -> i64 {
    i64::from(winner_seed.rank()) - i64::from(loser_seed.rank())
}

/// A worse seed beating a better one only counts if they were in different rank tiers.
pub(crate) fn is_upset(winner_seed: Seed, loser_seed: Seed) -> bool {
    winner_seed > loser_seed && upset_factor(winner_seed, loser_seed) > 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Winners,
    Losers,
}

impl Side {
    pub(crate) fn of_round(round: i64) -> Self {
        if round > 0 { Self::Winners } else { Self::Losers }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winners => write!(f, "🔵 W: "),
            Self::Losers => write!(f, "🔴 L: "),
        }
    }
}

struct Score(Option<i64>);

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(score) => score.fmt(f),
            None => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UpsetEvent {
    pub(crate) match_id: ID,
    pub(crate) winner: Entrant,
    pub(crate) winner_seed: Seed,
    pub(crate) winner_score: Option<i64>,
    pub(crate) loser: Entrant,
    pub(crate) loser_seed: Seed,
    pub(crate) loser_score: Option<i64>,
    pub(crate) upset_factor: i64,
    pub(crate) side: Side,
}

impl UpsetEvent {
    /// Returns `None` unless both competitors are seeded and the result is an upset.
    pub(crate) fn detect(set: &Match, winner: &Competitor, loser: &Competitor) -> Option<Self> {
        let (Some(winner_seed), Some(loser_seed)) = (winner.seed, loser.seed) else { return None };
        is_upset(winner_seed, loser_seed).then(|| Self {
            match_id: set.id.clone(),
            winner: winner.entrant.clone(),
            winner_seed,
            winner_score: winner.score,
            loser: loser.entrant.clone(),
            loser_seed,
            loser_score: loser.score,
            upset_factor: upset_factor(winner_seed, loser_seed),
            side: Side::of_round(set.round),
        })
    }
}

impl fmt::Display for UpsetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} (Seed {}) {} - {} {} (Seed {}). Upset Factor: {}.",
            self.side,
            self.winner.name, self.winner_seed, Score(self.winner_score),
            Score(self.loser_score), self.loser.name, self.loser_seed,
            self.upset_factor,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DqEvent {
    pub(crate) entrant: Entrant,
    pub(crate) seed: Option<Seed>,
}

impl fmt::Display for DqEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "⛔ DQ: {} (Seed ", self.entrant.name)?;
        match self.seed {
            Some(seed) => write!(f, "{seed})"),
            None => write!(f, "N/A)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Upset(UpsetEvent),
    Dq(DqEvent),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upset(upset) => upset.fmt(f),
            Self::Dq(dq) => dq.fmt(f),
        }
    }
}
