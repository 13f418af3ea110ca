use crate::{
    bracket::{
        Entrant,
        Match,
        SeedTable,
        Slot,
        Standing,
    },
    seed_rank::Seed,
};

/// start.gg reports a disqualified entrant as having scored −1 games.
const DQ_SCORE: i64 = -1;

/// An entrant as they appear in one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Competitor {
    pub(crate) entrant: Entrant,
    /// `None` if the entrant has no seed in the initial phase.
    pub(crate) seed: Option<Seed>,
    pub(crate) score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Decisive {
        winner: Competitor,
        loser: Competitor,
    },
    Disqualification(Competitor),
    /// Unplayed, in progress, or missing placements.
    Incomplete,
}

pub(crate) fn classify(set: &Match, seeds: &SeedTable) -> Outcome {
    let mut winner = None;
    let mut loser = None;
    for Slot { entrant, standing } in &set.slots {
        let Some(entrant) = entrant else { continue };
        let Standing { placement, score } = standing.clone().unwrap_or_default();
        let competitor = Competitor {
            seed: seeds.get(&entrant.id).copied(),
            entrant: entrant.clone(),
            score,
        };
        if score == Some(DQ_SCORE) {
            return Outcome::Disqualification(competitor)
        }
        match placement {
            Some(1) => winner = Some(competitor),
            Some(2) => loser = Some(competitor),
            _ => {}
        }
    }
    match (winner, loser) {
        (Some(winner), Some(loser)) => Outcome::Decisive { winner, loser },
        (_, _) => Outcome::Incomplete,
    }
}
