//! Vote tally - pure aggregation of a round's votes

use serde::{Deserialize, Serialize};

use crate::models::{ConnId, Submission, Vote};

/// Vote count for one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionCount {
    pub id: ConnId,
    pub player_name: String,
    pub votes: u32,
}

/// Outcome of counting a round
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tally {
    /// One entry per submission, in submission order
    pub counts: Vec<SubmissionCount>,
    pub max_votes: u32,
    /// Every submitter whose count equals `max_votes`
    pub winners: Vec<String>,
}

impl Tally {
    pub fn is_winner(&self, player_name: &str) -> bool {
        self.winners.iter().any(|w| w == player_name)
    }

    pub fn votes_for(&self, id: ConnId) -> u32 {
        self.counts
            .iter()
            .find(|c| c.id == id)
            .map_or(0, |c| c.votes)
    }
}

/// Count votes per submission and pick the winner set.
///
/// Every submission starts at zero. Votes naming no submission are ignored.
/// All submissions tied at the maximum win; there is no further tie-break.
pub fn tally(submissions: &[Submission], votes: &[Vote]) -> Tally {
    let mut counts: Vec<SubmissionCount> = submissions
        .iter()
        .map(|s| SubmissionCount {
            id: s.id,
            player_name: s.player_name.clone(),
            votes: 0,
        })
        .collect();

    for vote in votes {
        if let Some(count) = counts.iter_mut().find(|c| c.id == vote.target) {
            count.votes += 1;
        }
    }

    let Some(max_votes) = counts.iter().map(|c| c.votes).max() else {
        return Tally::default();
    };

    let winners = counts
        .iter()
        .filter(|c| c.votes == max_votes)
        .map(|c| c.player_name.clone())
        .collect();

    Tally {
        counts,
        max_votes,
        winners,
    }
}
