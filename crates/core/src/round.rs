//! Round state machine
//!
//! Phase transitions for a single room. Each transition checks the current
//! phase before acting and returns `None`/`false` when it has already been
//! taken, so a timer and an event racing into the same transition apply it
//! once. Timers themselves live with the caller.

use std::cmp::Reverse;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::cards::CardSource;
use crate::config::GameConfig;
use crate::error::{Error, Result};
use crate::models::{ConnId, Room, RoomStatus, RoundPhase, Submission, Vote};
use crate::tally::{tally, Tally};

/// Cards requested versus cards handed out by a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealSummary {
    pub round: u32,
    pub requested: usize,
    pub dealt: usize,
}

/// Scored outcome of a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResults {
    pub round: u32,
    pub tally: Tally,
    /// Set when someone reached the win score; the room is then finished
    pub game_winner: Option<(String, u32)>,
}

impl Room {
    /// Host starts (or restarts) a game
    pub fn start_game(&mut self, by: ConnId, min_players: usize) -> Result<()> {
        if !self.is_host(by) {
            return Err(Error::NotHost("start the game"));
        }
        if self.status == RoomStatus::Playing {
            return Err(Error::WrongPhase);
        }
        if self.players.len() < min_players {
            return Err(Error::NotEnoughPlayers(min_players));
        }

        if self.status == RoomStatus::Finished {
            for player in &mut self.players {
                player.score = 0;
            }
        }

        self.status = RoomStatus::Playing;
        self.phase = RoundPhase::None;
        info!(room = %self.code, players = self.players.len(), "Game started");
        Ok(())
    }

    /// Host stops the game; everything resets to waiting
    pub fn stop_game(&mut self, by: ConnId) -> Result<()> {
        if !self.is_host(by) {
            return Err(Error::NotHost("stop the game"));
        }

        self.status = RoomStatus::Waiting;
        self.phase = RoundPhase::None;
        self.caption = None;
        self.submissions.clear();
        self.votes.clear();
        self.reveal_order.clear();
        self.revealed = 0;
        self.countdown = 0;
        for player in &mut self.players {
            player.score = 0;
            player.hand.clear();
        }

        info!(room = %self.code, "Game stopped");
        Ok(())
    }

    /// Entry action of every round: fresh hands, a caption, cleared plays.
    ///
    /// Deals whatever the source returns; a short draw leaves later players
    /// with fewer cards rather than stalling the game.
    pub fn deal(&mut self, source: &mut dyn CardSource, config: &GameConfig) -> Option<DealSummary> {
        if self.status != RoomStatus::Playing {
            return None;
        }
        let can_deal = match self.phase {
            RoundPhase::None | RoundPhase::Results => true,
            RoundPhase::Revealing => self.submissions.is_empty(),
            RoundPhase::Submitting | RoundPhase::Voting => false,
        };
        if !can_deal {
            return None;
        }

        let requested = self.players.len() * config.hand_size;
        let mut cards = source.draw_cards(requested).into_iter();
        if cards.len() < requested {
            warn!(room = %self.code, requested, available = cards.len(), "Card source shortfall");
        }

        let mut dealt = 0;
        for player in &mut self.players {
            player.hand = cards.by_ref().take(config.hand_size).collect();
            dealt += player.hand.len();
        }

        self.caption = source.draw_caption();
        if self.caption.is_none() {
            warn!(room = %self.code, "No caption available");
        }

        self.submissions.clear();
        self.votes.clear();
        self.reveal_order.clear();
        self.revealed = 0;
        self.phase = RoundPhase::Submitting;
        self.countdown = config.submit_secs;
        self.round += 1;

        info!(room = %self.code, round = self.round, dealt, "New round dealt");
        Some(DealSummary {
            round: self.round,
            requested,
            dealt,
        })
    }

    /// Record a player's card for this round.
    ///
    /// Returns whether every connected player has now submitted.
    pub fn submit(&mut self, conn: ConnId, card_id: &str) -> Result<bool> {
        if self.status != RoomStatus::Playing || self.phase != RoundPhase::Submitting {
            return Err(Error::WrongPhase);
        }
        if self.submission_of(conn).is_some() {
            return Err(Error::AlreadySubmitted);
        }
        let player = self
            .player(conn)
            .ok_or_else(|| Error::PlayerNotFound(conn.to_string()))?;
        let card = player
            .card(card_id)
            .ok_or_else(|| Error::UnknownCard(card_id.to_string()))?;

        let submission = Submission {
            id: conn,
            player_name: player.name.clone(),
            card: card.snapshot(),
        };
        debug!(room = %self.code, player = %submission.player_name, card = %card_id, "Card submitted");
        self.submissions.push(submission);

        Ok(self.submissions_complete())
    }

    /// Connected players yet to submit
    pub fn pending_submitters(&self) -> usize {
        self.players
            .iter()
            .filter_map(|p| p.conn)
            .filter(|&conn| self.submission_of(conn).is_none())
            .count()
    }

    pub fn submissions_complete(&self) -> bool {
        self.phase == RoundPhase::Submitting && self.pending_submitters() == 0
    }

    /// Close submissions and fix a display order independent of who
    /// submitted when. Returns the order, possibly empty.
    pub fn begin_reveal<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Vec<Submission>> {
        if self.status != RoomStatus::Playing || self.phase != RoundPhase::Submitting {
            return None;
        }

        let mut order = self.submissions.clone();
        order.shuffle(rng);

        self.phase = RoundPhase::Revealing;
        self.countdown = 0;
        self.reveal_order = order.clone();
        self.revealed = 0;

        info!(room = %self.code, submissions = order.len(), "Reveal started");
        Some(order)
    }

    /// Next submission to show, with its 1-based position
    pub fn next_reveal(&mut self) -> Option<(usize, Submission)> {
        if self.phase != RoundPhase::Revealing {
            return None;
        }
        let submission = self.reveal_order.get(self.revealed)?.clone();
        self.revealed += 1;
        Some((self.revealed, submission))
    }

    pub fn reveal_finished(&self) -> bool {
        self.phase == RoundPhase::Revealing && self.revealed >= self.reveal_order.len()
    }

    pub fn begin_voting(&mut self, config: &GameConfig) -> bool {
        if self.status != RoomStatus::Playing || self.phase != RoundPhase::Revealing {
            return false;
        }
        if self.submissions.is_empty() {
            return false;
        }

        self.phase = RoundPhase::Voting;
        self.countdown = config.vote_secs;
        self.votes.clear();

        info!(room = %self.code, "Voting started");
        true
    }

    /// Record a vote. Returns whether every eligible voter has now voted.
    pub fn vote(&mut self, conn: ConnId, target: ConnId) -> Result<bool> {
        if self.status != RoomStatus::Playing || self.phase != RoundPhase::Voting {
            return Err(Error::WrongPhase);
        }
        let voter = self
            .player(conn)
            .ok_or_else(|| Error::PlayerNotFound(conn.to_string()))?;
        if self.submission_of(conn).is_none() {
            return Err(Error::NotEligible);
        }
        if target == conn {
            return Err(Error::SelfVote);
        }
        if self.vote_of(conn).is_some() {
            return Err(Error::AlreadyVoted);
        }
        let submission = self.submission_of(target).ok_or(Error::UnknownSubmission)?;

        let vote = Vote {
            voter: conn,
            voter_name: voter.name.clone(),
            target,
            target_name: submission.player_name.clone(),
        };
        debug!(room = %self.code, voter = %vote.voter_name, target = %vote.target_name, "Vote cast");
        self.votes.push(vote);

        Ok(self.votes_complete())
    }

    /// Players who may vote right now: connected and holding a submission.
    /// Recomputed on every call so departures shrink it immediately.
    pub fn eligible_voters(&self) -> usize {
        self.players
            .iter()
            .filter_map(|p| p.conn)
            .filter(|&conn| self.submission_of(conn).is_some())
            .count()
    }

    pub fn pending_voters(&self) -> usize {
        self.players
            .iter()
            .filter_map(|p| p.conn)
            .filter(|&conn| self.submission_of(conn).is_some() && self.vote_of(conn).is_none())
            .count()
    }

    pub fn votes_complete(&self) -> bool {
        self.phase == RoundPhase::Voting && self.pending_voters() == 0
    }

    /// Tally and score the round. Runs once per round; later calls are no-ops.
    pub fn finish_round(&mut self) -> Option<RoundResults> {
        if self.status != RoomStatus::Playing || self.phase != RoundPhase::Voting {
            return None;
        }
        self.phase = RoundPhase::Results;
        self.countdown = 0;

        let mut tally = tally(&self.submissions, &self.votes);
        // Submitters who left before results neither score nor win
        tally.winners.retain(|name| self.player_by_name(name).is_some());
        for winner in &tally.winners {
            if let Some(player) = self.players.iter_mut().find(|p| &p.name == winner) {
                player.score += 1;
            }
        }
        info!(room = %self.code, round = self.round, winners = ?tally.winners, max_votes = tally.max_votes, "Round scored");

        let game_winner = self
            .players
            .iter()
            .filter(|p| p.score >= self.win_score)
            .min_by_key(|p| Reverse(p.score))
            .map(|p| (p.name.clone(), p.score));

        if let Some((name, score)) = &game_winner {
            info!(room = %self.code, winner = %name, score, "Game over");
            self.status = RoomStatus::Finished;
            self.phase = RoundPhase::None;
        }

        Some(RoundResults {
            round: self.round,
            tally,
            game_winner,
        })
    }

    /// One second of countdown for `phase`. Returns the seconds left, or
    /// `None` if the room has moved on.
    pub fn tick(&mut self, phase: RoundPhase) -> Option<u32> {
        if self.status != RoomStatus::Playing || self.phase != phase {
            return None;
        }
        self.countdown = self.countdown.saturating_sub(1);
        Some(self.countdown)
    }
}
