//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible room states during
//! development. These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::{Room, RoomStatus, RoundPhase};

/// Validate that a room's membership and round state are consistent
pub fn assert_room_invariants(room: &Room) {
    let host_count = room.players.iter().filter(|p| p.is_host).count();
    debug_assert!(
        host_count <= 1,
        "Room {} has {} hosts, expected 0 or 1",
        room.code,
        host_count
    );

    let mut names = HashSet::new();
    for player in &room.players {
        debug_assert!(
            names.insert(player.name.as_str()),
            "Room {} has duplicate player name {:?}",
            room.code,
            player.name
        );
    }

    let mut conns = HashSet::new();
    for conn in room.connections() {
        debug_assert!(
            conns.insert(conn),
            "Room {} has connection {} seated twice",
            room.code,
            conn
        );
    }

    assert_round_invariants(room);
}

/// Validate submission and vote bookkeeping for the current round
pub fn assert_round_invariants(room: &Room) {
    debug_assert!(
        room.status == RoomStatus::Playing || room.phase == RoundPhase::None,
        "Room {} is {} but in phase {}",
        room.code,
        room.status,
        room.phase
    );

    let mut submitters = HashSet::new();
    for submission in &room.submissions {
        debug_assert!(
            submitters.insert(submission.id),
            "Room {} has two submissions from {}",
            room.code,
            submission.player_name
        );
    }

    let mut voters = HashSet::new();
    for vote in &room.votes {
        debug_assert!(
            voters.insert(vote.voter),
            "Room {} has two votes from {}",
            room.code,
            vote.voter_name
        );
        debug_assert!(
            vote.voter != vote.target,
            "Room {} has a self vote from {}",
            room.code,
            vote.voter_name
        );
    }

    debug_assert!(
        room.revealed <= room.reveal_order.len(),
        "Room {} revealed {} of {} submissions",
        room.code,
        room.revealed,
        room.reveal_order.len()
    );
}
