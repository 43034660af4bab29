//! Membership policy - joining, leaving and kicking
//!
//! Names are the stable identity of a player inside a room. Connection
//! handles come and go: a player without one is pending (provisioned
//! out-of-band, or a host inside the reconnect grace window) and the first
//! connection arriving under that name takes the seat over.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ConnId, Player, Room, RoomStatus};

/// How a connection entered a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new seat was added
    Joined,
    /// An existing pending seat was taken over
    Reattached { mid_game: bool },
}

impl Room {
    /// Attach a live connection under `name`
    pub fn join(&mut self, name: &str, conn: ConnId) -> Result<JoinOutcome> {
        if let Some(existing) = self.players.iter_mut().find(|p| p.name == name) {
            if existing.is_connected() {
                return Err(Error::NameTaken(name.to_string()));
            }
            existing.conn = Some(conn);
            self.rekey(name, conn);
            info!(room = %self.code, player = %name, conn = %conn, "Player reattached");
            return Ok(JoinOutcome::Reattached {
                mid_game: self.status == RoomStatus::Playing,
            });
        }

        if self.is_full() {
            return Err(Error::RoomFull);
        }

        self.players.push(Player::new(name, Some(conn)));
        info!(room = %self.code, player = %name, conn = %conn, "Player joined");
        Ok(JoinOutcome::Joined)
    }

    /// Add a pending seat with no connection yet
    pub fn provision(&mut self, name: &str) -> Result<()> {
        if self.player_by_name(name).is_some() {
            return Err(Error::NameTaken(name.to_string()));
        }
        if self.is_full() {
            return Err(Error::RoomFull);
        }

        self.players.push(Player::new(name, None));
        info!(room = %self.code, player = %name, "Pending player provisioned");
        Ok(())
    }

    /// Drop the connection but keep the seat (score, hand) for a reconnect
    pub fn detach(&mut self, conn: ConnId) -> Option<&Player> {
        let player = self.players.iter_mut().find(|p| p.conn == Some(conn))?;
        player.conn = None;
        debug!(room = %self.code, player = %player.name, "Player detached");
        Some(&*player)
    }

    /// Remove the seat held by `conn`
    pub fn remove(&mut self, conn: ConnId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.conn == Some(conn))?;
        let player = self.players.remove(index);
        info!(room = %self.code, player = %player.name, remaining = self.players.len(), "Player removed");
        Some(player)
    }

    /// Host removes another player by name
    pub fn kick(&mut self, by: ConnId, target: &str) -> Result<Player> {
        if !self.is_host(by) {
            return Err(Error::NotHost("kick players"));
        }
        let index = self
            .players
            .iter()
            .position(|p| p.name == target)
            .ok_or_else(|| Error::PlayerNotFound(target.to_string()))?;
        if self.players[index].is_host {
            return Err(Error::CannotKickHost);
        }

        let player = self.players.remove(index);
        info!(room = %self.code, player = %player.name, "Player kicked");
        Ok(player)
    }

    /// Point this round's plays by `name` at a new connection
    fn rekey(&mut self, name: &str, conn: ConnId) {
        for submission in self.submissions.iter_mut().chain(self.reveal_order.iter_mut()) {
            if submission.player_name == name {
                submission.id = conn;
            }
        }
        for vote in &mut self.votes {
            if vote.voter_name == name {
                vote.voter = conn;
            }
            if vote.target_name == name {
                vote.target = conn;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Card, RoundPhase, Submission};

    fn make_room() -> (Room, ConnId) {
        let host = ConnId::new();
        (Room::new("ABCDEF", Player::host("alice", Some(host)), 3, 7), host)
    }

    #[test]
    fn test_join_until_full() {
        let (mut room, _) = make_room();
        assert_eq!(room.join("bob", ConnId::new()).unwrap(), JoinOutcome::Joined);
        assert_eq!(room.join("carol", ConnId::new()).unwrap(), JoinOutcome::Joined);
        assert!(matches!(room.join("dave", ConnId::new()), Err(Error::RoomFull)));
        assert!(room.players.iter().skip(1).all(|p| !p.is_host));
    }

    #[test]
    fn test_live_name_is_taken() {
        let (mut room, _) = make_room();
        assert!(matches!(room.join("alice", ConnId::new()), Err(Error::NameTaken(_))));
    }

    #[test]
    fn test_pending_seat_reattaches_even_when_full() {
        let (mut room, _) = make_room();
        room.provision("bob").unwrap();
        room.join("carol", ConnId::new()).unwrap();

        let conn = ConnId::new();
        assert_eq!(
            room.join("bob", conn).unwrap(),
            JoinOutcome::Reattached { mid_game: false }
        );
        assert_eq!(room.player(conn).unwrap().name, "bob");
        assert_eq!(room.players.len(), 3);
    }

    #[test]
    fn test_provision_rejects_duplicates() {
        let (mut room, _) = make_room();
        room.provision("bob").unwrap();
        assert!(matches!(room.provision("bob"), Err(Error::NameTaken(_))));
    }

    #[test]
    fn test_detach_keeps_seat_and_rekeys_on_return() {
        let (mut room, host) = make_room();
        room.status = RoomStatus::Playing;
        room.phase = RoundPhase::Submitting;
        room.players[0].score = 2;
        room.submissions.push(Submission {
            id: host,
            player_name: "alice".to_string(),
            card: Card::new("c1", "c1.png").snapshot(),
        });

        room.detach(host).unwrap();
        assert!(room.players[0].is_pending());

        let new_conn = ConnId::new();
        assert_eq!(
            room.join("alice", new_conn).unwrap(),
            JoinOutcome::Reattached { mid_game: true }
        );
        assert!(room.is_host(new_conn));
        assert_eq!(room.players[0].score, 2);
        assert_eq!(room.submissions[0].id, new_conn);
    }

    #[test]
    fn test_kick_rules() {
        let (mut room, host) = make_room();
        let bob = ConnId::new();
        room.join("bob", bob).unwrap();

        assert!(matches!(room.kick(bob, "alice"), Err(Error::NotHost(_))));
        assert!(matches!(room.kick(host, "alice"), Err(Error::CannotKickHost)));
        assert!(matches!(room.kick(host, "zed"), Err(Error::PlayerNotFound(_))));

        let kicked = room.kick(host, "bob").unwrap();
        assert_eq!(kicked.conn, Some(bob));
        assert_eq!(room.players.len(), 1);
    }

    #[test]
    fn test_remove_last_player_empties_room() {
        let (mut room, host) = make_room();
        room.remove(host).unwrap();
        assert!(room.is_empty());
        assert!(room.remove(host).is_none());
    }
}
