//! Meme template and caption library

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::parse::{format_datetime, parse_json};
use crate::cards::Deck;
use crate::error::{Error, Result};
use crate::models::{Caption, Card};

/// On-disk library format:
///
/// ```toml
/// [[cards]]
/// id = "drake"
/// image_url = "https://example.com/drake.png"
/// tags = ["reaction"]
///
/// [[captions]]
/// id = "monday"
/// text = "When it's Monday again"
/// category = "work"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFile {
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub captions: Vec<Caption>,
}

impl LibraryFile {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid library file: {e}")))
    }
}

pub struct LibraryStore<'a> {
    conn: &'a Connection,
}

impl<'a> LibraryStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a card. Re-adding a card reactivates it.
    #[instrument(skip(self, card), fields(id = %card.id))]
    pub fn upsert_card(&self, card: &Card) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meme_templates (id, image_url, cdn_url, description, tags, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
             ON CONFLICT(id) DO UPDATE SET
                image_url = excluded.image_url,
                cdn_url = excluded.cdn_url,
                description = excluded.description,
                tags = excluded.tags,
                is_active = 1",
            params![
                card.id,
                card.image_url,
                card.cdn_url,
                card.description,
                serde_json::to_string(&card.tags)?,
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a caption
    #[instrument(skip(self, caption), fields(id = %caption.id))]
    pub fn upsert_caption(&self, caption: &Caption) -> Result<()> {
        self.conn.execute(
            "INSERT INTO captions (id, text, category, is_active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                category = excluded.category,
                is_active = 1",
            params![
                caption.id,
                caption.text,
                caption.category,
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Toggle whether a card can be dealt
    #[instrument(skip(self))]
    pub fn set_card_active(&self, id: &str, active: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE meme_templates SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(updated > 0)
    }

    /// Toggle whether a caption can be drawn
    #[instrument(skip(self))]
    pub fn set_caption_active(&self, id: &str, active: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE captions SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(updated > 0)
    }

    /// Import a whole library file in one transaction
    #[instrument(skip(self, library), fields(cards = library.cards.len(), captions = library.captions.len()))]
    pub fn import(&self, library: &LibraryFile) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for card in &library.cards {
            self.upsert_card(card)?;
        }
        for caption in &library.captions {
            self.upsert_caption(caption)?;
        }
        tx.commit()?;
        info!("Library imported");
        Ok(())
    }

    /// All cards currently eligible for dealing
    #[instrument(skip(self))]
    pub fn active_cards(&self) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, image_url, cdn_url, description, tags
             FROM meme_templates WHERE is_active = 1 ORDER BY id",
        )?;
        let cards = stmt
            .query_map([], row_to_card)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// All captions currently eligible for drawing
    #[instrument(skip(self))]
    pub fn active_captions(&self) -> Result<Vec<Caption>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, category FROM captions WHERE is_active = 1 ORDER BY id")?;
        let captions = stmt
            .query_map([], |row| {
                Ok(Caption {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    category: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(captions)
    }

    /// Load the active library into an in-memory deck
    pub fn deck(&self) -> Result<Deck> {
        Ok(Deck::new(self.active_cards()?, self.active_captions()?))
    }
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        image_url: row.get(1)?,
        cdn_url: row.get(2)?,
        description: row.get(3)?,
        tags: parse_json(4, &row.get::<_, String>(4)?)?,
    })
}
