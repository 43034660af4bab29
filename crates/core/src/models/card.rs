//! Card and caption content values

use serde::{Deserialize, Serialize};

/// An image card dealt into a player's hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub image_url: String,
    /// CDN-resolved image location, preferred over `image_url` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_url: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Card {
    pub fn new(id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_url: image_url.into(),
            cdn_url: None,
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_cdn_url(mut self, cdn_url: impl Into<String>) -> Self {
        self.cdn_url = Some(cdn_url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The image location clients should load
    pub fn image(&self) -> &str {
        self.cdn_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.image_url)
    }

    /// Detached copy taken at submit time
    pub fn snapshot(&self) -> SubmittedCard {
        SubmittedCard {
            id: self.id.clone(),
            image_url: self.image().to_string(),
            description: self.description.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Copy of a card as it was when submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedCard {
    pub id: String,
    pub image_url: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// The prompt players answer with a card each round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub id: String,
    pub text: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "random".to_string()
}

impl Caption {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category: default_category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_prefers_cdn() {
        let card = Card::new("c1", "raw.png").with_cdn_url("https://cdn/c1.png");
        assert_eq!(card.image(), "https://cdn/c1.png");

        let bare = Card::new("c2", "raw.png");
        assert_eq!(bare.image(), "raw.png");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut card = Card::new("c1", "raw.png").with_cdn_url("https://cdn/c1.png");
        let snapshot = card.snapshot();
        card.description = "changed".to_string();

        assert_eq!(snapshot.image_url, "https://cdn/c1.png");
        assert!(snapshot.description.is_empty());
    }
}
