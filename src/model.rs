//! Records persisted in the catalog and the shapes handed back to callers.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publication status of a title.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TitleStatus {
    #[default]
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
}

impl FromStr for TitleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "hiatus" => Ok(Self::Hiatus),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for TitleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Mutable counters kept alongside each title.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleStats {
    pub views: u64,
    pub total_ratings: u32,
    pub average_rating: f64,
    pub bookmark_count: u64,
}

/// The unit being searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub status: TitleStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub stats: TitleStats,
}

impl TitleRecord {
    /// Materialize a new record from creation input.
    pub fn from_new(input: NewTitle, now: DateTime<Utc>) -> Self {
        let id = input
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            id,
            title: input.title.trim().to_string(),
            alternative_titles: input
                .alternative_titles
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            author: input.author,
            description: input.description,
            cover_image: input.cover_image,
            genres: input.genres,
            status: input.status,
            created_at: now,
            last_updated: input.last_updated.unwrap_or(now),
            stats: TitleStats::default(),
        }
    }

    pub fn summary(&self) -> TitleSummary {
        TitleSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            cover_image: self.cover_image.clone(),
            genres: self.genres.clone(),
            status: self.status,
            author: self.author.clone(),
            description: self.description.clone(),
            stats: self.stats.clone(),
            last_updated: self.last_updated,
            alternative_titles: self.alternative_titles.clone(),
        }
    }
}

/// Creation input for a title. Stats are never accepted from callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTitle {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub status: TitleStatus,
    /// Imported catalogs may carry their own update time.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// What list and search responses expose for a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleSummary {
    pub id: String,
    pub title: String,
    pub cover_image: Option<String>,
    pub genres: BTreeSet<String>,
    pub status: TitleStatus,
    pub author: Option<String>,
    pub description: Option<String>,
    pub stats: TitleStats,
    pub last_updated: DateTime<Utc>,
    pub alternative_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title_id: String,
    pub number: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChapter {
    pub number: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pages: Vec<String>,
}

/// At most one per (user, title) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub user_id: String,
    pub title_id: String,
    #[serde(default)]
    pub last_read_chapter: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// The authenticated caller, as established by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub is_banned: bool,
}

impl Principal {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
            is_banned: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::user(user_id)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_assigns_id_and_trims() {
        let now = Utc::now();
        let record = TitleRecord::from_new(
            NewTitle {
                title: "  One Piece ".to_string(),
                alternative_titles: vec![
                    "ワンピース".to_string(),
                    "   ".to_string(),
                ],
                ..Default::default()
            },
            now,
        );

        assert!(!record.id.is_empty());
        assert_eq!(record.title, "One Piece");
        assert_eq!(record.alternative_titles, vec!["ワンピース"]);
        assert_eq!(record.last_updated, now);
        assert_eq!(record.stats, TitleStats::default());
    }

    #[test]
    fn from_new_keeps_supplied_id() {
        let record = TitleRecord::from_new(
            NewTitle {
                id: Some("berserk".to_string()),
                title: "Berserk".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(record.id, "berserk");
    }

    #[test]
    fn record_json_uses_camel_case() {
        let record = TitleRecord::from_new(
            NewTitle {
                title: "Vagabond".to_string(),
                status: TitleStatus::Hiatus,
                ..Default::default()
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["status"], "hiatus");
        assert!(json.get("alternativeTitles").is_some());
        assert!(json["stats"].get("averageRating").is_some());
        assert!(json["stats"].get("bookmarkCount").is_some());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "Completed".parse::<TitleStatus>(),
            Ok(TitleStatus::Completed)
        );
        assert!("paused".parse::<TitleStatus>().is_err());
    }
}
