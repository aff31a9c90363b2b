use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether an account was registered by a person or provisioned as a
/// disposable guest. Stored as its own column; the username prefix guests
/// carry is cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Registered,
    Guest,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Registered => "registered",
            AccountKind::Guest => "guest",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(AccountKind::Registered),
            "guest" => Ok(AccountKind::Guest),
            other => Err(format!("unknown account kind: {other}")),
        }
    }
}

impl ToSql for AccountKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub kind: AccountKind,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_guest(&self) -> bool {
        self.kind == AccountKind::Guest
    }
}

/// Note colours offered on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostColor {
    #[default]
    Yellow,
    Blue,
    Green,
    Pink,
    Purple,
    Orange,
    Cyan,
    Lime,
    Indigo,
    Teal,
}

impl PostColor {
    pub const ALL: [PostColor; 10] = [
        PostColor::Yellow,
        PostColor::Blue,
        PostColor::Green,
        PostColor::Pink,
        PostColor::Purple,
        PostColor::Orange,
        PostColor::Cyan,
        PostColor::Lime,
        PostColor::Indigo,
        PostColor::Teal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostColor::Yellow => "yellow",
            PostColor::Blue => "blue",
            PostColor::Green => "green",
            PostColor::Pink => "pink",
            PostColor::Purple => "purple",
            PostColor::Orange => "orange",
            PostColor::Cyan => "cyan",
            PostColor::Lime => "lime",
            PostColor::Indigo => "indigo",
            PostColor::Teal => "teal",
        }
    }

    /// CSS gradient stops used for board cards.
    pub fn gradient(&self) -> (&'static str, &'static str) {
        match self {
            PostColor::Yellow => ("#fef08a", "#fde047"),
            PostColor::Blue => ("#93c5fd", "#60a5fa"),
            PostColor::Green => ("#86efac", "#4ade80"),
            PostColor::Pink => ("#f9a8d4", "#f472b6"),
            PostColor::Purple => ("#c4b5fd", "#a78bfa"),
            PostColor::Orange => ("#fdba74", "#fb923c"),
            PostColor::Cyan => ("#67e8f9", "#22d3ee"),
            PostColor::Lime => ("#bef264", "#a3e635"),
            PostColor::Indigo => ("#818cf8", "#6366f1"),
            PostColor::Teal => ("#5eead4", "#2dd4bf"),
        }
    }
}

impl fmt::Display for PostColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown colour: {s}"))
    }
}

impl ToSql for PostColor {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostColor {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        // Rows written before colours were validated fall back to the default
        Ok(value.as_str()?.parse().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub title: String,
    pub creator_id: i64,
    pub creator_name: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Private boards are readable only by their creator.
    pub fn visible_to(&self, viewer_id: Option<i64>) -> bool {
        self.is_public || viewer_id == Some(self.creator_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub board_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub color: PostColor,
    pub position_x: f64,
    pub position_y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub z_index: i64,
    pub image_path: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForumCategory {
    #[default]
    General,
    Question,
    Tip,
    Showcase,
}

impl ForumCategory {
    pub const ALL: [ForumCategory; 4] = [
        ForumCategory::General,
        ForumCategory::Question,
        ForumCategory::Tip,
        ForumCategory::Showcase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForumCategory::General => "general",
            ForumCategory::Question => "question",
            ForumCategory::Tip => "tip",
            ForumCategory::Showcase => "showcase",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ForumCategory::General => "General",
            ForumCategory::Question => "Question",
            ForumCategory::Tip => "Tips & know-how",
            ForumCategory::Showcase => "Showcase",
        }
    }
}

impl fmt::Display for ForumCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForumCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ForumCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

impl ToSql for ForumCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ForumCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(value.as_str()?.parse().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: String,
    pub category: ForumCategory,
    pub is_notice: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumComment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_round_trip_through_names() {
        for color in PostColor::ALL {
            assert_eq!(color.as_str().parse::<PostColor>().unwrap(), color);
        }
        assert!("magenta".parse::<PostColor>().is_err());
    }

    #[test]
    fn private_board_is_visible_only_to_creator() {
        let board = Board {
            id: 1,
            title: "plans".into(),
            creator_id: 7,
            creator_name: "alice".into(),
            is_public: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(board.visible_to(Some(7)));
        assert!(!board.visible_to(Some(8)));
        assert!(!board.visible_to(None));

        let public = Board {
            is_public: true,
            ..board
        };
        assert!(public.visible_to(None));
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert_eq!(
            "tip".parse::<ForumCategory>().unwrap(),
            ForumCategory::Tip
        );
        assert!("news".parse::<ForumCategory>().is_err());
    }
}
