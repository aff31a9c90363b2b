// Board domain - pure parsing and summarising, no I/O
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Post, PostColor};
use crate::extractors::FormPayload;
use crate::media::Upload;

pub const DEFAULT_GRADIENT: (&str, &str) = ("#667eea", "#764ba2");
const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum PostInputError {
    #[error("board_id is required")]
    MissingBoard,

    #[error("board_id must be a number")]
    InvalidBoard,

    #[error("{field} must be a finite number")]
    InvalidNumber { field: &'static str },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("z_index must be an integer")]
    InvalidZIndex,

    #[error("No updatable field in request")]
    NothingToUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Forgiving coordinate parse for note creation. Whatever the browser sent,
/// the result is a finite number; junk becomes 0.0.
pub fn parse_coordinate(raw: Option<&str>) -> f64 {
    let Some(raw) = raw.map(str::trim) else {
        return 0.0;
    };
    if raw.is_empty() || raw == "NaN" || raw == "undefined" {
        return 0.0;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn parse_finite(payload: &FormPayload, field: &'static str) -> Result<f64, PostInputError> {
    payload
        .text(field)
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or(PostInputError::InvalidNumber { field })
}

/// One field-group update to a note. Exactly one is taken from a request.
#[derive(Debug, Clone)]
pub enum PostUpdate {
    Image(Upload),
    Attachment(Upload),
    Move(Position),
    Resize(Dimensions),
    Restack(i64),
    Edit(String),
}

impl PostUpdate {
    /// Pick the update carried by a payload, checked in a fixed order: image,
    /// attachment, position, size, stacking, content.
    pub fn from_payload(mut payload: FormPayload) -> Result<Self, PostInputError> {
        if let Some(upload) = payload.take_file("image") {
            return Ok(PostUpdate::Image(upload));
        }
        if let Some(upload) = payload.take_file("attached_file") {
            return Ok(PostUpdate::Attachment(upload));
        }
        if payload.has("position_x") && payload.has("position_y") {
            return Ok(PostUpdate::Move(Position {
                x: parse_finite(&payload, "position_x")?,
                y: parse_finite(&payload, "position_y")?,
            }));
        }
        if payload.has("width") && payload.has("height") {
            let width = parse_finite(&payload, "width")?;
            let height = parse_finite(&payload, "height")?;
            if width < 0.0 {
                return Err(PostInputError::Negative { field: "width" });
            }
            if height < 0.0 {
                return Err(PostInputError::Negative { field: "height" });
            }
            return Ok(PostUpdate::Resize(Dimensions { width, height }));
        }
        if let Some(raw) = payload.text("z_index") {
            let z = raw.trim().parse::<i64>().map_err(|_| PostInputError::InvalidZIndex)?;
            return Ok(PostUpdate::Restack(z));
        }
        if let Some(content) = payload.text("content") {
            return Ok(PostUpdate::Edit(content.to_string()));
        }
        Err(PostInputError::NothingToUpdate)
    }
}

/// The column group an update writes, once uploads have been stored.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Image { path: String },
    Attachment { path: String, name: String },
    Position(Position),
    Size(Dimensions),
    ZIndex(i64),
    Content(String),
}

/// A note about to be created.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub board_id: i64,
    pub content: String,
    pub color: PostColor,
    pub position: Position,
    pub image_path: Option<String>,
}

/// Parsed creation form. The image upload, if any, is still unsaved.
#[derive(Debug)]
pub struct NewPostForm {
    pub board_id: i64,
    pub content: String,
    pub color: PostColor,
    pub position: Position,
    pub image: Option<Upload>,
}

impl NewPostForm {
    pub fn from_payload(mut payload: FormPayload) -> Result<Self, PostInputError> {
        let board_id = match payload.text("board_id").map(str::trim) {
            None | Some("") => return Err(PostInputError::MissingBoard),
            Some(raw) => raw.parse::<i64>().map_err(|_| PostInputError::InvalidBoard)?,
        };

        let position = Position {
            x: parse_coordinate(non_empty(&payload, "position_x").or_else(|| non_empty(&payload, "x"))),
            y: parse_coordinate(non_empty(&payload, "position_y").or_else(|| non_empty(&payload, "y"))),
        };

        let image = payload.take_file("image");
        let (content, color) = if image.is_some() {
            (String::new(), PostColor::default())
        } else {
            let content = payload.text("content").unwrap_or_default().trim().to_string();
            let color = payload
                .text("color")
                .and_then(|c| c.parse().ok())
                .unwrap_or_default();
            (content, color)
        };

        Ok(Self {
            board_id,
            content,
            color,
            position,
            image,
        })
    }

    pub fn into_new_post(self, image_path: Option<String>) -> NewPost {
        NewPost {
            board_id: self.board_id,
            content: self.content,
            color: self.color,
            position: self.position,
            image_path,
        }
    }
}

fn non_empty<'a>(payload: &'a FormPayload, field: &str) -> Option<&'a str> {
    payload.text(field).filter(|v| !v.is_empty())
}

/// What a board card on the listing shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CardSummary {
    pub thumbnail_path: Option<String>,
    pub snippet: Option<String>,
    pub gradient_from: String,
    pub gradient_to: String,
    pub post_count: usize,
}

impl CardSummary {
    /// Latest image note as thumbnail, latest text as snippet, and the colour of
    /// the earliest note for the background.
    pub fn from_posts(posts: &[Post]) -> Self {
        let thumbnail_path = posts
            .iter()
            .filter(|p| p.image_path.is_some())
            .max_by_key(|p| (p.created_at, p.id))
            .and_then(|p| p.image_path.clone());

        let snippet = posts
            .iter()
            .filter(|p| !p.content.trim().is_empty())
            .max_by_key(|p| (p.created_at, p.id))
            .map(|p| p.content.trim().chars().take(SNIPPET_CHARS).collect());

        let (from, to) = posts
            .iter()
            .min_by_key(|p| (p.created_at, p.id))
            .map(|p| p.color.gradient())
            .unwrap_or(DEFAULT_GRADIENT);

        Self {
            thumbnail_path,
            snippet,
            gradient_from: from.to_string(),
            gradient_to: to.to_string(),
            post_count: posts.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use chrono::{Duration, Utc};

    fn png(name: &str) -> Upload {
        Upload {
            file_name: name.into(),
            content_type: Some("image/png".into()),
            data: Bytes::from_static(b"png"),
        }
    }

    fn post(id: i64, content: &str, color: PostColor, image: Option<&str>, age_mins: i64) -> Post {
        let at = Utc::now() - Duration::minutes(age_mins);
        Post {
            id,
            board_id: 1,
            user_id: 1,
            username: "alice".into(),
            content: content.into(),
            color,
            position_x: 0.0,
            position_y: 0.0,
            width: None,
            height: None,
            z_index: 1,
            image_path: image.map(String::from),
            file_path: None,
            file_name: None,
            likes: 0,
            dislikes: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn coordinates_are_coerced_to_finite_values() {
        assert_eq!(parse_coordinate(Some(" 12.5 ")), 12.5);
        assert_eq!(parse_coordinate(Some("-3")), -3.0);
        for junk in ["", "NaN", "undefined", "abc", "inf", "-infinity", "nan"] {
            assert_eq!(parse_coordinate(Some(junk)), 0.0, "{junk}");
        }
        assert_eq!(parse_coordinate(None), 0.0);
    }

    #[test]
    fn update_precedence_prefers_files_then_position() {
        let payload = FormPayload::from_pairs(&[
            ("position_x", "10"),
            ("position_y", "20"),
            ("content", "ignored"),
        ])
        .with_file("image", png("a.png"));
        assert!(matches!(PostUpdate::from_payload(payload), Ok(PostUpdate::Image(_))));

        let payload = FormPayload::from_pairs(&[("position_x", "10"), ("position_y", "20"), ("z_index", "4")]);
        assert!(matches!(
            PostUpdate::from_payload(payload),
            Ok(PostUpdate::Move(Position { x, y })) if x == 10.0 && y == 20.0
        ));

        let payload = FormPayload::from_pairs(&[("width", "120"), ("height", "80"), ("content", "hi")]);
        assert!(matches!(PostUpdate::from_payload(payload), Ok(PostUpdate::Resize(_))));

        let payload = FormPayload::from_pairs(&[("z_index", "7"), ("content", "hi")]);
        assert!(matches!(PostUpdate::from_payload(payload), Ok(PostUpdate::Restack(7))));

        let payload = FormPayload::from_pairs(&[("content", "  kept verbatim ")]);
        assert!(matches!(
            PostUpdate::from_payload(payload),
            Ok(PostUpdate::Edit(ref s)) if s == "  kept verbatim "
        ));
    }

    #[test]
    fn half_a_pair_falls_through() {
        let payload = FormPayload::from_pairs(&[("position_x", "10"), ("content", "x")]);
        assert!(matches!(PostUpdate::from_payload(payload), Ok(PostUpdate::Edit(_))));
    }

    #[test]
    fn invalid_update_values_are_rejected() {
        let payload = FormPayload::from_pairs(&[("position_x", "NaN"), ("position_y", "1")]);
        assert_eq!(
            PostUpdate::from_payload(payload).unwrap_err(),
            PostInputError::InvalidNumber { field: "position_x" }
        );

        let payload = FormPayload::from_pairs(&[("width", "-1"), ("height", "1")]);
        assert_eq!(
            PostUpdate::from_payload(payload).unwrap_err(),
            PostInputError::Negative { field: "width" }
        );

        let payload = FormPayload::from_pairs(&[("z_index", "1.5")]);
        assert_eq!(PostUpdate::from_payload(payload).unwrap_err(), PostInputError::InvalidZIndex);

        let payload = FormPayload::from_pairs(&[("unrelated", "1")]);
        assert_eq!(PostUpdate::from_payload(payload).unwrap_err(), PostInputError::NothingToUpdate);
    }

    #[test]
    fn creation_form_reads_aliases_and_defaults() {
        let payload = FormPayload::from_pairs(&[
            ("board_id", "3"),
            ("x", "15"),
            ("position_y", "undefined"),
            ("content", "  hello  "),
            ("color", "mauve"),
        ]);
        let form = NewPostForm::from_payload(payload).unwrap();
        assert_eq!(form.board_id, 3);
        assert_eq!(form.position, Position { x: 15.0, y: 0.0 });
        assert_eq!(form.content, "hello");
        assert_eq!(form.color, PostColor::Yellow);
        assert!(form.image.is_none());
    }

    #[test]
    fn image_note_drops_text_and_colour() {
        let payload = FormPayload::from_pairs(&[("board_id", "1"), ("content", "text"), ("color", "blue")])
            .with_file("image", png("cat.png"));
        let form = NewPostForm::from_payload(payload).unwrap();
        assert_eq!(form.content, "");
        assert_eq!(form.color, PostColor::Yellow);
        assert!(form.image.is_some());
    }

    #[test]
    fn creation_form_requires_numeric_board() {
        let missing = FormPayload::from_pairs(&[("content", "x")]);
        assert_eq!(NewPostForm::from_payload(missing).unwrap_err(), PostInputError::MissingBoard);
        let junk = FormPayload::from_pairs(&[("board_id", "abc")]);
        assert_eq!(NewPostForm::from_payload(junk).unwrap_err(), PostInputError::InvalidBoard);
    }

    #[test]
    fn card_summary_picks_latest_image_and_text() {
        let long = "x".repeat(150);
        let posts = vec![
            post(1, "first", PostColor::Blue, None, 30),
            post(2, "", PostColor::Pink, Some("posts/old.png"), 20),
            post(3, &long, PostColor::Green, None, 10),
            post(4, "", PostColor::Teal, Some("posts/new.png"), 5),
        ];
        let card = CardSummary::from_posts(&posts);
        assert_eq!(card.thumbnail_path.as_deref(), Some("posts/new.png"));
        assert_eq!(card.snippet.as_ref().map(|s| s.len()), Some(100));
        assert_eq!(card.gradient_from, PostColor::Blue.gradient().0);
        assert_eq!(card.post_count, 4);
    }

    #[test]
    fn empty_board_uses_default_gradient() {
        let card = CardSummary::from_posts(&[]);
        assert_eq!(card.gradient_from, "#667eea");
        assert_eq!(card.gradient_to, "#764ba2");
        assert!(card.thumbnail_path.is_none());
        assert!(card.snippet.is_none());
    }
}
