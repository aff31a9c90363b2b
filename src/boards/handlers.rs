use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::session::{claim_like, CurrentUser};
use crate::accounts::{Session, LOGIN_URL};
use crate::boards::domain::{CardSummary, FieldWrite, NewPostForm, PostUpdate};
use crate::db::models::{Board, Comment, Post, PostColor};
use crate::error::{AppError, AppResult};
use crate::extractors::{FormPayload, IsAjax, MaybeUser};
use crate::media::MediaKind;
use crate::routes::home::Html;
use crate::state::AppState;

pub const BOARD_LIST_URL: &str = "/collaboration/";

// -- View models --

pub struct BoardCard {
    pub board: Board,
    pub summary: CardSummary,
    pub thumbnail_url: Option<String>,
}

pub struct PostView {
    pub post: Post,
    pub image_url: Option<String>,
    pub file_url: Option<String>,
    pub comments: Vec<Comment>,
    pub can_edit: bool,
}

pub struct GalleryBoard {
    pub board: Board,
    pub posts: Vec<PostView>,
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/board_list.html")]
pub struct BoardListTemplate {
    pub user: Option<CurrentUser>,
    pub cards: Vec<BoardCard>,
}

#[derive(Template)]
#[template(path = "pages/gallery.html")]
pub struct GalleryTemplate {
    pub user: Option<CurrentUser>,
    pub boards: Vec<GalleryBoard>,
}

#[derive(Template)]
#[template(path = "pages/board_detail.html")]
pub struct BoardDetailTemplate {
    pub user: Option<CurrentUser>,
    pub board: Board,
    pub posts: Vec<PostView>,
    pub colors: Vec<PostColor>,
    pub can_delete: bool,
}

#[derive(Template)]
#[template(path = "pages/board_form.html")]
pub struct BoardFormTemplate {
    pub user: Option<CurrentUser>,
    pub title: String,
    pub is_public: bool,
    pub errors: Vec<String>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct BoardForm {
    #[serde(default)]
    pub title: String,
    pub is_public: Option<String>,
}

/// Board titles are 1 to 100 characters after trimming.
pub fn validate_board_title(title: &str) -> Result<String, String> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 {
        Err("Title is required.".to_string())
    } else if len > 100 {
        Err("Title must be at most 100 characters.".to_string())
    } else {
        Ok(title.to_string())
    }
}

// -- Helpers --

fn post_json(state: &AppState, post: &Post) -> serde_json::Value {
    json!({
        "id": post.id,
        "content": post.content,
        "user": post.username,
        "color": post.color,
        "position_x": post.position_x,
        "position_y": post.position_y,
        "width": post.width,
        "height": post.height,
        "z_index": post.z_index,
        "likes": post.likes,
        "image_url": post.image_path.as_deref().map(|p| state.media.url(p)),
        "file_url": post.file_path.as_deref().map(|p| state.media.url(p)),
        "file_name": post.file_name,
    })
}

fn post_views(
    state: &AppState,
    posts: Vec<Post>,
    comments: &[Comment],
    viewer: Option<&CurrentUser>,
) -> Vec<PostView> {
    posts
        .into_iter()
        .map(|post| PostView {
            image_url: post.image_path.as_deref().map(|p| state.media.url(p)),
            file_url: post.file_path.as_deref().map(|p| state.media.url(p)),
            comments: comments
                .iter()
                .filter(|c| c.post_id == post.id)
                .cloned()
                .collect(),
            can_edit: viewer.is_some_and(|u| u.may_modify(post.user_id)),
            post,
        })
        .collect()
}

fn board_url(board_id: i64) -> String {
    format!("/collaboration/board/{board_id}/")
}

fn ensure_visible(board: &Board, viewer: Option<&CurrentUser>) -> AppResult<()> {
    if board.visible_to(viewer.map(|u| u.id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden("You do not have access to this board.".into()))
    }
}

/// Board a note lives on, provided the viewer may see it.
async fn visible_board_of(state: &AppState, post: &Post, viewer: &CurrentUser) -> AppResult<Board> {
    let board = state
        .boards
        .get_board(post.board_id)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_visible(&board, Some(viewer))?;
    Ok(board)
}

// -- Board pages --

/// GET /collaboration/: public boards plus the viewer's own
pub async fn board_list(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Response> {
    let boards = state.boards.list_visible(user.as_ref().map(|u| u.id)).await?;

    let mut cards = Vec::with_capacity(boards.len());
    for board in boards {
        let posts = state.boards.posts_for_board(board.id).await?;
        let summary = CardSummary::from_posts(&posts);
        let thumbnail_url = summary.thumbnail_path.as_deref().map(|p| state.media.url(p));
        cards.push(BoardCard {
            board,
            summary,
            thumbnail_url,
        });
    }

    Ok(Html(BoardListTemplate { user, cards }).into_response())
}

/// GET /collaboration/gallery/: every visible board with its notes and comments
pub async fn gallery(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Response> {
    let boards = state.boards.list_visible(user.as_ref().map(|u| u.id)).await?;

    let mut gallery = Vec::with_capacity(boards.len());
    for board in boards {
        let posts = state.boards.posts_for_board(board.id).await?;
        let comments = state.boards.comments_for_board(board.id).await?;
        gallery.push(GalleryBoard {
            posts: post_views(&state, posts, &comments, user.as_ref()),
            board,
        });
    }

    Ok(Html(GalleryTemplate {
        user,
        boards: gallery,
    })
    .into_response())
}

/// GET /collaboration/board/{id}/
pub async fn board_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(board_id): Path<i64>,
) -> AppResult<Response> {
    let board = state.boards.get_board(board_id).await?.ok_or(AppError::NotFound)?;
    ensure_visible(&board, user.as_ref())?;

    let posts = state.boards.posts_for_board(board.id).await?;
    let comments = state.boards.comments_for_board(board.id).await?;
    let posts = post_views(&state, posts, &comments, user.as_ref());
    let can_delete = user.as_ref().is_some_and(|u| u.may_modify(board.creator_id));

    Ok(Html(BoardDetailTemplate {
        user,
        board,
        posts,
        colors: PostColor::ALL.to_vec(),
        can_delete,
    })
    .into_response())
}

/// GET /collaboration/board/create/
pub async fn board_create_page(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    if user.is_none() {
        return Ok(Redirect::to(LOGIN_URL).into_response());
    }
    Ok(Html(BoardFormTemplate {
        user,
        title: String::new(),
        is_public: true,
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /collaboration/board/create/
pub async fn board_create(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<BoardForm>,
) -> AppResult<Response> {
    let Some(creator) = user.clone() else {
        return Ok(Redirect::to(LOGIN_URL).into_response());
    };
    let is_public = form.is_public.is_some();

    let title = match validate_board_title(&form.title) {
        Ok(title) => title,
        Err(error) => {
            return Ok(Html(BoardFormTemplate {
                user,
                title: form.title,
                is_public,
                errors: vec![error],
            })
            .into_response());
        }
    };

    state
        .boards
        .create_board(&title, creator.id, is_public, Utc::now())
        .await?;
    Ok(Redirect::to(BOARD_LIST_URL).into_response())
}

/// POST /collaboration/board/{id}/delete/
pub async fn board_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(board_id): Path<i64>,
) -> AppResult<Response> {
    let board = state.boards.get_board(board_id).await?.ok_or(AppError::NotFound)?;
    user.ensure_can_modify(board.creator_id, "board")?;

    state.boards.delete_board(board.id).await?;
    tracing::info!(board_id, user_id = user.id, "Board deleted");
    Ok(Redirect::to(BOARD_LIST_URL).into_response())
}

// -- Note endpoints (AJAX) --

/// POST /collaboration/post/create/
pub async fn post_create(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: FormPayload,
) -> AppResult<Response> {
    let mut form = NewPostForm::from_payload(payload)?;
    let board = state
        .boards
        .get_board(form.board_id)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_visible(&board, Some(&user))?;

    let image_path = match form.image.take() {
        Some(upload) => Some(state.media.save(MediaKind::Image, &upload).await?.path),
        None => None,
    };
    let new_post = form.into_new_post(image_path);
    let post = state.boards.create_post(&new_post, user.id, Utc::now()).await?;
    tracing::debug!(post_id = post.id, board_id = board.id, "Note created");

    let mut body = json!({ "success": true, "post": post_json(&state, &post) });
    if let Some(path) = post.image_path.as_deref() {
        body["image_url"] = json!(state.media.url(path));
        body["post_id"] = json!(post.id);
    }
    Ok(Json(body).into_response())
}

/// POST /collaboration/post/{id}/update/: one field group per request
pub async fn post_update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    payload: FormPayload,
) -> AppResult<Response> {
    let post = state.boards.get_post(post_id).await?.ok_or(AppError::NotFound)?;
    user.ensure_can_modify(post.user_id, "note")?;

    let update = PostUpdate::from_payload(payload)?;
    let now = Utc::now();

    let (write, body) = match update {
        PostUpdate::Image(upload) => {
            let stored = state.media.save(MediaKind::Image, &upload).await?;
            let body = json!({ "success": true, "image_url": state.media.url(&stored.path) });
            (FieldWrite::Image { path: stored.path }, body)
        }
        PostUpdate::Attachment(upload) => {
            let stored = state.media.save(MediaKind::Attachment, &upload).await?;
            let body = json!({
                "success": true,
                "file_url": state.media.url(&stored.path),
                "file_name": stored.file_name,
            });
            (
                FieldWrite::Attachment {
                    path: stored.path,
                    name: stored.file_name,
                },
                body,
            )
        }
        PostUpdate::Move(position) => (FieldWrite::Position(position), json!({ "success": true })),
        PostUpdate::Resize(size) => (FieldWrite::Size(size), json!({ "success": true })),
        PostUpdate::Restack(z) => (FieldWrite::ZIndex(z), json!({ "success": true })),
        PostUpdate::Edit(content) => (FieldWrite::Content(content), serde_json::Value::Null),
    };

    if !state.boards.apply_update(post.id, &write, now).await? {
        return Err(AppError::NotFound);
    }

    if body.is_null() {
        let post = state.boards.get_post(post.id).await?.ok_or(AppError::NotFound)?;
        return Ok(Json(json!({ "success": true, "post": post_json(&state, &post) })).into_response());
    }
    Ok(Json(body).into_response())
}

/// POST /collaboration/post/{id}/delete/
pub async fn post_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    IsAjax(ajax): IsAjax,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = state.boards.get_post(post_id).await?.ok_or(AppError::NotFound)?;
    user.ensure_can_modify(post.user_id, "note")?;

    state.boards.delete_post(post.id).await?;
    if ajax {
        Ok(Json(json!({ "success": true })).into_response())
    } else {
        Ok(Redirect::to(&board_url(post.board_id)).into_response())
    }
}

/// POST /collaboration/post/{id}/feedback/: one like per session and note
pub async fn post_feedback(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
    Path(post_id): Path<i64>,
    payload: FormPayload,
) -> AppResult<Response> {
    let post = state.boards.get_post(post_id).await?.ok_or(AppError::NotFound)?;
    visible_board_of(&state, &post, &user).await?;

    if payload.text("type") != Some("like") {
        return Err(AppError::BadRequest("Unsupported feedback type.".into()));
    }

    if session.has_liked(post.id) || !claim_like(&state.db, &session.id(), post.id)? {
        let body = json!({
            "success": false,
            "message": "You already liked this note.",
            "likes": post.likes,
            "dislikes": post.dislikes,
        });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }

    let counts = state
        .boards
        .increment_likes(post.id)
        .await?
        .ok_or(AppError::NotFound)?;
    session.record_like(post.id);
    tracing::debug!(post_id, user_id = user.id, likes = counts.likes, "Note liked");

    Ok(Json(json!({
        "success": true,
        "likes": counts.likes,
        "dislikes": counts.dislikes,
    }))
    .into_response())
}

/// POST /collaboration/post/{id}/comment/create/
pub async fn comment_create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    payload: FormPayload,
) -> AppResult<Response> {
    let post = state.boards.get_post(post_id).await?.ok_or(AppError::NotFound)?;
    visible_board_of(&state, &post, &user).await?;

    let content = payload.text("content").unwrap_or_default().trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment content is required.".into()));
    }

    let comment = state
        .boards
        .create_comment(post.id, user.id, content, Utc::now())
        .await?;

    Ok(Json(json!({
        "success": true,
        "comment": {
            "id": comment.id,
            "content": comment.content,
            "author": comment.author_name,
            "created_at": comment.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }))
    .into_response())
}

/// POST /collaboration/comment/{id}/delete/
pub async fn comment_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    IsAjax(ajax): IsAjax,
    Path(comment_id): Path<i64>,
) -> AppResult<Response> {
    let comment = state
        .boards
        .get_comment(comment_id)
        .await?
        .ok_or(AppError::NotFound)?;
    user.ensure_can_modify(comment.author_id, "comment")?;

    let board_id = state
        .boards
        .get_post(comment.post_id)
        .await?
        .map(|p| p.board_id);
    state.boards.delete_comment(comment.id).await?;

    match (ajax, board_id) {
        (false, Some(board_id)) => Ok(Redirect::to(&board_url(board_id)).into_response()),
        _ => Ok(Json(json!({ "success": true })).into_response()),
    }
}
