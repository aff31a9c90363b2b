use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::session::CurrentUser;
use crate::accounts::LOGIN_URL;
use crate::db::models::{ForumCategory, ForumComment, ForumPost};
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::forum::domain::{ListParams, Page, PostDraftForm};
use crate::forum::repository::{self, PostFilter};
use crate::routes::home::Html;
use crate::state::AppState;

const FORUM_URL: &str = "/forum/";

// -- Templates --

#[derive(Template)]
#[template(path = "forum/post_list.html")]
pub struct PostListTemplate {
    pub user: Option<CurrentUser>,
    pub posts: Vec<ForumPost>,
    pub page: Page,
    pub search: String,
    pub category: String,
    pub categories: Vec<ForumCategory>,
}

#[derive(Template)]
#[template(path = "forum/post_detail.html")]
pub struct PostDetailTemplate {
    pub user: Option<CurrentUser>,
    pub post: ForumPost,
    pub comments: Vec<ForumComment>,
    pub total_likes: i64,
    pub liked: bool,
    pub can_edit: bool,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "forum/post_form.html")]
pub struct PostFormTemplate {
    pub user: Option<CurrentUser>,
    pub form: PostDraftForm,
    pub post_id: Option<i64>,
    pub can_pin: bool,
    pub categories: Vec<ForumCategory>,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "forum/post_confirm_delete.html")]
pub struct PostConfirmDeleteTemplate {
    pub user: Option<CurrentUser>,
    pub post: ForumPost,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

fn post_url(id: i64) -> String {
    format!("/forum/{id}/")
}

fn login_redirect() -> Response {
    Redirect::to(LOGIN_URL).into_response()
}

fn load_post(state: &AppState, id: i64) -> AppResult<ForumPost> {
    repository::get_post(&state.db, id)?.ok_or(AppError::NotFound)
}

fn render_detail(
    state: &AppState,
    user: Option<CurrentUser>,
    post: ForumPost,
    error: Option<String>,
) -> AppResult<Response> {
    let comments = repository::comments_for_post(&state.db, post.id)?;
    let total_likes = repository::total_likes(&state.db, post.id)?;
    let liked = match &user {
        Some(u) => repository::is_liked_by(&state.db, post.id, u.id)?,
        None => false,
    };
    let can_edit = user.as_ref().is_some_and(|u| u.may_modify(post.author_id));

    Ok(Html(PostDetailTemplate {
        user,
        post,
        comments,
        total_likes,
        liked,
        can_edit,
        error,
    })
    .into_response())
}

/// GET /forum/?search=&category=&page=
pub async fn post_list(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let filter = PostFilter {
        search: params.search(),
        category: params.category(),
    };
    let (posts, page) = repository::list_posts(
        &state.db,
        &filter,
        params.requested_page(),
        state.config.forum.page_size,
    )?;

    Ok(Html(PostListTemplate {
        user,
        posts,
        page,
        search: params.search().unwrap_or_default().to_string(),
        category: filter.category.map(|c| c.as_str().to_string()).unwrap_or_default(),
        categories: ForumCategory::ALL.to_vec(),
    })
    .into_response())
}

/// GET /forum/{id}/: counts a view unless the author is looking
pub async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let mut post = load_post(&state, id)?;
    if user.as_ref().map(|u| u.id) != Some(post.author_id) {
        repository::increment_views(&state.db, post.id)?;
        post.views += 1;
    }
    render_detail(&state, user, post, None)
}

/// POST /forum/{id}/: add a comment
pub async fn comment_create(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let Some(author) = user.clone() else {
        return Ok(login_redirect());
    };
    let post = load_post(&state, id)?;

    let content = form.content.trim();
    if content.is_empty() {
        return render_detail(&state, user, post, Some("Comment cannot be empty.".into()));
    }

    repository::create_comment(&state.db, post.id, author.id, content, Utc::now())?;
    Ok(Redirect::to(&post_url(post.id)).into_response())
}

/// GET /forum/create/
pub async fn create_page(MaybeUser(user): MaybeUser) -> AppResult<Response> {
    let Some(author) = user.clone() else {
        return Ok(login_redirect());
    };
    Ok(Html(PostFormTemplate {
        user,
        form: PostDraftForm::default(),
        post_id: None,
        can_pin: author.is_superuser,
        categories: ForumCategory::ALL.to_vec(),
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /forum/create/
pub async fn create(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<PostDraftForm>,
) -> AppResult<Response> {
    let Some(author) = user.clone() else {
        return Ok(login_redirect());
    };

    match form.validate(author.is_superuser) {
        Ok(draft) => {
            let id = repository::create_post(&state.db, author.id, &draft, Utc::now())?;
            tracing::info!(post_id = id, author_id = author.id, "Forum post created");
            Ok(Redirect::to(&post_url(id)).into_response())
        }
        Err(errors) => Ok(Html(PostFormTemplate {
            user,
            form,
            post_id: None,
            can_pin: author.is_superuser,
            categories: ForumCategory::ALL.to_vec(),
            errors,
        })
        .into_response()),
    }
}

/// GET /forum/{id}/update/
pub async fn update_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let Some(editor) = user.clone() else {
        return Ok(login_redirect());
    };
    let post = load_post(&state, id)?;
    editor.ensure_can_modify(post.author_id, "post")?;

    let form = PostDraftForm {
        title: post.title,
        content: post.content,
        category: post.category.as_str().to_string(),
        is_notice: post.is_notice.then(|| "on".to_string()),
    };
    Ok(Html(PostFormTemplate {
        user,
        form,
        post_id: Some(post.id),
        can_pin: editor.is_superuser,
        categories: ForumCategory::ALL.to_vec(),
        errors: Vec::new(),
    })
    .into_response())
}

/// POST /forum/{id}/update/
pub async fn update(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
    Form(form): Form<PostDraftForm>,
) -> AppResult<Response> {
    let Some(editor) = user.clone() else {
        return Ok(login_redirect());
    };
    let post = load_post(&state, id)?;
    editor.ensure_can_modify(post.author_id, "post")?;

    match form.validate(editor.is_superuser) {
        Ok(draft) => {
            repository::update_post(&state.db, post.id, &draft, Utc::now())?;
            Ok(Redirect::to(&post_url(post.id)).into_response())
        }
        Err(errors) => Ok(Html(PostFormTemplate {
            user,
            form,
            post_id: Some(post.id),
            can_pin: editor.is_superuser,
            categories: ForumCategory::ALL.to_vec(),
            errors,
        })
        .into_response()),
    }
}

/// GET /forum/{id}/delete/: confirmation page
pub async fn delete_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let Some(actor) = user.clone() else {
        return Ok(login_redirect());
    };
    let post = load_post(&state, id)?;
    actor.ensure_can_modify(post.author_id, "post")?;
    Ok(Html(PostConfirmDeleteTemplate { user, post }).into_response())
}

/// POST /forum/{id}/delete/
pub async fn delete(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let Some(actor) = user else {
        return Ok(login_redirect());
    };
    let post = load_post(&state, id)?;
    actor.ensure_can_modify(post.author_id, "post")?;

    repository::delete_post(&state.db, post.id)?;
    tracing::info!(post_id = post.id, user_id = actor.id, "Forum post deleted");
    Ok(Redirect::to(FORUM_URL).into_response())
}

/// POST /forum/{id}/like/
pub async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let post = load_post(&state, id)?;
    let liked = repository::toggle_like(&state.db, post.id, user.id, Utc::now())?;
    let total_likes = repository::total_likes(&state.db, post.id)?;

    Ok(Json(json!({
        "success": true,
        "liked": liked,
        "total_likes": total_likes,
    }))
    .into_response())
}

/// POST /forum/comment/{id}/delete/
pub async fn comment_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let comment = repository::get_comment(&state.db, id)?.ok_or(AppError::NotFound)?;
    user.ensure_can_modify(comment.author_id, "comment")?;

    repository::delete_comment(&state.db, comment.id)?;
    Ok(Redirect::to(&post_url(comment.post_id)).into_response())
}
