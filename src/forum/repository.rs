// Forum storage - plain functions over the pool
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::db::models::{ForumCategory, ForumComment, ForumPost};
use crate::db::RepositoryError;
use crate::forum::domain::{like_pattern, Page, PostDraft};
use crate::state::DbPool;

const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.author_id, u.username, p.category, \
            p.is_notice, p.views, p.created_at, p.updated_at \
     FROM forum_posts p JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at \
     FROM forum_comments c JOIN users u ON u.id = c.author_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<ForumPost> {
    Ok(ForumPost {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        author_name: row.get(4)?,
        category: row.get(5)?,
        is_notice: row.get(6)?,
        views: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<ForumComment> {
    Ok(ForumComment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Filters for the post listing.
#[derive(Debug, Clone, Default)]
pub struct PostFilter<'a> {
    pub search: Option<&'a str>,
    pub category: Option<ForumCategory>,
}

impl PostFilter<'_> {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        if let Some(search) = self.search {
            let n = args.len() + 1;
            clauses.push(format!(
                "(p.title LIKE ?{n} ESCAPE '\\' OR p.content LIKE ?{n} ESCAPE '\\' OR u.username LIKE ?{n} ESCAPE '\\')"
            ));
            args.push(Value::Text(like_pattern(search)));
        }
        if let Some(category) = self.category {
            clauses.push(format!("p.category = ?{}", args.len() + 1));
            args.push(Value::Text(category.as_str().to_string()));
        }
        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

/// A page of posts: notices first, then newest.
pub fn list_posts(
    pool: &DbPool,
    filter: &PostFilter<'_>,
    requested_page: usize,
    page_size: usize,
) -> Result<(Vec<ForumPost>, Page), RepositoryError> {
    let conn = pool.get()?;
    let (where_sql, args) = filter.where_clause();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM forum_posts p JOIN users u ON u.id = p.author_id{where_sql}"),
        params_from_iter(args.iter()),
        |row| row.get(0),
    )?;
    let page = Page::resolve(requested_page, page_size, total.max(0) as usize);

    let mut page_args = args;
    page_args.push(Value::Integer(page.size as i64));
    page_args.push(Value::Integer(page.offset() as i64));
    let limit_n = page_args.len() - 1;
    let offset_n = page_args.len();

    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT}{where_sql} ORDER BY p.is_notice DESC, p.created_at DESC, p.id DESC \
         LIMIT ?{limit_n} OFFSET ?{offset_n}"
    ))?;
    let posts = stmt
        .query_map(params_from_iter(page_args.iter()), post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((posts, page))
}

pub fn get_post(pool: &DbPool, id: i64) -> Result<Option<ForumPost>, RepositoryError> {
    let conn = pool.get()?;
    let post = conn
        .query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), params![id], post_from_row)
        .optional()?;
    Ok(post)
}

pub fn create_post(
    pool: &DbPool,
    author_id: i64,
    draft: &PostDraft,
    now: DateTime<Utc>,
) -> Result<i64, RepositoryError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO forum_posts (title, content, author_id, category, is_notice, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![draft.title, draft.content, author_id, draft.category, draft.is_notice, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_post(
    pool: &DbPool,
    id: i64,
    draft: &PostDraft,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE forum_posts SET title = ?2, content = ?3, category = ?4, is_notice = ?5, updated_at = ?6 \
         WHERE id = ?1",
        params![id, draft.title, draft.content, draft.category, draft.is_notice, now],
    )?;
    Ok(changed > 0)
}

pub fn delete_post(pool: &DbPool, id: i64) -> Result<bool, RepositoryError> {
    let conn = pool.get()?;
    Ok(conn.execute("DELETE FROM forum_posts WHERE id = ?1", params![id])? > 0)
}

pub fn increment_views(pool: &DbPool, id: i64) -> Result<(), RepositoryError> {
    let conn = pool.get()?;
    conn.execute("UPDATE forum_posts SET views = views + 1 WHERE id = ?1", params![id])?;
    Ok(())
}

/// Flip the user's like. Returns whether the user likes the post afterwards.
pub fn toggle_like(
    pool: &DbPool,
    post_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let conn = pool.get()?;
    let removed = conn.execute(
        "DELETE FROM forum_post_likes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    if removed > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT OR IGNORE INTO forum_post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, now],
    )?;
    Ok(true)
}

pub fn total_likes(pool: &DbPool, post_id: i64) -> Result<i64, RepositoryError> {
    let conn = pool.get()?;
    let total = conn.query_row(
        "SELECT COUNT(*) FROM forum_post_likes WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn is_liked_by(pool: &DbPool, post_id: i64, user_id: i64) -> Result<bool, RepositoryError> {
    let conn = pool.get()?;
    let liked = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM forum_post_likes WHERE post_id = ?1 AND user_id = ?2)",
        params![post_id, user_id],
        |row| row.get(0),
    )?;
    Ok(liked)
}

/// Comments on a post, oldest first
pub fn comments_for_post(pool: &DbPool, post_id: i64) -> Result<Vec<ForumComment>, RepositoryError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn create_comment(
    pool: &DbPool,
    post_id: i64,
    author_id: i64,
    content: &str,
    now: DateTime<Utc>,
) -> Result<i64, RepositoryError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO forum_comments (post_id, author_id, content, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![post_id, author_id, content, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_comment(pool: &DbPool, id: i64) -> Result<Option<ForumComment>, RepositoryError> {
    let conn = pool.get()?;
    let comment = conn
        .query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), params![id], comment_from_row)
        .optional()?;
    Ok(comment)
}

pub fn delete_comment(pool: &DbPool, id: i64) -> Result<bool, RepositoryError> {
    let conn = pool.get()?;
    Ok(conn.execute("DELETE FROM forum_comments WHERE id = ?1", params![id])? > 0)
}
