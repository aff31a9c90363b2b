// Repository pattern - isolates all board database side effects
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::boards::domain::{FieldWrite, NewPost};
use crate::db::models::{Board, Comment, Post};
use crate::db::RepositoryError;
use crate::state::DbPool;

/// Likes and dislikes of a note after a feedback write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackCounts {
    pub likes: i64,
    pub dislikes: i64,
}

#[async_trait]
pub trait BoardRepository: Send + Sync {
    /// Public boards plus the viewer's own, newest first
    async fn list_visible(&self, viewer_id: Option<i64>) -> Result<Vec<Board>, RepositoryError>;

    async fn boards_by_creator(&self, user_id: i64) -> Result<Vec<Board>, RepositoryError>;

    async fn get_board(&self, id: i64) -> Result<Option<Board>, RepositoryError>;

    async fn create_board(
        &self,
        title: &str,
        creator_id: i64,
        is_public: bool,
        now: DateTime<Utc>,
    ) -> Result<Board, RepositoryError>;

    /// Notes and comments go with the board (cascade)
    async fn delete_board(&self, id: i64) -> Result<bool, RepositoryError>;

    /// Notes of a board in stacking order
    async fn posts_for_board(&self, board_id: i64) -> Result<Vec<Post>, RepositoryError>;

    async fn get_post(&self, id: i64) -> Result<Option<Post>, RepositoryError>;

    async fn create_post(
        &self,
        post: &NewPost,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Post, RepositoryError>;

    /// Write one column group. Returns false when the note is gone.
    async fn apply_update(
        &self,
        post_id: i64,
        write: &FieldWrite,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError>;

    /// Atomic `likes + 1`. `None` when the note does not exist.
    async fn increment_likes(&self, post_id: i64) -> Result<Option<FeedbackCounts>, RepositoryError>;

    /// Comments on every note of a board, oldest first
    async fn comments_for_board(&self, board_id: i64) -> Result<Vec<Comment>, RepositoryError>;

    async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, RepositoryError>;

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, RepositoryError>;

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError>;
}

const BOARD_SELECT: &str = "SELECT b.id, b.title, b.creator_id, u.username, b.is_public, b.created_at, b.updated_at \
     FROM boards b JOIN users u ON u.id = b.creator_id";

const POST_SELECT: &str = "SELECT p.id, p.board_id, p.user_id, u.username, p.content, p.color, \
            p.position_x, p.position_y, p.width, p.height, p.z_index, \
            p.image_path, p.file_path, p.file_name, p.likes, p.dislikes, p.created_at, p.updated_at \
     FROM posts p JOIN users u ON u.id = p.user_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.username, c.content, c.created_at \
     FROM post_comments c JOIN users u ON u.id = c.author_id";

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        title: row.get(1)?,
        creator_id: row.get(2)?,
        creator_name: row.get(3)?,
        is_public: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        board_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        color: row.get(5)?,
        position_x: row.get(6)?,
        position_y: row.get(7)?,
        width: row.get(8)?,
        height: row.get(9)?,
        z_index: row.get(10)?,
        image_path: row.get(11)?,
        file_path: row.get(12)?,
        file_name: row.get(13)?,
        likes: row.get(14)?,
        dislikes: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// SQLite implementation
pub struct SqliteBoardRepository {
    pool: DbPool,
}

impl SqliteBoardRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn query_boards(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Board>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let boards = stmt
            .query_map(params, board_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(boards)
    }
}

#[async_trait]
impl BoardRepository for SqliteBoardRepository {
    async fn list_visible(&self, viewer_id: Option<i64>) -> Result<Vec<Board>, RepositoryError> {
        self.query_boards(
            &format!(
                "{BOARD_SELECT} WHERE b.is_public = 1 OR b.creator_id = ?1 \
                 ORDER BY b.created_at DESC, b.id DESC"
            ),
            params![viewer_id],
        )
    }

    async fn boards_by_creator(&self, user_id: i64) -> Result<Vec<Board>, RepositoryError> {
        self.query_boards(
            &format!("{BOARD_SELECT} WHERE b.creator_id = ?1 ORDER BY b.created_at DESC, b.id DESC"),
            params![user_id],
        )
    }

    async fn get_board(&self, id: i64) -> Result<Option<Board>, RepositoryError> {
        let conn = self.pool.get()?;
        let board = conn
            .query_row(&format!("{BOARD_SELECT} WHERE b.id = ?1"), params![id], board_from_row)
            .optional()?;
        Ok(board)
    }

    async fn create_board(
        &self,
        title: &str,
        creator_id: i64,
        is_public: bool,
        now: DateTime<Utc>,
    ) -> Result<Board, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO boards (title, creator_id, is_public, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![title, creator_id, is_public, now],
        )?;
        let id = conn.last_insert_rowid();
        let board = conn.query_row(&format!("{BOARD_SELECT} WHERE b.id = ?1"), params![id], board_from_row)?;
        tracing::info!(board_id = id, creator_id, "Board created");
        Ok(board)
    }

    async fn delete_board(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM boards WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn posts_for_board(&self, board_id: i64) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{POST_SELECT} WHERE p.board_id = ?1 ORDER BY p.z_index ASC, p.id ASC"
        ))?;
        let posts = stmt
            .query_map(params![board_id], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), params![id], post_from_row)
            .optional()?;
        Ok(post)
    }

    async fn create_post(
        &self,
        post: &NewPost,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Post, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (board_id, user_id, content, color, position_x, position_y, image_path, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                post.board_id,
                user_id,
                post.content,
                post.color,
                post.position.x,
                post.position.y,
                post.image_path,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created = conn.query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), params![id], post_from_row)?;
        Ok(created)
    }

    async fn apply_update(
        &self,
        post_id: i64,
        write: &FieldWrite,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = match write {
            FieldWrite::Image { path } => conn.execute(
                "UPDATE posts SET image_path = ?2, updated_at = ?3 WHERE id = ?1",
                params![post_id, path, now],
            )?,
            FieldWrite::Attachment { path, name } => conn.execute(
                "UPDATE posts SET file_path = ?2, file_name = ?3, updated_at = ?4 WHERE id = ?1",
                params![post_id, path, name, now],
            )?,
            FieldWrite::Position(pos) => conn.execute(
                "UPDATE posts SET position_x = ?2, position_y = ?3, updated_at = ?4 WHERE id = ?1",
                params![post_id, pos.x, pos.y, now],
            )?,
            FieldWrite::Size(dim) => conn.execute(
                "UPDATE posts SET width = ?2, height = ?3, updated_at = ?4 WHERE id = ?1",
                params![post_id, dim.width, dim.height, now],
            )?,
            FieldWrite::ZIndex(z) => conn.execute(
                "UPDATE posts SET z_index = ?2, updated_at = ?3 WHERE id = ?1",
                params![post_id, z, now],
            )?,
            FieldWrite::Content(content) => conn.execute(
                "UPDATE posts SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![post_id, content, now],
            )?,
        };
        Ok(changed > 0)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    async fn increment_likes(&self, post_id: i64) -> Result<Option<FeedbackCounts>, RepositoryError> {
        let conn = self.pool.get()?;
        let counts = conn
            .query_row(
                "UPDATE posts SET likes = likes + 1 WHERE id = ?1 RETURNING likes, dislikes",
                params![post_id],
                |row| {
                    Ok(FeedbackCounts {
                        likes: row.get(0)?,
                        dislikes: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(counts)
    }

    async fn comments_for_board(&self, board_id: i64) -> Result<Vec<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{COMMENT_SELECT} JOIN posts p ON p.id = c.post_id \
             WHERE p.board_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
        ))?;
        let comments = stmt
            .query_map(params![board_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO post_comments (post_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![post_id, author_id, content, now],
        )?;
        let id = conn.last_insert_rowid();
        let comment = conn.query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), params![id], comment_from_row)?;
        Ok(comment)
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        let comment = conn
            .query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), params![id], comment_from_row)
            .optional()?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM post_comments WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::users;
    use crate::boards::domain::{Dimensions, Position};
    use crate::db;
    use crate::db::models::PostColor;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteBoardRepository, DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteBoardRepository::new(pool.clone()), pool, temp_dir)
    }

    fn new_post(board_id: i64, content: &str) -> NewPost {
        NewPost {
            board_id,
            content: content.into(),
            color: PostColor::Pink,
            position: Position { x: 10.0, y: 20.0 },
            image_path: None,
        }
    }

    #[tokio::test]
    async fn visibility_respects_privacy() {
        let (repo, pool, _tmp) = create_test_repo();
        let alice = users::create_registered(&pool, "alice", "password1", false, 4).unwrap();
        let bob = users::create_registered(&pool, "bob", "password1", false, 4).unwrap();
        let now = Utc::now();

        repo.create_board("Public", alice.id, true, now).await.unwrap();
        let private = repo.create_board("Secret", alice.id, false, now).await.unwrap();
        assert_eq!(private.creator_name, "alice");

        assert_eq!(repo.list_visible(None).await.unwrap().len(), 1);
        assert_eq!(repo.list_visible(Some(bob.id)).await.unwrap().len(), 1);
        assert_eq!(repo.list_visible(Some(alice.id)).await.unwrap().len(), 2);
        assert_eq!(repo.boards_by_creator(alice.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn field_writes_touch_only_their_columns() {
        let (repo, pool, _tmp) = create_test_repo();
        let alice = users::create_registered(&pool, "alice", "password1", false, 4).unwrap();
        let now = Utc::now();
        let board = repo.create_board("B", alice.id, true, now).await.unwrap();
        let post = repo.create_post(&new_post(board.id, "hello"), alice.id, now).await.unwrap();
        assert_eq!(post.z_index, 1);
        assert_eq!(post.color, PostColor::Pink);

        repo.apply_update(post.id, &FieldWrite::Position(Position { x: 1.5, y: -2.0 }), now)
            .await
            .unwrap();
        repo.apply_update(post.id, &FieldWrite::Size(Dimensions { width: 200.0, height: 150.0 }), now)
            .await
            .unwrap();
        repo.apply_update(post.id, &FieldWrite::ZIndex(9), now).await.unwrap();

        let updated = repo.get_post(post.id).await.unwrap().unwrap();
        assert_eq!((updated.position_x, updated.position_y), (1.5, -2.0));
        assert_eq!((updated.width, updated.height), (Some(200.0), Some(150.0)));
        assert_eq!(updated.z_index, 9);
        assert_eq!(updated.content, "hello");

        assert!(!repo.apply_update(9999, &FieldWrite::ZIndex(1), now).await.unwrap());
    }

    #[tokio::test]
    async fn likes_increment_atomically() {
        let (repo, pool, _tmp) = create_test_repo();
        let alice = users::create_registered(&pool, "alice", "password1", false, 4).unwrap();
        let now = Utc::now();
        let board = repo.create_board("B", alice.id, true, now).await.unwrap();
        let post = repo.create_post(&new_post(board.id, ""), alice.id, now).await.unwrap();

        let first = repo.increment_likes(post.id).await.unwrap().unwrap();
        let second = repo.increment_likes(post.id).await.unwrap().unwrap();
        assert_eq!(first, FeedbackCounts { likes: 1, dislikes: 0 });
        assert_eq!(second.likes, 2);
        assert!(repo.increment_likes(424242).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_board_cascades_to_posts_and_comments() {
        let (repo, pool, _tmp) = create_test_repo();
        let alice = users::create_registered(&pool, "alice", "password1", false, 4).unwrap();
        let now = Utc::now();
        let board = repo.create_board("B", alice.id, true, now).await.unwrap();
        let post = repo.create_post(&new_post(board.id, "x"), alice.id, now).await.unwrap();
        let comment = repo.create_comment(post.id, alice.id, "nice", now).await.unwrap();
        assert_eq!(comment.author_name, "alice");
        assert_eq!(repo.comments_for_board(board.id).await.unwrap().len(), 1);

        assert!(repo.delete_board(board.id).await.unwrap());
        assert!(repo.get_post(post.id).await.unwrap().is_none());
        assert!(repo.get_comment(comment.id).await.unwrap().is_none());
        assert!(!repo.delete_board(board.id).await.unwrap());
    }
}
