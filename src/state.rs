use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::boards::repository::{BoardRepository, SqliteBoardRepository};
use crate::config::Config;
use crate::media::{LocalMediaStore, MediaStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub boards: Arc<dyn BoardRepository>,
    pub media: Arc<dyn MediaStore>,
}

impl AppState {
    /// Wire the SQLite board repository and the local media store around a pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let media = LocalMediaStore::new(config.uploads_path(), config.storage.media_url.clone());
        Self {
            boards: Arc::new(SqliteBoardRepository::new(db.clone())),
            media: Arc::new(media),
            db,
            config,
        }
    }
}
