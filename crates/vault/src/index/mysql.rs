//! [`MySqlIndex`]: the image index backed by a MySQL `images` table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    Error as SqlxError,
};
use tracing::info;

use super::{ImageIndex, IndexError, IndexedImage, Orientation};

/// Upper bound on pooled connections.
const MAX_CONNECTIONS: u32 = 10;

/// How long a request waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Image index over a lazily connected MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlIndex {
    pool: MySqlPool,
}

impl MySqlIndex {
    /// Build the pool without connecting. The first query opens a connection.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Query`] if `url` is not a valid MySQL URL.
    pub fn connect_lazy(url: &str) -> Result<Self, IndexError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(url)
            .map_err(query_error)?;
        info!("index connection pool created");
        Ok(Self { pool })
    }
}

/// Build the sampling query for `orientation`.
///
/// The predicate is one of four fixed strings; no request text reaches SQL.
fn random_query(orientation: Orientation) -> String {
    format!(
        "SELECT filepath, filename FROM images WHERE {} ORDER BY RAND() LIMIT 1",
        orientation.predicate()
    )
}

fn query_error(e: SqlxError) -> IndexError {
    IndexError::Query(e.to_string())
}

#[async_trait]
impl ImageIndex for MySqlIndex {
    async fn random(&self, orientation: Orientation) -> Result<Option<IndexedImage>, IndexError> {
        let sql = random_query(orientation);
        let row: Option<(String, String)> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(row.map(|(filepath, filename)| IndexedImage { filepath, filename }))
    }

    async fn ping(&self) -> Result<(), IndexError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}
