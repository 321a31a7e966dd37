/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database connection management.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobrelay::database::Database;
//!
//! let db = Database::new("sqlite:///var/lib/worker/outbox.db")?;
//! db.run_migrations().await?;
//! ```

use deadpool_diesel::sqlite::{Manager, Object, Pool, Runtime};
use diesel::connection::SimpleConnection;
use diesel_migrations::MigrationHarness;
use tracing::info;

use crate::error::StoreError;

/// SQLite serializes writers, so the pool holds a single connection.
const SQLITE_POOL_SIZE: usize = 1;

/// A pooled SQLite database.
///
/// Cloning is cheap; each clone references the same pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a pool for a file path, `sqlite://` URL, or `:memory:`.
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let connection_url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(connection_url, Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(SQLITE_POOL_SIZE)
            .build()
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;
        info!("SQLite connection pool initialized (size: {})", SQLITE_POOL_SIZE);
        Ok(Self { pool })
    }

    fn build_sqlite_url(connection_string: &str) -> String {
        match connection_string.strip_prefix("sqlite://") {
            Some(path) => path.to_string(),
            None => connection_string.to_string(),
        }
    }

    pub async fn connection(&self) -> Result<Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))
    }

    /// Applies pragmas and runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.connection().await?;
        conn.interact(|conn| {
            // WAL allows readers during writes; busy_timeout waits on locks
            // held by other processes instead of failing immediately.
            conn.batch_execute("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=30000;")?;
            conn.run_pending_migrations(super::SQLITE_MIGRATIONS)
                .map_err(|e| StoreError::Migration(e.to_string()))?;
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        Ok(())
    }
}
