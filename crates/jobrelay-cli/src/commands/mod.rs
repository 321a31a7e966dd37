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

//! Admin subcommands and the helpers they share.

use anyhow::{Context, Result};
use jobrelay::database::Database;
use jobrelay::outbox::SqliteOutboxStore;
use jobrelay::RelayConfig;
use std::path::Path;

pub mod outbox_stats;
pub mod purge_outbox;

/// Loads the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    match path {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(RelayConfig::default()),
    }
}

/// Opens the outbox database, applying any pending migrations.
pub async fn open_outbox(database_url: &str) -> Result<SqliteOutboxStore> {
    let database = Database::new(database_url).context("Failed to open outbox database")?;
    database
        .run_migrations()
        .await
        .context("Failed to migrate outbox database")?;
    Ok(SqliteOutboxStore::new(database))
}
