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

//! Durable outbox store on SQLite.
//!
//! Index assignment and the message insert share one immediate transaction,
//! so two producers can never draw the same index for a group. Timestamps are
//! stored as fixed-width RFC 3339 text, which sorts chronologically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;

use super::store::OutboxStore;
use crate::database::schema::{outbox_groups, outbox_messages};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{NewOutboxMessage, OutboxMessage};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = outbox_messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct OutboxMessageRow {
    id: String,
    outbox_ref: String,
    method: String,
    group_id: String,
    message_index: i64,
    content: Option<String>,
    has_content_stream: bool,
    attempts: i32,
    created_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = outbox_messages)]
struct NewOutboxMessageRow {
    id: String,
    outbox_ref: String,
    method: String,
    group_id: String,
    message_index: i64,
    content: Option<String>,
    has_content_stream: bool,
    attempts: i32,
    created_at: String,
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidValue {
            field: "created_at",
            value: value.to_string(),
        })
}

impl TryFrom<OutboxMessageRow> for OutboxMessage {
    type Error = StoreError;

    fn try_from(row: OutboxMessageRow) -> Result<Self, Self::Error> {
        Ok(OutboxMessage {
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            outbox_ref: row.outbox_ref,
            method: row.method,
            group_id: row.group_id,
            index: row.message_index,
            content: row.content,
            has_content_stream: row.has_content_stream,
            attempts: row.attempts,
        })
    }
}

fn into_messages(rows: Vec<OutboxMessageRow>) -> Result<Vec<OutboxMessage>, StoreError> {
    rows.into_iter().map(OutboxMessage::try_from).collect()
}

/// [`OutboxStore`] persisted in SQLite.
#[derive(Clone, Debug)]
pub struct SqliteOutboxStore {
    database: Database,
}

impl SqliteOutboxStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<OutboxMessage, StoreError> {
        let conn = self.database.connection().await?;

        let outbox_ref = message.outbox_ref.clone();
        let group_id = message.group_id.clone();
        let mut row = NewOutboxMessageRow {
            id: message.id.clone(),
            outbox_ref: message.outbox_ref.clone(),
            method: message.method.clone(),
            group_id: message.group_id.clone(),
            message_index: 0,
            content: message.content.clone(),
            has_content_stream: message.has_content_stream,
            attempts: 0,
            created_at: format_timestamp(message.created_at),
        };

        let index = conn
            .interact(move |conn| {
                conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                    let group = outbox_groups::table
                        .filter(outbox_groups::outbox_ref.eq(&outbox_ref))
                        .filter(outbox_groups::group_id.eq(&group_id));
                    let current: Option<i64> = group
                        .clone()
                        .select(outbox_groups::current_index)
                        .first(conn)
                        .optional()?;
                    let index = current.unwrap_or(0) + 1;

                    if current.is_some() {
                        diesel::update(group)
                            .set(outbox_groups::current_index.eq(index))
                            .execute(conn)?;
                    } else {
                        diesel::insert_into(outbox_groups::table)
                            .values((
                                outbox_groups::outbox_ref.eq(&outbox_ref),
                                outbox_groups::group_id.eq(&group_id),
                                outbox_groups::current_index.eq(index),
                            ))
                            .execute(conn)?;
                    }

                    row.message_index = index;
                    diesel::insert_into(outbox_messages::table)
                        .values(&row)
                        .execute(conn)?;
                    Ok(index)
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(message.into_message(index))
    }

    async fn list_pending(&self) -> Result<Vec<OutboxMessage>, StoreError> {
        let conn = self.database.connection().await?;
        let rows: Vec<OutboxMessageRow> = conn
            .interact(|conn| {
                outbox_messages::table
                    .select(OutboxMessageRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        into_messages(rows)
    }

    async fn increment_attempts(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.database.connection().await?;
        let id = id.to_string();
        conn.interact(move |conn| {
            diesel::update(outbox_messages::table.find(id))
                .set(outbox_messages::attempts.eq(outbox_messages::attempts + 1))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.database.connection().await?;
        let id = id.to_string();
        let deleted = conn
            .interact(move |conn| diesel::delete(outbox_messages::table.find(id)).execute(conn))
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        Ok(deleted > 0)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.database.connection().await?;
        let count: i64 = conn
            .interact(|conn| outbox_messages::table.count().get_result(conn))
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        Ok(count as usize)
    }

    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let conn = self.database.connection().await?;
        let cutoff = format_timestamp(cutoff);
        let rows: Vec<OutboxMessageRow> = conn
            .interact(move |conn| {
                outbox_messages::table
                    .filter(outbox_messages::created_at.lt(cutoff))
                    .order(outbox_messages::created_at.asc())
                    .select(OutboxMessageRow::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;
        into_messages(rows)
    }
}
