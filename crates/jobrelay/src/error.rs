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

//! Error types for the store, outbox, platform and client-facing services.
//!
//! Delivery failures are classified through [`StatusCode::failure_kind`], which
//! decides whether the dispatcher aborts its pass, counts an attempt, or drops
//! the message.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by entity repositories and the durable outbox tables.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key: {id}")]
    DuplicateKey { id: String },

    #[error("Subscription closed: the repository was dropped")]
    SubscriptionClosed,

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors raised while enqueueing or dispatching outbox messages.
#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Outbox store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to serialize outbox content: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Outbox content file {path}: {source}")]
    ContentFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Content for {method} on group {group_id} is {size} bytes, exceeding the limit of {max}"
    )]
    ContentTooLarge {
        method: String,
        group_id: String,
        size: usize,
        max: usize,
    },

    #[error("No consumer registered for outbox '{outbox_ref}' method '{method}'")]
    ConsumerNotRegistered { outbox_ref: String, method: String },
}

/// Status codes reported by a remote consumer. Mirrors the gRPC code set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// How the dispatcher treats a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The endpoint could not be reached. Abort the pass without counting an attempt.
    Unavailable,
    /// The endpoint rejected the call. Count an attempt and move to the next group.
    Transient,
    /// The message can never succeed. Drop it.
    Permanent,
}

impl StatusCode {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StatusCode::Unavailable
            | StatusCode::Unauthenticated
            | StatusCode::PermissionDenied
            | StatusCode::Cancelled => FailureKind::Unavailable,
            StatusCode::DeadlineExceeded
            | StatusCode::Internal
            | StatusCode::ResourceExhausted
            | StatusCode::Unknown => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Cancelled => "cancelled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }
}

/// Failure returned by an outbox consumer.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Remote call failed: {0}")]
    Rpc(#[from] RpcStatus),

    #[error("Failed to decode outbox content: {0}")]
    Content(#[from] serde_json::Error),

    #[error("Failed to read outbox content stream: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Message for {method} requires a content stream")]
    MissingStream { method: String },
}

impl DeliveryError {
    /// Local decode and stream failures will repeat on every attempt, so they are permanent.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DeliveryError::Rpc(status) => status.code.failure_kind(),
            _ => FailureKind::Permanent,
        }
    }
}

/// Errors raised by the platform state machine.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("The {entity} does not exist.")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid content: {0}")]
    InvalidContent(#[from] serde_json::Error),

    #[error("Result stream failed: {0}")]
    Stream(RpcStatus),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PlatformError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        PlatformError::NotFound {
            entity: "job",
            id: id.into(),
        }
    }

    pub fn engine_not_found(id: impl Into<String>) -> Self {
        PlatformError::NotFound {
            entity: "engine",
            id: id.into(),
        }
    }
}

impl From<PlatformError> for RpcStatus {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::NotFound { .. } => RpcStatus::not_found(error.to_string()),
            PlatformError::InvalidContent(e) => {
                RpcStatus::new(StatusCode::InvalidArgument, e.to_string())
            }
            PlatformError::Stream(status) => status,
            PlatformError::Store(e) => RpcStatus::internal(e.to_string()),
        }
    }
}

/// Errors raised while publishing a domain event.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to enqueue event: {0}")]
    Outbox(#[from] OutboxError),
}

/// Errors raised by the client-facing job and engine services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("The {entity} does not exist: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("The request timed out before revision {min_revision} was reached")]
    RequestTimeout { min_revision: i64 },

    #[error("Engine {engine_id} already has an active job")]
    JobAlreadyRunning { engine_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while loading a [`crate::config::RelayConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
}
