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

//! Configuration types for the outbox and the platform services.
//!
//! [`OutboxConfig`] and [`PlatformConfig`] are built in code through their
//! builders. [`RelayConfig`] is the TOML file form used by the CLI, and
//! converts into both.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the outbox producer, dispatcher and health check.
///
/// # Construction
///
/// ```rust,ignore
/// let config = OutboxConfig::builder()
///     .outbox_dir("/var/lib/worker/outbox")
///     .message_expiration_timeout(Duration::from_secs(3600))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OutboxConfig {
    outbox_dir: PathBuf,
    message_expiration_timeout: Duration,
    poll_interval: Duration,
    initial_retry_backoff: Duration,
    max_retry_backoff: Duration,
    max_document_size: usize,
    healthy_message_limit: usize,
}

impl OutboxConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> OutboxConfigBuilder {
        OutboxConfigBuilder::default()
    }

    /// Directory holding content stream files, one per message id.
    pub fn outbox_dir(&self) -> &Path {
        &self.outbox_dir
    }

    /// Age after which an undelivered message is dropped.
    pub fn message_expiration_timeout(&self) -> Duration {
        self.message_expiration_timeout
    }

    /// Idle wait between dispatch passes when no enqueue signal arrives.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait after the first failed pass.
    pub fn initial_retry_backoff(&self) -> Duration {
        self.initial_retry_backoff
    }

    /// Upper bound for the doubling backoff after failed passes.
    pub fn max_retry_backoff(&self) -> Duration {
        self.max_retry_backoff
    }

    /// Largest serialized content accepted by enqueue, in bytes.
    pub fn max_document_size(&self) -> usize {
        self.max_document_size
    }

    /// Pending message count above which the outbox reports as unhealthy.
    pub fn healthy_message_limit(&self) -> usize {
        self.healthy_message_limit
    }
}

/// Builder for [`OutboxConfig`].
#[derive(Debug, Clone)]
pub struct OutboxConfigBuilder {
    config: OutboxConfig,
}

impl Default for OutboxConfigBuilder {
    fn default() -> Self {
        Self {
            config: OutboxConfig {
                outbox_dir: PathBuf::from("outbox"),
                message_expiration_timeout: Duration::from_secs(48 * 60 * 60),
                poll_interval: Duration::from_secs(5),
                initial_retry_backoff: Duration::from_secs(30),
                max_retry_backoff: Duration::from_secs(15 * 60),
                max_document_size: 1_000_000,
                healthy_message_limit: 10,
            },
        }
    }
}

impl OutboxConfigBuilder {
    /// Sets the content stream directory.
    pub fn outbox_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.outbox_dir = value.into();
        self
    }

    /// Sets the message expiration timeout.
    pub fn message_expiration_timeout(mut self, value: Duration) -> Self {
        self.config.message_expiration_timeout = value;
        self
    }

    /// Sets the idle poll interval.
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    /// Sets the initial retry backoff.
    pub fn initial_retry_backoff(mut self, value: Duration) -> Self {
        self.config.initial_retry_backoff = value;
        self
    }

    /// Sets the maximum retry backoff.
    pub fn max_retry_backoff(mut self, value: Duration) -> Self {
        self.config.max_retry_backoff = value;
        self
    }

    /// Sets the maximum serialized content size.
    pub fn max_document_size(mut self, value: usize) -> Self {
        self.config.max_document_size = value;
        self
    }

    /// Sets the healthy pending message limit.
    pub fn healthy_message_limit(mut self, value: usize) -> Self {
        self.config.healthy_message_limit = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> OutboxConfig {
        self.config
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        OutboxConfigBuilder::default().build()
    }
}

/// Configuration for the platform state machine and client long-polls.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PlatformConfig {
    result_insert_batch_size: usize,
    long_poll_timeout: Duration,
}

impl PlatformConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> PlatformConfigBuilder {
        PlatformConfigBuilder::default()
    }

    /// Number of results buffered before each flush during InsertResults.
    pub fn result_insert_batch_size(&self) -> usize {
        self.result_insert_batch_size
    }

    /// How long a client long-poll waits before reporting a timeout.
    pub fn long_poll_timeout(&self) -> Duration {
        self.long_poll_timeout
    }
}

/// Builder for [`PlatformConfig`].
#[derive(Debug, Clone)]
pub struct PlatformConfigBuilder {
    config: PlatformConfig,
}

impl Default for PlatformConfigBuilder {
    fn default() -> Self {
        Self {
            config: PlatformConfig {
                result_insert_batch_size: 128,
                long_poll_timeout: Duration::from_secs(40),
            },
        }
    }
}

impl PlatformConfigBuilder {
    /// Sets the result insert batch size. Zero is treated as one.
    pub fn result_insert_batch_size(mut self, value: usize) -> Self {
        self.config.result_insert_batch_size = value.max(1);
        self
    }

    /// Sets the long-poll timeout.
    pub fn long_poll_timeout(mut self, value: Duration) -> Self {
        self.config.long_poll_timeout = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PlatformConfig {
        self.config
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfigBuilder::default().build()
    }
}

/// File form of the configuration. Durations are given in seconds.
///
/// ```toml
/// [outbox]
/// outbox_dir = "/var/lib/worker/outbox"
/// message_expiration_timeout_secs = 172800
///
/// [platform]
/// long_poll_timeout_secs = 40
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub outbox: OutboxSection,
    pub platform: PlatformSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutboxSection {
    pub outbox_dir: Option<PathBuf>,
    pub message_expiration_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub initial_retry_backoff_secs: Option<u64>,
    pub max_retry_backoff_secs: Option<u64>,
    pub max_document_size: Option<usize>,
    pub healthy_message_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformSection {
    pub result_insert_batch_size: Option<usize>,
    pub long_poll_timeout_secs: Option<u64>,
}

impl RelayConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn outbox_config(&self) -> OutboxConfig {
        let section = &self.outbox;
        let mut builder = OutboxConfig::builder();
        if let Some(dir) = &section.outbox_dir {
            builder = builder.outbox_dir(dir.clone());
        }
        if let Some(secs) = section.message_expiration_timeout_secs {
            builder = builder.message_expiration_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.poll_interval_secs {
            builder = builder.poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = section.initial_retry_backoff_secs {
            builder = builder.initial_retry_backoff(Duration::from_secs(secs));
        }
        if let Some(secs) = section.max_retry_backoff_secs {
            builder = builder.max_retry_backoff(Duration::from_secs(secs));
        }
        if let Some(size) = section.max_document_size {
            builder = builder.max_document_size(size);
        }
        if let Some(limit) = section.healthy_message_limit {
            builder = builder.healthy_message_limit(limit);
        }
        builder.build()
    }

    pub fn platform_config(&self) -> PlatformConfig {
        let section = &self.platform;
        let mut builder = PlatformConfig::builder();
        if let Some(size) = section.result_insert_batch_size {
            builder = builder.result_insert_batch_size(size);
        }
        if let Some(secs) = section.long_poll_timeout_secs {
            builder = builder.long_poll_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_outbox_config() {
        let config = OutboxConfig::default();

        assert_eq!(config.outbox_dir(), Path::new("outbox"));
        assert_eq!(
            config.message_expiration_timeout(),
            Duration::from_secs(172_800)
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.initial_retry_backoff(), Duration::from_secs(30));
        assert_eq!(config.max_retry_backoff(), Duration::from_secs(900));
        assert_eq!(config.max_document_size(), 1_000_000);
        assert_eq!(config.healthy_message_limit(), 10);
    }

    #[test]
    fn test_default_platform_config() {
        let config = PlatformConfig::default();
        assert_eq!(config.result_insert_batch_size(), 128);
        assert_eq!(config.long_poll_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = PlatformConfig::builder().result_insert_batch_size(0).build();
        assert_eq!(config.result_insert_batch_size(), 1);
    }

    #[test]
    fn test_config_debug() {
        let config = OutboxConfig::default();
        let debug_str = format!("{:?}", config);

        assert!(debug_str.contains("message_expiration_timeout"));
        assert!(debug_str.contains("outbox_dir"));
    }

    #[test]
    fn test_builder_all_fields() {
        let config = OutboxConfig::builder()
            .outbox_dir("/tmp/relay")
            .message_expiration_timeout(Duration::from_secs(60))
            .poll_interval(Duration::from_millis(250))
            .initial_retry_backoff(Duration::from_secs(1))
            .max_retry_backoff(Duration::from_secs(8))
            .max_document_size(512)
            .healthy_message_limit(3)
            .build();

        assert_eq!(config.outbox_dir(), Path::new("/tmp/relay"));
        assert_eq!(config.message_expiration_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.initial_retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.max_retry_backoff(), Duration::from_secs(8));
        assert_eq!(config.max_document_size(), 512);
        assert_eq!(config.healthy_message_limit(), 3);
    }

    #[test]
    fn test_relay_config_from_toml() {
        let config = RelayConfig::from_toml_str(
            r#"
            [outbox]
            outbox_dir = "/data/outbox"
            message_expiration_timeout_secs = 3600

            [platform]
            result_insert_batch_size = 64
            "#,
        )
        .unwrap();

        let outbox = config.outbox_config();
        assert_eq!(outbox.outbox_dir(), Path::new("/data/outbox"));
        assert_eq!(outbox.message_expiration_timeout(), Duration::from_secs(3600));
        assert_eq!(outbox.poll_interval(), Duration::from_secs(5));

        let platform = config.platform_config();
        assert_eq!(platform.result_insert_batch_size(), 64);
        assert_eq!(platform.long_poll_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn test_relay_config_rejects_unknown_fields() {
        let result = RelayConfig::from_toml_str("[outbox]\nretries = 3\n");
        assert!(matches!(result, Err(ConfigError::TomlParseError(_))));
    }

    #[test]
    fn test_empty_relay_config_uses_defaults() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config.platform_config().long_poll_timeout(), Duration::from_secs(40));
        assert_eq!(config.outbox_config().max_document_size(), 1_000_000);
    }
}
