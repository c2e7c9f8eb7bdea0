//! Gateway configuration: a YAML file with environment overrides.

use anyhow::Context;
use glyphmine_engine::auction::LoserRefundPolicy;
use glyphmine_engine::grumble::RemainderPolicy;
use glyphmine_engine::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    /// Directory for the persisted documents and exports.
    pub data_dir: PathBuf,
    /// Log level filter (`error` .. `trace`).
    pub log_level: String,
    pub tick_interval_ms: u64,
    pub write_debounce_ms: u64,
    /// Grumble tie remainder handling: `retain` or `distribute`.
    pub grumble_remainder_policy: String,
    /// Auction loser escrow handling: `retain` or `refund`.
    pub auction_refund_policy: String,
    /// Discord-compatible webhook for block/side-game notifications.
    pub webhook_url: Option<String>,
    /// Role id mentioned in webhook notifications.
    pub notify_role_id: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            tick_interval_ms: 1_000,
            write_debounce_ms: 100,
            grumble_remainder_policy: "retain".to_string(),
            auction_refund_policy: "retain".to_string(),
            webhook_url: None,
            notify_role_id: None,
        }
    }
}

impl GatewayConfig {
    /// Load from a YAML file (or defaults when none is given), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file {}", path.display()))?;
                serde_yaml::from_str(&raw).context("parse config file")?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("GLYPHMINE_LISTEN_ADDR") {
            self.listen_addr = value;
        }
        if let Ok(value) = std::env::var("GLYPHMINE_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("GLYPHMINE_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Ok(value) = std::env::var("GLYPHMINE_WEBHOOK_URL") {
            self.webhook_url = Some(value);
        }
        if let Ok(value) = std::env::var("GLYPHMINE_NOTIFY_ROLE_ID") {
            self.notify_role_id = Some(value);
        }
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let remainder_policy: RemainderPolicy = self
            .grumble_remainder_policy
            .parse()
            .map_err(|err| anyhow::anyhow!("grumble_remainder_policy: {err}"))?;
        let refund_policy: LoserRefundPolicy = self
            .auction_refund_policy
            .parse()
            .map_err(|err| anyhow::anyhow!("auction_refund_policy: {err}"))?;
        Ok(EngineConfig {
            data_dir: self.data_dir.clone(),
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            write_debounce: Duration::from_millis(self.write_debounce_ms),
            remainder_policy,
            refund_policy,
            ..EngineConfig::default()
        })
    }
}
