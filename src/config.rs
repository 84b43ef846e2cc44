//! 配置加载
//!
//! 默认配置文件 `~/.config/spectator/config.json`（JSON 格式），
//! 不存在时使用内置默认值。所有字段均可省略。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SpectatorError;
use crate::policy::TrailingWindowEvaluator;

/// 保留期上限：一年
const MAX_RETENTION_SECS: u64 = 365 * 24 * 3600;

/// 滑动窗口策略参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub size: usize,
    pub degraded_at: usize,
    pub unhealthy_at: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let eval = TrailingWindowEvaluator::default();
        Self {
            size: eval.window,
            degraded_at: eval.degraded_at,
            unhealthy_at: eval.unhealthy_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectatorConfig {
    /// 日志保留期（秒）
    pub retention_secs: u64,
    /// 单个探针超时（毫秒），不设置则不限制
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
    pub window: WindowConfig,
}

impl Default for SpectatorConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600, // 10 分钟
            probe_timeout_ms: None,
            window: WindowConfig::default(),
        }
    }
}

impl SpectatorConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("spectator")
            .join("config.json")
    }

    /// 从指定文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 读取默认路径，不存在时返回默认配置
    pub fn auto_load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            debug!(path = %path.display(), "Loading config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> std::result::Result<(), SpectatorError> {
        if self.retention_secs > MAX_RETENTION_SECS {
            return Err(SpectatorError::Config(format!(
                "retention_secs ({}) exceeds {}",
                self.retention_secs, MAX_RETENTION_SECS
            )));
        }
        let w = &self.window;
        if w.size == 0 {
            return Err(SpectatorError::Config("window.size must be at least 1".into()));
        }
        // 阈值为 0 时空窗口也会判为降级或不健康
        if w.degraded_at == 0 || w.unhealthy_at == 0 {
            return Err(SpectatorError::Config(format!(
                "window thresholds must be at least 1 (degraded_at {}, unhealthy_at {})",
                w.degraded_at, w.unhealthy_at
            )));
        }
        if w.unhealthy_at > w.size {
            return Err(SpectatorError::Config(format!(
                "window.unhealthy_at ({}) exceeds window.size ({})",
                w.unhealthy_at, w.size
            )));
        }
        if w.degraded_at > w.unhealthy_at {
            return Err(SpectatorError::Config(format!(
                "window.degraded_at ({}) exceeds window.unhealthy_at ({})",
                w.degraded_at, w.unhealthy_at
            )));
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs.min(MAX_RETENTION_SECS) as i64)
    }

    pub fn probe_timeout(&self) -> Option<std::time::Duration> {
        self.probe_timeout_ms.map(std::time::Duration::from_millis)
    }

    pub fn evaluator(&self) -> TrailingWindowEvaluator {
        TrailingWindowEvaluator::new(self.window.size, self.window.degraded_at, self.window.unhealthy_at)
    }
}
