//! 示例评估策略
//!
//! 这些策略只是 [`StateEvaluator`] 的参考实现，引擎本身不依赖其中任何阈值。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluator::StateEvaluator;
use crate::journal::JournalRecord;

/// 聚合健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// 尚未完成任何检查
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// 滑动窗口策略 - 统计最近 `window` 条记录中出现失败的记录数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingWindowEvaluator {
    /// 窗口大小（记录条数）
    pub window: usize,
    /// 失败记录数达到该值时为 Degraded
    pub degraded_at: usize,
    /// 失败记录数达到该值时为 Unhealthy
    pub unhealthy_at: usize,
}

impl TrailingWindowEvaluator {
    pub fn new(window: usize, degraded_at: usize, unhealthy_at: usize) -> Self {
        Self {
            window,
            degraded_at,
            unhealthy_at,
        }
    }

    /// 窗口内含失败的记录数
    pub fn failed_records(&self, journal: &[JournalRecord]) -> usize {
        let start = journal.len().saturating_sub(self.window);
        journal[start..].iter().filter(|r| r.has_failure()).count()
    }
}

impl Default for TrailingWindowEvaluator {
    fn default() -> Self {
        Self::new(3, 1, 2)
    }
}

impl StateEvaluator<HealthState> for TrailingWindowEvaluator {
    fn evaluate(&self, _current: &HealthState, _changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> HealthState {
        let failed = self.failed_records(journal);
        if failed >= self.unhealthy_at {
            HealthState::Unhealthy
        } else if failed >= self.degraded_at {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }
}

/// 只看最后一条记录
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestRecordEvaluator;

impl StateEvaluator<HealthState> for LatestRecordEvaluator {
    fn evaluate(&self, _current: &HealthState, _changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> HealthState {
        match journal.last() {
            Some(last) if last.has_failure() => HealthState::Degraded,
            _ => HealthState::Healthy,
        }
    }
}

/// 连续失败计数策略
///
/// 最新的 `threshold` 条记录全部含失败时为 Unhealthy；最新一条记录
/// 全部成功时恢复为 Healthy；其余情况保持当前状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveFailureEvaluator {
    pub threshold: usize,
}

impl ConsecutiveFailureEvaluator {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }
}

impl StateEvaluator<HealthState> for ConsecutiveFailureEvaluator {
    fn evaluate(&self, current: &HealthState, _changed_at: DateTime<Utc>, journal: &[JournalRecord]) -> HealthState {
        let Some(last) = journal.last() else {
            return *current;
        };
        if !last.has_failure() {
            return HealthState::Healthy;
        }

        let streak = journal.iter().rev().take_while(|r| r.has_failure()).count();
        if streak >= self.threshold {
            HealthState::Unhealthy
        } else {
            *current
        }
    }
}
