//! 探针模块 - 单次健康检查的契约与默认封装
//!
//! 探针的核心约定：`check()` 永远不返回错误。探针内部的任何失败
//! （包括闭包返回 `Err` 或 panic）都被转换为 `success = false` 的结果。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 探针逻辑返回了错误
    Error,
    /// 探针逻辑 panic
    Panic,
    /// 探针超时未返回
    Timeout,
}

/// 失败详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 从 anyhow 错误构造，保留完整的 cause 链
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::new(FailureKind::Error, format!("{:#}", err))
    }

    /// 从 panic payload 构造
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "probe panicked".to_string()
        };
        Self::new(FailureKind::Panic, message)
    }
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// 单次探针执行结果
///
/// 只能通过 [`ProbeResult::ok`] / [`ProbeResult::failed`] 构造，
/// 因此 `failure` 只会出现在失败结果上。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    probe_name: String,
    timestamp: DateTime<Utc>,
    success: bool,
    #[serde(default)]
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<ProbeFailure>,
}

impl ProbeResult {
    /// 成功结果，时间戳为当前时刻
    pub fn ok(probe_name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            probe_name: probe_name.into(),
            timestamp: Utc::now(),
            success: true,
            payload: payload.into(),
            failure: None,
        }
    }

    /// 失败结果，payload 为空，时间戳为当前时刻
    pub fn failed(probe_name: impl Into<String>, failure: ProbeFailure) -> Self {
        Self {
            probe_name: probe_name.into(),
            timestamp: Utc::now(),
            success: false,
            payload: String::new(),
            failure: Some(failure),
        }
    }

    /// 覆盖时间戳（测试和回放用）
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn probe_name(&self) -> &str {
        &self.probe_name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        self.failure.as_ref()
    }

    fn renamed(mut self, probe_name: &str) -> Self {
        if self.probe_name != probe_name {
            self.probe_name = probe_name.to_string();
        }
        self
    }
}

/// 探针 trait
#[async_trait]
pub trait Probe: Send + Sync {
    /// 探针名称（在同一个 Spectator 中唯一）
    fn name(&self) -> &str;

    /// 执行一次检查，不允许返回错误
    async fn check(&self) -> ProbeResult;
}

type ProbeFuture = Pin<Box<dyn Future<Output = anyhow::Result<ProbeResult>> + Send>>;

/// 默认探针封装 - 把返回 `anyhow::Result` 的异步闭包变成不会失败的探针
pub struct FnProbe {
    name: String,
    func: Box<dyn Fn() -> ProbeFuture + Send + Sync>,
}

impl FnProbe {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProbeResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move || Box::pin(func()) as ProbeFuture),
        }
    }
}

impl std::fmt::Debug for FnProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProbe").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Probe for FnProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ProbeResult {
        // 闭包本身也可能在构造 future 时 panic
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.func)())) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };

        match outcome {
            Ok(Ok(result)) => result.renamed(&self.name),
            Ok(Err(err)) => {
                warn!(probe = %self.name, error = %format!("{:#}", err), "Probe returned an error");
                ProbeResult::failed(&self.name, ProbeFailure::from_error(&err))
            }
            Err(payload) => {
                let failure = ProbeFailure::from_panic(payload.as_ref());
                warn!(probe = %self.name, message = %failure.message, "Probe panicked");
                ProbeResult::failed(&self.name, failure)
            }
        }
    }
}

/// 便捷构造：返回可直接注册到 Spectator 的探针
pub fn probe_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn Probe>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ProbeResult>> + Send + 'static,
{
    Arc::new(FnProbe::new(name, func))
}
