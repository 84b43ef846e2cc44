//! 检查日志 - 按时间保留的轮询记录
//!
//! 每个轮询周期产生一条 [`JournalRecord`]，追加到 [`Journal`] 末尾。
//! 追加时按保留期从队首裁剪过期记录。

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;

/// 一个轮询周期的全部探针结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    timestamp: DateTime<Utc>,
    values: Vec<ProbeResult>,
}

impl JournalRecord {
    pub fn new(timestamp: DateTime<Utc>, values: Vec<ProbeResult>) -> Self {
        Self { timestamp, values }
    }

    /// 周期时间
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 按注册顺序排列的探针结果
    pub fn values(&self) -> &[ProbeResult] {
        &self.values
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProbeResult> {
        self.values.iter().filter(|v| !v.is_success())
    }

    /// 是否有任一探针失败
    pub fn has_failure(&self) -> bool {
        self.failed().next().is_some()
    }

    /// 按名称查找结果（名称重复时返回第一个）
    pub fn get(&self, probe_name: &str) -> Option<&ProbeResult> {
        self.values.iter().find(|v| v.probe_name() == probe_name)
    }
}

/// 带保留期的检查日志
#[derive(Debug, Clone)]
pub struct Journal {
    retention: Duration,
    records: VecDeque<JournalRecord>,
    /// 见过的最新追加时间，保证裁剪单调
    newest: Option<DateTime<Utc>>,
}

impl Journal {
    /// 创建日志，负的保留期按 0 处理
    pub fn new(retention: Duration) -> Self {
        Self {
            retention: retention.max(Duration::zero()),
            records: VecDeque::new(),
            newest: None,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// 追加记录并裁剪过期记录
    ///
    /// 追加时间取记录自身的时间戳。乱序的记录会插入到正确位置，
    /// 早于保留窗口的会在本次裁剪中被丢弃。
    pub fn append(&mut self, record: JournalRecord) {
        let ts = record.timestamp;
        let newest = match self.newest {
            Some(prev) if prev > ts => prev,
            _ => ts,
        };
        self.newest = Some(newest);

        match self.records.back() {
            Some(last) if last.timestamp > ts => {
                let pos = self.records.partition_point(|r| r.timestamp <= ts);
                self.records.insert(pos, record);
            }
            _ => self.records.push_back(record),
        }

        // 保留期超出可表示的时间范围时不裁剪
        if let Some(cutoff) = newest.checked_sub_signed(self.retention) {
            self.trim(cutoff);
        }

        // records() 依赖连续存储；已连续时为 O(1)
        self.records.make_contiguous();
    }

    fn trim(&mut self, cutoff: DateTime<Utc>) {
        while self
            .records
            .front()
            .is_some_and(|r| r.timestamp < cutoff)
        {
            self.records.pop_front();
        }
    }

    /// 按时间排序的只读视图
    pub fn records(&self) -> &[JournalRecord] {
        let (head, tail) = self.records.as_slices();
        debug_assert!(tail.is_empty());
        head
    }

    /// 防御性拷贝
    pub fn snapshot(&self) -> Vec<JournalRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &JournalRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&JournalRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
