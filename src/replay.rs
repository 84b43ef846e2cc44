//! 日志回放 - 用记录下来的检查结果重放状态序列
//!
//! 文件格式为 JSONL，每行一条 [`JournalRecord`]。

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{Result, SpectatorError};
use crate::evaluator::{StateChange, StateEvaluator, StateTracker};
use crate::journal::{Journal, JournalRecord};

/// 按顺序回放记录，返回所有状态变化
///
/// 与 [`crate::Spectator::run_cycle`] 走同样的保留和去抖逻辑。`seeded_at` 是初始
/// 状态的变化时间，回放实时运行时应传入 [`crate::Spectator::state_changed_at`]
/// 在第一个周期之前的值；为 `None` 时取第一条记录的时间。
pub fn replay<S, E, I>(
    records: I,
    evaluator: &E,
    seed: S,
    seeded_at: Option<DateTime<Utc>>,
    retention: Duration,
) -> Vec<StateChange<S>>
where
    S: Clone + PartialEq,
    E: StateEvaluator<S> + ?Sized,
    I: IntoIterator<Item = JournalRecord>,
{
    let mut records = records.into_iter().peekable();
    let Some(first) = records.peek().map(|r| r.timestamp()) else {
        return Vec::new();
    };

    let mut journal = Journal::new(retention);
    let mut tracker = StateTracker::new(seed, seeded_at.unwrap_or(first));
    let mut changes = Vec::new();

    for record in records {
        let at = record.timestamp();
        journal.append(record);
        if let Some(change) = tracker.step(evaluator, journal.records(), at) {
            changes.push(change);
        }
    }

    changes
}

/// 读取 JSONL 日志文件，跳过空行
pub fn read_journal_file(path: &Path) -> Result<Vec<JournalRecord>> {
    let content = fs::read_to_string(path).map_err(|source| SpectatorError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| SpectatorError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    debug!(path = %path.display(), count = records.len(), "Read journal file");
    Ok(records)
}

/// 写入 JSONL 日志文件（覆盖）
pub fn write_journal_file<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a JournalRecord>,
{
    let io_err = |source| SpectatorError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| io_err(e.into()))?;
        writeln!(writer, "{}", line).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}
