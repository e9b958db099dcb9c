//! 滑动窗口计数器存储
//!
//! 计数器以 `主体:维度:窗口序号` 为键，窗口滚动时生成新键，
//! 旧键只需要清理，不需要重置。

use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

/// 计数器存储接口
///
/// 实现必须保证 `increment` 的读-改-写在一个事务内完成，
/// 失败时完整回滚，不留下部分累加。
pub trait CounterStore: Send + Sync {
    /// 把 `key` 的计数加上 `increment` 并返回新计数，首次写入时记录 `reset_at`
    fn increment(&self, key: &str, increment: u64, reset_at: i64) -> Result<u64>;

    /// 删除 `reset_at <= now_ms` 的计数器，最多删除 `limit` 行，返回删除数
    fn purge_expired(&self, now_ms: i64, limit: u32) -> Result<u64>;
}

/// SQLite 计数器存储
///
/// 单连接共享，同一键上的并发累加在事务边界串行化
pub struct SqliteCounterStore {
    conn: Mutex<Connection>,
}

impl SqliteCounterStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_limit_counters (
                key TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0,
                reset_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_counter_reset_at ON rate_limit_counters(reset_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库（测试和无持久化部署）
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }
}

impl CounterStore for SqliteCounterStore {
    fn increment(&self, key: &str, increment: u64, reset_at: i64) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT count FROM rate_limit_counters WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        let total = current.unwrap_or(0).max(0) as u64 + increment;

        tx.execute(
            "INSERT INTO rate_limit_counters (key, count, reset_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET count = excluded.count",
            rusqlite::params![key, total as i64, reset_at],
        )?;
        tx.commit()?;
        Ok(total)
    }

    fn purge_expired(&self, now_ms: i64, limit: u32) -> Result<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM rate_limit_counters WHERE key IN (
                SELECT key FROM rate_limit_counters WHERE reset_at <= ?1 LIMIT ?2
             )",
            rusqlite::params![now_ms, limit as i64],
        )?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
impl SqliteCounterStore {
    pub(crate) fn peek(&self, key: &str) -> Option<u64> {
        self.conn
            .lock()
            .query_row(
                "SELECT count FROM rate_limit_counters WHERE key = ?1",
                [key],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .ok()
            .flatten()
            .map(|c| c as u64)
    }

    pub(crate) fn row_count(&self) -> u64 {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM rate_limit_counters", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|c| c as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_accumulates() {
        let store = SqliteCounterStore::in_memory().unwrap();
        assert_eq!(store.increment("acct:rps:1", 1, 2000).unwrap(), 1);
        assert_eq!(store.increment("acct:rps:1", 1, 2000).unwrap(), 2);
        assert_eq!(store.increment("acct:rps:1", 5, 2000).unwrap(), 7);
        assert_eq!(store.peek("acct:rps:1"), Some(7));
    }

    #[test]
    fn test_keys_are_independent() {
        let store = SqliteCounterStore::in_memory().unwrap();
        store.increment("a:1", 3, 1000).unwrap();
        assert_eq!(store.increment("a:2", 1, 2000).unwrap(), 1);
        assert_eq!(store.peek("a:1"), Some(3));
    }

    #[test]
    fn test_failed_write_leaves_count_unchanged() {
        let store = SqliteCounterStore::in_memory().unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER cap_count BEFORE UPDATE ON rate_limit_counters
                 WHEN NEW.count > 5
                 BEGIN SELECT RAISE(ABORT, 'count cap'); END;",
            )
            .unwrap();

        assert_eq!(store.increment("acct:rps:1", 4, 2000).unwrap(), 4);
        assert!(store.increment("acct:rps:1", 3, 2000).is_err());
        assert_eq!(store.peek("acct:rps:1"), Some(4));

        // 回滚后连接仍可继续使用
        assert_eq!(store.increment("acct:rps:1", 1, 2000).unwrap(), 5);
    }

    #[test]
    fn test_purge_expired_is_bounded() {
        let store = SqliteCounterStore::in_memory().unwrap();
        for i in 0..5 {
            store.increment(&format!("old:{}", i), 1, 1000).unwrap();
        }
        store.increment("live:0", 1, 10_000).unwrap();

        assert_eq!(store.purge_expired(5000, 3).unwrap(), 3);
        assert_eq!(store.row_count(), 3);

        assert_eq!(store.purge_expired(5000, 100).unwrap(), 2);
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.peek("live:0"), Some(1));
    }
}
