//! 用量上报
//!
//! 通过 mpsc channel 异步上报到账户存储，上报失败只记录日志，不影响响应。
//! 提交端不阻塞也不丢弃记录，账户存储写入以有限并发排空队列。

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::sync::mpsc;

use crate::account::AccountStore;
use crate::account::types::UsageRecord;

/// 同时进行中的账户存储写入上限
const MAX_IN_FLIGHT: usize = 64;

struct UsageEvent {
    token: String,
    record: UsageRecord,
}

/// 用量上报器
#[derive(Clone)]
pub struct UsageRecorder {
    sender: mpsc::UnboundedSender<UsageEvent>,
}

impl UsageRecorder {
    /// 创建上报器并启动后台消费任务
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self::with_concurrency(store, MAX_IN_FLIGHT)
    }

    pub fn with_concurrency(store: Arc<dyn AccountStore>, max_in_flight: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::consume_loop(store, rx, max_in_flight.max(1)));
        Self { sender: tx }
    }

    /// 提交一条用量记录（非阻塞）
    pub fn record(&self, token: &str, record: UsageRecord) {
        let event = UsageEvent {
            token: token.to_string(),
            record,
        };
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                request_id = %e.0.record.request_id,
                "用量记录提交失败（消费任务已退出）"
            );
        }
    }

    async fn consume_loop(
        store: Arc<dyn AccountStore>,
        mut rx: mpsc::UnboundedReceiver<UsageEvent>,
        max_in_flight: usize,
    ) {
        stream::poll_fn(move |cx| rx.poll_recv(cx))
            .for_each_concurrent(max_in_flight, |event| {
                let store = store.clone();
                async move { Self::deliver(store.as_ref(), event).await }
            })
            .await;
        tracing::debug!("用量上报消费循环已退出");
    }

    async fn deliver(store: &dyn AccountStore, event: UsageEvent) {
        let record = &event.record;
        match store.record_usage(&event.token, record).await {
            Ok(()) => tracing::debug!(
                request_id = %record.request_id,
                account_id = %record.account_id,
                status = record.status_code,
                "用量已上报"
            ),
            Err(e) => tracing::warn!(
                request_id = %record.request_id,
                account_id = %record.account_id,
                "用量上报失败: {}",
                e
            ),
        }
    }
}
