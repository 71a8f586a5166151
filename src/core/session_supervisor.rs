//! 会话监管：同一会话的轮次串行执行
//!
//! 每个 session_id 对应一把 tokio Mutex；process_turn 在整轮期间持有 SessionTurn，
//! 因此同一会话的下一条消息要等上一轮结束才会开始，不同会话互不阻塞。
//! 轮次结束时若没有其它调用在等待该会话，对应的锁条目即被移除，表不会随会话数无限增长。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 会话级轮次锁
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// 持有期间独占该会话；drop 时释放并清理空闲条目
pub struct SessionTurn<'a> {
    supervisor: &'a SessionSupervisor,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.supervisor.prune(&self.session_id);
    }
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话的轮次锁；返回的 guard 释放前，同一会话的其它调用会等待
    pub async fn acquire(&self, session_id: &str) -> SessionTurn<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        SessionTurn {
            supervisor: self,
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    /// 只剩表本身引用时移除条目（等待者持有 Arc 克隆，计数大于 1）
    fn prune(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks
            .get(session_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(session_id);
        }
    }

    /// 当前有轮次在执行的会话数
    pub fn busy_sessions(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.values().filter(|l| l.try_lock().is_err()).count()
    }

    /// 表中跟踪的会话数（执行中或有等待者）
    pub fn tracked_sessions(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_else(|p| p.into_inner().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let supervisor = SessionSupervisor::new();
        let guard = supervisor.acquire("s1").await;

        let second = tokio::time::timeout(Duration::from_millis(50), supervisor.acquire("s1")).await;
        assert!(second.is_err(), "second turn must wait for the first");
        assert_eq!(supervisor.busy_sessions(), 1);

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(50), supervisor.acquire("s1")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_sessions_run_concurrently() {
        let supervisor = SessionSupervisor::new();
        let _a = supervisor.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), supervisor.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_pruned() {
        let supervisor = SessionSupervisor::new();
        for i in 0..100 {
            let _turn = supervisor.acquire(&format!("s{i}")).await;
        }
        assert_eq!(supervisor.tracked_sessions(), 0);

        let held = supervisor.acquire("busy").await;
        assert_eq!(supervisor.tracked_sessions(), 1);
        drop(held);
        assert_eq!(supervisor.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_turn_is_waiting() {
        let supervisor = Arc::new(SessionSupervisor::new());
        let first = supervisor.acquire("s1").await;

        let sup = supervisor.clone();
        let waiter = tokio::spawn(async move {
            let _turn = sup.acquire("s1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert!(supervisor.tracked_sessions() <= 1);

        waiter.await.unwrap();
        assert_eq!(supervisor.tracked_sessions(), 0);
    }
}
