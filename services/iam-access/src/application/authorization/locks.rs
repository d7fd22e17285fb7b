//! 按键串行化的变更锁
//!
//! 同一角色或同一租户上的变更依次执行，不同键互不阻塞。
//! 对账持有全局写锁，期间没有任何变更在途。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rbac_common::DomainId;
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

use crate::domain::role::RoleId;

/// 锁键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Domain(DomainId),
    Role(RoleId),
}

/// 单个变更持有的锁
#[derive(Debug)]
pub struct MutationGuard {
    _keys: Vec<OwnedMutexGuard<()>>,
    _gate: OwnedRwLockReadGuard<()>,
}

#[derive(Debug, Default)]
pub struct MutationLocks {
    gate: Arc<RwLock<()>>,
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl MutationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 `key` 对应的锁，持有期间同键的其他变更等待
    pub async fn lock(&self, key: LockKey) -> MutationGuard {
        self.lock_all(&[key]).await
    }

    /// 按给定顺序获取多个键；各调用方须使用相同的顺序 (租户在前，角色在后)
    ///
    /// 全局读锁只获取一次，等待中的对账不会夹在两个键之间。
    pub async fn lock_all(&self, keys: &[LockKey]) -> MutationGuard {
        let gate = self.gate.clone().read_owned().await;
        let slots: Vec<_> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // 清理无人持有的槽位
            slots.retain(|k, slot| keys.contains(k) || Arc::strong_count(slot) > 1);
            keys.iter()
                .map(|key| slots.entry(*key).or_default().clone())
                .collect()
        };
        let mut held = Vec::with_capacity(slots.len());
        for slot in slots {
            held.push(slot.lock_owned().await);
        }
        MutationGuard {
            _keys: held,
            _gate: gate,
        }
    }

    /// 等待所有在途变更结束并阻止新的变更
    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}
