// 菜单栏项缓存 - 保存当前发现的有序菜单栏项列表
//
// 每次刷新整体替换列表，读者只会看到完整的旧列表或完整的新列表

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::capture::ItemSource;
use crate::error::CacheError;
use crate::event_bus::{CacheEvent, EventBus};
use crate::models::ManagedItem;
use crate::permission::PermissionGate;

/// 一次刷新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 已重新发现并替换缓存
    Refreshed { count: usize },
    /// 处于防抖窗口内，缓存未改变
    Skipped,
}

/// 菜单栏项缓存
pub struct ItemCache {
    source: Arc<dyn ItemSource>,
    permission: Arc<dyn PermissionGate>,
    event_bus: Arc<EventBus>,
    items: RwLock<Arc<Vec<ManagedItem>>>,
    count_tx: watch::Sender<usize>,
    debounce: Duration,
    last_refresh: Mutex<Option<Instant>>,
    last_move: Mutex<Option<Instant>>,
    /// 保证同一时间只有一次刷新
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ItemCache {
    pub fn new(
        source: Arc<dyn ItemSource>,
        permission: Arc<dyn PermissionGate>,
        event_bus: Arc<EventBus>,
        debounce: Duration,
    ) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            source,
            permission,
            event_bus,
            items: RwLock::new(Arc::new(Vec::new())),
            count_tx,
            debounce,
            last_refresh: Mutex::new(None),
            last_move: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 当前菜单栏项快照
    pub fn current_items(&self) -> Arc<Vec<ManagedItem>> {
        self.items
            .read()
            .map(|items| Arc::clone(&items))
            .unwrap_or_default()
    }

    pub fn item_count(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// 订阅菜单栏项数量变化
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// 记录一次用户移动菜单栏项，防抖窗口内的非强制刷新会被跳过
    pub fn record_move(&self) {
        if let Ok(mut last) = self.last_move.lock() {
            *last = Some(Instant::now());
        }
    }

    /// 重新发现菜单栏项
    ///
    /// `force_regardless_of_recent_move` 为 false 时，距离上次刷新或上次移动
    /// 不足防抖窗口的请求直接返回 `Skipped`
    pub async fn refresh(
        &self,
        force_regardless_of_recent_move: bool,
    ) -> Result<RefreshOutcome, CacheError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_regardless_of_recent_move && self.within_debounce() {
            self.event_bus.publish(CacheEvent::ItemRefreshSkipped);
            return Ok(RefreshOutcome::Skipped);
        }

        if !self.permission.check_permission() {
            return Err(CacheError::PermissionUnavailable);
        }

        debug!("重新发现菜单栏项 (force={})", force_regardless_of_recent_move);

        let discovered = match self.source.discover().await {
            Ok(items) => items,
            Err(e) => {
                let err = CacheError::discovery(&e);
                warn!("菜单栏项发现失败，保留旧缓存: {}", e);
                self.event_bus.publish(CacheEvent::DiscoveryFailed {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        // 发现过程中权限被撤销，结果不可信
        if !self.permission.check_permission() {
            let err = CacheError::discovery("发现过程中屏幕录制权限被撤销");
            warn!("{}", err);
            self.event_bus.publish(CacheEvent::DiscoveryFailed {
                reason: err.to_string(),
            });
            return Err(err);
        }

        let items = dedup_items(discovered);
        let count = items.len();
        self.store(items);

        if let Ok(mut last) = self.last_refresh.lock() {
            *last = Some(Instant::now());
        }

        debug!("菜单栏项缓存已更新，共 {} 项", count);
        self.event_bus.publish(CacheEvent::ItemsRefreshed { count });
        Ok(RefreshOutcome::Refreshed { count })
    }

    fn store(&self, items: Vec<ManagedItem>) {
        let count = items.len();
        // 持有写锁时更新计数，列表与计数同时可见
        if let Ok(mut current) = self.items.write() {
            *current = Arc::new(items);
            self.count_tx.send_replace(count);
        }
    }

    fn within_debounce(&self) -> bool {
        let recent = |slot: &Mutex<Option<Instant>>| {
            slot.lock()
                .ok()
                .and_then(|last| *last)
                .map(|at| at.elapsed() < self.debounce)
                .unwrap_or(false)
        };
        recent(&self.last_refresh) || recent(&self.last_move)
    }
}

/// 去除重复标识，保留第一次出现的项
fn dedup_items(items: Vec<ManagedItem>) -> Vec<ManagedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id.clone());
            if !fresh {
                warn!("发现重复的菜单栏项标识 {}，已忽略", item.id);
            }
            fresh
        })
        .collect()
}
