// 权限检查 - 缓存的屏幕录制权限状态
//
// 实际的系统级权限检查由外部完成，这里只保存最近一次的结果

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::info;

/// 屏幕录制权限检查
pub trait PermissionGate: Send + Sync {
    /// 返回缓存的权限状态，不触发系统检查
    fn check_permission(&self) -> bool;
}

/// 基于缓存值的权限检查
pub struct CachedPermission {
    granted: AtomicBool,
    last_refreshed: RwLock<Option<DateTime<Utc>>>,
}

impl CachedPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            last_refreshed: RwLock::new(None),
        }
    }

    /// 由外部权限检查器写入新状态
    pub fn set(&self, granted: bool) {
        let previous = self.granted.swap(granted, Ordering::AcqRel);
        if previous != granted {
            info!("屏幕录制权限状态变更: {} -> {}", previous, granted);
        }
        if let Ok(mut time) = self.last_refreshed.write() {
            *time = Some(Utc::now());
        }
    }

    /// 执行一次探测并缓存结果
    pub fn refresh_with<F>(&self, probe: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let granted = probe();
        self.set(granted);
        granted
    }

    /// 最近一次刷新时间
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed.read().map(|t| *t).unwrap_or(None)
    }
}

impl Default for CachedPermission {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PermissionGate for CachedPermission {
    fn check_permission(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }
}
