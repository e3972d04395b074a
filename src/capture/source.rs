// 菜单栏项来源 - 内存中的菜单栏项列表与所属进程解析

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::RwLock;

use super::ItemSource;
use crate::models::ManagedItem;

/// 固定列表的菜单栏项来源，可在运行时替换
pub struct FixedItemSource {
    items: RwLock<Vec<ManagedItem>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FixedItemSource {
    pub fn new(items: Vec<ManagedItem>) -> Self {
        Self {
            items: RwLock::new(items),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// 替换下一次发现返回的菜单栏项
    pub async fn set_items(&self, items: Vec<ManagedItem>) {
        *self.items.write().await = items;
    }

    /// 模拟枚举失败（例如权限在调用中被撤销）
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// discover 被调用的次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ItemSource for FixedItemSource {
    async fn discover(&self) -> Result<Vec<ManagedItem>> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if self.failing.load(Ordering::Acquire) {
            return Err(anyhow!("无法枚举菜单栏窗口"));
        }
        Ok(self.items.read().await.clone())
    }
}

/// 为菜单栏项补全所属进程名称
pub struct ProcessResolver<S> {
    inner: S,
}

impl<S: ItemSource> ProcessResolver<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

/// 通过 sysinfo 查询进程名称
fn resolve_process_names(items: &mut [ManagedItem]) {
    let pids: Vec<Pid> = items
        .iter()
        .filter(|item| item.owner.name.is_none())
        .map(|item| Pid::from_u32(item.owner.pid))
        .collect();
    if pids.is_empty() {
        return;
    }

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&pids[..]));

    for item in items.iter_mut().filter(|item| item.owner.name.is_none()) {
        if let Some(process) = sys.process(Pid::from_u32(item.owner.pid)) {
            let name: &OsStr = process.name().as_ref();
            item.owner.name = Some(name.to_string_lossy().to_string());
        }
    }
}

#[async_trait]
impl<S: ItemSource> ItemSource for ProcessResolver<S> {
    async fn discover(&self) -> Result<Vec<ManagedItem>> {
        let mut items = self.inner.discover().await?;
        let items = tokio::task::spawn_blocking(move || {
            resolve_process_names(&mut items);
            items
        })
        .await?;
        Ok(items)
    }
}
