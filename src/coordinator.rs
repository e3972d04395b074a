// 缓存加载协调器 - 统一驱动菜单栏项缓存与图像缓存的加载
//
// 每次触发生成一个新的代号（generation），旧代号的等待随之作废；
// 已经提交的缓存写入不会被撤销

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::cache::{ImageCache, ImageSnapshot, ItemCache};
use crate::event_bus::{CacheEvent, EventBus};
use crate::models::{LayoutSection, ManagedItem};
use crate::permission::PermissionGate;

/// 默认加载超时
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

/// 加载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationPhase {
    /// 尚未加载
    Idle,
    /// 正在刷新缓存或等待菜单栏项出现
    Populating,
    /// 已有菜单栏项
    Converged,
    /// 超时仍无菜单栏项
    DeadlineExceeded,
    /// 无屏幕录制权限，未加载
    PermissionUnavailable,
}

impl PopulationPhase {
    /// 本次加载是否已经结束
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Converged | Self::DeadlineExceeded | Self::PermissionUnavailable
        )
    }
}

/// 协调器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationStatus {
    pub generation: u64,
    pub phase: PopulationPhase,
}

enum WaitResult {
    Items,
    Timeout,
    /// 被新的加载取代，或已由 has_items 信号结束
    Superseded,
}

/// 缓存加载协调器
pub struct CachePopulationCoordinator {
    items: Arc<ItemCache>,
    images: Arc<ImageCache>,
    permission: Arc<dyn PermissionGate>,
    event_bus: Arc<EventBus>,
    deadline: Duration,
    deadline_exceeded: AtomicBool,
    status: watch::Sender<PopulationStatus>,
    task: Mutex<Option<JoinHandle<PopulationPhase>>>,
}

impl CachePopulationCoordinator {
    pub fn new(
        items: Arc<ItemCache>,
        images: Arc<ImageCache>,
        permission: Arc<dyn PermissionGate>,
        event_bus: Arc<EventBus>,
        deadline: Duration,
    ) -> Self {
        let (status, _) = watch::channel(PopulationStatus {
            generation: 0,
            phase: PopulationPhase::Idle,
        });
        Self {
            items,
            images,
            permission,
            event_bus,
            deadline,
            deadline_exceeded: AtomicBool::new(false),
            status,
            task: Mutex::new(None),
        }
    }

    pub fn item_cache(&self) -> &Arc<ItemCache> {
        &self.items
    }

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.images
    }

    pub fn current_items(&self) -> Arc<Vec<ManagedItem>> {
        self.items.current_items()
    }

    pub fn current_images(&self) -> ImageSnapshot {
        self.images.current_images()
    }

    /// 最近一次加载是否超时
    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline_exceeded.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> PopulationPhase {
        self.status.borrow().phase
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// 订阅加载状态
    pub fn subscribe(&self) -> watch::Receiver<PopulationStatus> {
        self.status.subscribe()
    }

    /// 执行一次完整加载，取代正在等待的旧加载
    pub async fn populate(&self) -> PopulationPhase {
        let generation = self.begin();
        self.run(generation).await
    }

    /// 在后台启动一次加载，替换之前的任务句柄
    ///
    /// 旧任务不会被中止：正在进行的刷新照常完成，只有它的等待被作废
    pub fn trigger(self: &Arc<Self>) {
        let generation = self.begin();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(generation).await });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
    }

    /// 界面层报告“是否有可显示的菜单栏项”
    pub fn on_has_items_changed(self: &Arc<Self>, has_items: bool) {
        self.deadline_exceeded.store(false, Ordering::Release);

        if has_items {
            self.status.send_modify(|status| {
                status.phase = PopulationPhase::Converged;
            });
            return;
        }

        if !self.permission.check_permission() {
            self.status.send_modify(|status| {
                status.generation += 1;
                status.phase = PopulationPhase::PermissionUnavailable;
            });
            self.event_bus.publish(CacheEvent::PermissionUnavailable);
            return;
        }

        self.trigger();
    }

    /// 作废当前加载并中止后台任务（界面关闭时调用）
    pub fn cancel(&self) {
        self.status.send_modify(|status| {
            status.generation += 1;
            status.phase = PopulationPhase::Idle;
        });
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    /// 等待当前加载结束
    pub async fn settled(&self) -> PopulationPhase {
        let mut rx = self.status.subscribe();
        let phase = match rx.wait_for(|status| status.phase.is_settled()).await {
            Ok(status) => status.phase,
            Err(_) => self.phase(),
        };
        phase
    }

    fn begin(&self) -> u64 {
        let mut generation = 0;
        self.status.send_modify(|status| {
            status.generation += 1;
            status.phase = PopulationPhase::Populating;
            generation = status.generation;
        });
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.status.borrow().generation == generation
    }

    /// 仅当代号仍是最新且本次加载尚未结束时更新阶段
    fn settle(&self, generation: u64, phase: PopulationPhase) -> bool {
        self.status.send_if_modified(|status| {
            if status.generation != generation || status.phase != PopulationPhase::Populating {
                return false;
            }
            status.phase = phase;
            if phase == PopulationPhase::DeadlineExceeded {
                self.deadline_exceeded.store(true, Ordering::Release);
            }
            true
        })
    }

    async fn run(&self, generation: u64) -> PopulationPhase {
        self.deadline_exceeded.store(false, Ordering::Release);

        if !self.permission.check_permission() {
            if self.settle(generation, PopulationPhase::PermissionUnavailable) {
                self.event_bus.publish(CacheEvent::PermissionUnavailable);
            }
            return self.phase();
        }

        debug!(generation, "预加载菜单栏布局缓存");
        self.event_bus
            .publish(CacheEvent::PopulationStarted { generation });

        if let Err(e) = self.items.refresh(true).await {
            debug!(generation, "菜单栏项刷新未完成: {}", e);
        }
        // 新的加载会自己刷新图像
        if !self.is_current(generation) {
            return self.phase();
        }

        self.images.refresh(&LayoutSection::ALL).await;
        if !self.is_current(generation) {
            return self.phase();
        }

        match self.wait_for_items(generation).await {
            WaitResult::Superseded => self.phase(),
            WaitResult::Items => self.converge(generation),
            WaitResult::Timeout => {
                if self.items.item_count() > 0 {
                    return self.converge(generation);
                }

                let items = self.items.item_count();
                let images = self.images.image_count();
                if self.settle(generation, PopulationPhase::DeadlineExceeded) {
                    error!(
                        items,
                        images,
                        "菜单栏布局加载超时，未能获取菜单栏项。cacheItems: {}, images: {}",
                        items,
                        images
                    );
                    self.event_bus.publish(CacheEvent::DeadlineExceeded {
                        generation,
                        items,
                        images,
                    });
                }
                self.phase()
            }
        }
    }

    fn converge(&self, generation: u64) -> PopulationPhase {
        if self.settle(generation, PopulationPhase::Converged) {
            let items = self.items.item_count();
            info!(generation, items, "菜单栏布局缓存已加载");
            self.event_bus
                .publish(CacheEvent::PopulationConverged { generation, items });
        }
        self.phase()
    }

    async fn wait_for_items(&self, generation: u64) -> WaitResult {
        let mut count_rx = self.items.subscribe();
        let mut status_rx = self.status.subscribe();

        tokio::select! {
            Ok(_) = count_rx.wait_for(|count| *count > 0) => WaitResult::Items,
            Ok(_) = status_rx.wait_for(|status| {
                status.generation != generation || status.phase != PopulationPhase::Populating
            }) => {
                WaitResult::Superseded
            }
            _ = tokio::time::sleep(self.deadline) => WaitResult::Timeout,
        }
    }
}
