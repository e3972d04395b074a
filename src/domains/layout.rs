// 布局领域管理器
//
// 负责把缓存协调器、分区模型和权限状态组合成设置界面需要的视图状态
// 并在“是否有菜单栏项”变化时重新触发加载

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::coordinator::CachePopulationCoordinator;
use crate::models::{LayoutSection, SnapshotImage};
use crate::permission::PermissionGate;
use crate::sections::SectionModel;

/// 单个分区的显示数据
#[derive(Debug, Clone)]
pub struct SectionView {
    pub section: LayoutSection,
    /// 按显示顺序排列的快照
    pub images: Vec<SnapshotImage>,
}

/// 布局设置界面的状态
#[derive(Debug, Clone)]
pub enum LayoutScreenState {
    /// 缺少屏幕录制权限
    MissingPermission,
    /// 菜单栏被系统自动隐藏，无法调整布局
    CannotArrange,
    /// 正在加载菜单栏项
    Loading,
    /// 超时仍未加载到菜单栏项
    LoadFailed,
    /// 可以显示布局
    Ready { sections: Vec<SectionView> },
}

/// 布局领域管理器
#[derive(Clone)]
pub struct LayoutDomain {
    coordinator: Arc<CachePopulationCoordinator>,
    sections: Arc<SectionModel>,
    permission: Arc<dyn PermissionGate>,
    /// 上一次同步时的 (权限, has_items)
    last_sync: Arc<Mutex<Option<(bool, bool)>>>,
}

impl LayoutDomain {
    /// 创建新的布局领域管理器
    pub fn new(
        coordinator: Arc<CachePopulationCoordinator>,
        sections: Arc<SectionModel>,
        permission: Arc<dyn PermissionGate>,
    ) -> Self {
        Self {
            coordinator,
            sections,
            permission,
            last_sync: Arc::new(Mutex::new(None)),
        }
    }

    /// 获取缓存协调器
    pub fn get_coordinator(&self) -> &Arc<CachePopulationCoordinator> {
        &self.coordinator
    }

    /// 获取分区模型
    pub fn get_sections(&self) -> &Arc<SectionModel> {
        &self.sections
    }

    pub fn has_items(&self) -> bool {
        !self.coordinator.current_items().is_empty()
    }

    /// 计算当前界面状态
    pub fn screen_state(&self) -> LayoutScreenState {
        if !self.permission.check_permission() {
            return LayoutScreenState::MissingPermission;
        }
        if self.sections.is_menu_bar_hidden_by_system() {
            return LayoutScreenState::CannotArrange;
        }
        if !self.has_items() {
            return if self.coordinator.is_deadline_exceeded() {
                LayoutScreenState::LoadFailed
            } else {
                LayoutScreenState::Loading
            };
        }

        let images = self.coordinator.current_images();
        let sections = self
            .sections
            .enabled_sections()
            .into_iter()
            .map(|section| SectionView {
                section,
                images: images.section(section).to_vec(),
            })
            .collect();
        LayoutScreenState::Ready { sections }
    }

    /// 同步权限与 has_items，任一变化时通知协调器
    ///
    /// 权限刷新后也应调用，重新获得权限会重新开始加载
    pub fn sync(&self) {
        if self.sections.is_menu_bar_hidden_by_system() {
            return;
        }

        let key = (self.permission.check_permission(), self.has_items());
        let changed = match self.last_sync.lock() {
            Ok(mut last) => {
                let changed = *last != Some(key);
                *last = Some(key);
                changed
            }
            Err(_) => false,
        };

        if changed {
            let (granted, has_items) = key;
            trace!("同步布局状态: 权限 {}, has_items {}", granted, has_items);
            self.coordinator.on_has_items_changed(has_items);
        }
    }

    /// 监听菜单栏项数量变化，自动同步
    pub fn watch(&self) -> JoinHandle<()> {
        let domain = self.clone();
        let mut count_rx = self.coordinator.item_cache().subscribe();

        tokio::spawn(async move {
            domain.sync();
            while count_rx.changed().await.is_ok() {
                domain.sync();
            }
        })
    }

    /// 界面关闭
    pub fn disappear(&self) {
        self.coordinator.cancel();
        if let Ok(mut last) = self.last_sync.lock() {
            *last = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ImageCache, ItemCache};
    use crate::capture::{FixedItemSource, PlaceholderCapturer};
    use crate::coordinator::{PopulationPhase, DEFAULT_DEADLINE};
    use crate::event_bus::EventBus;
    use crate::models::{ItemFrame, ManagedItem};
    use crate::permission::CachedPermission;
    use tokio::time::Duration;

    fn domain(list: Vec<ManagedItem>, granted: bool) -> (LayoutDomain, Arc<FixedItemSource>, Arc<CachedPermission>) {
        let source = Arc::new(FixedItemSource::new(list));
        let permission = Arc::new(CachedPermission::new(granted));
        let sections = Arc::new(SectionModel::new());
        let bus = Arc::new(EventBus::new(64));
        let items = Arc::new(ItemCache::new(
            source.clone(),
            permission.clone(),
            bus.clone(),
            Duration::from_millis(500),
        ));
        let images = Arc::new(ImageCache::new(
            items.clone(),
            Arc::new(PlaceholderCapturer::default()),
            permission.clone(),
            sections.clone(),
            bus.clone(),
        ));
        let coordinator = Arc::new(CachePopulationCoordinator::new(
            items,
            images,
            permission.clone(),
            bus,
            DEFAULT_DEADLINE,
        ));
        (
            LayoutDomain::new(coordinator, sections, permission.clone()),
            source,
            permission,
        )
    }

    fn item(id: &str, section: LayoutSection, order: usize) -> ManagedItem {
        ManagedItem::new(id, 400, Some(section), order).with_frame(ItemFrame::new(0, 0, 20, 20))
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_permission_state() {
        let (domain, source, _) = domain(vec![item("a", LayoutSection::Visible, 0)], false);
        domain.sync();
        assert!(matches!(domain.screen_state(), LayoutScreenState::MissingPermission));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_granting_permission_restarts_population() {
        let (domain, source, permission) = domain(vec![item("a", LayoutSection::Visible, 0)], false);
        let watcher = domain.watch();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(domain.screen_state(), LayoutScreenState::MissingPermission));
        assert_eq!(
            domain.get_coordinator().phase(),
            PopulationPhase::PermissionUnavailable
        );

        permission.set(true);
        domain.sync();
        assert_eq!(
            domain.get_coordinator().settled().await,
            PopulationPhase::Converged
        );
        assert_eq!(source.call_count(), 1);
        assert!(matches!(domain.screen_state(), LayoutScreenState::Ready { .. }));
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cannot_arrange_when_hidden_by_system() {
        let (domain, source, _) = domain(vec![item("a", LayoutSection::Visible, 0)], true);
        domain.get_sections().set_menu_bar_hidden_by_system(true);
        domain.sync();
        assert!(matches!(domain.screen_state(), LayoutScreenState::CannotArrange));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_lists_enabled_sections() {
        let (domain, _, _) = domain(
            vec![
                item("a", LayoutSection::Visible, 0),
                item("h", LayoutSection::Hidden, 0),
                item("x", LayoutSection::AlwaysHidden, 0),
            ],
            true,
        );
        assert!(matches!(domain.screen_state(), LayoutScreenState::Loading));

        domain.sync();
        let phase = domain.get_coordinator().settled().await;
        assert_eq!(phase, PopulationPhase::Converged);

        match domain.screen_state() {
            LayoutScreenState::Ready { sections } => {
                let names: Vec<_> = sections.iter().map(|view| view.section).collect();
                assert_eq!(names, vec![LayoutSection::Visible, LayoutSection::Hidden]);
                assert_eq!(sections[0].images.len(), 1);
                assert_eq!(sections[1].images.len(), 1);
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failed_after_deadline() {
        let (domain, _, _) = domain(Vec::new(), true);
        domain.sync();
        assert_eq!(
            domain.get_coordinator().settled().await,
            PopulationPhase::DeadlineExceeded
        );
        assert!(matches!(domain.screen_state(), LayoutScreenState::LoadFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reacts_to_items_appearing() {
        let (domain, source, _) = domain(Vec::new(), true);
        let watcher = domain.watch();
        assert_eq!(
            domain.get_coordinator().settled().await,
            PopulationPhase::DeadlineExceeded
        );

        source.set_items(vec![item("a", LayoutSection::Visible, 0)]).await;
        domain
            .get_coordinator()
            .item_cache()
            .refresh(true)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(domain.get_coordinator().phase(), PopulationPhase::Converged);
        assert!(!domain.get_coordinator().is_deadline_exceeded());
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disappear_cancels_population() {
        let (domain, _, _) = domain(Vec::new(), true);
        domain.sync();
        domain.disappear();
        tokio::time::sleep(DEFAULT_DEADLINE * 2).await;
        assert!(!domain.get_coordinator().is_deadline_exceeded());
        assert_eq!(domain.get_coordinator().phase(), PopulationPhase::Idle);
    }
}
