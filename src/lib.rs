// 菜单栏布局缓存 - 菜单栏项发现、分区快照与加载超时检测

// 声明模块
pub mod app;
pub mod cache;
pub mod capture;
pub mod coordinator;
pub mod domains;
pub mod error;
pub mod event_bus;
pub mod logger;
pub mod models;
pub mod permission;
pub mod sections;
pub mod settings;

use std::sync::Arc;

pub use cache::{ImageCache, ImageSnapshot, ItemCache, RefreshOutcome};
pub use coordinator::{CachePopulationCoordinator, PopulationPhase, PopulationStatus};
pub use domains::{LayoutDomain, LayoutScreenState, SectionView};
pub use error::CacheError;
pub use models::*;
pub use permission::{CachedPermission, PermissionGate};
pub use sections::SectionModel;

use event_bus::EventBus;

/// 应用状态
///
/// - 布局领域：设置界面使用的缓存与分区状态
/// - 权限：外部权限检查器写入的缓存值
/// - 事件总线：界面层订阅缓存变化
#[derive(Clone)]
pub struct AppState {
    /// 布局领域管理器
    pub layout_domain: Arc<LayoutDomain>,
    /// 屏幕录制权限
    pub permission: Arc<CachedPermission>,
    /// 事件总线
    pub event_bus: Arc<EventBus>,
}
