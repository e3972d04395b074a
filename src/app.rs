//! 应用程序初始化和启动
//!
//! 负责菜单栏布局缓存的完整启动流程，包括：
//! - 配置加载
//! - 日志系统初始化
//! - 权限探测
//! - 缓存与协调器组装
//! - 启动一次加载并输出结果

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::{ImageCache, ItemCache};
use crate::capture::{
    self, FixedItemSource, ImageCapturer, ItemSource, PlaceholderCapturer, ProcessResolver,
    ScreenRegionCapturer,
};
use crate::coordinator::CachePopulationCoordinator;
use crate::domains::{LayoutDomain, LayoutScreenState};
use crate::event_bus::EventBus;
use crate::logger;
use crate::models::{CacheSettings, CacheSettingsUpdate, ItemFrame, LayoutSection, ManagedItem};
use crate::permission::CachedPermission;
use crate::sections::SectionModel;
use crate::settings::SettingsManager;
use crate::AppState;

/// 默认配置文件位置
pub fn default_config_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("menubar-layout").join("config.json")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/menubar-layout/config.json")
    }
}

/// 组装缓存、协调器和布局领域
pub fn build_state(
    settings: &CacheSettings,
    source: Arc<dyn ItemSource>,
    capturer: Arc<dyn ImageCapturer>,
    permission: Arc<CachedPermission>,
) -> AppState {
    let event_bus = Arc::new(EventBus::new(settings.event_capacity));
    let sections = Arc::new(SectionModel::new());

    let items = Arc::new(ItemCache::new(
        source,
        permission.clone(),
        event_bus.clone(),
        settings.debounce(),
    ));
    let images = Arc::new(ImageCache::new(
        items.clone(),
        capturer,
        permission.clone(),
        sections.clone(),
        event_bus.clone(),
    ));
    let coordinator = Arc::new(CachePopulationCoordinator::new(
        items,
        images,
        permission.clone(),
        event_bus.clone(),
        settings.deadline(),
    ));

    let layout_domain = Arc::new(LayoutDomain::new(coordinator, sections, permission.clone()));

    AppState {
        layout_domain,
        permission,
        event_bus,
    }
}

/// 解析命令行：可选的配置文件路径，之后是配置覆盖项
///
/// 支持 `--debounce-ms`、`--deadline-secs`、`--capture-scale`、`--log-level`
pub fn parse_args<I>(args: I) -> Result<(Option<PathBuf>, CacheSettingsUpdate)>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut update = CacheSettingsUpdate::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if !arg.starts_with("--") {
            if config_path.is_some() {
                return Err(anyhow!("多余的参数: {}", arg));
            }
            config_path = Some(PathBuf::from(arg));
            continue;
        }

        let value = args
            .next()
            .ok_or_else(|| anyhow!("参数 {} 缺少取值", arg))?;
        match arg.as_str() {
            "--debounce-ms" => update.item_debounce_ms = Some(value.parse()?),
            "--deadline-secs" => update.deadline_secs = Some(value.parse()?),
            "--capture-scale" => update.capture_scale = Some(value.parse()?),
            "--log-level" => update.log_level = Some(value),
            _ => return Err(anyhow!("未知参数: {}", arg)),
        }
    }

    Ok((config_path, update))
}

fn has_overrides(update: &CacheSettingsUpdate) -> bool {
    update.item_debounce_ms.is_some()
        || update.deadline_secs.is_some()
        || update.event_capacity.is_some()
        || update.capture_scale.is_some()
        || update.log_level.is_some()
}

/// 演示用的菜单栏项（从右上角开始排列）
///
/// 真实的菜单栏枚举依赖平台辅助功能接口，通过实现 `ItemSource` 接入
pub fn demo_items() -> Vec<ManagedItem> {
    let pid = std::process::id();
    let layout = [
        ("wifi", LayoutSection::Visible),
        ("battery", LayoutSection::Visible),
        ("clock", LayoutSection::Visible),
        ("bluetooth", LayoutSection::Hidden),
        ("spotlight", LayoutSection::Hidden),
        ("time-machine", LayoutSection::AlwaysHidden),
    ];

    let mut orders = std::collections::HashMap::new();
    layout
        .iter()
        .enumerate()
        .map(|(index, (id, section))| {
            let order = orders.entry(*section).or_insert(0usize);
            let item = ManagedItem::new(*id, pid, Some(*section), *order)
                .with_frame(ItemFrame::new(1200 + index as i32 * 30, 0, 24, 22));
            *order += 1;
            item
        })
        .collect()
}

/// 应用程序入口点
pub async fn run() -> Result<()> {
    let (config_path, overrides) = parse_args(std::env::args().skip(1))?;
    let settings_manager =
        SettingsManager::new(config_path.unwrap_or_else(default_config_path)).await?;
    let settings = if has_overrides(&overrides) {
        settings_manager.update(overrides).await?
    } else {
        settings_manager.get().await
    };

    logger::init(None, &settings.log_level)?;
    info!("初始化菜单栏布局缓存...");

    let permission = Arc::new(CachedPermission::default());
    let granted = {
        let permission = permission.clone();
        tokio::task::spawn_blocking(move || permission.refresh_with(capture::probe_screen_capture))
            .await?
    };

    let capturer: Arc<dyn ImageCapturer> = if granted {
        Arc::new(ScreenRegionCapturer::new(settings.capture_scale))
    } else {
        warn!("没有屏幕录制权限，使用占位图");
        Arc::new(PlaceholderCapturer::default())
    };
    // 演示数据源，平台实现替换这里即可
    let source: Arc<dyn ItemSource> =
        Arc::new(ProcessResolver::new(FixedItemSource::new(demo_items())));

    let state = build_state(&settings, source, capturer, permission);
    let domain = state.layout_domain.clone();
    let watcher = domain.watch();

    let phase = domain.get_coordinator().settled().await;
    info!("加载结束: {:?}", phase);

    match domain.screen_state() {
        LayoutScreenState::MissingPermission => warn!("菜单栏布局需要屏幕录制权限"),
        LayoutScreenState::CannotArrange => warn!("无法调整自动隐藏的菜单栏"),
        LayoutScreenState::Loading => info!("仍在加载菜单栏项"),
        LayoutScreenState::LoadFailed => error!("无法加载菜单栏项"),
        LayoutScreenState::Ready { sections } => {
            for view in sections {
                info!("分区 {}: {} 张快照", view.section, view.images.len());
            }
        }
    }

    domain.disappear();
    watcher.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::PopulationPhase;

    #[test]
    fn test_demo_items_orders_per_section() {
        let items = demo_items();
        let hidden: Vec<_> = items
            .iter()
            .filter(|item| item.section == Some(LayoutSection::Hidden))
            .map(|item| item.order)
            .collect();
        assert_eq!(hidden, vec![0, 1]);
        assert!(items.iter().all(|item| !item.frame.is_empty()));
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn test_parse_args_reads_path_and_overrides() {
        let (path, update) = parse_args(args(&[
            "/tmp/layout.json",
            "--deadline-secs",
            "5",
            "--log-level",
            "debug",
        ]))
        .unwrap();
        assert_eq!(path, Some(PathBuf::from("/tmp/layout.json")));
        assert_eq!(update.deadline_secs, Some(5));
        assert_eq!(update.log_level.as_deref(), Some("debug"));
        assert!(update.item_debounce_ms.is_none());
        assert!(has_overrides(&update));

        let (path, update) = parse_args(Vec::new()).unwrap();
        assert!(path.is_none());
        assert!(!has_overrides(&update));
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(args(&["--deadline-secs"])).is_err());
        assert!(parse_args(args(&["--deadline-secs", "soon"])).is_err());
        assert!(parse_args(args(&["--verbose", "1"])).is_err());
        assert!(parse_args(args(&["a.json", "b.json"])).is_err());
    }

    #[tokio::test]
    async fn test_overrides_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (_, update) = parse_args(args(&["--debounce-ms", "250"])).unwrap();

        let manager = SettingsManager::new(path.clone()).await.unwrap();
        manager.update(update).await.unwrap();

        let reloaded = SettingsManager::new(path).await.unwrap().get().await;
        assert_eq!(reloaded.item_debounce_ms, 250);
        assert_eq!(reloaded.deadline_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_state_populates_demo_items() {
        let state = build_state(
            &CacheSettings::default(),
            Arc::new(FixedItemSource::new(demo_items())),
            Arc::new(PlaceholderCapturer::default()),
            Arc::new(CachedPermission::new(true)),
        );
        let coordinator = state.layout_domain.get_coordinator();

        assert_eq!(coordinator.populate().await, PopulationPhase::Converged);
        assert_eq!(coordinator.current_items().len(), 6);
        // AlwaysHidden 默认未启用
        assert_eq!(coordinator.current_images().len(), 5);
    }
}
