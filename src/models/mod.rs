// 数据模型模块 - 定义菜单栏布局相关的数据结构

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 布局分区（固定集合，按声明顺序遍历）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSection {
    /// 始终显示
    Visible,
    /// 隐藏
    Hidden,
    /// 始终隐藏
    AlwaysHidden,
}

impl LayoutSection {
    /// 所有分区，顺序即界面上的显示顺序
    pub const ALL: [LayoutSection; 3] = [
        LayoutSection::Visible,
        LayoutSection::Hidden,
        LayoutSection::AlwaysHidden,
    ];

    /// 分区的稳定名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::AlwaysHidden => "always_hidden",
        }
    }
}

impl fmt::Display for LayoutSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 菜单栏项的稳定标识
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 菜单栏项所属进程
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwningProcess {
    /// 进程ID
    pub pid: u32,
    /// 进程名称（由 ProcessResolver 补全）
    pub name: Option<String>,
}

/// 菜单栏项在屏幕上的位置（逻辑像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ItemFrame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ItemFrame {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// 宽或高为0时无法截图
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 一个被管理的菜单栏项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedItem {
    /// 稳定标识，在 ItemCache 中唯一
    pub id: ItemId,
    /// 所属进程
    pub owner: OwningProcess,
    /// 所在分区，None 表示未被管理
    pub section: Option<LayoutSection>,
    /// 分区内的显示顺序
    pub order: usize,
    /// 屏幕位置
    pub frame: ItemFrame,
}

impl ManagedItem {
    pub fn new(id: impl Into<String>, pid: u32, section: Option<LayoutSection>, order: usize) -> Self {
        Self {
            id: ItemId::new(id),
            owner: OwningProcess { pid, name: None },
            section,
            order,
            frame: ItemFrame::default(),
        }
    }

    pub fn with_frame(mut self, frame: ItemFrame) -> Self {
        self.frame = frame;
        self
    }
}

/// 菜单栏项在某个分区中的快照图像
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    pub item_id: ItemId,
    pub section: LayoutSection,
    /// 截图时的位置，用于判断是否过期
    pub frame: ItemFrame,
    pub captured_at: DateTime<Utc>,
    pub image: Arc<DynamicImage>,
}

/// 缓存配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// 非强制刷新的防抖窗口（毫秒）
    pub item_debounce_ms: u64,
    /// 加载超时（秒）
    pub deadline_secs: u64,
    /// 事件总线缓冲区大小
    pub event_capacity: usize,
    /// 快照缩放比例（1.0 为原始大小）
    pub capture_scale: f32,
    /// 日志级别
    pub log_level: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            item_debounce_ms: 500,
            deadline_secs: 3,
            event_capacity: 64,
            capture_scale: 1.0,
            log_level: "info".to_string(),
        }
    }
}

impl CacheSettings {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.item_debounce_ms)
    }

    pub fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.deadline_secs)
    }
}

/// 配置的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettingsUpdate {
    pub item_debounce_ms: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub event_capacity: Option<usize>,
    pub capture_scale: Option<f32>,
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_order_is_stable() {
        assert_eq!(
            LayoutSection::ALL,
            [LayoutSection::Visible, LayoutSection::Hidden, LayoutSection::AlwaysHidden]
        );
        assert_eq!(LayoutSection::AlwaysHidden.to_string(), "always_hidden");
    }

    #[test]
    fn test_cache_settings_default() {
        let settings = CacheSettings::default();
        assert_eq!(settings.deadline(), std::time::Duration::from_secs(3));
        assert_eq!(settings.debounce(), std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_cache_settings_partial_json() {
        let settings: CacheSettings = serde_json::from_str(r#"{"deadline_secs": 5}"#).unwrap();
        assert_eq!(settings.deadline_secs, 5);
        assert_eq!(settings.item_debounce_ms, 500);
    }
}
