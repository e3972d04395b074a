// 分区模型 - 布局分区的枚举与启用状态

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::models::LayoutSection;

/// 分区模型
pub struct SectionModel {
    enabled: RwLock<BTreeMap<LayoutSection, bool>>,
    /// 菜单栏是否被系统自动隐藏（此时无法调整布局）
    menu_bar_hidden_by_system: AtomicBool,
}

impl SectionModel {
    pub fn new() -> Self {
        let enabled = LayoutSection::ALL
            .iter()
            .map(|section| (*section, *section != LayoutSection::AlwaysHidden))
            .collect();
        Self {
            enabled: RwLock::new(enabled),
            menu_bar_hidden_by_system: AtomicBool::new(false),
        }
    }

    /// 按声明顺序返回所有分区
    pub fn sections(&self) -> &'static [LayoutSection] {
        &LayoutSection::ALL
    }

    /// 只返回已启用的分区
    pub fn enabled_sections(&self) -> Vec<LayoutSection> {
        LayoutSection::ALL
            .iter()
            .copied()
            .filter(|section| self.is_enabled(*section))
            .collect()
    }

    pub fn is_enabled(&self, section: LayoutSection) -> bool {
        self.enabled
            .read()
            .ok()
            .and_then(|map| map.get(&section).copied())
            .unwrap_or(false)
    }

    /// 设置分区启用状态，Visible 分区不允许禁用
    pub fn set_enabled(&self, section: LayoutSection, enabled: bool) {
        if section == LayoutSection::Visible && !enabled {
            warn!("忽略禁用 visible 分区的请求");
            return;
        }
        if let Ok(mut map) = self.enabled.write() {
            map.insert(section, enabled);
            info!("分区 {} 启用状态: {}", section, enabled);
        }
    }

    /// 按名称查找分区（忽略大小写，兼容连字符写法）
    pub fn lookup(&self, name: &str) -> Option<LayoutSection> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "visible" => Some(LayoutSection::Visible),
            "hidden" => Some(LayoutSection::Hidden),
            "alwayshidden" => Some(LayoutSection::AlwaysHidden),
            _ => None,
        }
    }

    pub fn is_menu_bar_hidden_by_system(&self) -> bool {
        self.menu_bar_hidden_by_system.load(Ordering::Acquire)
    }

    pub fn set_menu_bar_hidden_by_system(&self, hidden: bool) {
        self.menu_bar_hidden_by_system.store(hidden, Ordering::Release);
    }
}

impl Default for SectionModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enablement() {
        let model = SectionModel::new();
        assert!(model.is_enabled(LayoutSection::Visible));
        assert!(model.is_enabled(LayoutSection::Hidden));
        assert!(!model.is_enabled(LayoutSection::AlwaysHidden));
        assert_eq!(
            model.enabled_sections(),
            vec![LayoutSection::Visible, LayoutSection::Hidden]
        );
    }

    #[test]
    fn test_visible_cannot_be_disabled() {
        let model = SectionModel::new();
        model.set_enabled(LayoutSection::Visible, false);
        assert!(model.is_enabled(LayoutSection::Visible));

        model.set_enabled(LayoutSection::AlwaysHidden, true);
        assert!(model.is_enabled(LayoutSection::AlwaysHidden));
    }

    #[test]
    fn test_lookup() {
        let model = SectionModel::new();
        assert_eq!(model.lookup("Visible"), Some(LayoutSection::Visible));
        assert_eq!(model.lookup("always_hidden"), Some(LayoutSection::AlwaysHidden));
        assert_eq!(model.lookup("Always-Hidden"), Some(LayoutSection::AlwaysHidden));
        assert_eq!(model.lookup("alwayshidden"), Some(LayoutSection::AlwaysHidden));
        assert_eq!(model.lookup("overflow"), None);
    }
}
