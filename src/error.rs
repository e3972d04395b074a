// 缓存错误定义
//
// 这些错误只在缓存层内部流转，协调器会把它们转换为可观察的状态

use thiserror::Error;

use crate::models::LayoutSection;

/// 缓存刷新过程中可能出现的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// 没有屏幕录制权限（正常的受限状态，不重试）
    #[error("缺少屏幕录制权限")]
    PermissionUnavailable,

    /// 菜单栏项枚举失败或不完整，保留旧缓存
    #[error("菜单栏项发现不完整: {reason}")]
    DiscoveryIncomplete { reason: String },

    /// 超时后仍未加载到任何菜单栏项
    #[error("加载超时: items={items}, images={images}")]
    DeadlineExceeded { items: usize, images: usize },

    /// 分区截图失败
    #[error("分区 {section} 截图失败: {reason}")]
    Capture { section: LayoutSection, reason: String },
}

impl CacheError {
    pub fn discovery(err: impl std::fmt::Display) -> Self {
        Self::DiscoveryIncomplete {
            reason: err.to_string(),
        }
    }
}
