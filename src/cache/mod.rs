// 缓存模块 - 菜单栏项缓存与快照图像缓存

pub mod images;
pub mod items;

pub use images::{ImageCache, ImageSnapshot};
pub use items::{ItemCache, RefreshOutcome};
