// 领域模块 - 用于组织应用的业务逻辑
//
// 布局领域：把缓存协调器、分区模型和权限状态组合成界面状态

pub mod layout;

pub use layout::{LayoutDomain, LayoutScreenState, SectionView};
