// 截图模块 - 菜单栏项的发现与区域截图
//
// ItemSource 负责枚举当前菜单栏项，ImageCapturer 负责按位置截取单个菜单栏项

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::trace;

use crate::models::{ItemFrame, LayoutSection, ManagedItem};

pub mod source;

pub use source::{FixedItemSource, ProcessResolver};

/// 菜单栏项发现
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// 枚举当前菜单栏项，顺序为屏幕上从左到右
    async fn discover(&self) -> Result<Vec<ManagedItem>>;
}

/// 菜单栏项截图
#[async_trait]
pub trait ImageCapturer: Send + Sync {
    /// 截取单个菜单栏项在指定分区中的图像
    async fn capture(&self, section: LayoutSection, item: &ManagedItem) -> Result<DynamicImage>;
}

/// 按屏幕区域截图
pub struct ScreenRegionCapturer {
    /// 缩放比例，1.0 表示不缩放
    scale: f32,
}

impl ScreenRegionCapturer {
    pub fn new(scale: f32) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Self { scale }
    }

    fn capture_region(frame: ItemFrame) -> Result<DynamicImage> {
        // 在 macOS 上使用系统原生截图命令
        #[cfg(target_os = "macos")]
        {
            use std::process::Command;
            use tempfile::Builder;

            let temp_file = Builder::new()
                .prefix("menubar_item_")
                .suffix(".png")
                .tempfile()
                .map_err(|e| anyhow!("创建临时文件失败: {}", e))?;
            let temp_path = temp_file.path().to_path_buf();

            // -x: 不播放快门声音
            // -R: 只截取指定区域
            let region = format!("{},{},{},{}", frame.x, frame.y, frame.width, frame.height);
            let output = Command::new("screencapture")
                .arg("-x")
                .arg("-R")
                .arg(&region)
                .arg("-t")
                .arg("png")
                .arg(&temp_path)
                .output()
                .map_err(|e| anyhow!("执行 screencapture 命令失败: {}", e))?;

            if !output.status.success() {
                let error = String::from_utf8_lossy(&output.stderr);
                return Err(anyhow!("screencapture 命令执行失败: {}", error));
            }

            let img = image::open(&temp_path).map_err(|e| anyhow!("读取截图文件失败: {}", e))?;
            trace!("使用 screencapture 截取区域 {} 成功", region);
            Ok(img)
        }

        // 其他平台使用 screenshots crate，只截取主屏幕
        #[cfg(not(target_os = "macos"))]
        {
            use screenshots::Screen;

            let screens = Screen::all()?;
            let screen = screens
                .first()
                .ok_or_else(|| anyhow!("未找到可用屏幕"))?;
            let image = screen.capture_area(frame.x, frame.y, frame.width, frame.height)?;
            trace!(
                "截取区域 ({}, {}) {}x{} 成功",
                frame.x,
                frame.y,
                frame.width,
                frame.height
            );
            Ok(DynamicImage::ImageRgba8(image))
        }
    }
}

impl Default for ScreenRegionCapturer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl ImageCapturer for ScreenRegionCapturer {
    async fn capture(&self, _section: LayoutSection, item: &ManagedItem) -> Result<DynamicImage> {
        let frame = item.frame;
        if frame.is_empty() {
            return Err(anyhow!("菜单栏项 {} 尺寸无效", item.id));
        }

        let img = tokio::task::spawn_blocking(move || Self::capture_region(frame)).await??;

        if (self.scale - 1.0).abs() < f32::EPSILON {
            return Ok(img);
        }
        let width = ((img.width() as f32) * self.scale).round().max(1.0) as u32;
        let height = ((img.height() as f32) * self.scale).round().max(1.0) as u32;
        Ok(img.resize_exact(width, height, image::imageops::FilterType::Lanczos3))
    }
}

/// 生成纯色占位图（无法访问屏幕时使用）
pub struct PlaceholderCapturer {
    color: [u8; 4],
}

impl PlaceholderCapturer {
    pub fn new(color: [u8; 4]) -> Self {
        Self { color }
    }
}

impl Default for PlaceholderCapturer {
    fn default() -> Self {
        Self::new([128, 128, 128, 255])
    }
}

#[async_trait]
impl ImageCapturer for PlaceholderCapturer {
    async fn capture(&self, _section: LayoutSection, item: &ManagedItem) -> Result<DynamicImage> {
        let frame = item.frame;
        if frame.is_empty() {
            return Err(anyhow!("菜单栏项 {} 尺寸无效", item.id));
        }
        let buffer = RgbaImage::from_pixel(frame.width, frame.height, Rgba(self.color));
        Ok(DynamicImage::ImageRgba8(buffer))
    }
}

/// 探测屏幕录制权限（结果交给 CachedPermission 缓存）
pub fn probe_screen_capture() -> bool {
    #[cfg(target_os = "macos")]
    {
        ScreenRegionCapturer::capture_region(ItemFrame::new(0, 0, 1, 1)).is_ok()
    }

    #[cfg(not(target_os = "macos"))]
    {
        screenshots::Screen::all()
            .map(|screens| !screens.is_empty())
            .unwrap_or(false)
    }
}
