// 快照图像缓存 - 按分区保存菜单栏项的截图
//
// 每个分区的新图像全部就绪后才整体替换，读者不会看到新旧混杂的分区

use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::items::ItemCache;
use crate::capture::ImageCapturer;
use crate::error::CacheError;
use crate::event_bus::{CacheEvent, EventBus};
use crate::models::{ItemId, LayoutSection, ManagedItem, SnapshotImage};
use crate::permission::PermissionGate;
use crate::sections::SectionModel;

/// 单个分区的图像（按显示顺序）
#[derive(Clone, Default)]
struct SectionEntry {
    images: Arc<Vec<SnapshotImage>>,
    /// 生成这组图像时的输入指纹
    fingerprint: u64,
}

/// 图像缓存的只读快照
#[derive(Clone, Default)]
pub struct ImageSnapshot {
    sections: BTreeMap<LayoutSection, Arc<Vec<SnapshotImage>>>,
}

impl ImageSnapshot {
    /// 查找某个分区中某个菜单栏项的图像
    pub fn get(&self, section: LayoutSection, id: &ItemId) -> Option<&SnapshotImage> {
        self.sections
            .get(&section)
            .and_then(|images| images.iter().find(|image| &image.item_id == id))
    }

    /// 某个分区的全部图像（按显示顺序）
    pub fn section(&self, section: LayoutSection) -> &[SnapshotImage] {
        self.sections
            .get(&section)
            .map(|images| images.as_slice())
            .unwrap_or(&[])
    }

    /// 图像总数
    pub fn len(&self) -> usize {
        self.sections.values().map(|images| images.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayoutSection, &SnapshotImage)> + '_ {
        self.sections
            .iter()
            .flat_map(|(section, images)| images.iter().map(move |image| (*section, image)))
    }
}

/// 快照图像缓存
pub struct ImageCache {
    items: Arc<ItemCache>,
    capturer: Arc<dyn ImageCapturer>,
    permission: Arc<dyn PermissionGate>,
    sections: Arc<SectionModel>,
    event_bus: Arc<EventBus>,
    images: RwLock<BTreeMap<LayoutSection, SectionEntry>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ImageCache {
    pub fn new(
        items: Arc<ItemCache>,
        capturer: Arc<dyn ImageCapturer>,
        permission: Arc<dyn PermissionGate>,
        sections: Arc<SectionModel>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            items,
            capturer,
            permission,
            sections,
            event_bus,
            images: RwLock::new(BTreeMap::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 当前图像快照
    pub fn current_images(&self) -> ImageSnapshot {
        let sections = self
            .images
            .read()
            .map(|map| {
                map.iter()
                    .map(|(section, entry)| (*section, Arc::clone(&entry.images)))
                    .collect()
            })
            .unwrap_or_default();
        ImageSnapshot { sections }
    }

    pub fn image_count(&self) -> usize {
        self.images
            .read()
            .map(|map| map.values().map(|entry| entry.images.len()).sum())
            .unwrap_or(0)
    }

    /// 无条件重新截取指定分区
    pub async fn refresh(&self, sections: &[LayoutSection]) {
        let _guard = self.refresh_lock.lock().await;
        let items = self.items.current_items();

        for section in unique(sections) {
            let fingerprint = self.fingerprint(section, &items);
            self.recapture(section, &items, fingerprint).await;
        }
    }

    /// 只重新截取输入发生变化的分区，返回实际刷新的分区
    pub async fn refresh_stale(&self, sections: &[LayoutSection]) -> Vec<LayoutSection> {
        let _guard = self.refresh_lock.lock().await;
        let items = self.items.current_items();
        let mut refreshed = Vec::new();

        for section in unique(sections) {
            let fingerprint = self.fingerprint(section, &items);
            if self.stored_fingerprint(section) == Some(fingerprint) {
                continue;
            }
            self.recapture(section, &items, fingerprint).await;
            refreshed.push(section);
        }

        refreshed
    }

    async fn recapture(&self, section: LayoutSection, items: &[ManagedItem], fingerprint: u64) {
        let images = match self.capture_section(section, items).await {
            Ok(images) => images,
            Err(e) => {
                debug!("{}，分区图像置空", e);
                Vec::new()
            }
        };

        let count = images.len();
        if let Ok(mut map) = self.images.write() {
            map.insert(
                section,
                SectionEntry {
                    images: Arc::new(images),
                    fingerprint,
                },
            );
        }

        debug!("分区 {} 的快照已替换，共 {} 张", section, count);
        self.event_bus
            .publish(CacheEvent::SectionImagesRefreshed { section, count });
    }

    async fn capture_section(
        &self,
        section: LayoutSection,
        items: &[ManagedItem],
    ) -> Result<Vec<SnapshotImage>, CacheError> {
        if !self.sections.is_enabled(section) {
            return Err(CacheError::Capture {
                section,
                reason: "分区未启用".to_string(),
            });
        }
        if !self.permission.check_permission() {
            return Err(CacheError::PermissionUnavailable);
        }

        let members = members_of(section, items);
        if members.is_empty() {
            return Err(CacheError::Capture {
                section,
                reason: "分区内没有菜单栏项".to_string(),
            });
        }

        let mut images = Vec::with_capacity(members.len());
        for item in members {
            match self.capturer.capture(section, item).await {
                Ok(image) => images.push(SnapshotImage {
                    item_id: item.id.clone(),
                    section,
                    frame: item.frame,
                    captured_at: Utc::now(),
                    image: Arc::new(image),
                }),
                Err(e) => warn!("截取菜单栏项 {} 失败: {}", item.id, e),
            }
        }

        // 截图过程中权限被撤销，丢弃这一组结果
        if !self.permission.check_permission() {
            return Err(CacheError::PermissionUnavailable);
        }

        Ok(images)
    }

    fn stored_fingerprint(&self, section: LayoutSection) -> Option<u64> {
        self.images
            .read()
            .ok()
            .and_then(|map| map.get(&section).map(|entry| entry.fingerprint))
    }

    fn fingerprint(&self, section: LayoutSection, items: &[ManagedItem]) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.sections.is_enabled(section).hash(&mut hasher);
        self.permission.check_permission().hash(&mut hasher);
        for item in members_of(section, items) {
            item.id.hash(&mut hasher);
            item.frame.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// 分区内的菜单栏项，按显示顺序排列
fn members_of(section: LayoutSection, items: &[ManagedItem]) -> Vec<&ManagedItem> {
    let mut members: Vec<&ManagedItem> = items
        .iter()
        .filter(|item| item.section == Some(section))
        .collect();
    members.sort_by_key(|item| item.order);
    members
}

fn unique(sections: &[LayoutSection]) -> Vec<LayoutSection> {
    let mut result = Vec::with_capacity(sections.len());
    for section in sections {
        if !result.contains(section) {
            result.push(*section);
        }
    }
    result
}
