// 事件总线 - 向界面层推送缓存变化
//
// 实现发布/订阅模式,界面层通过订阅得知缓存何时更新
// 使用 tokio::sync::broadcast 实现高效的事件分发

use tokio::sync::broadcast;

use crate::models::LayoutSection;

/// 缓存事件枚举 - 定义所有可能的缓存事件
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    // --- 菜单栏项事件 ---

    /// 菜单栏项已重新发现
    ItemsRefreshed {
        count: usize,
    },

    /// 防抖窗口内的非强制刷新被跳过
    ItemRefreshSkipped,

    /// 菜单栏项发现失败，旧缓存保留
    DiscoveryFailed {
        reason: String,
    },

    // --- 图像事件 ---

    /// 分区快照已替换
    SectionImagesRefreshed {
        section: LayoutSection,
        count: usize,
    },

    // --- 加载事件 ---

    /// 开始加载
    PopulationStarted {
        generation: u64,
    },

    /// 已加载到菜单栏项
    PopulationConverged {
        generation: u64,
        items: usize,
    },

    /// 超时仍无菜单栏项
    DeadlineExceeded {
        generation: u64,
        items: usize,
        images: usize,
    },

    /// 无屏幕录制权限，未加载
    PermissionUnavailable,
}

/// 事件总线
///
/// 使用 broadcast channel 实现发布/订阅模式
/// 支持多个订阅者同时接收事件
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃
    pub fn publish(&self, event: CacheEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.publish(CacheEvent::ItemsRefreshed { count: 4 });

        match receiver.recv().await {
            Ok(CacheEvent::ItemsRefreshed { count }) => assert_eq!(count, 4),
            other => panic!("未收到预期事件: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(CacheEvent::SectionImagesRefreshed {
            section: LayoutSection::Hidden,
            count: 2,
        });

        assert!(receiver1.try_recv().is_ok());
        assert!(receiver2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(CacheEvent::PermissionUnavailable);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
