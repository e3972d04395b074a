use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::warn;

use crate::models::{CacheSettings, CacheSettingsUpdate};

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<CacheSettings>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<CacheSettings>(&bytes)
                .unwrap_or_else(|e| {
                    warn!("配置文件解析失败，使用默认配置: {}", e);
                    CacheSettings::default()
                }),
            _ => {
                let default = CacheSettings::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> CacheSettings {
        self.data.read().await.clone()
    }

    pub async fn update(&self, update: CacheSettingsUpdate) -> Result<CacheSettings> {
        let mut config = self.data.write().await;

        if let Some(value) = update.item_debounce_ms {
            config.item_debounce_ms = value;
        }
        if let Some(value) = update.deadline_secs {
            config.deadline_secs = value;
        }
        if let Some(value) = update.event_capacity {
            config.event_capacity = value;
        }
        if let Some(value) = update.capture_scale {
            config.capture_scale = value;
        }
        if let Some(level) = update.log_level {
            config.log_level = level;
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &CacheSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
