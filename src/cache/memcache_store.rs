//! 基于 rat_memcache 的缓存存储
//!
//! 每个键的槽位序列化为 JSON 存入 L1/L2 缓存。删除写入空值墓碑，读取时视为不存在

use super::slot_store::{Slot, SlotBackend, SlotCacheStore};
use crate::error::{QueryCacheError, QueryCacheResult};
use crate::types::cache_config::{CacheConfig, CacheStrategy};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rat_logger::{debug, info};
use rat_memcache::types::EvictionStrategy;
use rat_memcache::{CacheOptions, RatMemCache, RatMemCacheBuilder};
use std::path::PathBuf;
use std::sync::Arc;

/// 墓碑存活时间（秒）
const TOMBSTONE_TTL_SECS: u64 = 1;

fn cache_error(err: anyhow::Error) -> QueryCacheError {
    crate::quick_error!(cache, format!("{:#}", err))
}

/// rat_memcache 槽位后端
#[derive(Debug, Clone)]
pub struct RatMemCacheBackend {
    cache: Arc<RatMemCache>,
    max_ttl_secs: u64,
}

impl RatMemCacheBackend {
    pub async fn new(config: &CacheConfig) -> QueryCacheResult<Self> {
        debug!("创建 rat_memcache 缓存后端，配置: {:?}", config);

        let l2 = config.l2_config.as_ref();
        let builder = RatMemCacheBuilder::new()
            .l1_config(rat_memcache::config::L1Config {
                max_memory: config.l1_config.max_memory_mb * 1024 * 1024,
                max_entries: config.l1_config.max_capacity,
                eviction_strategy: match config.strategy {
                    CacheStrategy::Lru => EvictionStrategy::Lru,
                    CacheStrategy::Lfu => EvictionStrategy::Lfu,
                    CacheStrategy::Fifo => EvictionStrategy::Fifo,
                },
            })
            .l2_config(rat_memcache::config::L2Config {
                enable_l2_cache: l2.is_some(),
                data_dir: l2.map(|c| PathBuf::from(&c.storage_path)),
                max_disk_size: l2.map(|c| c.max_disk_mb as u64 * 1024 * 1024).unwrap_or(500 * 1024 * 1024),
                write_buffer_size: 64 * 1024 * 1024,
                max_write_buffer_number: 3,
                block_cache_size: 16 * 1024 * 1024,
                enable_lz4: config.compression_config.enabled,
                compression_threshold: config.compression_config.threshold_bytes,
                compression_max_threshold: config.compression_config.threshold_bytes * 10,
                compression_level: l2.map(|c| c.compression_level).unwrap_or(6),
                background_threads: 2,
                clear_on_startup: l2.map(|c| c.clear_on_startup).unwrap_or(false),
                cache_size_mb: l2.map(|c| c.max_disk_mb).unwrap_or(500),
                max_file_size_mb: l2.map(|c| c.max_disk_mb / 2).unwrap_or(250),
                smart_flush_enabled: true,
                smart_flush_base_interval_ms: 100,
                smart_flush_min_interval_ms: 20,
                smart_flush_max_interval_ms: 500,
                smart_flush_write_rate_threshold: 10000,
                smart_flush_accumulated_bytes_threshold: 4 * 1024 * 1024,
                cache_warmup_strategy: rat_memcache::config::CacheWarmupStrategy::Recent,
                zstd_compression_level: None,
                l2_write_strategy: "write_through".to_string(),
                l2_write_threshold: 1024,
                l2_write_ttl_threshold: 3600,
            })
            .ttl_config(rat_memcache::config::TtlConfig {
                expire_seconds: Some(config.ttl_config.max_ttl_secs),
                cleanup_interval: config.ttl_config.check_interval_secs,
                max_cleanup_entries: 1000,
                lazy_expiration: true,
                active_expiration: true,
            })
            .performance_config(rat_memcache::config::PerformanceConfig {
                worker_threads: 4,
                enable_concurrency: true,
                read_write_separation: true,
                batch_size: 1000,
                enable_warmup: true,
                large_value_threshold: 10240,
            })
            .logging_config(rat_memcache::config::LoggingConfig {
                level: "INFO".to_string(),
                enable_colors: true,
                show_timestamp: true,
                enable_performance_logs: false,
                enable_audit_logs: false,
                enable_cache_logs: true,
                enable_logging: true,
                enable_async: false,
                batch_size: 2048,
                batch_interval_ms: 25,
                buffer_size: 16384,
            });

        let cache = builder
            .build()
            .await
            .map_err(|e| cache_error(anyhow!("创建 rat_memcache 实例失败: {}", e)))?;

        info!(
            "rat_memcache 缓存后端初始化成功 - L1容量: {}, L1内存: {}MB, L2磁盘: {}MB, 策略: {:?}",
            config.l1_config.max_capacity,
            config.l1_config.max_memory_mb,
            l2.map(|c| c.max_disk_mb).unwrap_or(0),
            config.strategy
        );

        Ok(Self {
            cache: Arc::new(cache),
            max_ttl_secs: config.ttl_config.max_ttl_secs,
        })
    }

    /// 槽位剩余时间换算成底层 TTL，截断到配置的最大值
    fn physical_ttl(&self, slot: &Slot) -> u64 {
        match slot.remaining_ms(Utc::now().timestamp_millis()) {
            Some(ms) => (((ms + 999) / 1000) as u64).clamp(1, self.max_ttl_secs.max(1)),
            None => self.max_ttl_secs,
        }
    }
}

#[async_trait]
impl SlotBackend for RatMemCacheBackend {
    async fn load(&self, key: &str) -> QueryCacheResult<Option<Slot>> {
        let data = self
            .cache
            .get(key)
            .await
            .map_err(|e| cache_error(anyhow!("读取缓存键 {} 失败: {}", key, e)))?;
        match data {
            Some(bytes) if !bytes.is_empty() => {
                let slot = serde_json::from_slice(&bytes)
                    .with_context(|| format!("缓存键 {} 的数据损坏", key))
                    .map_err(cache_error)?;
                Ok(Some(slot))
            }
            _ => Ok(None),
        }
    }

    async fn store(&self, key: &str, slot: &Slot) -> QueryCacheResult<()> {
        let serialized = serde_json::to_vec(slot)?;
        let options = CacheOptions {
            ttl_seconds: Some(self.physical_ttl(slot)),
            ..Default::default()
        };
        self.cache
            .set_with_options(key.to_string(), Bytes::from(serialized), &options)
            .await
            .map_err(|e| cache_error(anyhow!("写入缓存键 {} 失败: {}", key, e)))
    }

    async fn remove(&self, key: &str) -> QueryCacheResult<()> {
        let options = CacheOptions {
            ttl_seconds: Some(TOMBSTONE_TTL_SECS),
            ..Default::default()
        };
        self.cache
            .set_with_options(key.to_string(), Bytes::new(), &options)
            .await
            .map_err(|e| cache_error(anyhow!("删除缓存键 {} 失败: {}", key, e)))
    }
}

/// rat_memcache 缓存存储
pub type RatMemCacheStore = SlotCacheStore<RatMemCacheBackend>;

impl SlotCacheStore<RatMemCacheBackend> {
    pub async fn connect(config: &CacheConfig) -> QueryCacheResult<Self> {
        Ok(Self::with_backend(RatMemCacheBackend::new(config).await?))
    }
}
