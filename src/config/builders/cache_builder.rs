//! # 缓存配置构建器模块
//!
//! 所有配置项必须显式设置，构建时统一校验

use crate::error::QueryCacheResult;
use crate::types::cache_config::{
    CacheConfig, CacheStrategy, CompressionConfig, L1CacheConfig, L2CacheConfig, TtlConfig,
};
use rat_logger::info;

/// 缓存配置构建器
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_expiry_secs: Option<u64>,
    auto_rehydrate: Option<bool>,
    strategy: Option<CacheStrategy>,
    l1_config: Option<L1CacheConfig>,
    l2_config: Option<L2CacheConfig>,
    ttl_config: Option<TtlConfig>,
    compression_config: Option<CompressionConfig>,
}

impl CacheConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置描述符默认过期时间（秒）
    pub fn default_expiry_secs(mut self, secs: u64) -> Self {
        self.default_expiry_secs = Some(secs);
        self
    }

    /// 设置失效后是否立即重新填充
    pub fn auto_rehydrate(mut self, enabled: bool) -> Self {
        self.auto_rehydrate = Some(enabled);
        self
    }

    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn l1_config(mut self, config: L1CacheConfig) -> Self {
        self.l1_config = Some(config);
        self
    }

    /// 设置 L2 缓存配置，不设置表示禁用
    pub fn l2_config(mut self, config: Option<L2CacheConfig>) -> Self {
        self.l2_config = config;
        self
    }

    pub fn ttl_config(mut self, config: TtlConfig) -> Self {
        self.ttl_config = Some(config);
        self
    }

    pub fn compression_config(mut self, config: CompressionConfig) -> Self {
        self.compression_config = Some(config);
        self
    }

    /// 构建缓存配置
    ///
    /// # 错误
    ///
    /// 必需项未设置或取值非法时返回配置错误
    pub fn build(self) -> QueryCacheResult<CacheConfig> {
        let default_expiry_secs = self
            .default_expiry_secs
            .ok_or_else(|| crate::quick_error!(config, "默认过期时间必须设置"))?;
        let auto_rehydrate = self
            .auto_rehydrate
            .ok_or_else(|| crate::quick_error!(config, "自动重新填充选项必须设置"))?;
        let strategy = self
            .strategy
            .ok_or_else(|| crate::quick_error!(config, "缓存策略必须设置"))?;
        let l1_config = self
            .l1_config
            .ok_or_else(|| crate::quick_error!(config, "L1缓存配置必须设置"))?;
        let ttl_config = self
            .ttl_config
            .ok_or_else(|| crate::quick_error!(config, "TTL配置必须设置"))?;
        let compression_config = self
            .compression_config
            .ok_or_else(|| crate::quick_error!(config, "压缩配置必须设置"))?;

        if default_expiry_secs == 0 {
            return Err(crate::quick_error!(config, "默认过期时间不能为零"));
        }
        if l1_config.max_capacity == 0 {
            return Err(crate::quick_error!(config, "L1缓存容量不能为零"));
        }
        if ttl_config.max_ttl_secs < default_expiry_secs {
            return Err(crate::quick_error!(
                config,
                format!(
                    "最大TTL ({}) 不能小于默认过期时间 ({})",
                    ttl_config.max_ttl_secs, default_expiry_secs
                )
            ));
        }

        info!(
            "创建缓存配置: 默认过期={}秒, 自动重新填充={}, 策略={:?}",
            default_expiry_secs, auto_rehydrate, strategy
        );

        Ok(CacheConfig {
            default_expiry_secs,
            auto_rehydrate,
            strategy,
            l1_config,
            l2_config: self.l2_config,
            ttl_config,
            compression_config,
        })
    }
}
