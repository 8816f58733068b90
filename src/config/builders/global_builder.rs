//! # 全局配置构建器模块

use crate::config::core::GlobalConfig;
use crate::error::QueryCacheResult;
use crate::types::cache_config::CacheConfig;

/// 全局配置构建器
#[derive(Debug, Default)]
pub struct GlobalConfigBuilder {
    cache: Option<CacheConfig>,
}

impl GlobalConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置缓存配置
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 构建全局配置
    pub fn build(self) -> QueryCacheResult<GlobalConfig> {
        let cache = self
            .cache
            .ok_or_else(|| crate::quick_error!(config, "缓存配置必须设置"))?;
        Ok(GlobalConfig { cache })
    }
}
