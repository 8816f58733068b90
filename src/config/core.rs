//! # 配置管理模块 - 核心配置类型

use crate::error::{QueryCacheError, QueryCacheResult};
use crate::types::cache_config::CacheConfig;
use rat_logger::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 全局配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// 缓存配置
    pub cache: CacheConfig,
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

impl GlobalConfig {
    /// 创建全局配置构建器
    pub fn builder() -> super::builders::GlobalConfigBuilder {
        super::builders::GlobalConfigBuilder::new()
    }

    /// 从配置文件加载配置，`.toml` 扩展名按 TOML 解析，其余按 JSON 解析
    ///
    /// # 参数
    ///
    /// * `config_path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> QueryCacheResult<Self> {
        let path = config_path.as_ref();
        let content = std::fs::read_to_string(path).map_err(QueryCacheError::IoError)?;

        let config: GlobalConfig = if is_toml(path) {
            toml::from_str(&content)
                .map_err(|e| crate::quick_error!(config, format!("解析TOML配置文件失败: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| crate::quick_error!(config, format!("解析JSON配置文件失败: {}", e)))?
        };

        info!("从文件加载配置: {:?}", path);
        Ok(config)
    }

    /// 保存配置到文件
    ///
    /// # 参数
    ///
    /// * `config_path` - 配置文件路径
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> QueryCacheResult<()> {
        let path = config_path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| crate::quick_error!(config, format!("序列化TOML配置失败: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| crate::quick_error!(config, format!("序列化JSON配置失败: {}", e)))?
        };

        std::fs::write(path, content).map_err(QueryCacheError::IoError)?;

        info!("保存配置到文件: {:?}", path);
        Ok(())
    }
}
