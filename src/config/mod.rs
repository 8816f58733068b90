//! # 配置管理模块
//!
//! 缓存配置严格遵循构建器模式：所有配置项必须显式设置；
//! 查询描述符构建器则提供与缓存语义相符的默认值

pub mod builders;
pub mod core;

pub use builders::{CacheConfigBuilder, GlobalConfigBuilder, QueryDescriptorBuilder};
pub use core::GlobalConfig;
