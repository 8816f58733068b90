//! # 配置构建器模块
//!
//! 提供所有配置类型的构建器实现，支持链式调用和严格验证

pub mod cache_builder;
pub mod descriptor_builder;
pub mod global_builder;

pub use cache_builder::CacheConfigBuilder;
pub use descriptor_builder::{DEFAULT_EXPIRY_SECS, QueryDescriptorBuilder};
pub use global_builder::GlobalConfigBuilder;
