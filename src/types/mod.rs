//! 通用类型定义
//!
//! 文档值模型、ID类型、查询与更新选项、缓存配置

pub mod cache_config;
pub mod data_value;
pub mod id_types;
pub mod query;
pub mod update_operations;

pub use cache_config::{
    CacheConfig, CacheStrategy, CompressionConfig, L1CacheConfig, L2CacheConfig, TtlConfig,
};
pub use data_value::{DataValue, Document};
pub use id_types::ObjectId;
pub use query::{
    FilterFactory, FindOptions, ParamToken, Population, QueryFilter, SortConfig, SortDirection,
    UpdateOptions,
};
pub use update_operations::{UpdateDocument, UpdateOperator};
