//! rat_querycache - 文档数据库的读穿透查询缓存
//!
//! 查询结果按描述符和参数缓存到键值存储中，写操作经由变更跟踪存储
//! 精确计算受影响的缓存条目并删除，可选地立即重新填充

// 导出所有公共模块
pub mod error;
pub mod i18n;
pub mod types;
pub mod config;
pub mod query;
pub mod cache;
pub mod adapter;
pub mod invalidation;
pub mod rehydration;
pub mod registry;
pub mod cached_value;
pub mod manager;

// 重新导出常用类型和函数
pub use error::{QueryCacheError, QueryCacheResult};
pub use types::*;
pub use config::{CacheConfigBuilder, GlobalConfig, GlobalConfigBuilder, QueryDescriptorBuilder};
pub use query::{CachedQuery, ExecOptions, QueryDescriptor, ResultFilter};
pub use cache::{
    CacheStats, CacheStore, InvalidationOp, MemoryCacheStore, QueryEntry, RatMemCacheStore,
};
pub use adapter::{ChangeTrackingStore, DocumentStore, MemoryDocumentStore, UpdateResult};
#[cfg(feature = "mongodb-support")]
pub use adapter::MongoDocumentStore;
pub use invalidation::{ChangeEffect, InvalidationHandler, InvalidationIndex};
pub use rehydration::RehydrationHandler;
pub use registry::QueryRegistry;
pub use cached_value::CachedValue;
pub use manager::{QueryCacheManager, QueryCacheManagerBuilder};

// 条件编译调试宏 - 只有在 debug 模式下才输出调试信息
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        rat_logger::debug!($($arg)*);
    };
}

#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        // 在 release 模式下不输出调试信息
    };
}

/// 初始化rat_querycache库
///
/// 注册多语言错误消息并按 `RAT_LANG` / `LANG` 选择语言
///
/// 注意：日志系统由调用者自行初始化，本库不会初始化日志
pub fn init() {
    i18n::ErrorMessageI18n::init();
}

