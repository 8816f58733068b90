//! 查询缓存管理器
//!
//! 装配对象：由一组具名描述符构建注册表、失效处理器和重新填充处理器，
//! 并把文档存储包装成变更跟踪存储。装配完成后注册表只读

use crate::adapter::{ChangeTrackingStore, DocumentStore};
use crate::cache::memcache_store::RatMemCacheStore;
use crate::cache::stats::{CacheCounters, CacheStats};
use crate::cache::store::CacheStore;
use crate::cached_value::CachedValue;
use crate::error::QueryCacheResult;
use crate::invalidation::InvalidationHandler;
use crate::query::cached_query::CachedQuery;
use crate::query::descriptor::QueryDescriptor;
use crate::registry::QueryRegistry;
use crate::rehydration::RehydrationHandler;
use crate::types::cache_config::CacheConfig;
use crate::types::data_value::DataValue;
use rat_logger::info;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// 查询缓存管理器构建器
pub struct QueryCacheManagerBuilder {
    config: CacheConfig,
    queries: Vec<(String, QueryDescriptor)>,
    cache: Option<Arc<dyn CacheStore>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl QueryCacheManagerBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            queries: Vec::new(),
            cache: None,
            store: None,
        }
    }

    /// 注册具名查询
    pub fn query(mut self, name: impl Into<String>, descriptor: QueryDescriptor) -> Self {
        self.queries.push((name.into(), descriptor));
        self
    }

    /// 使用指定的缓存存储；未设置时按配置创建 [`RatMemCacheStore`]
    pub fn cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 底层文档存储（必须设置）
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> QueryCacheResult<QueryCacheManager> {
        let store = self
            .store
            .ok_or_else(|| crate::quick_error!(config, "文档存储必须设置"))?;

        let mut names = HashSet::new();
        for (name, _) in &self.queries {
            if !names.insert(name.as_str()) {
                return Err(crate::quick_error!(config, format!("查询名称重复: {}", name)));
            }
        }

        let cache: Arc<dyn CacheStore> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(RatMemCacheStore::connect(&self.config).await?),
        };

        let counters = Arc::new(CacheCounters::new());
        let max_ttl_secs = self.config.ttl_config.max_ttl_secs;

        // 查询读取时绕过跟踪层，跟踪层只拦截写操作
        let queries = self
            .queries
            .into_iter()
            .map(|(name, descriptor)| {
                Arc::new(CachedQuery::new(
                    name,
                    Arc::new(descriptor),
                    cache.clone(),
                    store.clone(),
                    counters.clone(),
                    max_ttl_secs,
                ))
            })
            .collect();
        let registry = Arc::new(QueryRegistry::new(queries));

        let rehydrator = Arc::new(RehydrationHandler::new(registry.clone(), counters.clone()));
        let handler = Arc::new(InvalidationHandler::new(
            cache.clone(),
            &registry,
            rehydrator.clone(),
            self.config.auto_rehydrate,
            counters.clone(),
        ));
        let tracked = Arc::new(ChangeTrackingStore::new(store, handler.clone()));

        info!(
            "查询缓存管理器已创建: 查询数={}, 索引集合数={}, 自动重新填充={}",
            registry.len(),
            handler.index().model_count(),
            self.config.auto_rehydrate
        );

        Ok(QueryCacheManager {
            config: self.config,
            cache,
            registry,
            rehydrator,
            handler,
            tracked,
            counters,
        })
    }
}

/// 查询缓存管理器
pub struct QueryCacheManager {
    config: CacheConfig,
    cache: Arc<dyn CacheStore>,
    registry: Arc<QueryRegistry>,
    rehydrator: Arc<RehydrationHandler>,
    handler: Arc<InvalidationHandler>,
    tracked: Arc<ChangeTrackingStore>,
    counters: Arc<CacheCounters>,
}

impl QueryCacheManager {
    pub fn builder(config: CacheConfig) -> QueryCacheManagerBuilder {
        QueryCacheManagerBuilder::new(config)
    }

    /// 按名称获取查询
    pub fn query(&self, name: &str) -> QueryCacheResult<Arc<CachedQuery>> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| crate::quick_error!(config, format!("未注册的查询: {}", name)))
    }

    /// 变更跟踪的文档存储，所有写操作都应经过它
    pub fn store(&self) -> Arc<ChangeTrackingStore> {
        self.tracked.clone()
    }

    pub fn cache_store(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    pub fn invalidation(&self) -> &Arc<InvalidationHandler> {
        &self.handler
    }

    /// 在同一个缓存存储上创建缓存值，过期时间默认取配置中的 `default_expiry_secs`
    pub fn cached_value<T, F, Fut>(
        &self,
        name: impl Into<String>,
        expiry_secs: Option<u64>,
        fetcher: F,
    ) -> QueryCacheResult<CachedValue<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(Vec<DataValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryCacheResult<Option<T>>> + Send + 'static,
    {
        CachedValue::new(
            name,
            expiry_secs.unwrap_or(self.config.default_expiry_secs),
            self.cache.clone(),
            fetcher,
        )
    }

    /// 重新填充所有等待中的被驱逐键，返回成功的键
    pub async fn rehydrate(&self) -> Vec<String> {
        let keys = self.handler.drain_evicted();
        self.rehydrator.rehydrate(&keys).await
    }

    /// 重新填充指定的缓存键
    pub async fn rehydrate_keys(&self, keys: &[String]) -> Vec<String> {
        self.rehydrator.rehydrate(keys).await
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl std::fmt::Debug for QueryCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCacheManager")
            .field("queries", &self.registry.len())
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}
