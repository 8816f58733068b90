//! 缓存查询运行时
//!
//! 一个 [`CachedQuery`] 对应一个已注册的描述符。读穿缓存：
//! 命中时直接返回缓存的结果窗口，未命中时查询文档存储并登记依赖。
//! 缓存存储的错误只记录日志（读降级为未命中，写被忽略），文档存储的错误向上传播

use crate::adapter::DocumentStore;
use crate::cache::keys::{FIELD_COUNT, FIELD_VALUE, id_to_string};
use crate::cache::stats::CacheCounters;
use crate::cache::store::{CacheStore, QueryEntry};
use crate::error::QueryCacheResult;
use crate::query::descriptor::QueryDescriptor;
use crate::query::path::get_path;
use crate::types::data_value::{DataValue, Document};
use crate::types::query::Population;
use rat_logger::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// 客户端结果过滤函数
pub type ResultFilter = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// 执行选项
#[derive(Clone, Default)]
pub struct ExecOptions {
    /// 过滤器工厂的参数
    pub params: Vec<DataValue>,
    pub skip: u64,
    /// None 表示不限制，必须为正数
    pub limit: Option<u64>,
    /// 客户端过滤（要求 cacheCount 无限）
    pub filter: Option<ResultFilter>,
    /// 跳过缓存读取
    pub skip_cache: bool,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只带参数的选项
    pub fn params(params: Vec<DataValue>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }
}

impl std::fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecOptions")
            .field("params", &self.params)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("filter", &self.filter.is_some())
            .field("skip_cache", &self.skip_cache)
            .finish()
    }
}

/// 对结果数组应用 skip/limit
fn skip_and_limit(docs: Vec<Document>, skip: u64, limit: Option<u64>) -> Vec<Document> {
    let iter = docs.into_iter().skip(skip as usize);
    match limit {
        Some(limit) => iter.take(limit as usize).collect(),
        None => iter.collect(),
    }
}

/// 收集结果中所有层级的填充文档ID
pub fn collect_populated_ids(docs: &[Document], populations: &[Population]) -> Vec<String> {
    let mut ids = Vec::new();
    collect_populated_into(docs, populations, &mut ids);
    ids
}

fn collect_populated_into(docs: &[Document], populations: &[Population], ids: &mut Vec<String>) {
    for node in populations {
        for doc in docs {
            let inner: Vec<&Document> = match get_path(doc, &node.path) {
                Some(DataValue::Object(obj)) => vec![obj],
                Some(DataValue::Array(items)) => items.iter().filter_map(|i| i.as_object()).collect(),
                _ => continue,
            };
            for populated in inner {
                let Some(id) = populated.get("_id") else {
                    continue;
                };
                let id = id_to_string(id);
                if !ids.contains(&id) {
                    ids.push(id);
                }
                if !node.populate.is_empty() {
                    collect_populated_into(std::slice::from_ref(populated), &node.populate, ids);
                }
            }
        }
    }
}

/// 缓存查询
pub struct CachedQuery {
    name: String,
    descriptor: Arc<QueryDescriptor>,
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn DocumentStore>,
    counters: Arc<CacheCounters>,
    /// 实际写入的过期时间（已按最大 TTL 截断）
    expiry_secs: u64,
}

impl CachedQuery {
    pub fn new(
        name: impl Into<String>,
        descriptor: Arc<QueryDescriptor>,
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn DocumentStore>,
        counters: Arc<CacheCounters>,
        max_ttl_secs: u64,
    ) -> Self {
        let expiry_secs = descriptor.expiry_secs().min(max_ttl_secs.max(1));
        Self {
            name: name.into(),
            descriptor,
            cache,
            store,
            counters,
            expiry_secs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<QueryDescriptor> {
        &self.descriptor
    }

    /// 缓存键
    pub fn get_cache_key(&self, params: &[DataValue]) -> QueryCacheResult<String> {
        self.descriptor.cache_key(params)
    }

    fn validate(&self, options: &ExecOptions) -> QueryCacheResult<()> {
        if options.filter.is_some() && self.descriptor.cache_count().is_some() {
            return Err(crate::quick_error!(
                config,
                format!("查询 {} 只有在 cacheCount 无限时才能使用客户端过滤", self.name)
            ));
        }
        if options.limit == Some(0) {
            return Err(crate::quick_error!(config, "limit 必须为正数"));
        }
        Ok(())
    }

    /// 请求窗口是否超出缓存范围
    fn outside_cache_window(&self, options: &ExecOptions) -> bool {
        match (self.descriptor.cache_count(), options.limit) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(count), Some(limit)) => limit.saturating_add(options.skip) > count,
        }
    }

    async fn read_cached(&self, key: &str) -> Option<Vec<Document>> {
        let raw = match self.cache.hget(key, FIELD_VALUE).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("读取缓存失败，按未命中处理: key={}, 错误: {}", key, e);
                return None;
            }
        };
        match DataValue::from_json_string(&raw) {
            Ok(DataValue::Array(items)) => {
                let docs: Option<Vec<Document>> = items
                    .into_iter()
                    .map(|item| match item {
                        DataValue::Object(doc) => Some(doc),
                        _ => None,
                    })
                    .collect();
                if docs.is_none() {
                    warn!("缓存结果格式错误，按未命中处理: key={}", key);
                }
                docs
            }
            Ok(_) => {
                warn!("缓存结果格式错误，按未命中处理: key={}", key);
                None
            }
            Err(e) => {
                warn!("缓存结果解码失败，按未命中处理: key={}, 错误: {}", key, e);
                None
            }
        }
    }

    async fn write_cached(&self, key: &str, docs: &[Document]) {
        let owned_ids = docs
            .iter()
            .filter_map(|doc| doc.get("_id"))
            .map(id_to_string)
            .collect();
        let value = DataValue::Array(docs.iter().cloned().map(DataValue::Object).collect());
        let entry = QueryEntry {
            key: key.to_string(),
            hash: self.descriptor.hash().to_string(),
            value: value.to_canonical_json_string(),
            owned_ids,
            populated_ids: collect_populated_ids(docs, self.descriptor.populate()),
            // cacheCount 无限时缓存的数组就是完整结果
            count: match self.descriptor.cache_count() {
                None => Some(docs.len() as u64),
                Some(_) => None,
            },
            expiry_secs: self.expiry_secs,
        };
        crate::debug_log!(
            "写入缓存条目: key={}, 文档数={}, 填充ID数={}",
            key,
            docs.len(),
            entry.populated_ids.len()
        );
        match self.cache.write_query_entry(&entry).await {
            Ok(()) => self.counters.record_write(),
            Err(e) => warn!("写入缓存失败，已忽略: key={}, 错误: {}", key, e),
        }
    }

    /// 执行查询
    pub async fn exec(&self, options: &ExecOptions) -> QueryCacheResult<Vec<Document>> {
        self.validate(options)?;
        let descriptor = &self.descriptor;
        let filter = descriptor.filter().resolve(&options.params)?;
        let key = descriptor.cache_key(&options.params)?;

        if self.outside_cache_window(options) {
            self.counters.record_bypass();
            debug!("查询窗口超出缓存范围，直接查询文档存储: query={}, key={}", self.name, key);
            return self
                .store
                .find(
                    descriptor.model(),
                    &filter,
                    &descriptor.find_options(options.skip, options.limit),
                )
                .await;
        }

        let cached = if options.skip_cache {
            None
        } else {
            self.read_cached(&key).await
        };

        let result = match cached {
            Some(docs) => {
                self.counters.record_hit();
                debug!("缓存命中: query={}, key={}", self.name, key);
                docs
            }
            None => {
                self.counters.record_miss();
                debug!("缓存未命中: query={}, key={}", self.name, key);
                let docs = self
                    .store
                    .find(
                        descriptor.model(),
                        &filter,
                        &descriptor.find_options(0, descriptor.cache_count()),
                    )
                    .await?;
                // 唯一查询的空结果不缓存：插入不会使唯一查询失效
                if !docs.is_empty() || !descriptor.is_unique() {
                    self.write_cached(&key, &docs).await;
                }
                docs
            }
        };

        let result = match &options.filter {
            Some(keep) => result.into_iter().filter(|doc| keep(doc)).collect(),
            None => result,
        };
        Ok(skip_and_limit(result, options.skip, options.limit))
    }

    /// 执行查询并返回第一个文档
    pub async fn exec_one(&self, options: &ExecOptions) -> QueryCacheResult<Option<Document>> {
        let options = options.clone().with_limit(1);
        Ok(self.exec(&options).await?.into_iter().next())
    }

    /// 执行查询并把结果反序列化为指定类型
    pub async fn exec_as<T: DeserializeOwned>(&self, options: &ExecOptions) -> QueryCacheResult<Vec<T>> {
        self.exec(options)
            .await?
            .into_iter()
            .map(|doc| DataValue::Object(doc).deserialize_to::<T>())
            .collect()
    }

    /// 执行查询并返回总数
    pub async fn exec_with_count(
        &self,
        options: &ExecOptions,
    ) -> QueryCacheResult<(Vec<Document>, u64)> {
        self.validate(options)?;
        if self.descriptor.cache_count().is_none() {
            let full_options = ExecOptions {
                skip: 0,
                limit: None,
                ..options.clone()
            };
            // 客户端过滤已作用于完整结果
            let full = self.exec(&full_options).await?;
            let total = full.len() as u64;
            return Ok((skip_and_limit(full, options.skip, options.limit), total));
        }
        futures::try_join!(self.exec(options), self.count(options))
    }

    /// 统计匹配的文档数
    pub async fn count(&self, options: &ExecOptions) -> QueryCacheResult<u64> {
        self.validate(options)?;
        let full_options = ExecOptions {
            skip: 0,
            limit: None,
            ..options.clone()
        };
        if options.filter.is_some() {
            return Ok(self.exec(&full_options).await?.len() as u64);
        }

        let descriptor = &self.descriptor;
        let key = descriptor.cache_key(&options.params)?;
        if !options.skip_cache {
            match self.cache.hget(&key, FIELD_COUNT).await {
                Ok(Some(raw)) => match raw.parse::<u64>() {
                    Ok(count) => {
                        self.counters.record_hit();
                        debug!("计数缓存命中: query={}, key={}", self.name, key);
                        return Ok(count);
                    }
                    Err(_) => warn!("缓存计数格式错误，按未命中处理: key={}", key),
                },
                Ok(None) => {}
                Err(e) => warn!("读取缓存计数失败，按未命中处理: key={}, 错误: {}", key, e),
            }
        }

        if descriptor.cache_count().is_none() {
            // 完整结果会连同计数一起写入缓存
            return Ok(self.exec(&full_options).await?.len() as u64);
        }

        self.counters.record_miss();
        let filter = descriptor.filter().resolve(&options.params)?;
        let mut count = self.store.count(descriptor.model(), &filter).await?;
        if descriptor.is_unique() {
            count = count.min(1);
        }
        if let Err(e) = self
            .cache
            .hset_if_exists(&key, FIELD_COUNT, &count.to_string())
            .await
        {
            warn!("写入缓存计数失败，已忽略: key={}, 错误: {}", key, e);
        }
        Ok(count)
    }
}

impl std::fmt::Debug for CachedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedQuery")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("expiry_secs", &self.expiry_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn test_skip_and_limit() {
        let docs: Vec<Document> = (0..5).map(|i| document! { "i" => i }).collect();
        assert_eq!(skip_and_limit(docs.clone(), 0, None).len(), 5);
        assert_eq!(skip_and_limit(docs.clone(), 3, None).len(), 2);
        let window = skip_and_limit(docs.clone(), 1, Some(2));
        assert_eq!(window, vec![document! { "i" => 1 }, document! { "i" => 2 }]);
        assert!(skip_and_limit(docs, 10, Some(2)).is_empty());
    }

    #[test]
    fn test_collect_populated_ids_at_every_level() {
        let docs = vec![
            document! {
                "_id" => "a1",
                "driver" => document! {
                    "_id" => "d1",
                    "team" => document! { "_id" => "t1" },
                },
            },
            document! { "_id" => "a2", "driver" => DataValue::Null },
            document! {
                "_id" => "a3",
                "driver" => document! { "_id" => "d1", "team" => document! { "_id" => "t2" } },
            },
        ];
        let populations = vec![Population::new("driver", "Driver").populate(Population::new("team", "Team"))];
        assert_eq!(collect_populated_ids(&docs, &populations), vec!["d1", "t1", "t2"]);
    }
}
