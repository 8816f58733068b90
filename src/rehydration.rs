//! 重新填充处理器
//!
//! 对被驱逐的缓存键还原描述符和参数，跳过缓存重新执行查询，
//! 赶在下一个调用方之前把结果写回缓存

use crate::cache::keys::parse_query_key;
use crate::cache::stats::CacheCounters;
use crate::error::QueryCacheResult;
use crate::query::cached_query::ExecOptions;
use crate::registry::QueryRegistry;
use futures::future::join_all;
use rat_logger::{debug, info, warn};
use std::sync::Arc;

/// 重新填充处理器
#[derive(Debug)]
pub struct RehydrationHandler {
    registry: Arc<QueryRegistry>,
    counters: Arc<CacheCounters>,
}

impl RehydrationHandler {
    pub fn new(registry: Arc<QueryRegistry>, counters: Arc<CacheCounters>) -> Self {
        Self { registry, counters }
    }

    /// 并发重新填充一批键，返回成功重新填充的键
    ///
    /// 单个键失败只记录日志，不影响其他键
    pub async fn rehydrate(&self, keys: &[String]) -> Vec<String> {
        if keys.is_empty() {
            return Vec::new();
        }
        let results = join_all(keys.iter().map(|key| self.rehydrate_key(key))).await;

        let mut done = Vec::new();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(true) => done.push(key.clone()),
                Ok(false) => {}
                Err(e) => warn!("重新填充缓存键失败: key={}, 错误: {}", key, e),
            }
        }
        info!("重新填充完成: 请求={}, 成功={}", keys.len(), done.len());
        done
    }

    async fn rehydrate_key(&self, key: &str) -> QueryCacheResult<bool> {
        let parsed = parse_query_key(key)?;
        let Some(query) = self.registry.get_by_hash(&parsed.hash) else {
            debug!("缓存键对应的查询已不存在，跳过: {}", key);
            return Ok(false);
        };
        if !query.descriptor().rehydrate_enabled() {
            return Ok(false);
        }

        let options = ExecOptions {
            params: parsed.params,
            limit: query.descriptor().cache_count(),
            skip_cache: true,
            ..ExecOptions::default()
        };
        query.exec(&options).await?;
        self.counters.record_rehydration();
        debug!("已重新填充: query={}, key={}", query.name(), key);
        Ok(true)
    }
}
