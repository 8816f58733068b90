//! 查询注册表
//!
//! 在装配阶段由全部描述符一次性构建，之后只读。
//! 按名称供调用方查找，按哈希供重新填充阶段从缓存键还原查询

use crate::query::cached_query::CachedQuery;
use rat_logger::warn;
use std::collections::HashMap;
use std::sync::Arc;

/// 查询注册表
#[derive(Debug, Default)]
pub struct QueryRegistry {
    by_name: HashMap<String, Arc<CachedQuery>>,
    by_hash: HashMap<String, Arc<CachedQuery>>,
    /// 注册顺序
    ordered: Vec<Arc<CachedQuery>>,
}

impl QueryRegistry {
    pub fn new(queries: Vec<Arc<CachedQuery>>) -> Self {
        let mut registry = Self::default();
        for query in queries {
            let hash = query.descriptor().hash().to_string();
            if let Some(existing) = registry.by_hash.get(&hash) {
                // 配置完全相同的描述符共享缓存条目
                warn!(
                    "查询 {} 与 {} 的配置相同，共享缓存条目",
                    query.name(),
                    existing.name()
                );
            } else {
                registry.by_hash.insert(hash, query.clone());
            }
            registry.by_name.insert(query.name().to_string(), query.clone());
            registry.ordered.push(query);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CachedQuery>> {
        self.by_name.get(name)
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<&Arc<CachedQuery>> {
        self.by_hash.get(hash)
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CachedQuery>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
