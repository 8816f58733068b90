//! 写入驱动的缓存失效
//!
//! 变更效果按集合名称路由到相关描述符：
//! - 插入：按静态匹配器过滤，能还原参数时只删除对应的键，否则删除描述符的全部条目
//! - 更新：比较写入前后的匹配状态和修改路径，填充文档的变化通过 `P:<id>` 集合定位
//! - 删除：删除依赖被删文档的全部条目

use crate::adapter::ChangeEffectReceiver;
use crate::cache::keys::{id_to_string, owned_key, populated_key};
use crate::cache::stats::CacheCounters;
use crate::cache::store::{CacheStore, InvalidationOp};
use crate::query::classify::Selection;
use crate::query::descriptor::QueryDescriptor;
use crate::query::path::{crosses_array, get_path, paths_overlap};
use crate::registry::QueryRegistry;
use crate::rehydration::RehydrationHandler;
use crate::types::data_value::{DataValue, Document};
use async_trait::async_trait;
use crossbeam_queue::SegQueue;
use rat_logger::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// 写操作对缓存的影响
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEffect {
    Insert {
        model: String,
        docs: Vec<Document>,
    },
    Update {
        model: String,
        modified_paths: Vec<String>,
        /// (写入前, 写入后)
        pairs: Vec<(Document, Document)>,
    },
    Remove {
        ids: Vec<DataValue>,
    },
}

/// 填充子树中目标为某个集合的节点
#[derive(Debug, Clone)]
struct PopulatedEntry {
    descriptor: Arc<QueryDescriptor>,
    select: Selection,
}

/// 失效索引：集合名称到描述符
#[derive(Debug, Default)]
pub struct InvalidationIndex {
    primary: HashMap<String, Vec<Arc<QueryDescriptor>>>,
    populated: HashMap<String, Vec<PopulatedEntry>>,
}

impl InvalidationIndex {
    pub fn build(registry: &QueryRegistry) -> Self {
        let mut index = Self::default();
        for query in registry.iter() {
            let descriptor = query.descriptor();
            index
                .primary
                .entry(descriptor.model().to_string())
                .or_default()
                .push(descriptor.clone());
            for node in &descriptor.classification().populated {
                index
                    .populated
                    .entry(node.model.clone())
                    .or_default()
                    .push(PopulatedEntry {
                        descriptor: descriptor.clone(),
                        select: node.select.clone(),
                    });
            }
        }
        index
    }

    /// 被索引的集合数量
    pub fn model_count(&self) -> usize {
        let mut models: Vec<&String> = self.primary.keys().chain(self.populated.keys()).collect();
        models.sort();
        models.dedup();
        models.len()
    }

    fn primary(&self, model: &str) -> &[Arc<QueryDescriptor>] {
        self.primary.get(model).map(Vec::as_slice).unwrap_or_default()
    }

    fn populated(&self, model: &str) -> &[PopulatedEntry] {
        self.populated.get(model).map(Vec::as_slice).unwrap_or_default()
    }
}

/// 根据文档还原缓存键；参数值为数组时无法确定具体的键
fn construct_invalidation(descriptor: &QueryDescriptor, docs: &[&Document]) -> Vec<InvalidationOp> {
    let info = &descriptor.classification().query;
    let all = || {
        vec![InvalidationOp::DeleteQueriesIn {
            set_key: descriptor.all_key(),
            hash: None,
        }]
    };
    if info.complex_query {
        return all();
    }

    let mut ops = Vec::with_capacity(docs.len());
    for doc in docs {
        // 跨数组的点分路径对应多个值，同样无法确定具体的键
        if info.dynamic_keys.iter().any(|key| crosses_array(doc, key)) {
            return all();
        }
        let params: Vec<DataValue> = info
            .dynamic_keys
            .iter()
            .map(|key| get_path(doc, key).cloned().unwrap_or(DataValue::Null))
            .collect();
        // 标量参数可以通过数组成员关系匹配，数组字段对应多个键
        if params.iter().any(|p| matches!(p, DataValue::Array(_))) {
            return all();
        }
        match descriptor.cache_key(&params) {
            Ok(key) => {
                let op = InvalidationOp::DeleteQuery(key);
                if !ops.contains(&op) {
                    ops.push(op);
                }
            }
            Err(e) => {
                warn!("无法还原缓存键，改为删除全部条目: {}", e);
                return all();
            }
        }
    }
    ops
}

fn insert_invalidation(descriptor: &QueryDescriptor, doc: &Document) -> Vec<InvalidationOp> {
    // 唯一查询不受新文档影响
    if descriptor.is_unique() || !descriptor.invalidate_on_insert() {
        return Vec::new();
    }
    if !descriptor.classification().query.matcher.matches(doc) {
        return Vec::new();
    }
    construct_invalidation(descriptor, &[doc])
}

fn update_invalidation(
    descriptor: &QueryDescriptor,
    modified: &[String],
    before: &Document,
    after: &Document,
) -> Vec<InvalidationOp> {
    let info = descriptor.classification();
    let was_match = info.query.matcher.matches(before);
    let now_match = info.query.matcher.matches(after);
    match (was_match, now_match) {
        (true, true) => {
            let dynamic_modified = info
                .query
                .dynamic_keys
                .iter()
                .any(|key| modified.iter().any(|m| paths_overlap(m, key)));
            if dynamic_modified || info.sort.was_modified(modified) || info.select.was_modified(modified) {
                construct_invalidation(descriptor, &[before, after])
            } else {
                Vec::new()
            }
        }
        (false, true) => construct_invalidation(descriptor, &[after]),
        (true, false) => construct_invalidation(descriptor, &[before]),
        (false, false) => Vec::new(),
    }
}

/// 失效处理器
pub struct InvalidationHandler {
    cache: Arc<dyn CacheStore>,
    index: InvalidationIndex,
    rehydrator: Arc<RehydrationHandler>,
    auto_rehydrate: bool,
    counters: Arc<CacheCounters>,
    /// 等待手动重新填充的键
    pending: SegQueue<String>,
}

impl InvalidationHandler {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        registry: &QueryRegistry,
        rehydrator: Arc<RehydrationHandler>,
        auto_rehydrate: bool,
        counters: Arc<CacheCounters>,
    ) -> Self {
        Self {
            cache,
            index: InvalidationIndex::build(registry),
            rehydrator,
            auto_rehydrate,
            counters,
            pending: SegQueue::new(),
        }
    }

    pub fn index(&self) -> &InvalidationIndex {
        &self.index
    }

    /// 取出所有等待重新填充的键
    pub fn drain_evicted(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.pending.len());
        while let Some(key) = self.pending.pop() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// 计算变更效果需要的失效操作
    pub async fn collect_invalidations(&self, effect: &ChangeEffect) -> Vec<InvalidationOp> {
        let mut ops = Vec::new();
        let mut push_all = |new_ops: Vec<InvalidationOp>| {
            for op in new_ops {
                if !ops.contains(&op) {
                    ops.push(op);
                }
            }
        };

        match effect {
            ChangeEffect::Insert { model, docs } => {
                for descriptor in self.index.primary(model) {
                    for doc in docs {
                        push_all(insert_invalidation(descriptor, doc));
                    }
                }
            }
            ChangeEffect::Update {
                model,
                modified_paths,
                pairs,
            } => {
                for descriptor in self.index.primary(model) {
                    for (before, after) in pairs {
                        push_all(update_invalidation(descriptor, modified_paths, before, after));
                    }
                }
                for entry in self.index.populated(model) {
                    if !entry.select.was_modified(modified_paths) {
                        continue;
                    }
                    for (_, after) in pairs {
                        if let Some(id) = after.get("_id") {
                            push_all(vec![InvalidationOp::DeleteQueriesIn {
                                set_key: populated_key(&id_to_string(id)),
                                hash: Some(entry.descriptor.hash().to_string()),
                            }]);
                        }
                    }
                }
            }
            ChangeEffect::Remove { ids } => {
                let sets: Vec<String> = ids
                    .iter()
                    .map(id_to_string)
                    .flat_map(|id| [owned_key(&id), populated_key(&id)])
                    .collect();
                match self.cache.sunion(&sets).await {
                    Ok(keys) => push_all(keys.into_iter().map(InvalidationOp::DeleteQuery).collect()),
                    Err(e) => warn!("读取依赖集合失败，跳过删除失效: {}", e),
                }
            }
        }
        ops
    }

    /// 执行失效并处理被驱逐的键，返回真正被删除的键
    pub async fn invalidate(&self, ops: &[InvalidationOp]) -> Vec<String> {
        if ops.is_empty() {
            return Vec::new();
        }
        let evicted = self.cache.exec_batch(ops).await;
        debug!("缓存失效: 操作数={}, 驱逐键数={}", ops.len(), evicted.len());
        if evicted.is_empty() {
            return evicted;
        }
        self.counters.record_evictions(evicted.len());

        if self.auto_rehydrate {
            self.rehydrator.rehydrate(&evicted).await;
        } else {
            for key in &evicted {
                self.pending.push(key.clone());
            }
        }
        evicted
    }

    /// 处理一个变更效果，返回真正被删除的键
    pub async fn handle(&self, effect: &ChangeEffect) -> Vec<String> {
        let ops = self.collect_invalidations(effect).await;
        self.invalidate(&ops).await
    }
}

#[async_trait]
impl ChangeEffectReceiver for InvalidationHandler {
    async fn on_change_effect(&self, effect: ChangeEffect) {
        self.handle(&effect).await;
    }
}

impl std::fmt::Debug for InvalidationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationHandler")
            .field("index", &self.index)
            .field("auto_rehydrate", &self.auto_rehydrate)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryDocumentStore;
    use crate::cache::memory_store::MemoryCacheStore;
    use crate::cache::store::QueryEntry;
    use crate::document;
    use crate::query::cached_query::CachedQuery;
    use crate::types::query::{QueryFilter, SortConfig};

    fn by_kind() -> QueryDescriptor {
        QueryDescriptor::builder()
            .model("Vehicle")
            .filter(QueryFilter::from_fn(1, |p| document! { "kind" => p[0].clone() }))
            .select(document! { "price" => 1 })
            .sort(vec![SortConfig::desc("year")])
            .build()
            .unwrap()
    }

    fn key(descriptor: &QueryDescriptor, kind: &str) -> InvalidationOp {
        InvalidationOp::DeleteQuery(descriptor.cache_key(&[DataValue::from(kind)]).unwrap())
    }

    #[test]
    fn test_insert_targets_param_key() {
        let d = by_kind();
        let doc = document! { "_id" => 1, "kind" => "car" };
        assert_eq!(insert_invalidation(&d, &doc), vec![key(&d, "car")]);

        // 缺失的动态键按 null 还原
        let doc = document! { "_id" => 2 };
        assert_eq!(
            insert_invalidation(&d, &doc),
            vec![InvalidationOp::DeleteQuery(d.cache_key(&[DataValue::Null]).unwrap())]
        );
    }

    #[test]
    fn test_unique_descriptor_ignores_insert() {
        let d = QueryDescriptor::builder()
            .model("Vehicle")
            .filter(QueryFilter::from_fn(1, |p| document! { "_id" => p[0].clone() }))
            .unique(true)
            .build()
            .unwrap();
        assert!(insert_invalidation(&d, &document! { "_id" => 1 }).is_empty());
    }

    #[test]
    fn test_update_decisions() {
        let d = by_kind();
        let before = document! { "_id" => 1, "kind" => "car", "price" => 10, "year" => 2000 };

        let mut after = before.clone();
        after.insert("name".to_string(), DataValue::from("renamed"));
        assert!(update_invalidation(&d, &["name".to_string()], &before, &after).is_empty());

        let mut after = before.clone();
        after.insert("year".to_string(), DataValue::Int(2001));
        assert_eq!(
            update_invalidation(&d, &["year".to_string()], &before, &after),
            vec![key(&d, "car")]
        );

        let mut after = before.clone();
        after.insert("kind".to_string(), DataValue::from("van"));
        assert_eq!(
            update_invalidation(&d, &["kind".to_string()], &before, &after),
            vec![key(&d, "car"), key(&d, "van")]
        );
    }

    #[test]
    fn test_static_filter_transitions() {
        let d = QueryDescriptor::builder()
            .model("Vehicle")
            .filter(document! { "kind" => "car" })
            .build()
            .unwrap();
        let car = document! { "_id" => 1, "kind" => "car" };
        let van = document! { "_id" => 1, "kind" => "van" };
        let modified = vec!["kind".to_string()];
        let static_key = InvalidationOp::DeleteQuery(d.cache_key(&[]).unwrap());

        assert_eq!(update_invalidation(&d, &modified, &car, &van), vec![static_key.clone()]);
        assert_eq!(update_invalidation(&d, &modified, &van, &car), vec![static_key]);
        assert!(update_invalidation(&d, &modified, &van, &van).is_empty());
    }

    #[test]
    fn test_evicted_keys_wait_for_manual_rehydrate() {
        tokio_test::block_on(async {
            let cache = Arc::new(MemoryCacheStore::new());
            let counters = Arc::new(CacheCounters::new());
            let descriptor = Arc::new(by_kind());
            let query = Arc::new(CachedQuery::new(
                "byKind",
                descriptor.clone(),
                cache.clone(),
                Arc::new(MemoryDocumentStore::new()),
                counters.clone(),
                3600,
            ));
            let registry = Arc::new(QueryRegistry::new(vec![query]));
            let rehydrator = Arc::new(RehydrationHandler::new(registry.clone(), counters.clone()));
            let handler = InvalidationHandler::new(cache.clone(), &registry, rehydrator, false, counters.clone());

            let cache_key = descriptor.cache_key(&[DataValue::from("car")]).unwrap();
            cache
                .write_query_entry(&QueryEntry {
                    key: cache_key.clone(),
                    hash: descriptor.hash().to_string(),
                    value: "[]".to_string(),
                    owned_ids: Vec::new(),
                    populated_ids: Vec::new(),
                    count: Some(0),
                    expiry_secs: 60,
                })
                .await
                .unwrap();

            let effect = ChangeEffect::Insert {
                model: "Vehicle".to_string(),
                docs: vec![document! { "_id" => 7, "kind" => "car" }],
            };
            assert_eq!(handler.handle(&effect).await, vec![cache_key.clone()]);
            // 第二次失效时键已不存在
            assert!(handler.handle(&effect).await.is_empty());

            assert_eq!(handler.drain_evicted(), vec![cache_key]);
            assert!(handler.drain_evicted().is_empty());
            assert_eq!(counters.snapshot().evictions, 1);
        });
    }
}
