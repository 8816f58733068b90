//! 进程内文档存储
//!
//! 按插入顺序保存每个集合的文档，查询语义与 [`Matcher`] 一致

use super::{DocumentStore, UpdateResult, ensure_id, populate_documents};
use crate::cache::keys::id_to_string;
use crate::error::QueryCacheResult;
use crate::query::matcher::Matcher;
use crate::query::operators::{
    apply_updates, build_upserted_document, build_upserted_replacement, replace_document,
};
use crate::query::path::{get_path, set_path, unset_path};
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, SortConfig, SortDirection, UpdateOptions};
use crate::types::update_operations::UpdateDocument;
use async_trait::async_trait;
use dashmap::DashMap;
use rat_logger::debug;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// 进程内文档存储
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, Vec<Document>>,
    reads: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入初始数据，不经过变更跟踪
    pub fn seed(&self, model: &str, docs: Vec<Document>) {
        let mut collection = self.collections.entry(model.to_string()).or_default();
        for mut doc in docs {
            ensure_id(&mut doc);
            collection.push(doc);
        }
    }

    /// 集合当前的全部文档
    pub fn snapshot(&self, model: &str) -> Vec<Document> {
        self.collections
            .get(model)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    /// 已执行的读操作次数（find 与 count）
    pub fn read_count(&self) -> u64 {
        self.reads.load(AtomicOrdering::Relaxed)
    }

    fn matching(&self, model: &str, matcher: &Matcher) -> Vec<Document> {
        self.collections
            .get(model)
            .map(|c| c.iter().filter(|d| matcher.matches(d)).cloned().collect())
            .unwrap_or_default()
    }
}

fn sort_documents(docs: &mut [Document], sort: &[SortConfig]) {
    if sort.is_empty() {
        return;
    }
    let null = DataValue::Null;
    docs.sort_by(|a, b| {
        for key in sort {
            let left = get_path(a, &key.field).unwrap_or(&null);
            let right = get_path(b, &key.field).unwrap_or(&null);
            let ordering = match key.direction {
                SortDirection::Asc => left.sort_cmp(right),
                SortDirection::Desc => right.sort_cmp(left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn is_truthy(value: &DataValue) -> bool {
    match value {
        DataValue::Bool(b) => *b,
        DataValue::Int(i) => *i != 0,
        DataValue::Float(f) => *f != 0.0,
        _ => true,
    }
}

/// 对文档应用投影
///
/// 包含模式保留 `_id`（除非显式排除）和选中路径；排除模式删除选中路径
pub fn apply_projection(doc: &Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(path, value)| path != "_id" && is_truthy(value));
    if projection.is_empty() {
        return doc.clone();
    }
    if !inclusive {
        let mut projected = doc.clone();
        for path in projection.keys() {
            unset_path(&mut projected, path);
        }
        return projected;
    }

    let mut projected = Document::new();
    let keep_id = projection.get("_id").is_none_or(is_truthy);
    if keep_id {
        if let Some(id) = doc.get("_id") {
            projected.insert("_id".to_string(), id.clone());
        }
    }
    for (path, value) in projection {
        if path == "_id" || !is_truthy(value) {
            continue;
        }
        if let Some(found) = get_path(doc, path) {
            // 路径已由上级对象完整保留时跳过
            let _ = set_path(&mut projected, path, found.clone());
        }
    }
    projected
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> QueryCacheResult<Vec<Document>> {
        let matcher = Matcher::compile(filter)?;
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);

        let mut docs = self.matching(model, &matcher);
        sort_documents(&mut docs, &options.sort);
        let skip = options.skip as usize;
        let mut docs: Vec<Document> = match options.limit {
            Some(limit) => docs.into_iter().skip(skip).take(limit as usize).collect(),
            None => docs.into_iter().skip(skip).collect(),
        };

        let mut projection = options.projection.clone();
        if !options.populate.is_empty() && projection.iter().any(|(p, v)| p != "_id" && is_truthy(v)) {
            for node in &options.populate {
                projection.insert(node.path.clone(), DataValue::Int(1));
            }
        }
        populate_documents(self, &mut docs, &options.populate).await?;

        debug!("内存文档存储查询: 集合={}, 结果数量={}", model, docs.len());
        Ok(docs.iter().map(|d| apply_projection(d, &projection)).collect())
    }

    async fn count(&self, model: &str, filter: &Document) -> QueryCacheResult<u64> {
        let matcher = Matcher::compile(filter)?;
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(self
            .collections
            .get(model)
            .map(|c| c.iter().filter(|d| matcher.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_many(
        &self,
        model: &str,
        docs: Vec<Document>,
    ) -> QueryCacheResult<Vec<DataValue>> {
        let mut collection = self.collections.entry(model.to_string()).or_default();
        let mut prepared = Vec::with_capacity(docs.len());
        let mut ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = ensure_id(&mut doc);
            let duplicate = collection
                .iter()
                .chain(prepared.iter())
                .any(|existing: &Document| existing.get("_id") == Some(&id));
            if duplicate {
                return Err(crate::quick_error!(
                    store,
                    format!("集合 {} 中已存在 _id 为 {} 的文档", model, id_to_string(&id))
                ));
            }
            ids.push(id);
            prepared.push(doc);
        }
        collection.extend(prepared);
        debug!("内存文档存储插入: 集合={}, 数量={}", model, ids.len());
        Ok(ids)
    }

    async fn update(
        &self,
        model: &str,
        filter: &Document,
        update: &UpdateDocument,
        options: UpdateOptions,
    ) -> QueryCacheResult<UpdateResult> {
        let matcher = Matcher::compile(filter)?;
        let mut collection = self.collections.entry(model.to_string()).or_default();
        let mut result = UpdateResult::default();

        for doc in collection.iter_mut() {
            if !matcher.matches(doc) {
                continue;
            }
            let mut updated = doc.clone();
            apply_updates(std::slice::from_mut(&mut updated), update)
                .map_err(|e| crate::quick_error!(store, e))?;
            *doc = updated;
            result.matched += 1;
            if !options.multi {
                break;
            }
        }

        if result.matched == 0 && options.upsert {
            let mut doc = build_upserted_document(filter, update)
                .map_err(|e| crate::quick_error!(store, e))?;
            result.upserted_id = Some(ensure_id(&mut doc));
            collection.push(doc);
        }
        debug!("内存文档存储更新: 集合={}, 匹配={}", model, result.matched);
        Ok(result)
    }

    async fn replace_one(
        &self,
        model: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> QueryCacheResult<UpdateResult> {
        let matcher = Matcher::compile(filter)?;
        let mut collection = self.collections.entry(model.to_string()).or_default();
        let mut result = UpdateResult::default();

        if let Some(doc) = collection.iter_mut().find(|d| matcher.matches(d)) {
            *doc = replace_document(doc, &replacement).map_err(|e| crate::quick_error!(store, e))?;
            result.matched = 1;
        } else if upsert {
            let mut doc = build_upserted_replacement(filter, &replacement);
            let id = ensure_id(&mut doc);
            if collection.iter().any(|existing| existing.get("_id") == Some(&id)) {
                return Err(crate::quick_error!(
                    store,
                    format!("集合 {} 中已存在 _id 为 {} 的文档", model, id_to_string(&id))
                ));
            }
            result.upserted_id = Some(id);
            collection.push(doc);
        }
        debug!("内存文档存储替换: 集合={}, 匹配={}", model, result.matched);
        Ok(result)
    }

    async fn delete(&self, model: &str, filter: &Document, multi: bool) -> QueryCacheResult<u64> {
        let matcher = Matcher::compile(filter)?;
        let Some(mut collection) = self.collections.get_mut(model) else {
            return Ok(0);
        };
        let mut deleted = 0u64;
        collection.retain(|doc| {
            if (multi || deleted == 0) && matcher.matches(doc) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        debug!("内存文档存储删除: 集合={}, 数量={}", model, deleted);
        Ok(deleted)
    }
}
