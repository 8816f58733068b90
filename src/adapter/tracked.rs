//! 变更跟踪存储
//!
//! 包装任意 [`DocumentStore`]，在写入前计算写操作对缓存的影响，
//! 写入成功后再把影响交给接收方。写入失败时不产生任何失效

use super::{DocumentStore, UpdateResult, ensure_id};
use crate::error::QueryCacheResult;
use crate::invalidation::ChangeEffect;
use crate::query::operators::{
    build_upserted_document, build_upserted_replacement, collect_modified_paths,
    diff_top_level_paths, map_before_and_after, parse_query_update, replace_document,
};
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, UpdateOptions};
use crate::types::update_operations::UpdateDocument;
use async_trait::async_trait;
use rat_logger::debug;
use std::sync::Arc;

/// 变更效果接收方
#[async_trait]
pub trait ChangeEffectReceiver: Send + Sync {
    async fn on_change_effect(&self, effect: ChangeEffect);
}

/// 变更跟踪存储
pub struct ChangeTrackingStore {
    inner: Arc<dyn DocumentStore>,
    receiver: Arc<dyn ChangeEffectReceiver>,
}

impl ChangeTrackingStore {
    pub fn new(inner: Arc<dyn DocumentStore>, receiver: Arc<dyn ChangeEffectReceiver>) -> Self {
        Self { inner, receiver }
    }

    /// 被包装的存储，直接写入它不会触发失效
    pub fn inner(&self) -> &Arc<dyn DocumentStore> {
        &self.inner
    }

    /// 使用原始更新文档（`{"$set": {...}}` 形式）更新
    pub async fn update_raw(
        &self,
        model: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> QueryCacheResult<UpdateResult> {
        let parsed = parse_query_update(update)?;
        self.update(model, filter, &parsed, options).await
    }

    async fn dispatch(&self, effect: ChangeEffect) {
        self.receiver.on_change_effect(effect).await;
    }
}

#[async_trait]
impl DocumentStore for ChangeTrackingStore {
    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> QueryCacheResult<Vec<Document>> {
        self.inner.find(model, filter, options).await
    }

    async fn count(&self, model: &str, filter: &Document) -> QueryCacheResult<u64> {
        self.inner.count(model, filter).await
    }

    async fn insert_many(
        &self,
        model: &str,
        mut docs: Vec<Document>,
    ) -> QueryCacheResult<Vec<DataValue>> {
        // 先分配ID，失效时需要完整的文档
        for doc in docs.iter_mut() {
            ensure_id(doc);
        }
        let ids = self.inner.insert_many(model, docs.clone()).await?;
        debug!("跟踪插入: model={}, 数量={}", model, ids.len());
        self.dispatch(ChangeEffect::Insert {
            model: model.to_string(),
            docs,
        })
        .await;
        Ok(ids)
    }

    async fn update(
        &self,
        model: &str,
        filter: &Document,
        update: &UpdateDocument,
        options: UpdateOptions,
    ) -> QueryCacheResult<UpdateResult> {
        let mut find_options = FindOptions::new();
        if !options.multi {
            find_options = find_options.with_limit(1);
        }
        let before = self.inner.find(model, filter, &find_options).await?;
        let pairs = map_before_and_after(&before, update)?;
        let modified_paths = collect_modified_paths(update);
        let upserted = if before.is_empty() && options.upsert {
            Some(build_upserted_document(filter, update)?)
        } else {
            None
        };

        let result = self.inner.update(model, filter, update, options).await?;
        debug!(
            "跟踪更新: model={}, 匹配={}, upsert={}",
            model,
            result.matched,
            result.upserted_id.is_some()
        );

        match (upserted, &result.upserted_id) {
            (Some(mut doc), Some(id)) => {
                doc.insert("_id".to_string(), id.clone());
                self.dispatch(ChangeEffect::Insert {
                    model: model.to_string(),
                    docs: vec![doc],
                })
                .await;
            }
            _ if !pairs.is_empty() => {
                self.dispatch(ChangeEffect::Update {
                    model: model.to_string(),
                    modified_paths,
                    pairs,
                })
                .await;
            }
            _ => {}
        }
        Ok(result)
    }

    async fn replace_one(
        &self,
        model: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> QueryCacheResult<UpdateResult> {
        let before = self
            .inner
            .find(model, filter, &FindOptions::new().with_limit(1))
            .await?
            .into_iter()
            .next();
        let change = match &before {
            Some(before) => {
                let after = replace_document(before, &replacement)?;
                let modified_paths = diff_top_level_paths(before, &after);
                Some((modified_paths, vec![(before.clone(), after)]))
            }
            None => None,
        };
        let upserted = if before.is_none() && upsert {
            Some(build_upserted_replacement(filter, &replacement))
        } else {
            None
        };

        let result = self.inner.replace_one(model, filter, replacement, upsert).await?;
        debug!(
            "跟踪替换: model={}, 匹配={}, upsert={}",
            model,
            result.matched,
            result.upserted_id.is_some()
        );

        match (upserted, &result.upserted_id, change) {
            (Some(mut doc), Some(id), _) => {
                doc.insert("_id".to_string(), id.clone());
                self.dispatch(ChangeEffect::Insert {
                    model: model.to_string(),
                    docs: vec![doc],
                })
                .await;
            }
            (_, _, Some((modified_paths, pairs))) if !modified_paths.is_empty() => {
                self.dispatch(ChangeEffect::Update {
                    model: model.to_string(),
                    modified_paths,
                    pairs,
                })
                .await;
            }
            _ => {}
        }
        Ok(result)
    }

    async fn delete(&self, model: &str, filter: &Document, multi: bool) -> QueryCacheResult<u64> {
        let mut projection = Document::new();
        projection.insert("_id".to_string(), DataValue::Int(1));
        let mut find_options = FindOptions::new().with_projection(projection);
        if !multi {
            find_options = find_options.with_limit(1);
        }
        let ids: Vec<DataValue> = self
            .inner
            .find(model, filter, &find_options)
            .await?
            .into_iter()
            .filter_map(|mut doc| doc.remove("_id"))
            .collect();

        let deleted = self.inner.delete(model, filter, multi).await?;
        debug!("跟踪删除: model={}, 删除={}", model, deleted);
        if !ids.is_empty() {
            self.dispatch(ChangeEffect::Remove { ids }).await;
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for ChangeTrackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTrackingStore").finish_non_exhaustive()
    }
}
