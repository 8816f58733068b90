//! 文档存储适配器模块
//!
//! 提供统一的文档存储操作接口，屏蔽不同存储的实现差异。
//! 写操作通过 [`ChangeTrackingStore`] 包装后才会触发缓存失效

use crate::error::QueryCacheResult;
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, UpdateOptions};
use crate::types::update_operations::UpdateDocument;
use async_trait::async_trait;

mod memory;
#[cfg(feature = "mongodb-support")]
mod mongodb;
mod populate;
mod tracked;

pub use memory::{MemoryDocumentStore, apply_projection};
#[cfg(feature = "mongodb-support")]
pub use mongodb::MongoDocumentStore;
pub use populate::populate_documents;
pub use tracked::{ChangeEffectReceiver, ChangeTrackingStore};

/// 更新结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// 匹配的文档数
    pub matched: u64,
    /// upsert 插入的文档ID
    pub upserted_id: Option<DataValue>,
}

/// 文档存储trait，定义统一的文档操作接口
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 查找文档（投影、排序、跳过、限制、引用填充）
    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> QueryCacheResult<Vec<Document>>;

    /// 统计匹配的文档数
    async fn count(&self, model: &str, filter: &Document) -> QueryCacheResult<u64>;

    /// 插入多个文档，缺少 `_id` 的文档会生成 ObjectId，返回插入的ID
    async fn insert_many(
        &self,
        model: &str,
        docs: Vec<Document>,
    ) -> QueryCacheResult<Vec<DataValue>>;

    /// 插入单个文档
    async fn insert_one(&self, model: &str, doc: Document) -> QueryCacheResult<DataValue> {
        let mut ids = self.insert_many(model, vec![doc]).await?;
        ids.pop()
            .ok_or_else(|| crate::quick_error!(store, format!("集合 {} 插入后没有返回ID", model)))
    }

    /// 按过滤器更新文档
    async fn update(
        &self,
        model: &str,
        filter: &Document,
        update: &UpdateDocument,
        options: UpdateOptions,
    ) -> QueryCacheResult<UpdateResult>;

    /// 用整体文档替换第一个匹配的文档，保留原 `_id`
    ///
    /// 没有匹配且 `upsert` 为 true 时插入替换文档
    async fn replace_one(
        &self,
        model: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> QueryCacheResult<UpdateResult>;

    /// 按过滤器删除文档，`multi` 为 false 时只删除第一个，返回删除数量
    async fn delete(&self, model: &str, filter: &Document, multi: bool) -> QueryCacheResult<u64>;
}

/// 确保文档有 `_id`，返回ID
pub(crate) fn ensure_id(doc: &mut Document) -> DataValue {
    doc.entry("_id".to_string())
        .or_insert_with(|| DataValue::ObjectId(crate::types::id_types::ObjectId::new()))
        .clone()
}
