//! MongoDB文档存储

use super::utils::{bson_to_data_value, bson_to_document, document_to_bson, sort_to_bson};
use crate::adapter::{DocumentStore, UpdateResult, ensure_id, populate_documents};
use crate::error::QueryCacheResult;
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, UpdateOptions};
use crate::types::update_operations::UpdateDocument;
use async_trait::async_trait;
use mongodb::bson;
use mongodb::{Collection, Database};
use rat_logger::debug;

/// MongoDB文档存储
#[derive(Debug, Clone)]
pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 通过连接URI连接到指定数据库
    pub async fn connect(uri: &str, database: &str) -> QueryCacheResult<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB连接失败: {}", e)))?;
        Ok(Self::new(client.database(database)))
    }

    fn collection(&self, model: &str) -> Collection<bson::Document> {
        self.db.collection::<bson::Document>(model)
    }
}

/// 包含模式投影需要保留填充路径
fn projection_with_populate(options: &FindOptions) -> Document {
    let mut projection = options.projection.clone();
    let inclusive = projection.iter().any(|(path, value)| {
        path != "_id" && !matches!(value, DataValue::Int(0) | DataValue::Bool(false))
    });
    if inclusive {
        for node in &options.populate {
            projection.insert(node.path.clone(), DataValue::Int(1));
        }
    }
    projection
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find(
        &self,
        model: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> QueryCacheResult<Vec<Document>> {
        let query = document_to_bson(filter)?;
        debug!("执行MongoDB查询: 集合={}, 条件={:?}", model, query);

        let mut find_options = mongodb::options::FindOptions::default();
        let projection = projection_with_populate(options);
        if !projection.is_empty() {
            find_options.projection = Some(document_to_bson(&projection)?);
        }
        if !options.sort.is_empty() {
            find_options.sort = Some(sort_to_bson(&options.sort));
        }
        if options.skip > 0 {
            find_options.skip = Some(options.skip);
        }
        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }

        let mut cursor = self
            .collection(model)
            .find(query, find_options)
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB查询失败: {}", e)))?;

        let mut results = Vec::new();
        while cursor
            .advance()
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB游标遍历失败: {}", e)))?
        {
            let doc = cursor
                .deserialize_current()
                .map_err(|e| crate::quick_error!(store, format!("MongoDB文档反序列化失败: {}", e)))?;
            results.push(bson_to_document(&doc));
        }

        populate_documents(self, &mut results, &options.populate).await?;
        Ok(results)
    }

    async fn count(&self, model: &str, filter: &Document) -> QueryCacheResult<u64> {
        let query = document_to_bson(filter)?;
        debug!("执行MongoDB计数: 集合={}, 条件={:?}", model, query);
        self.collection(model)
            .count_documents(query, None)
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB计数失败: {}", e)))
    }

    async fn insert_many(
        &self,
        model: &str,
        docs: Vec<Document>,
    ) -> QueryCacheResult<Vec<DataValue>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::with_capacity(docs.len());
        let mut prepared = Vec::with_capacity(docs.len());
        for mut doc in docs {
            ids.push(ensure_id(&mut doc));
            prepared.push(document_to_bson(&doc)?);
        }

        debug!("执行MongoDB插入: 集合={}, 数量={}", model, prepared.len());
        self.collection(model)
            .insert_many(prepared, None)
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB插入失败: {}", e)))?;
        Ok(ids)
    }

    async fn update(
        &self,
        model: &str,
        filter: &Document,
        update: &UpdateDocument,
        options: UpdateOptions,
    ) -> QueryCacheResult<UpdateResult> {
        let query = document_to_bson(filter)?;
        let update_doc = document_to_bson(&update.to_document())?;
        let mut update_options = mongodb::options::UpdateOptions::default();
        update_options.upsert = Some(options.upsert);

        debug!("执行MongoDB更新: 集合={}, 条件={:?}, 更新={:?}", model, query, update_doc);
        let collection = self.collection(model);
        let result = (if options.multi {
            collection.update_many(query, update_doc, update_options).await
        } else {
            collection.update_one(query, update_doc, update_options).await
        })
        .map_err(|e| crate::quick_error!(store, format!("MongoDB更新失败: {}", e)))?;

        Ok(UpdateResult {
            matched: result.matched_count,
            upserted_id: result.upserted_id.as_ref().map(bson_to_data_value),
        })
    }

    async fn replace_one(
        &self,
        model: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> QueryCacheResult<UpdateResult> {
        let query = document_to_bson(filter)?;
        let replacement = document_to_bson(&replacement)?;
        let mut replace_options = mongodb::options::ReplaceOptions::default();
        replace_options.upsert = Some(upsert);

        debug!("执行MongoDB替换: 集合={}, 条件={:?}", model, query);
        let result = self
            .collection(model)
            .replace_one(query, replacement, replace_options)
            .await
            .map_err(|e| crate::quick_error!(store, format!("MongoDB替换失败: {}", e)))?;

        Ok(UpdateResult {
            matched: result.matched_count,
            upserted_id: result.upserted_id.as_ref().map(bson_to_data_value),
        })
    }

    async fn delete(&self, model: &str, filter: &Document, multi: bool) -> QueryCacheResult<u64> {
        let query = document_to_bson(filter)?;
        debug!("执行MongoDB删除: 集合={}, 条件={:?}, 多条={}", model, query, multi);
        let collection = self.collection(model);
        let result = (if multi {
            collection.delete_many(query, None).await
        } else {
            collection.delete_one(query, None).await
        })
        .map_err(|e| crate::quick_error!(store, format!("MongoDB删除失败: {}", e)))?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;
    use crate::types::query::Population;

    #[test]
    fn test_projection_keeps_populate_paths() {
        let options = FindOptions::new()
            .with_projection(document! { "name" => 1 })
            .with_populate(vec![Population::new("driver", "Driver")]);
        let projection = projection_with_populate(&options);
        assert_eq!(projection.get("driver"), Some(&DataValue::Int(1)));

        let exclusive = FindOptions::new()
            .with_projection(document! { "secret" => 0 })
            .with_populate(vec![Population::new("driver", "Driver")]);
        assert!(projection_with_populate(&exclusive).get("driver").is_none());
    }

    #[test]
    fn test_bson_round_trip_keeps_object_id() {
        let id = crate::types::id_types::ObjectId::new();
        let doc = document! { "_id" => id, "tags" => DataValue::Array(vec![DataValue::from("a")]) };
        let converted = bson_to_document(&document_to_bson(&doc).unwrap());
        assert_eq!(converted, doc);
    }
}
