//! 引用填充
//!
//! 按 [`Population`] 配置把引用字段中的 `_id`（单个或数组）替换为目标集合的文档。
//! 嵌套填充通过目标集合查询的 `populate` 选项递归完成

use super::DocumentStore;
use crate::cache::keys::id_to_string;
use crate::error::QueryCacheResult;
use crate::query::path::{get_path, get_path_mut};
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, Population};
use std::collections::HashMap;

fn is_reference(value: &DataValue) -> bool {
    !matches!(
        value,
        DataValue::Null | DataValue::Object(_) | DataValue::Array(_)
    )
}

fn collect_references(docs: &[Document], path: &str) -> Vec<DataValue> {
    let mut ids: Vec<DataValue> = Vec::new();
    let mut push = |value: &DataValue| {
        if is_reference(value) && !ids.contains(value) {
            ids.push(value.clone());
        }
    };
    for doc in docs {
        match get_path(doc, path) {
            Some(DataValue::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }
    ids
}

/// 填充一组文档
///
/// 找不到的单个引用置为 null，数组中找不到的引用被移除
pub async fn populate_documents(
    store: &dyn DocumentStore,
    docs: &mut [Document],
    populations: &[Population],
) -> QueryCacheResult<()> {
    for node in populations {
        let ids = collect_references(docs, &node.path);
        if ids.is_empty() {
            continue;
        }

        let mut filter = Document::new();
        let mut in_ids = Document::new();
        in_ids.insert("$in".to_string(), DataValue::Array(ids));
        filter.insert("_id".to_string(), DataValue::Object(in_ids));
        let options = FindOptions::new()
            .with_projection(node.select.clone())
            .with_populate(node.populate.clone());

        let found = store.find(&node.model, &filter, &options).await?;
        let by_id: HashMap<String, Document> = found
            .into_iter()
            .filter_map(|doc| doc.get("_id").map(id_to_string).map(|id| (id, doc)))
            .collect();
        let resolve = |value: &DataValue| by_id.get(&id_to_string(value)).cloned();

        for doc in docs.iter_mut() {
            let Some(slot) = get_path_mut(doc, &node.path) else {
                continue;
            };
            match slot {
                DataValue::Array(items) => {
                    let resolved: Vec<DataValue> = items
                        .iter()
                        .filter_map(|item| {
                            if is_reference(item) {
                                resolve(item).map(DataValue::Object)
                            } else {
                                Some(item.clone())
                            }
                        })
                        .collect();
                    *items = resolved;
                }
                value if is_reference(&*value) => {
                    *value = resolve(value).map(DataValue::Object).unwrap_or(DataValue::Null);
                }
                _ => {}
            }
        }
    }
    Ok(())
}
