//! MongoDB工具函数模块
//!
//! BSON 与 [`DataValue`] 之间的转换

use crate::error::QueryCacheResult;
use crate::types::data_value::{DataValue, Document};
use crate::types::id_types::ObjectId;
use crate::types::query::SortConfig;
use mongodb::bson::{self, Bson};

/// 将DataValue转换为BSON值
pub(crate) fn data_value_to_bson(value: &DataValue) -> QueryCacheResult<Bson> {
    let bson = match value {
        DataValue::Null => Bson::Null,
        DataValue::Bool(b) => Bson::Boolean(*b),
        DataValue::Int(i) => Bson::Int64(*i),
        DataValue::Float(f) => Bson::Double(*f),
        DataValue::String(s) => Bson::String(s.clone()),
        DataValue::ObjectId(oid) => Bson::ObjectId(bson::oid::ObjectId::from_bytes(oid.bytes())),
        DataValue::DateTime(dt) => Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())),
        DataValue::Timestamp { time, increment } => Bson::Timestamp(bson::Timestamp {
            time: *time,
            increment: *increment,
        }),
        DataValue::Array(items) => Bson::Array(
            items
                .iter()
                .map(data_value_to_bson)
                .collect::<QueryCacheResult<Vec<_>>>()?,
        ),
        DataValue::Object(doc) => Bson::Document(document_to_bson(doc)?),
        DataValue::Param(token) => {
            return Err(crate::quick_error!(
                config,
                format!("参数占位符 {} 不能发送到文档存储", token)
            ));
        }
    };
    Ok(bson)
}

/// 将Document转换为BSON文档
pub(crate) fn document_to_bson(doc: &Document) -> QueryCacheResult<bson::Document> {
    let mut result = bson::Document::new();
    for (key, value) in doc {
        result.insert(key.clone(), data_value_to_bson(value)?);
    }
    Ok(result)
}

/// 将BSON值转换为DataValue
pub(crate) fn bson_to_data_value(value: &Bson) -> DataValue {
    match value {
        Bson::Null | Bson::Undefined => DataValue::Null,
        Bson::Boolean(b) => DataValue::Bool(*b),
        Bson::Int32(i) => DataValue::Int(*i as i64),
        Bson::Int64(i) => DataValue::Int(*i),
        Bson::Double(d) => DataValue::Float(*d),
        Bson::String(s) => DataValue::String(s.clone()),
        Bson::ObjectId(oid) => DataValue::ObjectId(ObjectId::from_bytes(oid.bytes())),
        Bson::DateTime(dt) => chrono::DateTime::<chrono::Utc>::from_timestamp_millis(dt.timestamp_millis())
            .map(DataValue::DateTime)
            .unwrap_or(DataValue::Null),
        Bson::Timestamp(ts) => DataValue::Timestamp {
            time: ts.time,
            increment: ts.increment,
        },
        Bson::Array(items) => DataValue::Array(items.iter().map(bson_to_data_value).collect()),
        Bson::Document(doc) => DataValue::Object(bson_to_document(doc)),
        Bson::Decimal128(decimal) => DataValue::String(decimal.to_string()),
        Bson::Symbol(symbol) => DataValue::String(symbol.clone()),
        // 其他类型按宽松扩展JSON保留
        other => DataValue::from(other.clone().into_relaxed_extjson()),
    }
}

/// 将BSON文档转换为Document
pub(crate) fn bson_to_document(doc: &bson::Document) -> Document {
    doc.iter()
        .map(|(key, value)| (key.clone(), bson_to_data_value(value)))
        .collect()
}

/// 构建排序文档
pub(crate) fn sort_to_bson(sort: &[SortConfig]) -> bson::Document {
    let mut result = bson::Document::new();
    for key in sort {
        result.insert(key.field.clone(), key.direction.as_i64());
    }
    result
}
