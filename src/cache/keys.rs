//! 缓存键编码
//!
//! - 查询结果：`Q:<16位哈希><扩展JSON参数数组>`
//! - 描述符全部条目集合：`A:<哈希>`
//! - 文档依赖集合：`O:<文档ID>`（结果自身的文档）、`P:<文档ID>`（填充的文档）
//! - 缓存值：`v:<名称><扩展JSON参数数组>`

use crate::error::QueryCacheResult;
use crate::types::data_value::DataValue;

/// 结果条目字段：序列化后的结果
pub const FIELD_VALUE: &str = "V";
/// 结果条目字段：结果文档ID（空格分隔）
pub const FIELD_OWNED: &str = "O";
/// 结果条目字段：填充文档ID（空格分隔）
pub const FIELD_POPULATED: &str = "P";
/// 结果条目字段：计数
pub const FIELD_COUNT: &str = "N";

/// 描述符哈希长度
pub const HASH_LEN: usize = 16;

pub fn query_key(hash: &str, params: &[DataValue]) -> String {
    let encoded = DataValue::Array(params.to_vec()).to_json_string();
    format!("Q:{}{}", hash, encoded)
}

pub fn value_key(name: &str, params: &[DataValue]) -> String {
    let encoded = DataValue::Array(params.to_vec()).to_json_string();
    format!("v:{}{}", name, encoded)
}

pub fn all_key(hash: &str) -> String {
    format!("A:{}", hash)
}

pub fn owned_key(id: &str) -> String {
    format!("O:{}", id)
}

pub fn populated_key(id: &str) -> String {
    format!("P:{}", id)
}

/// 查询键中的描述符哈希
pub fn hash_of_query_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("Q:")?;
    rest.get(..HASH_LEN)
}

/// 解析后的查询键
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQueryKey {
    pub hash: String,
    pub params: Vec<DataValue>,
}

/// 从查询键还原描述符哈希与参数
pub fn parse_query_key(key: &str) -> QueryCacheResult<ParsedQueryKey> {
    let invalid = || crate::quick_error!(invalid_key, key);
    let hash = hash_of_query_key(key).ok_or_else(invalid)?;
    let encoded = &key[2 + HASH_LEN..];
    if !encoded.starts_with('[') || !encoded.ends_with(']') {
        return Err(invalid());
    }
    match DataValue::from_json_string(encoded) {
        Ok(DataValue::Array(params)) => Ok(ParsedQueryKey {
            hash: hash.to_string(),
            params,
        }),
        _ => Err(invalid()),
    }
}

/// 文档ID的字符串形式，用于依赖集合键
pub fn id_to_string(id: &DataValue) -> String {
    match id {
        DataValue::ObjectId(oid) => oid.to_hex(),
        DataValue::String(s) => s.clone(),
        other => other.to_json_string(),
    }
}
