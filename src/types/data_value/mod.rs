use crate::types::id_types::ObjectId;
use crate::types::query::ParamToken;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 文档类型：字段名到值的有序映射
///
/// 使用有序映射保证序列化结果稳定，缓存键与描述符哈希依赖这一点
pub type Document = BTreeMap<String, DataValue>;

/// 通用数据值类型 - 文档数据库的值表示
#[derive(Clone)]
pub enum DataValue {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 整数
    Int(i64),
    /// 浮点数
    Float(f64),
    /// 字符串
    String(String),
    /// 文档ID
    ObjectId(ObjectId),
    /// UTC日期时间
    DateTime(DateTime<Utc>),
    /// 逻辑时间戳（秒 + 自增序号）
    Timestamp { time: u32, increment: u32 },
    /// 数组
    Array(Vec<DataValue>),
    /// 对象/文档
    Object(Document),
    /// 过滤器工厂的参数占位符，只在分类阶段出现
    Param(ParamToken),
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => true,
            (DataValue::Bool(a), DataValue::Bool(b)) => a == b,
            (DataValue::String(a), DataValue::String(b)) => a == b,
            (DataValue::ObjectId(a), DataValue::ObjectId(b)) => a == b,
            (DataValue::DateTime(a), DataValue::DateTime(b)) => a == b,
            (
                DataValue::Timestamp { time: t1, increment: i1 },
                DataValue::Timestamp { time: t2, increment: i2 },
            ) => t1 == t2 && i1 == i2,
            (DataValue::Array(a), DataValue::Array(b)) => a == b,
            (DataValue::Object(a), DataValue::Object(b)) => a == b,
            (DataValue::Param(a), DataValue::Param(b)) => a.same(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) if self.is_number() && other.is_number() => a == b,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::String(s) => write!(f, "{}", s),
            DataValue::ObjectId(id) => write!(f, "{}", id),
            DataValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            DataValue::Timestamp { time, increment } => write!(f, "Timestamp({}, {})", time, increment),
            DataValue::Param(token) => write!(f, "{}", token),
            DataValue::Array(_) | DataValue::Object(_) => {
                write!(f, "{}", self.to_extended_json())
            }
        }
    }
}

impl std::fmt::Debug for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Debug 与 Display 保持一致，显示实际值而不是类型构造函数
        write!(f, "{}", self)
    }
}

impl DataValue {
    /// 获取数据类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::Bool(_) => "boolean",
            DataValue::Int(_) => "integer",
            DataValue::Float(_) => "float",
            DataValue::String(_) => "string",
            DataValue::ObjectId(_) => "objectId",
            DataValue::DateTime(_) => "date",
            DataValue::Timestamp { .. } => "timestamp",
            DataValue::Array(_) => "array",
            DataValue::Object(_) => "object",
            DataValue::Param(_) => "param",
        }
    }

    /// 判断是否为空值
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// 判断是否为数值
    pub fn is_number(&self) -> bool {
        matches!(self, DataValue::Int(_) | DataValue::Float(_))
    }

    /// 数值视图
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Int(i) => Some(*i as f64),
            DataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Document> {
        match self {
            DataValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<DataValue>> {
        match self {
            DataValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// 是否为以 `$` 开头的操作符对象，例如 `{ $gte: 1 }`
    pub fn is_operator_object(&self) -> bool {
        match self {
            DataValue::Object(map) => map.keys().next().is_some_and(|k| k.starts_with('$')),
            _ => false,
        }
    }

    /// 类型序号，跨类型排序时使用（与 MongoDB 的 BSON 比较顺序一致）
    fn type_rank(&self) -> u8 {
        match self {
            DataValue::Null => 1,
            DataValue::Int(_) | DataValue::Float(_) => 2,
            DataValue::String(_) | DataValue::Param(_) => 3,
            DataValue::Object(_) => 4,
            DataValue::Array(_) => 5,
            DataValue::ObjectId(_) => 7,
            DataValue::Bool(_) => 8,
            DataValue::DateTime(_) => 9,
            DataValue::Timestamp { .. } => 10,
        }
    }

    /// 同类值比较，不同类型返回 None
    ///
    /// `$gt`/`$lt` 等比较操作符只在同类值之间成立
    pub fn compare(&self, other: &DataValue) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Bool(a), DataValue::Bool(b)) => Some(a.cmp(b)),
            (DataValue::Int(a), DataValue::Int(b)) => Some(a.cmp(b)),
            (DataValue::String(a), DataValue::String(b)) => Some(a.cmp(b)),
            (DataValue::ObjectId(a), DataValue::ObjectId(b)) => Some(a.cmp(b)),
            (DataValue::DateTime(a), DataValue::DateTime(b)) => Some(a.cmp(b)),
            (
                DataValue::Timestamp { time: t1, increment: i1 },
                DataValue::Timestamp { time: t2, increment: i2 },
            ) => Some((t1, i1).cmp(&(t2, i2))),
            _ if self.is_number() && other.is_number() => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => None,
        }
    }

    /// 全序比较，用于排序
    pub fn sort_cmp(&self, other: &DataValue) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        if let Some(ordering) = self.compare(other) {
            return ordering;
        }
        match (self, other) {
            (DataValue::Array(a), DataValue::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ordering = x.sort_cmp(y);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (DataValue::Object(a), DataValue::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ordering = ka.cmp(kb).then_with(|| va.sort_cmp(vb));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            // NaN 与其它数值比较时视为相等
            _ => Ordering::Equal,
        }
    }

    /// 转换为扩展 JSON（relaxed 模式）
    ///
    /// 文档ID编码为 `{"$oid": ..}`，日期编码为毫秒精度的 `{"$date": ..}`，
    /// 整数值的浮点数编码为整数，保证相同的参数得到相同的缓存键
    pub fn to_extended_json(&self) -> serde_json::Value {
        self.encode(false)
    }

    /// 转换为无损扩展 JSON，用于缓存的结果值
    ///
    /// 浮点数一律编码为 `{"$numberDouble": ..}`，日期保留纳秒精度，
    /// 解码后与原值类型和精度都一致
    pub fn to_canonical_json(&self) -> serde_json::Value {
        self.encode(true)
    }

    fn encode(&self, canonical: bool) -> serde_json::Value {
        use chrono::SecondsFormat;
        use serde_json::{Map, Number, Value, json};
        match self {
            DataValue::Null => Value::Null,
            DataValue::Bool(b) => Value::Bool(*b),
            DataValue::Int(i) => Value::Number(Number::from(*i)),
            DataValue::Float(f) if canonical => json!({ "$numberDouble": f.to_string() }),
            DataValue::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Value::Number(Number::from(*f as i64))
                } else {
                    match Number::from_f64(*f) {
                        Some(n) => Value::Number(n),
                        None => json!({ "$numberDouble": f.to_string() }),
                    }
                }
            }
            DataValue::String(s) => Value::String(s.clone()),
            DataValue::ObjectId(id) => json!({ "$oid": id.to_hex() }),
            DataValue::DateTime(dt) => {
                let format = if canonical { SecondsFormat::AutoSi } else { SecondsFormat::Millis };
                json!({ "$date": dt.to_rfc3339_opts(format, true) })
            }
            DataValue::Timestamp { time, increment } => {
                json!({ "$timestamp": { "t": time, "i": increment } })
            }
            DataValue::Param(token) => Value::String(token.to_string()),
            DataValue::Array(items) => {
                Value::Array(items.iter().map(|v| v.encode(canonical)).collect())
            }
            DataValue::Object(map) => {
                let object: Map<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.encode(canonical)))
                    .collect();
                Value::Object(object)
            }
        }
    }

    /// 从扩展 JSON 解析
    pub fn from_extended_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => DataValue::Null,
            Value::Bool(b) => DataValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Int(i),
                None => DataValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => DataValue::String(s),
            Value::Array(items) => {
                DataValue::Array(items.into_iter().map(DataValue::from_extended_json).collect())
            }
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(special) = parse_special_object(&map) {
                        return special;
                    }
                }
                DataValue::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, DataValue::from_extended_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// 转换为普通 JSON（文档ID与日期以字符串表示），用于反序列化为用户类型
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            DataValue::ObjectId(id) => Value::String(id.to_hex()),
            DataValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            DataValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json_value()).collect()),
            DataValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_value()))
                    .collect(),
            ),
            other => other.to_extended_json(),
        }
    }

    /// 转换为扩展 JSON 字符串
    pub fn to_json_string(&self) -> String {
        self.to_extended_json().to_string()
    }

    /// 转换为无损扩展 JSON 字符串
    pub fn to_canonical_json_string(&self) -> String {
        self.to_canonical_json().to_string()
    }

    /// 从扩展 JSON 字符串解析
    pub fn from_json_string(json: &str) -> crate::error::QueryCacheResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            crate::quick_error!(serialization, format!("JSON 解析为 DataValue 失败: {}", e))
        })?;
        Ok(Self::from_extended_json(value))
    }

    /// 直接反序列化为指定类型
    pub fn deserialize_to<T>(&self) -> crate::error::QueryCacheResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.to_json_value()).map_err(|e| {
            crate::quick_error!(serialization, format!("DataValue 反序列化失败: {}", e))
        })
    }
}

fn parse_special_object(map: &serde_json::Map<String, serde_json::Value>) -> Option<DataValue> {
    let (key, value) = map.iter().next()?;
    match key.as_str() {
        "$oid" => ObjectId::parse_str(value.as_str()?).map(DataValue::ObjectId),
        "$date" => match value {
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| DataValue::DateTime(dt.with_timezone(&Utc))),
            serde_json::Value::Number(n) => Utc
                .timestamp_millis_opt(n.as_i64()?)
                .single()
                .map(DataValue::DateTime),
            serde_json::Value::Object(inner) => {
                let millis = inner.get("$numberLong")?.as_str()?.parse::<i64>().ok()?;
                Utc.timestamp_millis_opt(millis).single().map(DataValue::DateTime)
            }
            _ => None,
        },
        "$timestamp" => {
            let inner = value.as_object()?;
            Some(DataValue::Timestamp {
                time: inner.get("t")?.as_u64()? as u32,
                increment: inner.get("i")?.as_u64()? as u32,
            })
        }
        "$numberDouble" => value.as_str()?.parse::<f64>().ok().map(DataValue::Float),
        _ => None,
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_extended_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(DataValue::from_extended_json(value))
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<u32> for DataValue {
    fn from(value: u32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<ObjectId> for DataValue {
    fn from(value: ObjectId) -> Self {
        DataValue::ObjectId(value)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(value: DateTime<Utc>) -> Self {
        DataValue::DateTime(value)
    }
}

impl From<Document> for DataValue {
    fn from(value: Document) -> Self {
        DataValue::Object(value)
    }
}

impl From<ParamToken> for DataValue {
    fn from(value: ParamToken) -> Self {
        DataValue::Param(value)
    }
}

impl<T> From<Vec<T>> for DataValue
where
    T: Into<DataValue>,
{
    fn from(value: Vec<T>) -> Self {
        DataValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T> From<Option<T>> for DataValue
where
    T: Into<DataValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DataValue::Null,
        }
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(value: serde_json::Value) -> Self {
        DataValue::from_extended_json(value)
    }
}

/// 构造 [`Document`] 的便捷宏
///
/// ```ignore
/// let filter = document! { "kind" => "car", "price" => document! { "$gte" => 2000 } };
/// ```
#[macro_export]
macro_rules! document {
    () => {
        $crate::types::data_value::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::types::data_value::Document::new();
        $(
            doc.insert(($key).to_string(), $crate::types::data_value::DataValue::from($value));
        )+
        doc
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_float_equality() {
        assert_eq!(DataValue::Int(3), DataValue::Float(3.0));
        assert_ne!(DataValue::Int(3), DataValue::String("3".into()));
    }

    #[test]
    fn test_extended_json_special_types() {
        let id = ObjectId::new();
        let date = Utc.timestamp_millis_opt(20000).single().unwrap();
        let value = DataValue::Array(vec![DataValue::ObjectId(id), DataValue::DateTime(date)]);
        let json = value.to_extended_json();
        assert_eq!(json[0]["$oid"], serde_json::Value::String(id.to_hex()));
        assert_eq!(DataValue::from_extended_json(json), value);
    }

    #[test]
    fn test_integral_float_encodes_as_integer() {
        assert_eq!(DataValue::Float(2000.0).to_json_string(), "2000");
        assert_eq!(DataValue::Float(1.5).to_json_string(), "1.5");
    }

    #[test]
    fn test_canonical_json_is_lossless() {
        let date = Utc.timestamp_opt(1_700_000_000, 279_901_523).single().unwrap();
        let value = DataValue::Array(vec![
            DataValue::DateTime(date),
            DataValue::Float(2000.0),
            DataValue::Float(0.1),
            DataValue::Int(7),
        ]);
        let decoded = DataValue::from_json_string(&value.to_canonical_json_string()).unwrap();
        let items = decoded.as_array().unwrap();
        assert!(matches!(items[0], DataValue::DateTime(dt) if dt == date));
        assert!(matches!(items[1], DataValue::Float(f) if f == 2000.0));
        assert!(matches!(items[2], DataValue::Float(f) if f == 0.1));
        assert!(matches!(items[3], DataValue::Int(7)));

        // 缓存键编码仍然归一化
        let relaxed = DataValue::from_json_string(&value.to_json_string()).unwrap();
        assert!(matches!(relaxed.as_array().unwrap()[1], DataValue::Int(2000)));
    }

    #[test]
    fn test_sort_cmp_across_types() {
        let mut values = vec![
            DataValue::Bool(true),
            DataValue::String("a".into()),
            DataValue::Int(5),
            DataValue::Null,
            DataValue::Float(1.5),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                DataValue::Null,
                DataValue::Float(1.5),
                DataValue::Int(5),
                DataValue::String("a".into()),
                DataValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_compare_rejects_mixed_types() {
        assert_eq!(DataValue::Int(1).compare(&DataValue::String("1".into())), None);
        assert_eq!(
            DataValue::Int(1).compare(&DataValue::Float(2.0)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_document_macro() {
        let doc = crate::document! { "kind" => "car", "price" => 1000 };
        assert_eq!(doc.get("kind"), Some(&DataValue::String("car".into())));
        assert_eq!(doc.get("price"), Some(&DataValue::Int(1000)));
    }

    #[derive(Deserialize, Debug)]
    struct Vehicle {
        _id: String,
        name: String,
        price: i64,
    }

    #[test]
    fn test_deserialize_to_struct() {
        let id = ObjectId::new();
        let doc = crate::document! { "_id" => id, "name" => "A1", "price" => 1000 };
        let vehicle: Vehicle = DataValue::Object(doc).deserialize_to().unwrap();
        assert_eq!(vehicle._id, id.to_hex());
        assert_eq!(vehicle.name, "A1");
        assert_eq!(vehicle.price, 1000);
    }
}
