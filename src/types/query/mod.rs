use crate::error::QueryCacheResult;
use crate::types::data_value::{DataValue, Document};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 过滤器参数占位符
///
/// 分类时为每个参数生成一个占位符并调用过滤器工厂，
/// 之后按指针身份（而不是值）识别占位符出现的位置
#[derive(Clone)]
pub struct ParamToken(Arc<usize>);

impl ParamToken {
    pub(crate) fn new(index: usize) -> Self {
        Self(Arc::new(index))
    }

    /// 参数位置
    pub fn index(&self) -> usize {
        *self.0
    }

    /// 是否为同一个占位符
    pub fn same(&self, other: &ParamToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Display for ParamToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "_$CQP{}$_", self.index())
    }
}

impl std::fmt::Debug for ParamToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParamToken({})", self.index())
    }
}

/// 过滤器工厂函数
pub type FilterFactory = Arc<dyn Fn(&[DataValue]) -> Document + Send + Sync>;

/// 查询过滤器：静态文档或带参数的工厂
#[derive(Clone)]
pub enum QueryFilter {
    /// 静态过滤器
    Static(Document),
    /// 参数化过滤器，`arity` 为参数个数
    Factory { arity: usize, factory: FilterFactory },
}

impl QueryFilter {
    /// 创建参数化过滤器
    ///
    /// ```ignore
    /// let filter = QueryFilter::from_fn(1, |p| document! { "kind" => p[0].clone() });
    /// ```
    pub fn from_fn<F>(arity: usize, factory: F) -> Self
    where
        F: Fn(&[DataValue]) -> Document + Send + Sync + 'static,
    {
        QueryFilter::Factory {
            arity,
            factory: Arc::new(factory),
        }
    }

    /// 参数个数
    pub fn arity(&self) -> usize {
        match self {
            QueryFilter::Static(_) => 0,
            QueryFilter::Factory { arity, .. } => *arity,
        }
    }

    /// 使用实际参数生成过滤器，参数个数必须与声明一致
    pub fn resolve(&self, params: &[DataValue]) -> QueryCacheResult<Document> {
        match self {
            QueryFilter::Static(doc) => Ok(doc.clone()),
            QueryFilter::Factory { arity, factory } => {
                if params.len() != *arity {
                    return Err(crate::quick_error!(
                        config,
                        format!("查询需要 {} 个参数，实际传入 {} 个", arity, params.len())
                    ));
                }
                Ok(factory(params))
            }
        }
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter::Static(Document::new())
    }
}

impl From<Document> for QueryFilter {
    fn from(value: Document) -> Self {
        QueryFilter::Static(value)
    }
}

impl std::fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryFilter::Static(doc) => f.debug_tuple("Static").field(doc).finish(),
            QueryFilter::Factory { arity, .. } => {
                f.debug_struct("Factory").field("arity", arity).finish_non_exhaustive()
            }
        }
    }
}

/// 排序配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    /// 字段名
    pub field: String,
    /// 排序方向
    pub direction: SortDirection,
}

impl SortConfig {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SortDirection {
    /// 升序
    Asc,
    /// 降序
    Desc,
}

impl SortDirection {
    /// MongoDB 风格的方向值（1 / -1）
    pub fn as_i64(&self) -> i64 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// 引用填充节点
///
/// `path` 字段保存目标集合文档的 `_id`（单个或数组），
/// 填充后替换为目标文档（按 `select` 投影），可以继续嵌套填充
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    /// 引用字段路径
    pub path: String,
    /// 目标集合
    pub model: String,
    /// 目标文档投影
    pub select: Document,
    /// 嵌套填充
    pub populate: Vec<Population>,
}

impl Population {
    pub fn new(path: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            select: Document::new(),
            populate: Vec::new(),
        }
    }

    /// 设置目标文档投影
    pub fn select(mut self, select: Document) -> Self {
        self.select = select;
        self
    }

    /// 添加嵌套填充
    pub fn populate(mut self, child: Population) -> Self {
        self.populate.push(child);
        self
    }

    /// 转换为可哈希的文档表示
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("path".to_string(), DataValue::String(self.path.clone()));
        doc.insert("model".to_string(), DataValue::String(self.model.clone()));
        doc.insert("select".to_string(), DataValue::Object(self.select.clone()));
        doc.insert(
            "populate".to_string(),
            DataValue::Array(
                self.populate
                    .iter()
                    .map(|p| DataValue::Object(p.to_document()))
                    .collect(),
            ),
        );
        doc
    }
}

/// 文档存储查询选项
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// 投影（空表示全部字段）
    pub projection: Document,
    /// 排序
    pub sort: Vec<SortConfig>,
    /// 跳过条数
    pub skip: u64,
    /// 限制条数
    pub limit: Option<u64>,
    /// 引用填充
    pub populate: Vec<Population>,
}

impl FindOptions {
    /// 创建新的查询选项
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortConfig>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_populate(mut self, populate: Vec<Population>) -> Self {
        self.populate = populate;
        self
    }
}

/// 更新选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// 无匹配文档时插入
    pub upsert: bool,
    /// 更新全部匹配文档（否则只更新第一个）
    pub multi: bool,
}

impl UpdateOptions {
    pub fn one() -> Self {
        Self::default()
    }

    pub fn many() -> Self {
        Self {
            upsert: false,
            multi: true,
        }
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_token_identity() {
        let a = ParamToken::new(0);
        let b = ParamToken::new(0);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert_eq!(a.to_string(), "_$CQP0$_");
    }

    #[test]
    fn test_factory_arity_checked() {
        let filter = QueryFilter::from_fn(1, |p| crate::document! { "kind" => p[0].clone() });
        assert!(filter.resolve(&[]).unwrap_err().is_config());
        let doc = filter.resolve(&[DataValue::from("car")]).unwrap();
        assert_eq!(doc.get("kind"), Some(&DataValue::from("car")));
    }
}
