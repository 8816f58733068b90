//! 查询描述符
//!
//! 描述符是不可变的查询配置。分类信息在构建时计算（配置错误在任何 I/O 之前暴露），
//! 哈希在首次访问时计算并缓存

use crate::cache::keys::{self, HASH_LEN};
use crate::error::QueryCacheResult;
use crate::query::classify::{
    QueryClassification, Selection, classify_projection, classify_query, classify_sort,
    instantiate_shape,
};
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{FindOptions, Population, QueryFilter, SortConfig};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::OnceCell;
use uuid::Uuid;

/// 填充子树中某个节点的投影分类
#[derive(Debug, Clone)]
pub struct PopulatedSelection {
    /// 目标集合
    pub model: String,
    pub select: Selection,
}

/// 描述符的分类信息
#[derive(Debug, Clone)]
pub struct ClassificationInfo {
    pub query: QueryClassification,
    pub select: Selection,
    pub sort: Selection,
    /// 所有层级的填充节点
    pub populated: Vec<PopulatedSelection>,
}

impl ClassificationInfo {
    fn build(
        filter: &QueryFilter,
        select: &Document,
        sort: &[SortConfig],
        populate: &[Population],
    ) -> QueryCacheResult<Self> {
        let mut populated = Vec::new();
        flatten_populations(populate, &mut populated)?;
        Ok(Self {
            query: classify_query(filter)?,
            select: classify_projection(select)?,
            sort: classify_sort(sort),
            populated,
        })
    }
}

fn flatten_populations(
    populate: &[Population],
    out: &mut Vec<PopulatedSelection>,
) -> QueryCacheResult<()> {
    for node in populate {
        out.push(PopulatedSelection {
            model: node.model.clone(),
            select: classify_projection(&node.select)?,
        });
        flatten_populations(&node.populate, out)?;
    }
    Ok(())
}

/// 查询描述符
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub(crate) model: String,
    pub(crate) filter: QueryFilter,
    pub(crate) select: Document,
    pub(crate) populate: Vec<Population>,
    pub(crate) sort: Vec<SortConfig>,
    /// None 表示无限
    pub(crate) cache_count: Option<u64>,
    pub(crate) expiry_secs: u64,
    pub(crate) unique: bool,
    pub(crate) invalidate_on_insert: bool,
    pub(crate) rehydrate: bool,
    pub(crate) info: ClassificationInfo,
    hash: OnceCell<String>,
}

impl QueryDescriptor {
    /// 创建描述符构建器
    pub fn builder() -> crate::config::builders::QueryDescriptorBuilder {
        crate::config::builders::QueryDescriptorBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        model: String,
        filter: QueryFilter,
        select: Document,
        populate: Vec<Population>,
        sort: Vec<SortConfig>,
        cache_count: Option<u64>,
        expiry_secs: u64,
        unique: bool,
        invalidate_on_insert: bool,
        rehydrate: bool,
    ) -> QueryCacheResult<Self> {
        let info = ClassificationInfo::build(&filter, &select, &sort, &populate)?;
        Ok(Self {
            model,
            filter,
            select,
            populate,
            sort,
            cache_count,
            expiry_secs,
            unique,
            invalidate_on_insert,
            rehydrate,
            info,
            hash: OnceCell::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn cache_count(&self) -> Option<u64> {
        self.cache_count
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn invalidate_on_insert(&self) -> bool {
        self.invalidate_on_insert
    }

    pub fn rehydrate_enabled(&self) -> bool {
        self.rehydrate
    }

    pub fn populate(&self) -> &[Population] {
        &self.populate
    }

    pub fn classification(&self) -> &ClassificationInfo {
        &self.info
    }

    /// 配置哈希（16 个字符）
    ///
    /// 对完整配置的扩展 JSON 计算 UUID v5 摘要后取 base64 前 16 位。
    /// 工厂过滤器以占位符实例化，任何配置字段变化都得到不同的哈希
    pub fn hash(&self) -> &str {
        self.hash.get_or_init(|| {
            let json = DataValue::Object(self.config_document()).to_json_string();
            let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, json.as_bytes());
            let mut encoded = STANDARD.encode(digest.as_bytes());
            encoded.truncate(HASH_LEN);
            encoded
        })
    }

    fn config_document(&self) -> Document {
        let (shape, _) = instantiate_shape(&self.filter);
        let sort = self
            .sort
            .iter()
            .map(|s| {
                let mut entry = Document::new();
                entry.insert(s.field.clone(), DataValue::Int(s.direction.as_i64()));
                DataValue::Object(entry)
            })
            .collect::<Vec<_>>();
        let cache_count = match self.cache_count {
            Some(count) => DataValue::Int(count as i64),
            None => DataValue::String("Infinity".to_string()),
        };

        let mut doc = Document::new();
        doc.insert("model".to_string(), DataValue::String(self.model.clone()));
        doc.insert("query".to_string(), DataValue::Object(shape));
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
        doc.insert("sort".to_string(), DataValue::Array(sort));
        doc.insert("cacheCount".to_string(), cache_count);
        doc.insert("expiry".to_string(), DataValue::Int(self.expiry_secs as i64));
        doc.insert("unique".to_string(), DataValue::Bool(self.unique));
        doc.insert(
            "invalidateOnInsert".to_string(),
            DataValue::Bool(self.invalidate_on_insert),
        );
        doc.insert("rehydrate".to_string(), DataValue::Bool(self.rehydrate));
        doc
    }

    /// 结果缓存键
    ///
    /// 静态描述符忽略传入参数；参数化描述符要求参数个数与声明一致
    pub fn cache_key(&self, params: &[DataValue]) -> QueryCacheResult<String> {
        match &self.filter {
            QueryFilter::Static(_) => Ok(keys::query_key(self.hash(), &[])),
            QueryFilter::Factory { arity, .. } => {
                if params.len() != *arity {
                    return Err(crate::quick_error!(
                        config,
                        format!("查询需要 {} 个参数，实际传入 {} 个", arity, params.len())
                    ));
                }
                Ok(keys::query_key(self.hash(), params))
            }
        }
    }

    /// 描述符全部条目集合键
    pub fn all_key(&self) -> String {
        keys::all_key(self.hash())
    }

    /// 文档存储查询选项
    ///
    /// 唯一查询总是只取一条，不排序也不跳过
    pub fn find_options(&self, skip: u64, limit: Option<u64>) -> FindOptions {
        let options = FindOptions::new()
            .with_projection(self.select.clone())
            .with_populate(self.populate.clone());
        if self.unique {
            return options.with_limit(1);
        }
        let options = options.with_sort(self.sort.clone()).with_skip(skip);
        match limit {
            Some(limit) => options.with_limit(limit),
            None => options,
        }
    }
}
