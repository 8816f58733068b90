//! # 查询描述符构建器模块
//!
//! 集合名称和过滤器必须设置，其他字段有默认值：
//! 不投影、不填充、不排序、cacheCount 无限、过期 12 小时、非唯一、插入时失效、允许重新填充

use crate::error::QueryCacheResult;
use crate::query::descriptor::QueryDescriptor;
use crate::types::cache_config::CacheConfig;
use crate::types::data_value::Document;
use crate::types::query::{Population, QueryFilter, SortConfig};

/// 描述符默认过期时间（秒）
pub const DEFAULT_EXPIRY_SECS: u64 = 12 * 60 * 60;

/// 查询描述符构建器
#[derive(Debug, Clone)]
pub struct QueryDescriptorBuilder {
    model: Option<String>,
    filter: Option<QueryFilter>,
    select: Document,
    populate: Vec<Population>,
    sort: Vec<SortConfig>,
    cache_count: Option<u64>,
    expiry_secs: u64,
    unique: bool,
    invalidate_on_insert: bool,
    rehydrate: bool,
}

impl QueryDescriptorBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            filter: None,
            select: Document::new(),
            populate: Vec::new(),
            sort: Vec::new(),
            cache_count: None,
            expiry_secs: DEFAULT_EXPIRY_SECS,
            unique: false,
            invalidate_on_insert: true,
            rehydrate: true,
        }
    }

    /// 以缓存配置的默认过期时间作为初始值
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new().expiry_secs(config.default_expiry_secs)
    }

    /// 设置集合名称
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// 设置过滤器（静态文档或 [`QueryFilter::from_fn`]）
    pub fn filter(mut self, filter: impl Into<QueryFilter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn select(mut self, select: Document) -> Self {
        self.select = select;
        self
    }

    pub fn populate(mut self, populate: Vec<Population>) -> Self {
        self.populate = populate;
        self
    }

    pub fn sort(mut self, sort: Vec<SortConfig>) -> Self {
        self.sort = sort;
        self
    }

    /// 缓存的最大结果条数，超出窗口的查询直接访问文档存储
    pub fn cache_count(mut self, count: u64) -> Self {
        self.cache_count = Some(count);
        self
    }

    pub fn expiry_secs(mut self, secs: u64) -> Self {
        self.expiry_secs = secs;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn invalidate_on_insert(mut self, enabled: bool) -> Self {
        self.invalidate_on_insert = enabled;
        self
    }

    pub fn rehydrate(mut self, enabled: bool) -> Self {
        self.rehydrate = enabled;
        self
    }

    /// 构建描述符，同时完成查询和投影分类
    pub fn build(self) -> QueryCacheResult<QueryDescriptor> {
        let model = self
            .model
            .filter(|m| !m.is_empty())
            .ok_or_else(|| crate::quick_error!(config, "集合名称必须设置"))?;
        let filter = self
            .filter
            .ok_or_else(|| crate::quick_error!(config, "查询过滤器必须设置"))?;
        if self.expiry_secs == 0 {
            return Err(crate::quick_error!(config, "过期时间不能为零"));
        }
        if self.cache_count == Some(0) {
            return Err(crate::quick_error!(config, "cacheCount 必须为正数"));
        }

        QueryDescriptor::new(
            model,
            filter,
            self.select,
            self.populate,
            self.sort,
            self.cache_count,
            self.expiry_secs,
            self.unique,
            self.invalidate_on_insert,
            self.rehydrate,
        )
    }
}

impl Default for QueryDescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
