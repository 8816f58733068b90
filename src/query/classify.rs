//! 查询分类与投影分类
//!
//! 查询分类把过滤器拆成静态匹配器、按参数顺序排列的动态键和复杂查询标记；
//! 投影分类把 select/sort 拆成包含/排除模式和显式路径

use crate::error::QueryCacheResult;
use crate::query::matcher::Matcher;
use crate::query::path::{is_prefix_of, paths_overlap};
use crate::types::data_value::{DataValue, Document};
use crate::types::query::{ParamToken, QueryFilter, SortConfig};

/// 查询分类结果
#[derive(Debug, Clone)]
pub struct QueryClassification {
    /// 静态部分的匹配器
    pub matcher: Matcher,
    /// 第 i 个参数对应的过滤键
    pub dynamic_keys: Vec<String>,
    /// 是否有参数出现在比较操作符内部
    pub complex_query: bool,
}

/// 投影分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub inclusive: bool,
    pub paths: Vec<String>,
}

impl Selection {
    /// 修改的路径是否影响此投影
    ///
    /// 包含模式：有修改路径与选中路径相等或互为前缀；
    /// 排除模式：有修改路径未被任何排除路径覆盖
    pub fn was_modified(&self, modified: &[String]) -> bool {
        if modified.is_empty() {
            return false;
        }
        if self.paths.is_empty() {
            return !self.inclusive;
        }
        if self.inclusive {
            modified
                .iter()
                .any(|m| self.paths.iter().any(|p| paths_overlap(m, p)))
        } else {
            !modified
                .iter()
                .all(|m| self.paths.iter().any(|p| m == p || is_prefix_of(p, m)))
        }
    }
}

/// 生成占位符并调用过滤器工厂，得到过滤器的"形状"
pub fn instantiate_shape(filter: &QueryFilter) -> (Document, Vec<ParamToken>) {
    match filter {
        QueryFilter::Static(doc) => (doc.clone(), Vec::new()),
        QueryFilter::Factory { arity, factory } => {
            let tokens: Vec<ParamToken> = (0..*arity).map(ParamToken::new).collect();
            let params: Vec<DataValue> = tokens.iter().cloned().map(DataValue::Param).collect();
            (factory(&params), tokens)
        }
    }
}

/// 对过滤器分类
pub fn classify_query(filter: &QueryFilter) -> QueryCacheResult<QueryClassification> {
    let (shape, tokens) = instantiate_shape(filter);
    if tokens.is_empty() {
        return Ok(QueryClassification {
            matcher: Matcher::compile(&shape)?,
            dynamic_keys: Vec::new(),
            complex_query: false,
        });
    }

    let mut slots: Vec<Option<String>> = vec![None; tokens.len()];
    let mut complex_query = false;
    for (key, value) in &shape {
        find_params(key, value, &tokens, false, &mut slots, &mut complex_query);
    }

    let mut dynamic_keys = Vec::with_capacity(slots.len());
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(key) => dynamic_keys.push(key),
            None => {
                return Err(crate::quick_error!(
                    config,
                    format!("过滤器没有使用第 {} 个参数", index)
                ));
            }
        }
    }

    let static_filter: Document = shape
        .into_iter()
        .filter(|(key, _)| !dynamic_keys.contains(key))
        .collect();

    Ok(QueryClassification {
        matcher: Matcher::compile(&static_filter)?,
        dynamic_keys,
        complex_query,
    })
}

fn find_params(
    key: &str,
    value: &DataValue,
    tokens: &[ParamToken],
    inside: bool,
    slots: &mut [Option<String>],
    complex_query: &mut bool,
) {
    match value {
        DataValue::Param(token) => {
            if let Some(index) = tokens.iter().position(|t| t.same(token)) {
                if inside {
                    *complex_query = true;
                }
                slots[index] = Some(key.to_string());
            }
        }
        DataValue::Object(map) => {
            for nested in map.values() {
                find_params(key, nested, tokens, true, slots, complex_query);
            }
        }
        DataValue::Array(items) => {
            for nested in items {
                find_params(key, nested, tokens, true, slots, complex_query);
            }
        }
        _ => {}
    }
}

/// 对投影分类
///
/// 值必须是 0/1（或布尔值）；不允许排除 `_id`；非 `_id` 路径不能混用两种模式
pub fn classify_projection(select: &Document) -> QueryCacheResult<Selection> {
    let mut inclusive: Option<bool> = None;
    let mut paths = Vec::new();
    for (path, value) in select {
        let include = match value {
            DataValue::Int(1) | DataValue::Bool(true) => true,
            DataValue::Int(0) | DataValue::Bool(false) => false,
            DataValue::Float(f) if *f == 1.0 => true,
            DataValue::Float(f) if *f == 0.0 => false,
            other => {
                return Err(crate::quick_error!(
                    config,
                    format!("投影 {} 的值必须是 0 或 1，实际为 {}", path, other)
                ));
            }
        };
        if path == "_id" {
            if !include {
                return Err(crate::quick_error!(config, "投影不允许排除 _id"));
            }
            continue;
        }
        match inclusive {
            None => inclusive = Some(include),
            Some(mode) if mode != include => {
                return Err(crate::quick_error!(config, "投影不能混用包含和排除模式"));
            }
            _ => {}
        }
        paths.push(path.clone());
    }
    Ok(Selection {
        inclusive: inclusive.unwrap_or(false),
        paths,
    })
}

/// 排序字段视为一个包含投影：任一排序键变化都可能改变缓存窗口的顺序
pub fn classify_sort(sort: &[SortConfig]) -> Selection {
    Selection {
        inclusive: true,
        paths: sort.iter().map(|s| s.field.clone()).collect(),
    }
}
