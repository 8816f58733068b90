//! 文档匹配器
//!
//! 把 MongoDB 风格的过滤文档编译为可重复求值的谓词树，
//! 用于内存文档存储的查询以及失效判断中的 before/after 匹配

use crate::error::QueryCacheResult;
use crate::query::path::collect_values;
use crate::types::data_value::{DataValue, Document};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// 编译后的过滤器
#[derive(Debug, Clone)]
pub struct Matcher {
    conditions: Vec<Condition>,
}

#[derive(Debug, Clone)]
enum Condition {
    Field { path: String, predicates: Vec<Predicate> },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Nor(Vec<Matcher>),
}

#[derive(Debug, Clone)]
enum Predicate {
    Eq(DataValue),
    Ne(DataValue),
    Cmp(Ordering, bool, DataValue),
    In(Vec<DataValue>),
    Nin(Vec<DataValue>),
    Exists(bool),
    Size(usize),
    All(Vec<DataValue>),
    ElemMatch(ElemMatch),
    Not(Vec<Predicate>),
    Regex(Regex),
    Mod(i64, i64),
}

#[derive(Debug, Clone)]
enum ElemMatch {
    /// 元素为文档，按子过滤器匹配
    Document(Box<Matcher>),
    /// 元素为标量，按操作符匹配
    Value(Vec<Predicate>),
}

impl Matcher {
    /// 编译过滤文档，遇到不支持的操作符返回配置错误
    pub fn compile(filter: &Document) -> QueryCacheResult<Self> {
        let mut conditions = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            let condition = match key.as_str() {
                "$and" => Condition::And(compile_list(key, value)?),
                "$or" => Condition::Or(compile_list(key, value)?),
                "$nor" => Condition::Nor(compile_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(crate::quick_error!(
                        config,
                        format!("不支持的顶层查询操作符: {}", op)
                    ));
                }
                path => Condition::Field {
                    path: path.to_string(),
                    predicates: compile_field(value)?,
                },
            };
            conditions.push(condition);
        }
        Ok(Self { conditions })
    }

    /// 匹配所有文档的空过滤器
    pub fn match_all() -> Self {
        Self { conditions: Vec::new() }
    }

    /// 判断文档是否满足过滤器
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Field { path, predicates } => {
                let values = collect_values(doc, path);
                predicates.iter().all(|p| p.test(&values))
            }
            Condition::And(list) => list.iter().all(|m| m.matches(doc)),
            Condition::Or(list) => list.iter().any(|m| m.matches(doc)),
            Condition::Nor(list) => !list.iter().any(|m| m.matches(doc)),
        })
    }
}

fn compile_list(key: &str, value: &DataValue) -> QueryCacheResult<Vec<Matcher>> {
    let items = match value {
        DataValue::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(crate::quick_error!(
                config,
                format!("{} 的值必须是非空数组", key)
            ));
        }
    };
    items
        .iter()
        .map(|item| match item {
            DataValue::Object(sub) => Matcher::compile(sub),
            _ => Err(crate::quick_error!(config, format!("{} 的元素必须是文档", key))),
        })
        .collect()
}

fn compile_field(value: &DataValue) -> QueryCacheResult<Vec<Predicate>> {
    match value {
        DataValue::Object(ops) if value.is_operator_object() => compile_operators(ops),
        other => Ok(vec![Predicate::Eq(other.clone())]),
    }
}

fn compile_operators(ops: &Document) -> QueryCacheResult<Vec<Predicate>> {
    let mut predicates = Vec::with_capacity(ops.len());
    let options = ops.get("$options").and_then(|v| v.as_str()).unwrap_or("");
    for (op, operand) in ops {
        let predicate = match op.as_str() {
            "$eq" => Predicate::Eq(operand.clone()),
            "$ne" => Predicate::Ne(operand.clone()),
            "$gt" => Predicate::Cmp(Ordering::Greater, false, operand.clone()),
            "$gte" => Predicate::Cmp(Ordering::Greater, true, operand.clone()),
            "$lt" => Predicate::Cmp(Ordering::Less, false, operand.clone()),
            "$lte" => Predicate::Cmp(Ordering::Less, true, operand.clone()),
            "$in" => Predicate::In(expect_array(op, operand)?),
            "$nin" => Predicate::Nin(expect_array(op, operand)?),
            "$all" => Predicate::All(expect_array(op, operand)?),
            "$exists" => Predicate::Exists(truthy(operand)),
            "$size" => match operand {
                DataValue::Int(n) if *n >= 0 => Predicate::Size(*n as usize),
                _ => return Err(crate::quick_error!(config, "$size 的值必须是非负整数")),
            },
            "$elemMatch" => match operand {
                DataValue::Object(sub) if operand.is_operator_object() => {
                    Predicate::ElemMatch(ElemMatch::Value(compile_operators(sub)?))
                }
                DataValue::Object(sub) => {
                    Predicate::ElemMatch(ElemMatch::Document(Box::new(Matcher::compile(sub)?)))
                }
                _ => return Err(crate::quick_error!(config, "$elemMatch 的值必须是文档")),
            },
            "$not" => Predicate::Not(compile_field(operand)?),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| crate::quick_error!(config, "$regex 的值必须是字符串"))?;
                Predicate::Regex(build_regex(pattern, options)?)
            }
            "$options" => continue,
            "$mod" => match operand.as_array().map(|v| v.as_slice()) {
                Some([DataValue::Int(divisor), DataValue::Int(remainder)]) if *divisor != 0 => {
                    Predicate::Mod(*divisor, *remainder)
                }
                _ => return Err(crate::quick_error!(config, "$mod 的值必须是 [除数, 余数]")),
            },
            other => {
                return Err(crate::quick_error!(
                    config,
                    format!("不支持的查询操作符: {}", other)
                ));
            }
        };
        predicates.push(predicate);
    }
    Ok(predicates)
}

fn expect_array(op: &str, operand: &DataValue) -> QueryCacheResult<Vec<DataValue>> {
    match operand {
        DataValue::Array(items) => Ok(items.clone()),
        _ => Err(crate::quick_error!(config, format!("{} 的值必须是数组", op))),
    }
}

fn truthy(value: &DataValue) -> bool {
    match value {
        DataValue::Null => false,
        DataValue::Bool(b) => *b,
        DataValue::Int(i) => *i != 0,
        DataValue::Float(f) => *f != 0.0,
        _ => true,
    }
}

fn build_regex(pattern: &str, options: &str) -> QueryCacheResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| crate::quick_error!(config, format!("无效的正则表达式 {}: {}", pattern, e)))
}

/// 候选值或其数组元素中是否存在满足条件的值
fn any_value_or_element(values: &[&DataValue], test: impl Fn(&DataValue) -> bool) -> bool {
    values.iter().any(|value| {
        test(value)
            || matches!(value, DataValue::Array(items) if items.iter().any(|item| test(item)))
    })
}

impl Predicate {
    fn test(&self, values: &[&DataValue]) -> bool {
        match self {
            Predicate::Eq(expected) => equals(values, expected),
            Predicate::Ne(expected) => !equals(values, expected),
            Predicate::Cmp(direction, inclusive, bound) => any_value_or_element(values, |v| {
                match v.compare(bound) {
                    Some(Ordering::Equal) => *inclusive,
                    Some(ordering) => ordering == *direction,
                    None => false,
                }
            }),
            Predicate::In(list) => list.iter().any(|expected| equals(values, expected)),
            Predicate::Nin(list) => !list.iter().any(|expected| equals(values, expected)),
            Predicate::Exists(expected) => !values.is_empty() == *expected,
            Predicate::Size(size) => values
                .iter()
                .any(|v| matches!(v, DataValue::Array(items) if items.len() == *size)),
            Predicate::All(list) => {
                !list.is_empty()
                    && values.iter().any(|v| match v {
                        DataValue::Array(items) => list.iter().all(|x| items.contains(x)),
                        scalar => list.iter().all(|x| *scalar == x),
                    })
            }
            Predicate::ElemMatch(elem) => values.iter().any(|v| match v {
                DataValue::Array(items) => items.iter().any(|item| elem.test(item)),
                _ => false,
            }),
            Predicate::Not(inner) => !inner.iter().all(|p| p.test(values)),
            Predicate::Regex(re) => any_value_or_element(values, |v| {
                v.as_str().is_some_and(|s| re.is_match(s))
            }),
            Predicate::Mod(divisor, remainder) => any_value_or_element(values, |v| match v {
                // 除数非零在编译时已校验，i64::MIN % -1 按 0 处理
                DataValue::Int(i) => i.wrapping_rem(*divisor) == *remainder,
                DataValue::Float(f) => (f.trunc() as i64).wrapping_rem(*divisor) == *remainder,
                _ => false,
            }),
        }
    }
}

impl ElemMatch {
    fn test(&self, item: &DataValue) -> bool {
        match self {
            ElemMatch::Document(matcher) => item.as_object().is_some_and(|doc| matcher.matches(doc)),
            ElemMatch::Value(predicates) => {
                let values = [item];
                predicates.iter().all(|p| p.test(&values))
            }
        }
    }
}

/// 等值匹配：字段缺失等价于 null，数组字段按元素包含判断
fn equals(values: &[&DataValue], expected: &DataValue) -> bool {
    if values.is_empty() {
        return expected.is_null();
    }
    any_value_or_element(values, |v| v == expected)
}
