//! 更新操作符解释器
//!
//! 在内存中对文档快照应用受限的更新操作符集合，
//! 用于在不再次读取数据库的情况下得到写入前后的文档状态

use crate::error::QueryCacheResult;
use crate::query::path::{get_path, get_path_mut, set_path, unset_path};
use crate::types::data_value::{DataValue, Document};
use crate::types::update_operations::{UpdateDocument, UpdateOperator};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// 把原始更新表达式规范化为 `{操作符 -> {路径 -> 值}}`
///
/// 不以 `$` 开头的顶层字段并入 `$set`
pub fn parse_query_update(input: &Document) -> QueryCacheResult<UpdateDocument> {
    let mut result = UpdateDocument::new();
    for (key, value) in input {
        if !key.starts_with('$') {
            validate_path(key)?;
            result
                .operations
                .entry(UpdateOperator::Set)
                .or_default()
                .insert(key.clone(), value.clone());
            continue;
        }
        let operator = UpdateOperator::from_name(key).ok_or_else(|| {
            crate::quick_error!(config, format!("不支持的更新操作符: {}", key))
        })?;
        let fields = match value {
            DataValue::Null => continue,
            DataValue::Object(fields) => fields,
            _ => {
                return Err(crate::quick_error!(
                    config,
                    format!("更新操作符 {} 的值必须是文档", key)
                ));
            }
        };
        for (path, operand) in fields {
            validate_path(path)?;
            if operator == UpdateOperator::Push {
                parse_array_update(operand)?;
            }
            result
                .operations
                .entry(operator)
                .or_default()
                .insert(path.clone(), operand.clone());
        }
    }
    Ok(result)
}

fn validate_path(path: &str) -> QueryCacheResult<()> {
    if path.split('.').any(|segment| segment.starts_with('$')) {
        return Err(crate::quick_error!(
            config,
            format!("不支持使用 <field>.$ 形式更新数组: {}", path)
        ));
    }
    Ok(())
}

/// 更新涉及的全部路径（`$rename` 的目标路径也计入，`$setOnInsert` 对已有文档无效果不计入）
pub fn collect_modified_paths(update: &UpdateDocument) -> Vec<String> {
    let mut result = BTreeSet::new();
    for (operator, fields) in update.iter() {
        if *operator == UpdateOperator::SetOnInsert {
            continue;
        }
        for (path, operand) in fields {
            result.insert(path.clone());
            if *operator == UpdateOperator::Rename {
                if let Some(target) = operand.as_str() {
                    result.insert(target.to_string());
                }
            }
        }
    }
    result.into_iter().collect()
}

/// 在原地对多个文档应用更新，返回涉及的路径
pub fn apply_updates(
    targets: &mut [Document],
    update: &UpdateDocument,
) -> QueryCacheResult<Vec<String>> {
    for (operator, fields) in update.iter() {
        for (path, operand) in fields {
            validate_path(path)?;
            for target in targets.iter_mut() {
                apply_operator(target, *operator, path, operand)?;
            }
        }
    }
    Ok(collect_modified_paths(update))
}

/// 计算每个文档更新前后的状态，不修改输入
pub fn map_before_and_after(
    targets: &[Document],
    update: &UpdateDocument,
) -> QueryCacheResult<Vec<(Document, Document)>> {
    let mut after: Vec<Document> = targets.to_vec();
    apply_updates(&mut after, update)?;
    Ok(targets.iter().cloned().zip(after).collect())
}

/// 推测 upsert 插入的文档
///
/// 只取过滤器中的直接等值（或 `$eq`）字段，再应用合并了 `$setOnInsert` 的 `$set`。
/// 不会反映数据库端的默认值或校验器
pub fn build_upserted_document(
    filter: &Document,
    update: &UpdateDocument,
) -> QueryCacheResult<Document> {
    let mut doc = Document::new();
    for (field, raw) in filter {
        if field.starts_with('$') {
            continue;
        }
        let value = match raw {
            DataValue::Object(ops) if raw.is_operator_object() => match ops.get("$eq") {
                Some(eq) => eq.clone(),
                None => continue,
            },
            other => other.clone(),
        };
        set_path(&mut doc, field, value)?;
    }

    let mut merged = update.clone();
    if let Some(on_insert) = merged.operations.remove(&UpdateOperator::SetOnInsert) {
        merged
            .operations
            .entry(UpdateOperator::Set)
            .or_default()
            .extend(on_insert);
    }
    apply_updates(std::slice::from_mut(&mut doc), &merged)?;
    Ok(doc)
}

/// 整体替换文档后的状态，保留原文档的 `_id`
///
/// 替换文档带有不同的 `_id` 时报错，与数据库对 `_id` 不可变的约束一致
pub fn replace_document(before: &Document, replacement: &Document) -> QueryCacheResult<Document> {
    let mut after = replacement.clone();
    match (before.get("_id"), replacement.get("_id")) {
        (Some(old), Some(new)) if old != new => {
            return Err(crate::quick_error!(
                config,
                format!("替换文档不能修改 _id: {} -> {}", old, new)
            ));
        }
        (Some(old), _) => {
            after.insert("_id".to_string(), old.clone());
        }
        (None, _) => {}
    }
    Ok(after)
}

/// 推测替换式 upsert 插入的文档：`_id` 取自替换文档，其次取过滤器中的等值 `_id`
pub fn build_upserted_replacement(filter: &Document, replacement: &Document) -> Document {
    let mut doc = replacement.clone();
    if !doc.contains_key("_id") {
        if let Some(id) = filter.get("_id").filter(|v| !v.is_operator_object()) {
            doc.insert("_id".to_string(), id.clone());
        }
    }
    doc
}

/// 整体替换时被修改的顶层字段（新增、删除或值不同）
pub fn diff_top_level_paths(before: &Document, after: &Document) -> Vec<String> {
    let mut result = BTreeSet::new();
    for (field, value) in before {
        if after.get(field) != Some(value) {
            result.insert(field.clone());
        }
    }
    for field in after.keys() {
        if !before.contains_key(field) {
            result.insert(field.clone());
        }
    }
    result.remove("_id");
    result.into_iter().collect()
}

fn apply_operator(
    target: &mut Document,
    operator: UpdateOperator,
    path: &str,
    operand: &DataValue,
) -> QueryCacheResult<()> {
    match operator {
        UpdateOperator::CurrentDate => set_path(target, path, current_date(operand)?),
        UpdateOperator::Inc => {
            let amount = inc_amount(operand)?;
            let next = match get_path(target, path) {
                None => operand.clone(),
                Some(found) => add_numbers(found, &amount).ok_or_else(|| {
                    crate::quick_error!(config, format!("$inc 目标字段必须是数值: {}", path))
                })?,
            };
            set_path(target, path, next)
        }
        UpdateOperator::Mul => {
            if !operand.is_number() {
                return Err(crate::quick_error!(config, "$mul 的值必须是数值"));
            }
            let next = match get_path(target, path) {
                None => DataValue::Int(0),
                Some(found) => multiply_numbers(found, operand).ok_or_else(|| {
                    crate::quick_error!(config, format!("$mul 目标字段必须是数值: {}", path))
                })?,
            };
            set_path(target, path, next)
        }
        UpdateOperator::Min | UpdateOperator::Max => {
            let wanted = if operator == UpdateOperator::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            match get_path(target, path) {
                Some(current) if operand.sort_cmp(current) == wanted => {
                    set_path(target, path, operand.clone())
                }
                _ => Ok(()),
            }
        }
        UpdateOperator::Rename => {
            let destination = operand
                .as_str()
                .ok_or_else(|| crate::quick_error!(config, "$rename 的值必须是字符串"))?;
            validate_path(destination)?;
            if let Some(found) = unset_path(target, path) {
                set_path(target, destination, found)?;
            }
            Ok(())
        }
        UpdateOperator::Set => set_path(target, path, operand.clone()),
        UpdateOperator::SetOnInsert => Ok(()),
        UpdateOperator::Unset => {
            unset_path(target, path);
            Ok(())
        }
        UpdateOperator::AddToSet => {
            let items = match operand {
                DataValue::Object(spec) if spec.contains_key("$each") => match spec.get("$each") {
                    Some(DataValue::Array(items)) => items.clone(),
                    _ => return Err(crate::quick_error!(config, "$each 的值必须是数组")),
                },
                other => vec![other.clone()],
            };
            match get_path_mut(target, path) {
                None => {
                    let mut fresh: Vec<DataValue> = Vec::new();
                    for item in items {
                        if !fresh.contains(&item) {
                            fresh.push(item);
                        }
                    }
                    set_path(target, path, DataValue::Array(fresh))
                }
                Some(DataValue::Array(existing)) => {
                    for item in items {
                        if !existing.contains(&item) {
                            existing.push(item);
                        }
                    }
                    Ok(())
                }
                Some(_) => Err(crate::quick_error!(
                    config,
                    format!("$addToSet 目标字段必须是数组: {}", path)
                )),
            }
        }
        UpdateOperator::Pop => match get_path_mut(target, path) {
            None => Ok(()),
            Some(DataValue::Array(existing)) => {
                match operand {
                    DataValue::Int(1) | DataValue::Bool(true) => {
                        if !existing.is_empty() {
                            existing.remove(0);
                        }
                    }
                    DataValue::Int(-1) => {
                        existing.pop();
                    }
                    _ => return Err(crate::quick_error!(config, "$pop 的值必须是 1 或 -1")),
                }
                Ok(())
            }
            Some(_) => Err(crate::quick_error!(
                config,
                format!("$pop 目标字段必须是数组: {}", path)
            )),
        },
        UpdateOperator::Push => {
            let spec = parse_array_update(operand)?;
            match get_path_mut(target, path) {
                None => {
                    let mut fresh = Vec::new();
                    spec.apply(&mut fresh);
                    set_path(target, path, DataValue::Array(fresh))
                }
                Some(DataValue::Array(existing)) => {
                    spec.apply(existing);
                    Ok(())
                }
                Some(_) => Err(crate::quick_error!(
                    config,
                    format!("$push 目标字段必须是数组: {}", path)
                )),
            }
        }
    }
}

fn current_date(operand: &DataValue) -> QueryCacheResult<DataValue> {
    let now = Utc::now();
    match operand {
        DataValue::Bool(_) => Ok(DataValue::DateTime(now)),
        DataValue::Object(spec) => match spec.get("$type").and_then(|t| t.as_str()) {
            Some("date") => Ok(DataValue::DateTime(now)),
            Some("timestamp") => Ok(DataValue::Timestamp {
                time: now.timestamp() as u32,
                increment: 1,
            }),
            _ => Err(crate::quick_error!(config, "$currentDate 的值无效")),
        },
        _ => Err(crate::quick_error!(config, "$currentDate 的值无效")),
    }
}

fn inc_amount(operand: &DataValue) -> QueryCacheResult<DataValue> {
    match operand {
        DataValue::Int(_) => Ok(operand.clone()),
        DataValue::Float(f) if !f.is_nan() => Ok(operand.clone()),
        DataValue::Bool(true) => Ok(DataValue::Int(1)),
        DataValue::Bool(false) => Ok(DataValue::Int(0)),
        DataValue::DateTime(dt) => Ok(DataValue::Int(dt.timestamp_millis())),
        _ => Err(crate::quick_error!(config, "$inc 的值必须是数值类型")),
    }
}

fn add_numbers(a: &DataValue, b: &DataValue) -> Option<DataValue> {
    match (a, b) {
        (DataValue::Int(x), DataValue::Int(y)) => Some(
            x.checked_add(*y)
                .map(DataValue::Int)
                .unwrap_or(DataValue::Float(*x as f64 + *y as f64)),
        ),
        _ => Some(DataValue::Float(a.as_f64()? + b.as_f64()?)),
    }
}

fn multiply_numbers(a: &DataValue, b: &DataValue) -> Option<DataValue> {
    match (a, b) {
        (DataValue::Int(x), DataValue::Int(y)) => Some(
            x.checked_mul(*y)
                .map(DataValue::Int)
                .unwrap_or(DataValue::Float(*x as f64 * *y as f64)),
        ),
        _ => Some(DataValue::Float(a.as_f64()? * b.as_f64()?)),
    }
}

/// `$push` 的参数：普通值，或 `{$each, $position?, $slice?}`
struct ArrayUpdate {
    items: Vec<DataValue>,
    position: Option<i64>,
    slice: Option<i64>,
}

fn parse_array_update(operand: &DataValue) -> QueryCacheResult<ArrayUpdate> {
    let spec = match operand {
        DataValue::Object(spec) if spec.contains_key("$each") => spec,
        other => {
            return Ok(ArrayUpdate {
                items: vec![other.clone()],
                position: None,
                slice: None,
            });
        }
    };
    if spec.contains_key("$sort") {
        return Err(crate::quick_error!(config, "不支持 $push 的 $sort 修饰符"));
    }
    let items = match spec.get("$each") {
        Some(DataValue::Array(items)) => items.clone(),
        _ => return Err(crate::quick_error!(config, "$each 的值必须是数组")),
    };
    let int_modifier = |name: &str| -> QueryCacheResult<Option<i64>> {
        match spec.get(name) {
            None => Ok(None),
            Some(DataValue::Int(i)) => Ok(Some(*i)),
            Some(_) => Err(crate::quick_error!(config, format!("{} 的值必须是整数", name))),
        }
    };
    Ok(ArrayUpdate {
        items,
        position: int_modifier("$position")?,
        slice: int_modifier("$slice")?,
    })
}

impl ArrayUpdate {
    fn apply(self, target: &mut Vec<DataValue>) {
        let len = target.len() as i64;
        match self.position {
            None => target.extend(self.items),
            Some(position) => {
                let index = if position < 0 {
                    (len + position).max(0)
                } else {
                    position.min(len)
                } as usize;
                for (offset, item) in self.items.into_iter().enumerate() {
                    target.insert(index + offset, item);
                }
            }
        }
        if let Some(slice) = self.slice {
            if slice >= 0 {
                target.truncate(slice as usize);
            } else {
                let keep = slice.unsigned_abs() as usize;
                if target.len() > keep {
                    target.drain(0..target.len() - keep);
                }
            }
        }
    }
}
