//! 点分路径工具
//!
//! `a.b.c` 形式的路径在文档中读取、设置和删除值。数字段可以索引数组

use crate::error::QueryCacheResult;
use crate::types::data_value::{DataValue, Document};

/// 读取路径上的值
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a DataValue> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = child(current, segment)?;
    }
    Some(current)
}

fn child<'a>(value: &'a DataValue, segment: &str) -> Option<&'a DataValue> {
    match value {
        DataValue::Object(map) => map.get(segment),
        DataValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// 路径在到达末段之前是否经过数组
pub fn crosses_array(doc: &Document, path: &str) -> bool {
    let mut segments = path.split('.');
    let Some(mut current) = segments.next().and_then(|head| doc.get(head)) else {
        return false;
    };
    for segment in segments {
        if matches!(current, DataValue::Array(_)) {
            return true;
        }
        match child(current, segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}

/// 读取路径上的可变值
pub fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut DataValue> {
    let mut segments = path.split('.');
    let mut current = doc.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            DataValue::Object(map) => map.get_mut(segment)?,
            DataValue::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// 收集路径上的所有候选值，路径经过数组时展开到每个元素
///
/// 匹配器按这种方式处理 `tags.name` 这类跨数组路径
pub fn collect_values<'a>(doc: &'a Document, path: &str) -> Vec<&'a DataValue> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = doc.get(segments[0]) {
        collect_from(first, &segments[1..], &mut out);
    }
    out
}

fn collect_from<'a>(value: &'a DataValue, segments: &[&str], out: &mut Vec<&'a DataValue>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        DataValue::Object(map) => {
            if let Some(next) = map.get(*head) {
                collect_from(next, rest, out);
            }
        }
        DataValue::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_from(next, rest, out);
                }
            }
            for item in items {
                if let DataValue::Object(map) = item {
                    if let Some(next) = map.get(*head) {
                        collect_from(next, rest, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// 设置路径上的值，缺失的中间对象会被创建
pub fn set_path(doc: &mut Document, path: &str, value: DataValue) -> QueryCacheResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    set_in_document(doc, &segments, value, path)
}

fn set_in_document(
    doc: &mut Document,
    segments: &[&str],
    value: DataValue,
    full_path: &str,
) -> QueryCacheResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(crate::quick_error!(config, "更新路径不能为空"));
    };
    if rest.is_empty() {
        doc.insert(head.to_string(), value);
        return Ok(());
    }
    let entry = doc.entry(head.to_string()).or_insert(DataValue::Null);
    if entry.is_null() {
        *entry = DataValue::Object(Document::new());
    }
    set_in_value(entry, rest, value, full_path)
}

fn set_in_value(
    target: &mut DataValue,
    segments: &[&str],
    value: DataValue,
    full_path: &str,
) -> QueryCacheResult<()> {
    match target {
        DataValue::Object(map) => set_in_document(map, segments, value, full_path),
        DataValue::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Err(crate::quick_error!(config, "更新路径不能为空"));
            };
            let index = head.parse::<usize>().map_err(|_| {
                crate::quick_error!(config, format!("无法在数组上设置非数字路径: {}", full_path))
            })?;
            if items.len() <= index {
                items.resize(index + 1, DataValue::Null);
            }
            if rest.is_empty() {
                items[index] = value;
                return Ok(());
            }
            let slot = &mut items[index];
            if slot.is_null() {
                *slot = DataValue::Object(Document::new());
            }
            set_in_value(slot, rest, value, full_path)
        }
        other => Err(crate::quick_error!(
            config,
            format!("无法在 {} 类型字段上设置路径: {}", other.type_name(), full_path)
        )),
    }
}

/// 删除路径上的值并返回被删除的值
///
/// 数组元素不会被移除，而是置为 null
pub fn unset_path(doc: &mut Document, path: &str) -> Option<DataValue> {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };
    let Some(parent_path) = parent_path else {
        return doc.remove(last);
    };
    match get_path_mut(doc, parent_path)? {
        DataValue::Object(map) => map.remove(last),
        DataValue::Array(items) => {
            let slot = items.get_mut(last.parse::<usize>().ok()?)?;
            Some(std::mem::replace(slot, DataValue::Null))
        }
        _ => None,
    }
}

/// 两个路径是否重叠：相等或一方是另一方的前缀
pub fn paths_overlap(a: &str, b: &str) -> bool {
    a == b || is_prefix_of(a, b) || is_prefix_of(b, a)
}

/// `prefix` 是否为 `path` 的上级路径
pub fn is_prefix_of(prefix: &str, path: &str) -> bool {
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'.'
}
