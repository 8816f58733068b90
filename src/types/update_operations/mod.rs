use crate::types::data_value::{DataValue, Document};
use std::collections::BTreeMap;

/// 更新操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateOperator {
    /// 设置为当前时间
    CurrentDate,
    /// 原子性增加
    Inc,
    /// 取较小值
    Min,
    /// 取较大值
    Max,
    /// 原子性乘法
    Mul,
    /// 字段改名
    Rename,
    /// 直接设置值
    Set,
    /// 仅在插入时设置
    SetOnInsert,
    /// 删除字段
    Unset,
    /// 数组集合添加
    AddToSet,
    /// 移除数组首/尾元素
    Pop,
    /// 数组追加
    Push,
}

impl UpdateOperator {
    /// 从 `$` 操作符名称解析
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "$currentDate" => UpdateOperator::CurrentDate,
            "$inc" => UpdateOperator::Inc,
            "$min" => UpdateOperator::Min,
            "$max" => UpdateOperator::Max,
            "$mul" => UpdateOperator::Mul,
            "$rename" => UpdateOperator::Rename,
            "$set" => UpdateOperator::Set,
            "$setOnInsert" => UpdateOperator::SetOnInsert,
            "$unset" => UpdateOperator::Unset,
            "$addToSet" => UpdateOperator::AddToSet,
            "$pop" => UpdateOperator::Pop,
            "$push" => UpdateOperator::Push,
            _ => return None,
        };
        Some(op)
    }

    /// `$` 操作符名称
    pub fn name(&self) -> &'static str {
        match self {
            UpdateOperator::CurrentDate => "$currentDate",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Min => "$min",
            UpdateOperator::Max => "$max",
            UpdateOperator::Mul => "$mul",
            UpdateOperator::Rename => "$rename",
            UpdateOperator::Set => "$set",
            UpdateOperator::SetOnInsert => "$setOnInsert",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::AddToSet => "$addToSet",
            UpdateOperator::Pop => "$pop",
            UpdateOperator::Push => "$push",
        }
    }
}

/// 规范化的更新文档：操作符 -> { 路径 -> 值 }
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDocument {
    pub(crate) operations: BTreeMap<UpdateOperator, Document>,
}

impl UpdateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个操作
    pub fn with(
        mut self,
        operator: UpdateOperator,
        path: impl Into<String>,
        value: impl Into<DataValue>,
    ) -> Self {
        self.operations
            .entry(operator)
            .or_default()
            .insert(path.into(), value.into());
        self
    }

    pub fn set(self, path: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.with(UpdateOperator::Set, path, value)
    }

    pub fn inc(self, path: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.with(UpdateOperator::Inc, path, value)
    }

    pub fn unset(self, path: impl Into<String>) -> Self {
        self.with(UpdateOperator::Unset, path, DataValue::from(""))
    }

    pub fn push(self, path: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.with(UpdateOperator::Push, path, value)
    }

    /// 某个操作符的字段映射
    pub fn get(&self, operator: UpdateOperator) -> Option<&Document> {
        self.operations.get(&operator)
    }

    /// 按操作符顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&UpdateOperator, &Document)> {
        self.operations.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.values().all(|fields| fields.is_empty())
    }

    /// 转换回 `$` 操作符形式的原始文档
    pub fn to_document(&self) -> Document {
        self.operations
            .iter()
            .map(|(op, fields)| (op.name().to_string(), DataValue::Object(fields.clone())))
            .collect()
    }
}
