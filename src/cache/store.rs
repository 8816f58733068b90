//! 缓存存储抽象
//!
//! 查询运行时和失效处理器只通过 [`CacheStore`] 访问缓存。
//! 条目写入与条目删除都是原子脚本：依赖集合的登记和清理与条目本身同步完成

use crate::error::QueryCacheResult;
use async_trait::async_trait;
use futures::future::join_all;
use rat_logger::warn;

/// 一条待写入的查询结果
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry {
    /// 结果键 `Q:...`
    pub key: String,
    /// 描述符哈希
    pub hash: String,
    /// 序列化后的结果数组
    pub value: String,
    /// 结果文档ID
    pub owned_ids: Vec<String>,
    /// 填充文档ID
    pub populated_ids: Vec<String>,
    /// 计数（仅 cacheCount 无限时随条目写入）
    pub count: Option<u64>,
    /// 过期时间（秒）
    pub expiry_secs: u64,
}

/// 批量失效中的单个操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOp {
    /// 删除单个结果键
    DeleteQuery(String),
    /// 删除集合中的全部结果键，可按描述符哈希过滤
    DeleteQueriesIn {
        set_key: String,
        hash: Option<String>,
    },
}

/// 缓存存储接口
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取字符串值
    async fn get(&self, key: &str) -> QueryCacheResult<Option<String>>;

    /// 写入字符串值并设置过期时间（秒）
    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> QueryCacheResult<()>;

    /// 读取哈希字段
    async fn hget(&self, key: &str, field: &str) -> QueryCacheResult<Option<String>>;

    /// 仅当哈希存在时设置字段，返回是否写入
    async fn hset_if_exists(&self, key: &str, field: &str, value: &str) -> QueryCacheResult<bool>;

    /// 集合成员
    async fn smembers(&self, key: &str) -> QueryCacheResult<Vec<String>>;

    /// 多个集合的并集
    async fn sunion(&self, keys: &[String]) -> QueryCacheResult<Vec<String>>;

    /// 仅当新的 TTL 大于当前剩余 TTL 时设置，返回是否修改
    async fn expire_gt(&self, key: &str, secs: u64) -> QueryCacheResult<bool>;

    /// 原子写入结果条目并登记依赖集合
    async fn write_query_entry(&self, entry: &QueryEntry) -> QueryCacheResult<()>;

    /// 原子删除结果条目及其依赖集合成员关系，返回条目是否存在
    async fn delete_query(&self, key: &str) -> QueryCacheResult<bool>;

    /// 删除集合中的结果条目，返回真正被删除的键
    async fn delete_queries_in(
        &self,
        set_key: &str,
        hash: Option<&str>,
    ) -> QueryCacheResult<Vec<String>>;

    /// 批量执行失效操作，返回真正被删除的键（去重）
    ///
    /// 不同键之间的删除相互独立，单个操作失败只记录日志
    async fn exec_batch(&self, ops: &[InvalidationOp]) -> Vec<String> {
        let futures = ops.iter().map(|op| async move {
            match op {
                InvalidationOp::DeleteQuery(key) => {
                    self.delete_query(key).await.map(|deleted| {
                        if deleted { vec![key.clone()] } else { Vec::new() }
                    })
                }
                InvalidationOp::DeleteQueriesIn { set_key, hash } => {
                    self.delete_queries_in(set_key, hash.as_deref()).await
                }
            }
        });

        let mut evicted: Vec<String> = Vec::new();
        for (op, result) in ops.iter().zip(join_all(futures).await) {
            match result {
                Ok(keys) => {
                    for key in keys {
                        if !evicted.contains(&key) {
                            evicted.push(key);
                        }
                    }
                }
                Err(e) => warn!("缓存失效操作失败，已忽略: {:?}, 错误: {}", op, e),
            }
        }
        evicted
    }
}
