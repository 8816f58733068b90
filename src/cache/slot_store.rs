//! 基于槽位的缓存存储实现
//!
//! 后端只需要提供按键读写整个槽位（哈希或集合，附带过期时间）的能力，
//! 哈希/集合命令、TTL 比较和原子脚本都在这里实现一次。
//! 所有修改操作在同一把脚本锁下执行，与单线程脚本执行的缓存服务器语义一致

use super::keys::{
    FIELD_COUNT, FIELD_OWNED, FIELD_POPULATED, FIELD_VALUE, all_key, hash_of_query_key, owned_key,
    populated_key,
};
use super::store::{CacheStore, QueryEntry};
use crate::error::QueryCacheResult;
use async_trait::async_trait;
use chrono::Utc;
use rat_logger::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

/// 槽位中保存的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SlotValue {
    String(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

/// 一个键对应的槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// 过期时间点（毫秒时间戳），None 表示不过期
    pub expires_at_ms: Option<i64>,
    pub value: SlotValue,
}

impl Slot {
    fn new(value: SlotValue) -> Self {
        Self {
            expires_at_ms: None,
            value,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }

    /// 剩余存活时间（毫秒），None 表示不过期
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_at_ms.map(|at| (at - now_ms).max(0))
    }
}

/// 槽位读写后端
#[async_trait]
pub trait SlotBackend: Send + Sync {
    async fn load(&self, key: &str) -> QueryCacheResult<Option<Slot>>;
    async fn store(&self, key: &str, slot: &Slot) -> QueryCacheResult<()>;
    async fn remove(&self, key: &str) -> QueryCacheResult<()>;
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn wrong_type(key: &str) -> crate::error::QueryCacheError {
    crate::quick_error!(cache, format!("键 {} 的类型不匹配", key))
}

/// 在槽位后端之上实现的缓存存储
pub struct SlotCacheStore<B: SlotBackend> {
    pub(crate) backend: B,
    script_lock: Mutex<()>,
}

impl<B: SlotBackend> SlotCacheStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            script_lock: Mutex::new(()),
        }
    }

    /// 键是否存在（未过期）
    pub async fn exists(&self, key: &str) -> QueryCacheResult<bool> {
        Ok(self.live(key).await?.is_some())
    }

    /// 剩余 TTL（秒），None 表示键不存在或不过期
    pub async fn ttl_secs(&self, key: &str) -> QueryCacheResult<Option<u64>> {
        let slot = self.live(key).await?;
        Ok(slot
            .and_then(|s| s.remaining_ms(now_ms()))
            .map(|ms| ((ms + 999) / 1000) as u64))
    }

    async fn live(&self, key: &str) -> QueryCacheResult<Option<Slot>> {
        match self.backend.load(key).await? {
            Some(slot) if slot.is_expired(now_ms()) => {
                self.backend.remove(key).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn load_hash(&self, key: &str) -> QueryCacheResult<Option<BTreeMap<String, String>>> {
        match self.live(key).await? {
            None => Ok(None),
            Some(Slot {
                value: SlotValue::Hash(map),
                ..
            }) => Ok(Some(map)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn load_set(&self, key: &str) -> QueryCacheResult<Option<Slot>> {
        match self.live(key).await? {
            Some(slot) if !matches!(slot.value, SlotValue::Set(_)) => Err(wrong_type(key)),
            other => Ok(other),
        }
    }

    fn members(slot: &Option<Slot>) -> Vec<String> {
        match slot {
            Some(Slot {
                value: SlotValue::Set(set),
                ..
            }) => set.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    async fn sadd_locked(&self, key: &str, member: &str) -> QueryCacheResult<()> {
        let mut slot = self
            .load_set(key)
            .await?
            .unwrap_or_else(|| Slot::new(SlotValue::Set(BTreeSet::new())));
        if let SlotValue::Set(set) = &mut slot.value {
            set.insert(member.to_string());
        }
        self.backend.store(key, &slot).await
    }

    async fn srem_locked(&self, key: &str, member: &str) -> QueryCacheResult<()> {
        let Some(mut slot) = self.load_set(key).await? else {
            return Ok(());
        };
        let now_empty = match &mut slot.value {
            SlotValue::Set(set) => {
                if !set.remove(member) {
                    return Ok(());
                }
                set.is_empty()
            }
            _ => return Err(wrong_type(key)),
        };
        // 空集合等同于不存在
        if now_empty {
            self.backend.remove(key).await
        } else {
            self.backend.store(key, &slot).await
        }
    }

    async fn expire_gt_locked(&self, key: &str, secs: u64) -> QueryCacheResult<bool> {
        let Some(mut slot) = self.live(key).await? else {
            return Ok(false);
        };
        let now = now_ms();
        let requested_ms = (secs as i64).saturating_mul(1000);
        // 不过期的键视为剩余 -1
        let current_ms = slot.remaining_ms(now).unwrap_or(-1);
        if requested_ms <= current_ms {
            return Ok(false);
        }
        slot.expires_at_ms = Some(now + requested_ms);
        self.backend.store(key, &slot).await?;
        Ok(true)
    }

    async fn delete_query_locked(&self, key: &str) -> QueryCacheResult<bool> {
        let Some(fields) = self.load_hash(key).await? else {
            return Ok(false);
        };
        let Some(owned) = fields.get(FIELD_OWNED) else {
            return Ok(false);
        };
        for id in owned.split_whitespace() {
            self.srem_locked(&owned_key(id), key).await?;
        }
        if let Some(populated) = fields.get(FIELD_POPULATED) {
            for id in populated.split_whitespace() {
                self.srem_locked(&populated_key(id), key).await?;
            }
        }
        if let Some(hash) = hash_of_query_key(key) {
            self.srem_locked(&all_key(hash), key).await?;
        }
        self.backend.remove(key).await?;
        Ok(true)
    }
}

#[async_trait]
impl<B: SlotBackend> CacheStore for SlotCacheStore<B> {
    async fn hget(&self, key: &str, field: &str) -> QueryCacheResult<Option<String>> {
        Ok(self
            .load_hash(key)
            .await?
            .and_then(|mut fields| fields.remove(field)))
    }

    async fn hset_if_exists(&self, key: &str, field: &str, value: &str) -> QueryCacheResult<bool> {
        let _guard = self.script_lock.lock().await;
        let Some(mut slot) = self.live(key).await? else {
            return Ok(false);
        };
        match &mut slot.value {
            SlotValue::Hash(fields) => {
                fields.insert(field.to_string(), value.to_string());
            }
            _ => return Err(wrong_type(key)),
        }
        self.backend.store(key, &slot).await?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> QueryCacheResult<Option<String>> {
        match self.live(key).await? {
            None => Ok(None),
            Some(Slot {
                value: SlotValue::String(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, secs: u64) -> QueryCacheResult<()> {
        let _guard = self.script_lock.lock().await;
        let slot = Slot {
            expires_at_ms: Some(now_ms() + (secs as i64).saturating_mul(1000)),
            value: SlotValue::String(value.to_string()),
        };
        self.backend.store(key, &slot).await
    }

    async fn smembers(&self, key: &str) -> QueryCacheResult<Vec<String>> {
        Ok(Self::members(&self.load_set(key).await?))
    }

    async fn sunion(&self, keys: &[String]) -> QueryCacheResult<Vec<String>> {
        let mut union = BTreeSet::new();
        for key in keys {
            union.extend(Self::members(&self.load_set(key).await?));
        }
        Ok(union.into_iter().collect())
    }

    async fn expire_gt(&self, key: &str, secs: u64) -> QueryCacheResult<bool> {
        let _guard = self.script_lock.lock().await;
        self.expire_gt_locked(key, secs).await
    }

    async fn write_query_entry(&self, entry: &QueryEntry) -> QueryCacheResult<()> {
        let _guard = self.script_lock.lock().await;

        // 旧条目的依赖登记先清理，避免集合中残留过期成员
        self.delete_query_locked(&entry.key).await?;

        let mut fields = BTreeMap::new();
        fields.insert(FIELD_VALUE.to_string(), entry.value.clone());
        fields.insert(FIELD_OWNED.to_string(), entry.owned_ids.join(" "));
        fields.insert(FIELD_POPULATED.to_string(), entry.populated_ids.join(" "));
        if let Some(count) = entry.count {
            fields.insert(FIELD_COUNT.to_string(), count.to_string());
        }
        self.backend
            .store(&entry.key, &Slot::new(SlotValue::Hash(fields)))
            .await?;

        let mut sets = vec![all_key(&entry.hash)];
        sets.extend(entry.owned_ids.iter().map(|id| owned_key(id)));
        sets.extend(entry.populated_ids.iter().map(|id| populated_key(id)));
        for set_key in &sets {
            self.sadd_locked(set_key, &entry.key).await?;
        }

        self.expire_gt_locked(&entry.key, entry.expiry_secs).await?;
        for set_key in &sets {
            self.expire_gt_locked(set_key, entry.expiry_secs).await?;
        }

        debug!(
            "写入缓存条目: {}, 依赖集合数量: {}",
            entry.key,
            sets.len()
        );
        Ok(())
    }

    async fn delete_query(&self, key: &str) -> QueryCacheResult<bool> {
        let _guard = self.script_lock.lock().await;
        self.delete_query_locked(key).await
    }

    async fn delete_queries_in(
        &self,
        set_key: &str,
        hash: Option<&str>,
    ) -> QueryCacheResult<Vec<String>> {
        let _guard = self.script_lock.lock().await;
        let prefix = hash.map(|h| format!("Q:{}", h));
        let members = Self::members(&self.load_set(set_key).await?);
        let mut deleted = Vec::new();
        for member in members {
            if let Some(prefix) = &prefix {
                if !member.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if self.delete_query_locked(&member).await? {
                deleted.push(member);
            }
        }
        Ok(deleted)
    }
}
