//! 进程内缓存存储
//!
//! 适合测试和单进程部署，过期在访问时惰性清理

use super::slot_store::{Slot, SlotBackend, SlotCacheStore};
use crate::error::QueryCacheResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// 进程内槽位后端
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<HashMap<String, Slot>>,
}

#[async_trait]
impl SlotBackend for MemoryBackend {
    async fn load(&self, key: &str) -> QueryCacheResult<Option<Slot>> {
        Ok(self.slots.lock().get(key).cloned())
    }

    async fn store(&self, key: &str, slot: &Slot) -> QueryCacheResult<()> {
        self.slots.lock().insert(key.to_string(), slot.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> QueryCacheResult<()> {
        self.slots.lock().remove(key);
        Ok(())
    }
}

/// 进程内缓存存储
pub type MemoryCacheStore = SlotCacheStore<MemoryBackend>;

impl SlotCacheStore<MemoryBackend> {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::default())
    }

    /// 当前所有键（含尚未惰性清理的过期键），按字典序
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backend.slots.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 清空全部数据
    pub fn flush(&self) {
        self.backend.slots.lock().clear();
    }
}

impl Default for SlotCacheStore<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::{FIELD_COUNT, FIELD_OWNED, FIELD_VALUE};
    use crate::cache::store::{CacheStore, InvalidationOp, QueryEntry};

    const HASH: &str = "Static1_________";

    fn entry(params: &str, owned: &[&str], populated: &[&str]) -> QueryEntry {
        QueryEntry {
            key: format!("Q:{}{}", HASH, params),
            hash: HASH.to_string(),
            value: "[]".to_string(),
            owned_ids: owned.iter().map(|s| s.to_string()).collect(),
            populated_ids: populated.iter().map(|s| s.to_string()).collect(),
            count: None,
            expiry_secs: 100,
        }
    }

    #[tokio::test]
    async fn test_write_registers_dependency_sets() {
        let store = MemoryCacheStore::new();
        let e = entry("[]", &["a1", "a2"], &["d1"]);
        store.write_query_entry(&e).await.unwrap();

        assert_eq!(store.hget(&e.key, FIELD_VALUE).await.unwrap(), Some("[]".to_string()));
        assert_eq!(store.hget(&e.key, FIELD_OWNED).await.unwrap(), Some("a1 a2".to_string()));
        assert_eq!(store.hget(&e.key, FIELD_COUNT).await.unwrap(), None);
        assert_eq!(store.smembers("O:a1").await.unwrap(), vec![e.key.clone()]);
        assert_eq!(store.smembers("P:d1").await.unwrap(), vec![e.key.clone()]);
        assert_eq!(store.smembers(&format!("A:{}", HASH)).await.unwrap(), vec![e.key.clone()]);
        assert_eq!(store.ttl_secs(&e.key).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_delete_cleans_every_membership() {
        let store = MemoryCacheStore::new();
        let e = entry("[]", &["a1"], &["d1"]);
        store.write_query_entry(&e).await.unwrap();

        assert!(store.delete_query(&e.key).await.unwrap());
        assert!(!store.delete_query(&e.key).await.unwrap());
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_expire_gt_never_shortens() {
        let store = MemoryCacheStore::new();
        let e = entry("[]", &[], &[]);
        store.write_query_entry(&e).await.unwrap();

        assert!(!store.expire_gt(&e.key, 50).await.unwrap());
        assert_eq!(store.ttl_secs(&e.key).await.unwrap(), Some(100));
        assert!(store.expire_gt(&e.key, 500).await.unwrap());
        assert_eq!(store.ttl_secs(&e.key).await.unwrap(), Some(500));
        assert!(!store.expire_gt("missing", 500).await.unwrap());
    }

    #[tokio::test]
    async fn test_string_values_and_type_checks() {
        let store = MemoryCacheStore::new();
        store.set_ex("v:total[]", "42", 30).await.unwrap();
        assert_eq!(store.get("v:total[]").await.unwrap(), Some("42".to_string()));
        assert_eq!(store.ttl_secs("v:total[]").await.unwrap(), Some(30));
        assert_eq!(store.get("v:missing[]").await.unwrap(), None);

        assert!(store.hget("v:total[]", FIELD_VALUE).await.is_err());
        let e = entry("[]", &["a1"], &[]);
        store.write_query_entry(&e).await.unwrap();
        assert!(store.get(&e.key).await.is_err());
    }

    #[tokio::test]
    async fn test_rewrite_drops_stale_memberships() {
        let store = MemoryCacheStore::new();
        store.write_query_entry(&entry("[]", &["a1"], &[])).await.unwrap();
        store.write_query_entry(&entry("[]", &["a2"], &[])).await.unwrap();

        assert!(store.smembers("O:a1").await.unwrap().is_empty());
        assert_eq!(store.smembers("O:a2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_queries_in_filters_by_hash() {
        let store = MemoryCacheStore::new();
        let mine = entry("[1]", &[], &["d1"]);
        let mut other = entry("[1]", &[], &["d1"]);
        other.hash = "Other___________".to_string();
        other.key = format!("Q:{}[1]", other.hash);
        store.write_query_entry(&mine).await.unwrap();
        store.write_query_entry(&other).await.unwrap();

        let deleted = store.delete_queries_in("P:d1", Some(HASH)).await.unwrap();
        assert_eq!(deleted, vec![mine.key.clone()]);
        assert_eq!(store.smembers("P:d1").await.unwrap(), vec![other.key.clone()]);
    }

    #[tokio::test]
    async fn test_hset_if_exists_does_not_create() {
        let store = MemoryCacheStore::new();
        assert!(!store.hset_if_exists("Q:nothing", FIELD_COUNT, "3").await.unwrap());
        assert!(store.keys().is_empty());

        let e = entry("[]", &[], &[]);
        store.write_query_entry(&e).await.unwrap();
        assert!(store.hset_if_exists(&e.key, FIELD_COUNT, "3").await.unwrap());
        assert_eq!(store.hget(&e.key, FIELD_COUNT).await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_exec_batch_reports_only_existing_keys() {
        let store = MemoryCacheStore::new();
        let a = entry("[\"a\"]", &["x"], &[]);
        let b = entry("[\"b\"]", &["x"], &[]);
        store.write_query_entry(&a).await.unwrap();
        store.write_query_entry(&b).await.unwrap();

        let evicted = store
            .exec_batch(&[
                InvalidationOp::DeleteQuery(a.key.clone()),
                InvalidationOp::DeleteQuery("Q:Static1_________[\"zzz\"]".to_string()),
                InvalidationOp::DeleteQueriesIn {
                    set_key: format!("A:{}", HASH),
                    hash: None,
                },
            ])
            .await;
        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&a.key));
        assert!(evicted.contains(&b.key));
        assert!(store.keys().is_empty());
    }
}
