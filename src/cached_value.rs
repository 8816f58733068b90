//! 缓存值
//!
//! 与描述符无关的通用读穿透缓存：按名称和参数缓存任意可序列化的计算结果，
//! 只靠过期时间淘汰，写操作不会使其失效

use crate::cache::keys::value_key;
use crate::cache::store::CacheStore;
use crate::error::QueryCacheResult;
use crate::types::data_value::DataValue;
use futures::future::{BoxFuture, FutureExt};
use rat_logger::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

type Fetcher<T> =
    Arc<dyn Fn(Vec<DataValue>) -> BoxFuture<'static, QueryCacheResult<Option<T>>> + Send + Sync>;

/// 按名称缓存的计算结果
///
/// `None` 结果同样会被缓存，与未命中区分开
pub struct CachedValue<T> {
    name: String,
    expiry_secs: u64,
    cache: Arc<dyn CacheStore>,
    fetcher: Fetcher<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CachedValue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new<F, Fut>(
        name: impl Into<String>,
        expiry_secs: u64,
        cache: Arc<dyn CacheStore>,
        fetcher: F,
    ) -> QueryCacheResult<Self>
    where
        F: Fn(Vec<DataValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryCacheResult<Option<T>>> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::quick_error!(config, "缓存值名称不能为空"));
        }
        if expiry_secs == 0 {
            return Err(crate::quick_error!(config, "过期时间不能为零"));
        }
        Ok(Self {
            name,
            expiry_secs,
            cache,
            fetcher: Arc::new(move |params| fetcher(params).boxed()),
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_key(&self, params: &[DataValue]) -> String {
        value_key(&self.name, params)
    }

    /// 读取缓存，未命中时计算并写入
    pub async fn exec(&self, params: &[DataValue]) -> QueryCacheResult<Option<T>> {
        let key = self.cache_key(params);
        if let Some(cached) = self.read(&key).await {
            return Ok(cached);
        }
        let data = (self.fetcher)(params.to_vec()).await?;
        self.write(&key, &data).await;
        Ok(data)
    }

    /// 只读取缓存，外层 `None` 表示未命中
    pub async fn fetch(&self, params: &[DataValue]) -> Option<Option<T>> {
        self.read(&self.cache_key(params)).await
    }

    /// 重新计算并覆盖缓存
    pub async fn rehydrate(&self, params: &[DataValue]) -> QueryCacheResult<Option<T>> {
        let data = (self.fetcher)(params.to_vec()).await?;
        self.write(&self.cache_key(params), &data).await;
        Ok(data)
    }

    /// 直接计算，不读写缓存
    pub async fn fallback(&self, params: &[DataValue]) -> QueryCacheResult<Option<T>> {
        (self.fetcher)(params.to_vec()).await
    }

    async fn read(&self, key: &str) -> Option<Option<T>> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("读取缓存值失败，按未命中处理: key={}, 错误: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("缓存值解码失败，按未命中处理: key={}, 错误: {}", key, e);
                None
            }
        }
    }

    async fn write(&self, key: &str, data: &Option<T>) {
        let json = match serde_json::to_string(data) {
            Ok(json) => json,
            Err(e) => {
                warn!("缓存值序列化失败，已忽略: key={}, 错误: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, &json, self.expiry_secs).await {
            warn!("写入缓存值失败，已忽略: key={}, 错误: {}", key, e);
        }
    }
}

impl<T> std::fmt::Debug for CachedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedValue")
            .field("name", &self.name)
            .field("expiry_secs", &self.expiry_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FleetSummary {
        kind: String,
        total: u64,
    }

    fn summary(calls: Arc<AtomicU64>) -> CachedValue<FleetSummary> {
        CachedValue::new("fleetSummary", 60, Arc::new(MemoryCacheStore::new()), move |params| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let kind = params.first().and_then(|p| p.as_str()).unwrap_or_default().to_string();
                if kind.is_empty() {
                    return Ok(None);
                }
                Ok(Some(FleetSummary { kind, total: 4 }))
            }
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_exec_caches_per_params() {
        let calls = Arc::new(AtomicU64::new(0));
        let value = summary(calls.clone());
        let car = [DataValue::from("car")];

        assert_eq!(value.cache_key(&car), "v:fleetSummary[\"car\"]");
        assert_eq!(value.fetch(&car).await, None);
        let first = value.exec(&car).await.unwrap();
        let second = value.exec(&car).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        value.exec(&[DataValue::from("truck")]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_none_result_is_cached() {
        let calls = Arc::new(AtomicU64::new(0));
        let value = summary(calls.clone());
        assert_eq!(value.exec(&[]).await.unwrap(), None);
        assert_eq!(value.fetch(&[]).await, Some(None));
        assert_eq!(value.exec(&[]).await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rehydrate_and_fallback() {
        let calls = Arc::new(AtomicU64::new(0));
        let value = summary(calls.clone());
        let car = [DataValue::from("car")];

        value.fallback(&car).await.unwrap();
        assert_eq!(value.fetch(&car).await, None);
        value.rehydrate(&car).await.unwrap();
        assert!(value.fetch(&car).await.is_some());
        value.exec(&car).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejects_empty_name_and_zero_expiry() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let fetch = |_: Vec<DataValue>| async { Ok(Some(1u64)) };
        assert!(CachedValue::new("", 60, cache.clone(), fetch).unwrap_err().is_config());
        assert!(CachedValue::new("n", 0, cache, fetch).unwrap_err().is_config());
    }
}
