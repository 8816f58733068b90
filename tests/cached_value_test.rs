//! 缓存值测试：与查询共享缓存存储，只按过期时间淘汰

mod common;

use common::setup;
use rat_querycache::types::DataValue;
use rat_querycache::{CacheStore, DocumentStore, document};

#[tokio::test]
async fn test_cached_value_shares_store_and_ignores_writes() {
    let fx = setup(false, vec![]).await;
    let documents = fx.documents.clone();
    let count_by_kind = fx
        .manager
        .cached_value("countByKind", None, move |params: Vec<DataValue>| {
            let documents = documents.clone();
            async move {
                let kind = params.into_iter().next().unwrap_or(DataValue::Null);
                let total = documents.count("Vehicle", &document! { "kind" => kind }).await?;
                Ok(Some(total))
            }
        })
        .unwrap();

    let car = [DataValue::from("car")];
    assert_eq!(count_by_kind.exec(&car).await.unwrap(), Some(4));
    assert_eq!(count_by_kind.exec(&car).await.unwrap(), Some(4));
    assert_eq!(fx.documents.read_count(), 1);

    let key = count_by_kind.cache_key(&car);
    assert_eq!(key, "v:countByKind[\"car\"]");
    assert_eq!(fx.cache.get(&key).await.unwrap(), Some("4".to_string()));
    assert_eq!(fx.cache.ttl_secs(&key).await.unwrap(), Some(43200));

    // 写操作不会使缓存值失效，需要显式重新计算
    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Golf", "kind" => "car" })
        .await
        .unwrap();
    assert_eq!(count_by_kind.exec(&car).await.unwrap(), Some(4));
    assert_eq!(count_by_kind.rehydrate(&car).await.unwrap(), Some(5));
    assert_eq!(count_by_kind.fetch(&car).await, Some(Some(5)));
}
