//! 重新填充测试：自动与手动模式、参数还原、异常键

mod common;

use common::{oid, setup};
use rat_querycache::types::{DataValue, QueryFilter, SortConfig, UpdateDocument, UpdateOptions};
use rat_querycache::{DocumentStore, ExecOptions, QueryDescriptor, document};

fn cars() -> QueryDescriptor {
    QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! { "kind" => "car" })
        .build()
        .unwrap()
}

fn by_kind() -> QueryDescriptor {
    QueryDescriptor::builder()
        .model("Vehicle")
        .filter(QueryFilter::from_fn(1, |p| document! { "kind" => p[0].clone() }))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_auto_rehydrate_refills_evicted_key() {
    let fx = setup(true, vec![("cars", cars())]).await;
    let query = fx.manager.query("cars").unwrap();
    query.exec(&ExecOptions::new()).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Golf", "kind" => "car" })
        .await
        .unwrap();
    assert_eq!(fx.documents.read_count(), 2);
    assert_eq!(fx.query_keys().len(), 1);

    assert_eq!(query.exec(&ExecOptions::new()).await.unwrap().len(), 5);
    assert_eq!(fx.documents.read_count(), 2);

    let stats = fx.manager.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.rehydrations, 1);
    // 这是新插入后的第一次调用方读取，已经命中
    assert_eq!(stats.hits, 1);
    assert!(fx.manager.rehydrate().await.is_empty());
}

#[tokio::test]
async fn test_manual_rehydrate_drains_pending_keys() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    let car = ExecOptions::params(vec![DataValue::from("car")]);
    let truck = ExecOptions::params(vec![DataValue::from("truck")]);
    query.exec(&car).await.unwrap();
    query.exec(&truck).await.unwrap();

    fx.manager
        .store()
        .update(
            "Vehicle",
            &document! { "_id" => oid(0x10) },
            &UpdateDocument::new().set("kind", "truck"),
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(fx.manager.stats().rehydrations, 0);

    let mut refilled = fx.manager.rehydrate().await;
    refilled.sort();
    let mut expected = vec![
        query.get_cache_key(&[DataValue::from("car")]).unwrap(),
        query.get_cache_key(&[DataValue::from("truck")]).unwrap(),
    ];
    expected.sort();
    assert_eq!(refilled, expected);
    assert_eq!(fx.query_keys(), expected);

    let reads = fx.documents.read_count();
    assert_eq!(query.exec(&car).await.unwrap().len(), 3);
    assert_eq!(query.exec(&truck).await.unwrap().len(), 4);
    assert_eq!(fx.documents.read_count(), reads);

    assert!(fx.manager.rehydrate().await.is_empty());
}

#[tokio::test]
async fn test_rehydrate_respects_descriptor_flag() {
    let lazy = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! { "kind" => "car" })
        .rehydrate(false)
        .build()
        .unwrap();
    let fx = setup(true, vec![("lazyCars", lazy)]).await;
    fx.manager.query("lazyCars").unwrap().exec(&ExecOptions::new()).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Golf", "kind" => "car" })
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(fx.manager.stats().rehydrations, 0);
}

#[tokio::test]
async fn test_rehydrate_uses_cache_window() {
    let cheapest = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! {})
        .sort(vec![SortConfig::asc("price")])
        .cache_count(3)
        .build()
        .unwrap();
    let fx = setup(true, vec![("cheapest", cheapest)]).await;
    let query = fx.manager.query("cheapest").unwrap();
    query.exec(&ExecOptions::new().with_limit(2)).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Scooter", "kind" => "bike", "price" => 900 })
        .await
        .unwrap();

    let reads = fx.documents.read_count();
    let page = query
        .exec(&ExecOptions::new().with_skip(1).with_limit(2))
        .await
        .unwrap();
    let ordered: Vec<&str> = page.iter().filter_map(|d| d.get("name")?.as_str()).collect();
    assert_eq!(ordered, vec!["Vespa", "Monster"]);
    assert_eq!(fx.documents.read_count(), reads);
}

#[tokio::test]
async fn test_unparseable_and_unknown_keys_are_skipped() {
    let fx = setup(false, vec![("cars", cars())]).await;
    let refilled = fx
        .manager
        .rehydrate_keys(&[
            "garbage".to_string(),
            "Q:unknownhash00000[]".to_string(),
            "Q:short".to_string(),
        ])
        .await;
    assert!(refilled.is_empty());
    assert_eq!(fx.documents.read_count(), 0);

    let key = fx.manager.query("cars").unwrap().get_cache_key(&[]).unwrap();
    let refilled = fx.manager.rehydrate_keys(&["garbage".to_string(), key.clone()]).await;
    assert_eq!(refilled, vec![key]);
    assert_eq!(fx.query_keys().len(), 1);
}
