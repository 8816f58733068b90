//! 写入驱动的失效测试：插入、更新、upsert、删除与填充文档

mod common;

use common::{id, names, oid, setup};
use rat_querycache::invalidation::ChangeEffect;
use rat_querycache::types::{DataValue, Population, QueryFilter, UpdateDocument, UpdateOptions};
use rat_querycache::{DocumentStore, ExecOptions, InvalidationOp, QueryDescriptor, document};

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
        .select(document! { "price" => 1 })
        .build()
        .unwrap()
}

fn min_price() -> QueryDescriptor {
    QueryDescriptor::builder()
        .model("Vehicle")
        .filter(QueryFilter::from_fn(1, |p| {
            document! { "price" => document! { "$gte" => p[0].clone() } }
        }))
        .build()
        .unwrap()
}

fn cars_with_driver() -> QueryDescriptor {
    QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! { "kind" => "car" })
        .select(document! { "name" => 1 })
        .populate(vec![Population::new("driver", "Driver").select(document! { "name" => 1 })])
        .build()
        .unwrap()
}

fn kind(value: &str) -> ExecOptions {
    ExecOptions::params(vec![DataValue::from(value)])
}

#[tokio::test]
async fn test_insert_outside_static_filter_is_ignored() {
    let fx = setup(false, vec![("cars", cars())]).await;
    let query = fx.manager.query("cars").unwrap();
    query.exec(&ExecOptions::new()).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Unimog", "kind" => "truck" })
        .await
        .unwrap();
    assert_eq!(fx.manager.stats().evictions, 0);
    assert_eq!(fx.query_keys().len(), 1);
}

#[tokio::test]
async fn test_insert_only_evicts_matching_param_key() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    query.exec(&kind("car")).await.unwrap();
    query.exec(&kind("truck")).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Golf", "kind" => "car", "price" => 25000 })
        .await
        .unwrap();

    let remaining = fx.query_keys();
    assert_eq!(remaining, vec![query.get_cache_key(&[DataValue::from("truck")]).unwrap()]);
    assert_eq!(query.exec(&kind("car")).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_complex_query_insert_evicts_every_parameterization() {
    let fx = setup(false, vec![("minPrice", min_price())]).await;
    let query = fx.manager.query("minPrice").unwrap();
    query.exec(&ExecOptions::params(vec![DataValue::from(30000)])).await.unwrap();
    query.exec(&ExecOptions::params(vec![DataValue::from(45000)])).await.unwrap();
    assert_eq!(fx.query_keys().len(), 2);

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Kei", "kind" => "car", "price" => 9000 })
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(fx.manager.stats().evictions, 2);
}

#[tokio::test]
async fn test_insert_can_be_excluded_per_descriptor() {
    let quiet = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! { "kind" => "car" })
        .invalidate_on_insert(false)
        .build()
        .unwrap();
    let fx = setup(false, vec![("quietCars", quiet)]).await;
    fx.manager.query("quietCars").unwrap().exec(&ExecOptions::new()).await.unwrap();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Golf", "kind" => "car" })
        .await
        .unwrap();
    assert_eq!(fx.query_keys().len(), 1);
}

#[tokio::test]
async fn test_update_of_untracked_field_keeps_cache() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    query.exec(&kind("car")).await.unwrap();

    fx.manager
        .store()
        .update(
            "Vehicle",
            &document! { "_id" => oid(0x10) },
            &UpdateDocument::new().set("name", "Civic Type R"),
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert_eq!(fx.manager.stats().evictions, 0);
    assert_eq!(fx.query_keys().len(), 1);
}

#[tokio::test]
async fn test_update_of_selected_field_evicts_key() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    query.exec(&kind("car")).await.unwrap();
    query.exec(&kind("truck")).await.unwrap();

    fx.manager
        .store()
        .update(
            "Vehicle",
            &document! { "_id" => oid(0x10) },
            &UpdateDocument::new().inc("price", 500),
            UpdateOptions::one(),
        )
        .await
        .unwrap();

    assert_eq!(
        fx.query_keys(),
        vec![query.get_cache_key(&[DataValue::from("truck")]).unwrap()]
    );
    let refreshed = query.exec(&kind("car")).await.unwrap();
    let civic = refreshed.iter().find(|d| d.get("_id") == Some(&id(0x10))).unwrap();
    assert_eq!(civic.get("price"), Some(&DataValue::Int(20500)));
}

#[tokio::test]
async fn test_update_of_dynamic_key_moves_between_params() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    query.exec(&kind("car")).await.unwrap();
    query.exec(&kind("truck")).await.unwrap();
    query.exec(&kind("van")).await.unwrap();

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

    assert_eq!(
        fx.query_keys(),
        vec![query.get_cache_key(&[DataValue::from("van")]).unwrap()]
    );
    assert_eq!(query.exec(&kind("car")).await.unwrap().len(), 3);
    assert_eq!(query.exec(&kind("truck")).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_update_leaving_static_filter_evicts() {
    let fx = setup(false, vec![("cars", cars())]).await;
    let query = fx.manager.query("cars").unwrap();
    query.exec(&ExecOptions::new()).await.unwrap();

    fx.manager
        .store()
        .update_raw(
            "Vehicle",
            &document! { "name" => "Mustang" },
            &document! { "$set" => document! { "kind" => "classic" } },
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(query.exec(&ExecOptions::new()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_without_match_is_silent() {
    let fx = setup(false, vec![("cars", cars())]).await;
    fx.manager.query("cars").unwrap().exec(&ExecOptions::new()).await.unwrap();

    let result = fx
        .manager
        .store()
        .update(
            "Vehicle",
            &document! { "name" => "Nope" },
            &UpdateDocument::new().set("kind", "car"),
            UpdateOptions::many(),
        )
        .await
        .unwrap();
    assert_eq!(result.matched, 0);
    assert_eq!(fx.query_keys().len(), 1);
}

#[tokio::test]
async fn test_upsert_is_treated_as_insert() {
    let fx = setup(false, vec![("cars", cars())]).await;
    let query = fx.manager.query("cars").unwrap();
    query.exec(&ExecOptions::new()).await.unwrap();

    let result = fx
        .manager
        .store()
        .update(
            "Vehicle",
            &document! { "name" => "Beetle", "kind" => "car" },
            &UpdateDocument::new().set("price", 15000),
            UpdateOptions::one().with_upsert(true),
        )
        .await
        .unwrap();
    assert!(result.upserted_id.is_some());
    assert!(fx.query_keys().is_empty());
    assert!(names(&query.exec(&ExecOptions::new()).await.unwrap()).contains(&"Beetle".to_string()));
}

#[tokio::test]
async fn test_delete_evicts_entries_owning_document() {
    let fx = setup(false, vec![("cars", cars()), ("byKind", by_kind())]).await;
    fx.manager.query("cars").unwrap().exec(&ExecOptions::new()).await.unwrap();
    let by_kind = fx.manager.query("byKind").unwrap();
    by_kind.exec(&kind("car")).await.unwrap();
    by_kind.exec(&kind("bike")).await.unwrap();

    let deleted = fx
        .manager
        .store()
        .delete("Vehicle", &document! { "_id" => oid(0x12) }, false)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    assert_eq!(
        fx.query_keys(),
        vec![by_kind.get_cache_key(&[DataValue::from("bike")]).unwrap()]
    );
    assert!(!fx.cache.keys().contains(&format!("O:{}", oid(0x12).to_hex())));
}

#[tokio::test]
async fn test_populated_document_changes() {
    let fx = setup(false, vec![("carsWithDriver", cars_with_driver())]).await;
    let query = fx.manager.query("carsWithDriver").unwrap();
    query.exec(&ExecOptions::new()).await.unwrap();

    // 未选中的字段
    fx.manager
        .store()
        .update(
            "Driver",
            &document! { "_id" => oid(0x01) },
            &UpdateDocument::new().inc("age", 1),
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert_eq!(fx.query_keys().len(), 1);

    // 未被任何缓存结果引用的司机
    fx.manager
        .store()
        .update(
            "Driver",
            &document! { "_id" => oid(0x04) },
            &UpdateDocument::new().set("name", "David"),
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert_eq!(fx.query_keys().len(), 1);

    fx.manager
        .store()
        .update(
            "Driver",
            &document! { "_id" => oid(0x01) },
            &UpdateDocument::new().set("name", "Alicia"),
            UpdateOptions::one(),
        )
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());

    let docs = query.exec(&ExecOptions::new()).await.unwrap();
    let civic = docs.iter().find(|d| d.get("_id") == Some(&id(0x10))).unwrap();
    let driver = civic.get("driver").and_then(|d| d.as_object()).unwrap();
    assert_eq!(driver.get("name"), Some(&DataValue::from("Alicia")));
}

#[tokio::test]
async fn test_deleting_populated_document_evicts() {
    let fx = setup(false, vec![("carsWithDriver", cars_with_driver())]).await;
    fx.manager
        .query("carsWithDriver")
        .unwrap()
        .exec(&ExecOptions::new())
        .await
        .unwrap();

    fx.manager
        .store()
        .delete("Driver", &document! { "_id" => oid(0x03) }, true)
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
}

#[tokio::test]
async fn test_invalidating_missing_key_is_noop() {
    let fx = setup(true, vec![("cars", cars())]).await;
    let handler = fx.manager.invalidation();

    let evicted = handler
        .invalidate(&[InvalidationOp::DeleteQuery("Q:AAAAAAAAAAAAAAAA[]".to_string())])
        .await;
    assert!(evicted.is_empty());

    let stats = fx.manager.stats();
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.rehydrations, 0);
    assert_eq!(fx.documents.read_count(), 0);
}

#[tokio::test]
async fn test_collect_invalidations_for_array_dynamic_value() {
    let by_tag = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(QueryFilter::from_fn(1, |p| document! { "tags" => p[0].clone() }))
        .build()
        .unwrap();
    let fx = setup(false, vec![("byTag", by_tag)]).await;
    let query = fx.manager.query("byTag").unwrap();

    let effect = ChangeEffect::Insert {
        model: "Vehicle".to_string(),
        docs: vec![document! {
            "_id" => oid(0x30),
            "tags" => DataValue::Array(vec![DataValue::from("red"), DataValue::from("fast")]),
        }],
    };
    let ops = fx.manager.invalidation().collect_invalidations(&effect).await;
    assert_eq!(
        ops,
        vec![InvalidationOp::DeleteQueriesIn {
            set_key: query.descriptor().all_key(),
            hash: None,
        }]
    );
}

#[tokio::test]
async fn test_dotted_dynamic_key_through_array_evicts_every_parameterization() {
    let by_tag_name = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(QueryFilter::from_fn(1, |p| document! { "tags.name" => p[0].clone() }))
        .build()
        .unwrap();
    let fx = setup(false, vec![("byTagName", by_tag_name)]).await;
    let query = fx.manager.query("byTagName").unwrap();
    query.exec(&ExecOptions::params(vec![DataValue::from("red")])).await.unwrap();
    query.exec(&ExecOptions::params(vec![DataValue::from("blue")])).await.unwrap();
    assert_eq!(fx.query_keys().len(), 2);

    fx.manager
        .store()
        .insert_one(
            "Vehicle",
            document! {
                "name" => "Polo",
                "tags" => vec![DataValue::Object(document! { "name" => "red" })],
            },
        )
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(
        query.exec(&ExecOptions::params(vec![DataValue::from("red")])).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_mod_filter_at_integer_bounds_invalidates() {
    let divisible = QueryDescriptor::builder()
        .model("Vehicle")
        .filter(document! { "price" => document! { "$mod" => vec![-1, 0] } })
        .build()
        .unwrap();
    let fx = setup(false, vec![("divisible", divisible)]).await;
    let query = fx.manager.query("divisible").unwrap();
    let before = query.exec(&ExecOptions::new()).await.unwrap().len();

    fx.manager
        .store()
        .insert_one("Vehicle", document! { "name" => "Outlier", "price" => i64::MIN })
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(query.exec(&ExecOptions::new()).await.unwrap().len(), before + 1);
}

#[tokio::test]
async fn test_replacing_document_invalidates_by_changed_fields() {
    let fx = setup(false, vec![("byKind", by_kind())]).await;
    let query = fx.manager.query("byKind").unwrap();
    query.exec(&kind("car")).await.unwrap();
    query.exec(&kind("truck")).await.unwrap();

    // 只修改未选择的字段
    fx.manager
        .store()
        .replace_one(
            "Vehicle",
            &document! { "_id" => oid(0x10) },
            document! { "name" => "Civic Type R", "kind" => "car", "price" => 20000, "driver" => oid(0x01) },
            false,
        )
        .await
        .unwrap();
    assert_eq!(fx.query_keys().len(), 2);

    fx.manager
        .store()
        .replace_one(
            "Vehicle",
            &document! { "_id" => oid(0x10) },
            document! { "name" => "Civic Type R", "kind" => "truck", "price" => 20000 },
            false,
        )
        .await
        .unwrap();
    assert!(fx.query_keys().is_empty());
    assert_eq!(query.exec(&kind("car")).await.unwrap().len(), 3);
    assert_eq!(query.exec(&kind("truck")).await.unwrap().len(), 4);
}
