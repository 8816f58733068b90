//! 集成测试公共夹具：4 个司机、11 辆车

#![allow(dead_code)]

use rat_querycache::cache::MemoryCacheStore;
use rat_querycache::types::{
    CacheConfig, CacheStrategy, CompressionConfig, DataValue, Document, L1CacheConfig, ObjectId,
    TtlConfig,
};
use rat_querycache::{
    CacheConfigBuilder, CacheStore, DocumentStore, MemoryDocumentStore, QueryCacheManager,
    QueryDescriptor, document,
};
use std::sync::Arc;

pub fn oid(n: u8) -> ObjectId {
    ObjectId::parse_str(&format!("{:024x}", n)).expect("测试ID格式错误")
}

pub fn id(n: u8) -> DataValue {
    DataValue::ObjectId(oid(n))
}

pub fn drivers() -> Vec<Document> {
    vec![
        document! { "_id" => oid(0x01), "name" => "Alice", "age" => 30 },
        document! { "_id" => oid(0x02), "name" => "Bob", "age" => 45 },
        document! { "_id" => oid(0x03), "name" => "Carol", "age" => 28 },
        document! { "_id" => oid(0x04), "name" => "Dave", "age" => 52 },
    ]
}

fn vehicle(n: u8, name: &str, kind: &str, price: i64, driver: u8) -> Document {
    document! {
        "_id" => oid(n),
        "name" => name,
        "kind" => kind,
        "price" => price,
        "driver" => oid(driver),
    }
}

/// 4 辆轿车、3 辆卡车、2 辆摩托、2 辆厢式车
pub fn vehicles() -> Vec<Document> {
    vec![
        vehicle(0x10, "Civic", "car", 20000, 0x01),
        vehicle(0x11, "Corolla", "car", 22000, 0x02),
        vehicle(0x12, "Model 3", "car", 40000, 0x03),
        vehicle(0x13, "Mustang", "car", 35000, 0x01),
        vehicle(0x14, "F-150", "truck", 45000, 0x02),
        vehicle(0x15, "Silverado", "truck", 47000, 0x04),
        vehicle(0x16, "Tacoma", "truck", 32000, 0x03),
        vehicle(0x17, "Monster", "bike", 18000, 0x04),
        vehicle(0x18, "Vespa", "bike", 6000, 0x01),
        vehicle(0x19, "Sprinter", "van", 50000, 0x02),
        vehicle(0x1a, "Transit", "van", 38000, 0x03),
    ]
}

pub fn cache_config(auto_rehydrate: bool) -> CacheConfig {
    CacheConfigBuilder::new()
        .default_expiry_secs(43200)
        .auto_rehydrate(auto_rehydrate)
        .strategy(CacheStrategy::Lru)
        .l1_config(L1CacheConfig {
            max_capacity: 1000,
            max_memory_mb: 64,
        })
        .ttl_config(TtlConfig {
            max_ttl_secs: 86400,
            check_interval_secs: 60,
        })
        .compression_config(CompressionConfig {
            enabled: false,
            threshold_bytes: 1024,
        })
        .build()
        .expect("测试缓存配置无效")
}

pub struct Fixture {
    pub manager: QueryCacheManager,
    pub documents: Arc<MemoryDocumentStore>,
    pub cache: Arc<MemoryCacheStore>,
}

impl Fixture {
    /// 车辆集合中查询的键
    pub fn query_keys(&self) -> Vec<String> {
        self.cache
            .keys()
            .into_iter()
            .filter(|k| k.starts_with("Q:"))
            .collect()
    }
}

pub fn seeded_documents() -> Arc<MemoryDocumentStore> {
    let documents = Arc::new(MemoryDocumentStore::new());
    documents.seed("Driver", drivers());
    documents.seed("Vehicle", vehicles());
    documents
}

pub async fn setup(auto_rehydrate: bool, queries: Vec<(&str, QueryDescriptor)>) -> Fixture {
    let documents = seeded_documents();
    let cache = Arc::new(MemoryCacheStore::new());

    let mut builder = QueryCacheManager::builder(cache_config(auto_rehydrate))
        .cache_store(cache.clone() as Arc<dyn CacheStore>)
        .document_store(documents.clone() as Arc<dyn DocumentStore>);
    for (name, descriptor) in queries {
        builder = builder.query(name, descriptor);
    }
    let manager = builder.build().await.expect("装配查询缓存管理器失败");

    Fixture {
        manager,
        documents,
        cache,
    }
}

pub fn names(docs: &[Document]) -> Vec<String> {
    let mut names: Vec<String> = docs
        .iter()
        .filter_map(|d| d.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .collect();
    names.sort();
    names
}
