//! MongoDB适配器模块
//!
//! - adapter.rs: [`DocumentStore`](crate::adapter::DocumentStore) 实现
//! - utils.rs: BSON数据转换工具函数

pub mod adapter;
pub(crate) mod utils;

// 重新导出核心类型
pub use adapter::MongoDocumentStore;
