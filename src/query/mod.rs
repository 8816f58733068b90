//! 查询模块
//!
//! 过滤器匹配、查询/投影分类、更新操作符解释器、描述符与缓存查询运行时

pub mod cached_query;
pub mod classify;
pub mod descriptor;
pub mod matcher;
pub mod operators;
pub mod path;

pub use cached_query::{CachedQuery, ExecOptions, ResultFilter, collect_populated_ids};
pub use classify::{QueryClassification, Selection, classify_projection, classify_query};
pub use descriptor::{ClassificationInfo, PopulatedSelection, QueryDescriptor};
pub use matcher::Matcher;
pub use operators::{
    apply_updates, build_upserted_document, build_upserted_replacement, collect_modified_paths,
    diff_top_level_paths, map_before_and_after, parse_query_update, replace_document,
};
