use serde::{Deserialize, Serialize};

/// 查询缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// 查询描述符默认过期时间（秒）
    pub default_expiry_secs: u64,
    /// 失效后立即重新填充被驱逐的查询
    pub auto_rehydrate: bool,
    /// 缓存策略（仅 rat_memcache 后端使用）
    pub strategy: CacheStrategy,
    /// L1 缓存配置
    pub l1_config: L1CacheConfig,
    /// L2 缓存配置（可选）
    pub l2_config: Option<L2CacheConfig>,
    /// TTL 配置
    pub ttl_config: TtlConfig,
    /// 压缩配置
    pub compression_config: CompressionConfig,
}

/// 缓存策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheStrategy {
    /// LRU（最近最少使用）
    Lru,
    /// LFU（最少使用频率）
    Lfu,
    /// FIFO（先进先出）
    Fifo,
}

/// L1 缓存配置（内存缓存）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1CacheConfig {
    /// 最大容量（条目数）
    pub max_capacity: usize,
    /// 最大内存使用（MB）
    pub max_memory_mb: usize,
}

/// L2 缓存配置（磁盘缓存）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2CacheConfig {
    /// 存储路径
    pub storage_path: String,
    /// 最大磁盘使用（MB）
    pub max_disk_mb: usize,
    /// 压缩级别（0-22）
    pub compression_level: i32,
    /// 启动时清空缓存目录
    pub clear_on_startup: bool,
}

/// TTL 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// 最大 TTL（秒），描述符的过期时间会被截断到此值
    pub max_ttl_secs: u64,
    /// TTL 检查间隔（秒）
    pub check_interval_secs: u64,
}

/// 压缩配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// 是否启用压缩
    pub enabled: bool,
    /// 压缩阈值（字节）
    pub threshold_bytes: usize,
}
