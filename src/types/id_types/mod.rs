use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 文档ID（MongoDB ObjectId 格式）
///
/// 12字节：时间戳(4字节) + 进程随机值(5字节) + 计数器(3字节)，以24位十六进制字符串表示
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

static COUNTER: once_cell::sync::Lazy<AtomicU32> =
    once_cell::sync::Lazy::new(|| AtomicU32::new(rand::random::<u32>() & 0x00FF_FFFF));

static PROCESS_UNIQUE: once_cell::sync::Lazy<[u8; 5]> =
    once_cell::sync::Lazy::new(rand::random::<[u8; 5]>);

impl ObjectId {
    /// 生成新的ObjectId
    pub fn new() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    /// 从原始字节构造
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// 原始字节
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// 从24位十六进制字符串解析
    pub fn parse_str(s: &str) -> Option<Self> {
        if s.len() != 24 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// 转换为24位十六进制字符串
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// 嵌入的创建时间（秒）
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = crate::error::QueryCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
            .ok_or_else(|| crate::quick_error!(serialization, format!("无效的ObjectId: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex_round_trip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::parse_str(&hex), Some(id));
    }

    #[test]
    fn test_object_id_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_id_rejects_bad_input() {
        assert!(ObjectId::parse_str("xyz").is_none());
        assert!(ObjectId::parse_str("zz0000000000000000000000").is_none());
        assert!("0000000000000000000000A1".parse::<ObjectId>().is_ok());
    }
}
