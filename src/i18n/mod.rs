//! 多语言错误消息模块
//!
//! 使用rat_embed_lang框架提供统一的错误消息多语言支持

use std::collections::HashMap;
use rat_embed_lang::register_translations;

/// 错误消息翻译注册器
pub struct ErrorMessageI18n;

impl ErrorMessageI18n {
    /// 注册所有错误消息翻译
    pub fn register_all_translations() {
        let mut translations = HashMap::new();

        // 配置错误
        let mut config_errors = HashMap::new();
        config_errors.insert("zh-CN".to_string(), "配置错误: {message}".to_string());
        config_errors.insert("en-US".to_string(), "Configuration error: {message}".to_string());
        config_errors.insert("ja-JP".to_string(), "設定エラー: {message}".to_string());
        translations.insert("error.config".to_string(), config_errors);

        // 缓存存储错误
        let mut cache_errors = HashMap::new();
        cache_errors.insert("zh-CN".to_string(), "缓存操作失败: {message}".to_string());
        cache_errors.insert("en-US".to_string(), "Cache operation failed: {message}".to_string());
        cache_errors.insert("ja-JP".to_string(), "キャッシュ操作が失敗しました: {message}".to_string());
        translations.insert("error.cache".to_string(), cache_errors);

        // 文档存储错误
        let mut store_errors = HashMap::new();
        store_errors.insert("zh-CN".to_string(), "文档存储操作失败: {message}".to_string());
        store_errors.insert("en-US".to_string(), "Document store operation failed: {message}".to_string());
        store_errors.insert("ja-JP".to_string(), "ドキュメントストア操作が失敗しました: {message}".to_string());
        translations.insert("error.document_store".to_string(), store_errors);

        // 无效缓存键
        let mut invalid_key_errors = HashMap::new();
        invalid_key_errors.insert("zh-CN".to_string(), "无法解析缓存键: {key}".to_string());
        invalid_key_errors.insert("en-US".to_string(), "Failed to parse cache key: {key}".to_string());
        invalid_key_errors.insert("ja-JP".to_string(), "キャッシュキーを解析できません: {key}".to_string());
        translations.insert("error.invalid_cache_key".to_string(), invalid_key_errors);

        // 序列化错误
        let mut serialization_errors = HashMap::new();
        serialization_errors.insert("zh-CN".to_string(), "数据序列化失败: {message}".to_string());
        serialization_errors.insert("en-US".to_string(), "Data serialization failed: {message}".to_string());
        serialization_errors.insert("ja-JP".to_string(), "データシリアライズが失敗しました: {message}".to_string());
        translations.insert("error.serialization".to_string(), serialization_errors);

        // 注册所有翻译
        register_translations(translations);
    }

    /// 初始化错误消息多语言支持
    pub fn init() {
        Self::register_all_translations();

        // 从环境变量获取语言设置，默认为zh-CN
        let lang = std::env::var("RAT_LANG")
            .or_else(|_| std::env::var("LANG"))
            .unwrap_or_else(|_| "zh-CN".to_string());

        // 标准化语言代码
        use rat_embed_lang::normalize_language_code;
        let normalized_lang = normalize_language_code(&lang);
        set_language(&normalized_lang);
    }
}

/// 重新导出rat_embed_lang的核心函数
pub use rat_embed_lang::{t, set_language, current_language};
