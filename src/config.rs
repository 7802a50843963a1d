//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SALESBOT__*` 覆盖（双下划线表示嵌套，如 `SALESBOT__APP__OPERATOR_NUMBER=5511...`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{RetryPolicy, SalesError};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub messaging: MessagingSection,
    pub storage: StorageSection,
    pub retry: RetrySection,
    pub server: ServerSection,
}

/// [app] 段：运营方号码、是否处理自己发出的消息、目录与提示词文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub operator_number: String,
    pub enable_self_messages: bool,
    pub catalog_path: PathBuf,
    pub system_prompt_path: PathBuf,
    /// 客户邮箱空闲多久（秒）后回收 worker 与内存中的会话
    pub session_idle_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            operator_number: String::new(),
            enable_self_messages: false,
            catalog_path: PathBuf::from("config/catalog.pdf"),
            system_prompt_path: PathBuf::from("config/prompts/system.md"),
            session_idle_secs: 600,
        }
    }
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    /// OpenAI 兼容 API 地址，未设置时用官方地址
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub temperature: f32,
    pub seed: i64,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            base_url: None,
            api_key: None,
            temperature: 1.0,
            seed: 0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [messaging] 段：Evolution API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingSection {
    pub base_url: String,
    pub instance_id: String,
    /// 未设置时读 EVOLUTION_API_KEY
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            instance_id: String::new(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl MessagingSection {
    pub fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("EVOLUTION_API_KEY").ok())
            .unwrap_or_default()
    }
}

/// [storage] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_url: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_url: "sqlite:salesbot.db?mode=rwc".to_string(),
        }
    }
}

/// [retry] 段：模型、网关、存储调用共用
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// 启动前校验；失败时进程不应启动
    pub fn validate(&self) -> Result<(), SalesError> {
        let operator = self.app.operator_number.trim();
        if operator.is_empty() {
            return Err(SalesError::Config("app.operator_number is required".to_string()));
        }
        if !operator.chars().all(|c| c.is_ascii_digit()) {
            return Err(SalesError::Config(format!(
                "app.operator_number must contain only digits, got '{operator}'"
            )));
        }
        let base = &self.messaging.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SalesError::Config(format!(
                "messaging.base_url must be an http(s) URL, got '{base}'"
            )));
        }
        if self.messaging.instance_id.trim().is_empty() {
            return Err(SalesError::Config("messaging.instance_id is required".to_string()));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 SALESBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SALESBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SALESBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.app.operator_number = "5511987654321".into();
        cfg.messaging.instance_id = "loja".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gpt-4.1");
        assert_eq!(cfg.llm.temperature, 1.0);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.app.session_idle_secs, 600);
        assert_eq!(cfg.storage.database_url, "sqlite:salesbot.db?mode=rwc");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let mut cfg = valid();
        cfg.app.operator_number = "+55 11".into();
        assert!(matches!(cfg.validate(), Err(SalesError::Config(_))));

        let mut cfg = valid();
        cfg.app.operator_number.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.messaging.base_url = "ftp://evolution".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.messaging.instance_id = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_section() {
        let policy = RetrySection {
            max_attempts: 0,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        }
        .policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[app]\noperator_number = \"5511000\"\n[llm]\nmodel = \"gpt-4.1-mini\"\n[retry]\nmax_attempts = 5"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.operator_number, "5511000");
        assert_eq!(cfg.llm.model, "gpt-4.1-mini");
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_backoff_ms, 500);
    }
}
