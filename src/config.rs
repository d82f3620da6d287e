//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `THREADLINE__*` 覆盖（双下划线表示嵌套，如 `THREADLINE__POLL__MAX_ATTEMPTS=10`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::poller::PollPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub llm: LlmSection,
    pub poll: PollSection,
    pub tts: TtsSection,
    pub storage: StorageSection,
}

/// [server] 段：监听地址、运行环境、Cookie 有效期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// development 时开放 GET / 诊断接口
    pub environment: String,
    pub cookie_max_age_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "production".to_string(),
            cookie_max_age_secs: 24 * 60 * 60,
        }
    }
}

impl ServerSection {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn cookie_max_age(&self) -> Duration {
        Duration::from_secs(self.cookie_max_age_secs)
    }
}

/// [llm] 段：后端选择、鉴权与抽取模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 未设置时读取 ASSISTANT_ID
    pub assistant_id: Option<String>,
    pub extraction_model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            api_key: None,
            assistant_id: None,
            extraction_model: "gpt-3.5-turbo".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl LlmSection {
    pub fn is_mock(&self) -> bool {
        self.provider.eq_ignore_ascii_case("mock")
    }

    pub fn assistant_id(&self) -> Option<String> {
        self.assistant_id
            .clone()
            .or_else(|| std::env::var("ASSISTANT_ID").ok())
            .filter(|id| !id.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// [poll] 段：任务轮询次数与间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            interval_ms: policy.interval.as_millis() as u64,
        }
    }
}

impl PollSection {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.max_attempts, Duration::from_millis(self.interval_ms))
    }
}

/// [tts] 段：语音合成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsSection {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
        }
    }
}

/// [storage] 段：设置 db_path 且启用 async-sqlite 时使用 SQLite
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 THREADLINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键）；文件不存在时报错
/// 3. 最后叠加环境变量 THREADLINE__*（双下划线表示嵌套键）
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

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("THREADLINE")
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

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert!(!cfg.server.is_development());
        assert_eq!(cfg.server.cookie_max_age(), Duration::from_secs(86_400));
        assert_eq!(cfg.poll.policy(), PollPolicy::default());
        assert_eq!(cfg.llm.extraction_model, "gpt-3.5-turbo");
        assert_eq!(cfg.tts.voice, "alloy");
        assert!(cfg.storage.db_path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nenvironment = \"development\"\n\n[poll]\nmax_attempts = 5\ninterval_ms = 200\n\n[llm]\nprovider = \"mock\""
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert!(cfg.server.is_development());
        assert!(cfg.llm.is_mock());
        assert_eq!(
            cfg.poll.policy(),
            PollPolicy::new(5, Duration::from_millis(200))
        );
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_config(Some(missing)).is_err());
    }
}
