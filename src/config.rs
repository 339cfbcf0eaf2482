//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ASKDB__*` 覆盖（双下划线表示嵌套，如 `ASKDB__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub database: DatabaseSection,
    pub retrieval: RetrievalSection,
    pub store: StoreSection,
    pub validation: ValidationSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；有 API Key 时才会真正走远端
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [orchestrator] 段：轮数上限、超时、持久化与并发策略
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// 单轮模型调用超时；未设置时取 llm.timeouts.request
    pub round_timeout_secs: Option<u64>,
    /// 单次动作执行超时
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// 整个 run 的超时
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// 保存会话失败时是否中断
    #[serde(default)]
    pub persist_failure_is_fatal: bool,
    /// 同一会话的请求串行执行
    #[serde(default)]
    pub serialize_conversations: bool,
    /// 开场校验与检查后强制执行两条护栏
    #[serde(default = "default_true")]
    pub enforce_guardrails: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_secs: None,
            action_timeout_secs: default_action_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            persist_failure_is_fatal: false,
            serialize_conversations: false,
            enforce_guardrails: true,
        }
    }
}

fn default_max_rounds() -> usize {
    12
}

fn default_action_timeout_secs() -> u64 {
    90
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// [database] 段：被查询的 SQLite 库
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub read_only: bool,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: None,
            read_only: true,
            max_rows: default_max_rows(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_max_rows() -> usize {
    500
}

fn default_query_timeout_secs() -> u64 {
    30
}

/// [retrieval] 段：检索条数、知识库与表描述文件
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// TOML 知识库（`[[entries]] text / sql_example`）
    pub knowledge_path: Option<PathBuf>,
    /// tables.json；缺失或为空时改为内省数据库
    pub tables_path: Option<PathBuf>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            knowledge_path: None,
            tables_path: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

/// [store] 段：会话存储
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// memory / sqlite
    #[serde(default = "default_store_kind")]
    pub kind: String,
    pub path: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            path: None,
        }
    }
}

fn default_store_kind() -> String {
    "memory".to_string()
}

/// [validation] 段：validate_user_request 的判定
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_true")]
    pub require_schema_relevance: bool,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            min_query_chars: default_min_query_chars(),
            require_schema_relevance: true,
        }
    }
}

fn default_min_query_chars() -> usize {
    3
}

impl OrchestratorSection {
    /// 单轮模型调用超时（未单独配置时沿用 LLM 请求超时）
    pub fn round_timeout(&self, llm: &LlmSection) -> u64 {
        self.round_timeout_secs.unwrap_or(llm.timeouts.request)
    }
}

/// 从 config 目录加载配置，环境变量 ASKDB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ASKDB__*（双下划线表示嵌套键）
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
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ASKDB")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_rounds, 12);
        assert_eq!(cfg.orchestrator.round_timeout(&cfg.llm), 60);
        assert!(cfg.orchestrator.enforce_guardrails);
        assert!(!cfg.orchestrator.persist_failure_is_fatal);
        assert!(cfg.database.read_only);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.store.kind, "memory");
        assert_eq!(cfg.validation.min_query_chars, 3);
    }

    #[test]
    fn test_file_overrides_and_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("askdb.toml");
        std::fs::write(
            &path,
            "[orchestrator]\nmax_rounds = 5\nround_timeout_secs = 10\n\n[database]\nmax_rows = 20\n\n[store]\nkind = \"sqlite\"\npath = \"data/conv.db\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.orchestrator.max_rounds, 5);
        assert_eq!(cfg.orchestrator.round_timeout(&cfg.llm), 10);
        assert_eq!(cfg.orchestrator.run_timeout_secs, 300);
        assert_eq!(cfg.database.max_rows, 20);
        assert!(cfg.database.read_only);
        assert_eq!(cfg.store.kind, "sqlite");
        assert_eq!(cfg.store.path, Some(PathBuf::from("data/conv.db")));
    }
}
