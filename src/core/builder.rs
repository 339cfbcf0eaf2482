//! 编排器构建：按配置装配模型、SQL 后端、库结构、检索、会话存储与动作注册表
//!
//! 各协作方都可以显式注入（测试用），未注入的按配置创建。

use std::sync::Arc;

use crate::actions::{register_canonical_actions, ActionDispatcher, ActionRegistry, ValidateUserRequestAction};
use crate::backend::{SqlBackend, SqliteBackend};
use crate::config::{AppConfig, StoreSection};
use crate::context::{ContextRetriever, KeywordRetriever, SchemaCatalog, SchemaProvider};
use crate::conversation::{ConversationStore, InMemoryConversationStore, SqliteConversationStore};
use crate::core::AgentError;
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, ScriptedLlmClient};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};

/// 按 provider 与环境变量中的 API Key 选择模型后端；都没有时退回脚本化 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using mock LLM (provider = mock)");
        return Arc::new(ScriptedLlmClient::default());
    }
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek && provider != "openai" {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model), None))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using mock LLM");
        Arc::new(ScriptedLlmClient::default())
    }
}

/// 按 [store] 段创建会话存储
pub fn create_store_from_config(store: &StoreSection) -> Result<Arc<dyn ConversationStore>, AgentError> {
    match store.kind.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryConversationStore::new())),
        "sqlite" => {
            let path = store
                .path
                .clone()
                .ok_or_else(|| AgentError::Config("store.path is required for sqlite store".to_string()))?;
            tracing::info!(path = %path.display(), "Using SQLite conversation store");
            Ok(Arc::new(SqliteConversationStore::open(path)?))
        }
        other => Err(AgentError::Config(format!("unknown store kind: {}", other))),
    }
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    backend: Option<Arc<dyn SqlBackend>>,
    introspect: Option<Arc<SqliteBackend>>,
    schema: Option<Arc<dyn SchemaProvider>>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            backend: None,
            introspect: None,
            schema: None,
            retriever: None,
            store: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// SQLite 后端：既执行查询，也作为库结构内省来源
    pub fn with_sqlite(mut self, backend: Arc<SqliteBackend>) -> Self {
        self.backend = Some(backend.clone());
        self.introspect = Some(backend);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn SqlBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Result<Orchestrator, AgentError> {
        let cfg = self.config;
        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg));

        let mut introspect = self.introspect;
        let backend: Arc<dyn SqlBackend> = match self.backend {
            Some(b) => b,
            None => {
                let path = cfg
                    .database
                    .path
                    .clone()
                    .ok_or_else(|| AgentError::Config("database.path is not set".to_string()))?;
                let sqlite = Arc::new(
                    SqliteBackend::open(&path, cfg.database.read_only)?
                        .with_limits(cfg.database.max_rows, cfg.database.query_timeout_secs),
                );
                introspect = Some(sqlite.clone());
                sqlite
            }
        };

        let schema: Arc<dyn SchemaProvider> = match self.schema {
            Some(s) => s,
            None => Arc::new(SchemaCatalog::new(cfg.retrieval.tables_path.clone(), introspect)),
        };
        let vocabulary = schema.vocabulary().await?;

        let retriever: Arc<dyn ContextRetriever> = match self.retriever {
            Some(r) => r,
            None => {
                let mut r = KeywordRetriever::new(cfg.retrieval.top_k)
                    .with_descriptions(schema.descriptions().await?);
                if let Some(path) = &cfg.retrieval.knowledge_path {
                    r = r.load_file(path)?;
                }
                Arc::new(r)
            }
        };

        let store = match self.store {
            Some(s) => s,
            None => create_store_from_config(&cfg.store)?,
        };

        let validator = ValidateUserRequestAction::new(cfg.validation.min_query_chars)
            .with_schema_vocabulary(vocabulary)
            .with_require_relevance(cfg.validation.require_schema_relevance);
        let mut registry = ActionRegistry::new();
        register_canonical_actions(&mut registry, llm.clone(), backend.clone(), validator);
        tracing::info!(actions = ?registry.action_names(), "action registry ready");
        let dispatcher = ActionDispatcher::new(Arc::new(registry), cfg.orchestrator.action_timeout_secs);

        Ok(Orchestrator::new(llm, dispatcher, schema, retriever, store)
            .with_settings(OrchestratorSettings::from_config(&cfg))
            .with_dialect(backend.dialect()))
    }
}
