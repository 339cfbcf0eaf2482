//! 编排主循环
//!
//! 每轮：构建 prompt -> 调用模型 -> 解析指令 -> 护栏 -> 补全上下文 -> 分发动作 ->
//! 追加 Turn 并保存 -> 判断终止。模型是唯一的重试驱动者，循环只负责把失败原因
//! （failureReason）回灌给下一次 generate_sql。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actions::{
    check_passed, directive_schema_json, ActionDispatcher, ActionResult, CHECK_QUERY,
    EXECUTE_QUERY, EXPLAIN_QUERY, GENERATE_SQL, SUMMARIZE_RESULTS, VALID, VALIDATE_USER_REQUEST,
};
use crate::config::AppConfig;
use crate::context::{ContextRetriever, SchemaProvider};
use crate::conversation::{Conversation, ConversationStore, NewTurn};
use crate::core::{AgentError, ConversationLocks};
use crate::llm::LlmClient;
use crate::orchestrator::prompt::{followup_prompt, initial_prompt, LastStep, PromptContext};
use crate::orchestrator::{parse_directive, Constraint, Directive, OrchestrationEvent, ParsedOutput};

/// 日志 / 事件中的预览长度
const PREVIEW_CHARS: usize = 200;

/// 循环参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_rounds: usize,
    pub round_timeout: Duration,
    pub run_timeout: Duration,
    pub persist_failure_is_fatal: bool,
    pub serialize_conversations: bool,
    pub enforce_guardrails: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let o = &cfg.orchestrator;
        Self {
            max_rounds: o.max_rounds.max(1),
            round_timeout: Duration::from_secs(o.round_timeout(&cfg.llm)),
            run_timeout: Duration::from_secs(o.run_timeout_secs),
            persist_failure_is_fatal: o.persist_failure_is_fatal,
            serialize_conversations: o.serialize_conversations,
            enforce_guardrails: o.enforce_guardrails,
        }
    }
}

/// 单次 run 的可选项：取消令牌与事件通道
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cancel_token: Option<CancellationToken>,
    pub event_tx: Option<mpsc::UnboundedSender<OrchestrationEvent>>,
}

impl RunOptions {
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<OrchestrationEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, ev: OrchestrationEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 编排器：持有模型、分发器与各协作方，可被多个请求并发共享
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    dispatcher: ActionDispatcher,
    schema: Arc<dyn SchemaProvider>,
    retriever: Arc<dyn ContextRetriever>,
    store: Arc<dyn ConversationStore>,
    settings: OrchestratorSettings,
    locks: ConversationLocks,
    dialect: String,
    /// 动作菜单与指令 schema（注册表只读，启动时渲染一次）
    action_menu: String,
    directive_schema: String,
}

fn preview(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

fn is_terminal(action: &str) -> bool {
    action == EXECUTE_QUERY || action == SUMMARIZE_RESULTS
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: ActionDispatcher,
        schema: Arc<dyn SchemaProvider>,
        retriever: Arc<dyn ContextRetriever>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let action_menu = dispatcher.registry().to_schema_json();
        Self {
            llm,
            dispatcher,
            schema,
            retriever,
            store,
            settings: OrchestratorSettings::default(),
            locks: ConversationLocks::new(),
            dialect: "SQL".to_string(),
            action_menu,
            directive_schema: directive_schema_json(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// 入口：返回面向用户的文本；中断性错误转为 "Error: <message>"
    pub async fn run(&self, user_query: &str, conversation_id: &str) -> String {
        self.run_with(user_query, conversation_id, RunOptions::default())
            .await
    }

    pub async fn run_with(&self, user_query: &str, conversation_id: &str, opts: RunOptions) -> String {
        match self.try_run_with(user_query, conversation_id, &opts).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(conversation_id, error = %e, "orchestration aborted");
                opts.emit(OrchestrationEvent::Error {
                    text: e.to_string(),
                });
                format!("Error: {}", e)
            }
        }
    }

    /// 与 run 相同，但保留类型化错误
    pub async fn try_run(&self, user_query: &str, conversation_id: &str) -> Result<String, AgentError> {
        self.try_run_with(user_query, conversation_id, &RunOptions::default())
            .await
    }

    pub async fn try_run_with(
        &self,
        user_query: &str,
        conversation_id: &str,
        opts: &RunOptions,
    ) -> Result<String, AgentError> {
        let cancel = opts.cancel_token.clone().unwrap_or_default();
        // 等锁也计入整体超时
        let run = async {
            let _guard = if self.settings.serialize_conversations {
                Some(self.locks.acquire(conversation_id).await)
            } else {
                None
            };
            self.drive(user_query, conversation_id, &cancel, opts).await
        };
        match tokio::time::timeout(self.settings.run_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::RunTimeout(self.settings.run_timeout.as_secs())),
        }
    }

    async fn drive(
        &self,
        user_query: &str,
        conversation_id: &str,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<String, AgentError> {
        let (mut conversation, created) = self.store.load_or_create(conversation_id).await?;
        if created {
            self.persist(&conversation).await?;
        }

        let previous_context = conversation.previous_context();
        let rag_context = self
            .retriever
            .retrieve(user_query, &previous_context)
            .await?
            .join("\n");
        let mut database_schema = self.schema.relevant_schema(&rag_context).await?;
        if database_schema.is_empty() {
            // 检索未命中任何表名时给出完整结构
            database_schema = self.schema.full_schema().await?;
        }

        let ctx = PromptContext {
            user_query: user_query.to_string(),
            conversation_id: conversation_id.to_string(),
            database_schema,
            rag_context,
            previous_context,
            dialect: self.dialect.clone(),
        };

        let max_rounds = self.settings.max_rounds;
        let opening = Constraint::Opening {
            user_query: user_query.to_string(),
        };
        let mut prompt = initial_prompt(&ctx, &opening);
        let mut constraint = Some(opening);
        let mut pending_failure: Option<String> = None;

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            opts.emit(OrchestrationEvent::RoundStarted { round, max_rounds });
            tracing::debug!(round, prompt_chars = prompt.len(), "round prompt built");

            let output = self.call_llm(&prompt, cancel).await?;
            tracing::info!(round, output = %preview(&output), "model output");

            let mut directive = match parse_directive(&output) {
                ParsedOutput::Directive(d) => d,
                ParsedOutput::DirectAnswer(text) => {
                    tracing::info!(round, "model answered directly");
                    opts.emit(OrchestrationEvent::Finished {
                        rounds: round,
                        answer_preview: preview(&text),
                    });
                    return Ok(text);
                }
                ParsedOutput::Malformed { raw, reason } => {
                    tracing::warn!(round, reason = %reason, "malformed directive, treating output as answer");
                    opts.emit(OrchestrationEvent::MalformedDirective { round, reason });
                    opts.emit(OrchestrationEvent::Finished {
                        rounds: round,
                        answer_preview: preview(&raw),
                    });
                    return Ok(raw);
                }
            };
            if let Some(canonical) = self.dispatcher.canonical_name(&directive.action) {
                directive.action = canonical;
            }
            tracing::info!(round, action = %directive.action, "directive");
            opts.emit(OrchestrationEvent::DirectiveParsed {
                round,
                action: directive.action.clone(),
                params: directive.params_value(),
            });

            if let Some(c) = constraint.take() {
                if self.settings.enforce_guardrails {
                    let requested = directive.action.clone();
                    let (enforced, overridden) = c.apply(directive);
                    if overridden {
                        tracing::warn!(
                            round,
                            guardrail = c.name(),
                            requested = %requested,
                            enforced = %enforced.action,
                            "guardrail overrode directive"
                        );
                        opts.emit(OrchestrationEvent::GuardrailApplied {
                            round,
                            guardrail: c.name().to_string(),
                            requested,
                            enforced: enforced.action.clone(),
                        });
                    }
                    directive = enforced;
                }
            }

            self.fill_context(&mut directive, &ctx, &mut pending_failure);
            let input_sql = directive.param_str("sql").map(str::to_string);

            let result = self
                .dispatcher
                .dispatch(&directive.action, directive.params_value())
                .await?;
            let serialized = result.serialize();
            opts.emit(OrchestrationEvent::ActionDispatched {
                round,
                action: directive.action.clone(),
                is_error: result.is_error(),
                preview: preview(&serialized),
            });

            // 校验未通过：直接把原因返回给用户
            if directive.action == VALIDATE_USER_REQUEST && result.as_text() != Some(VALID) {
                let answer = result
                    .as_text()
                    .map(str::to_string)
                    .or_else(|| result.error_message().map(str::to_string))
                    .unwrap_or(serialized);
                tracing::info!(round, answer = %answer, "request rejected by validation");
                opts.emit(OrchestrationEvent::Finished {
                    rounds: round,
                    answer_preview: preview(&answer),
                });
                return Ok(answer);
            }

            self.record_turn(
                &mut conversation,
                user_query,
                &directive.action,
                input_sql.clone(),
                &result,
                &serialized,
            )
            .await?;

            if is_terminal(&directive.action) && !result.is_error() {
                opts.emit(OrchestrationEvent::Finished {
                    rounds: round,
                    answer_preview: preview(&serialized),
                });
                return Ok(serialized);
            }

            if let Some(error) = result.error_message() {
                tracing::info!(round, action = %directive.action, error = %error, "action failed, failureReason pending");
                pending_failure = Some(error.to_string());
            }

            constraint = match (&input_sql, directive.action.as_str()) {
                (Some(sql), CHECK_QUERY) if check_passed(&result) => {
                    Some(Constraint::ExecuteChecked { sql: sql.clone() })
                }
                _ => None,
            };

            let last = LastStep {
                action: &directive.action,
                result: &serialized,
                failure_reason: pending_failure.as_deref(),
            };
            prompt = followup_prompt(
                &ctx,
                &self.action_menu,
                &self.directive_schema,
                &last,
                constraint.as_ref(),
            );
        }

        tracing::warn!(max_rounds, conversation_id, "round limit reached");
        let answer = format!("Could not complete the request within {} rounds.", max_rounds);
        opts.emit(OrchestrationEvent::Finished {
            rounds: max_rounds,
            answer_preview: answer.clone(),
        });
        Ok(answer)
    }

    async fn call_llm(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, AgentError> {
        let secs = self.settings.round_timeout.as_secs();
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            r = tokio::time::timeout(self.settings.round_timeout, self.llm.generate(prompt)) => match r {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(AgentError::LlmError(e)),
                Err(_) => Err(AgentError::LlmTimeout(secs)),
            },
        }
    }

    /// generate_sql 缺省字段由循环状态补齐，并注入待处理的 failureReason；
    /// validate_user_request 缺 userQuery 时补上原问题
    fn fill_context(&self, directive: &mut Directive, ctx: &PromptContext, pending_failure: &mut Option<String>) {
        let fill = |d: &mut Directive, key: &str, value: &str| {
            if d.lacks(key) {
                d.params.insert(key.to_string(), Value::String(value.to_string()));
            }
        };
        match directive.action.as_str() {
            VALIDATE_USER_REQUEST => fill(directive, "userQuery", &ctx.user_query),
            GENERATE_SQL => {
                fill(directive, "userQuery", &ctx.user_query);
                fill(directive, "databaseSchema", &ctx.database_schema);
                fill(directive, "ragContext", &ctx.rag_context);
                fill(directive, "previousContext", &ctx.previous_context);
                fill(directive, "conversationId", &ctx.conversation_id);
                if let Some(reason) = pending_failure.take() {
                    fill(directive, "failureReason", &reason);
                }
            }
            _ => {}
        }
    }

    async fn record_turn(
        &self,
        conversation: &mut Conversation,
        user_query: &str,
        action: &str,
        input_sql: Option<String>,
        result: &ActionResult,
        serialized: &str,
    ) -> Result<(), AgentError> {
        let generated_sql = match action {
            GENERATE_SQL => result.as_text().map(str::to_string),
            EXECUTE_QUERY | EXPLAIN_QUERY | CHECK_QUERY => input_sql,
            _ => None,
        };
        let raw_result = matches!(action, EXECUTE_QUERY | EXPLAIN_QUERY).then(|| serialized.to_string());
        let seq = conversation.append_turn(
            NewTurn::new(user_query, serialized)
                .with_sql(generated_sql)
                .with_raw_result(raw_result),
        );
        tracing::debug!(conversation_id = %conversation.id, turn = seq, action, "turn appended");
        self.persist(conversation).await
    }

    /// 保存失败默认只告警
    async fn persist(&self, conversation: &Conversation) -> Result<(), AgentError> {
        match self.store.save(conversation).await {
            Ok(()) => Ok(()),
            Err(e) if self.settings.persist_failure_is_fatal => Err(e),
            Err(e) => {
                tracing::warn!(conversation_id = %conversation.id, error = %e, "failed to persist conversation, continuing");
                Ok(())
            }
        }
    }
}
