//! 编排 prompt：首轮只允许 validate_user_request，后续轮附带完整动作菜单与上一步结果

use crate::orchestrator::Constraint;

/// 每轮共享的上下文块
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub user_query: String,
    pub conversation_id: String,
    pub database_schema: String,
    pub rag_context: String,
    pub previous_context: String,
    /// 方言名，如 SQLite
    pub dialect: String,
}

impl PromptContext {
    fn history_section(&self) -> String {
        if self.previous_context.is_empty() {
            String::new()
        } else {
            format!("CONVERSATION HISTORY:\n{}\n\n", self.previous_context)
        }
    }

    fn context_tail(&self) -> String {
        format!(
            "DATABASE SCHEMA:\n{}\n\nRAG CONTEXT:\n{}\n\n{}User Query: {}\n\nconversationId: {}\n",
            self.database_schema,
            self.rag_context,
            self.history_section(),
            self.user_query,
            self.conversation_id
        )
    }
}

/// 上一步的动作与结果
pub struct LastStep<'a> {
    pub action: &'a str,
    pub result: &'a str,
    /// 待注入 generate_sql 的失败原因
    pub failure_reason: Option<&'a str>,
}

pub fn initial_prompt(ctx: &PromptContext, constraint: &Constraint) -> String {
    format!(
        "You are an intelligent assistant for a {dialect} database. You answer questions by \
         choosing one action per step; each action is executed for you and its result is shown \
         in the next step.\n\n\
         Every request must start by validating the user's question.\n\
         The only action allowed now is validate_user_request: check if the user query is actionable.\n\n\
         {instruction}\n\n\
         Respond only with one JSON object. Do not return SQL directly or outside JSON.\n\n\
         {tail}",
        dialect = ctx.dialect,
        instruction = constraint.prompt_instruction(),
        tail = ctx.context_tail(),
    )
}

/// `action_menu`：动作列表及参数 schema；`directive_schema`：指令 JSON Schema
pub fn followup_prompt(
    ctx: &PromptContext,
    action_menu: &str,
    directive_schema: &str,
    last: &LastStep<'_>,
    constraint: Option<&Constraint>,
) -> String {
    let mut sb = format!(
        "You are an intelligent assistant for a {} database with access to the following actions:\n\n{}\n\n",
        ctx.dialect, action_menu
    );
    sb.push_str("Instructions:\n");
    sb.push_str("- Respond only with one JSON object for the next action.\n");
    sb.push_str("- If the request is valid, use generate_sql to create SQL.\n");
    sb.push_str("- Check the generated SQL with check_query.\n");
    sb.push_str("- Then use execute_query to run exactly the checked SQL.\n");
    sb.push_str("- If execute_query fails, use generate_sql again and pass the error as failureReason.\n");
    sb.push_str("- If the result is too large, use explain_query and summarize_results.\n");
    sb.push_str("- Do not wait for user confirmation. Do not return SQL outside JSON.\n");
    sb.push_str("- If you can answer without any action, reply in plain text.\n\n");
    sb.push_str(&format!(
        "Action JSON Schema (your output must match):\n```json\n{}\n```\n\n",
        directive_schema
    ));
    sb.push_str(&format!(
        "CONTEXT:\nLast action: {}\nResult: {}\n",
        last.action, last.result
    ));
    if let Some(reason) = last.failure_reason {
        sb.push_str(&format!(
            "The last action failed. failureReason: {}\nPass it as failureReason when calling generate_sql.\n",
            reason
        ));
    }
    sb.push('\n');
    if let Some(c) = constraint {
        sb.push_str(&c.prompt_instruction());
        sb.push_str("\n\n");
    }
    sb.push_str(&ctx.context_tail());
    sb.push_str("\nBased on the above, provide the next action as a JSON object.\n");
    sb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PromptContext {
        PromptContext {
            user_query: "What is the status of work order WO-123?".to_string(),
            conversation_id: "abc".to_string(),
            database_schema: "-- Table: work_order\nColumns: work_order_id\n".to_string(),
            rag_context: "The work_order table has columns: work_order_id.".to_string(),
            previous_context: String::new(),
            dialect: "SQLite".to_string(),
        }
    }

    #[test]
    fn test_initial_prompt_allows_only_validation() {
        let c = Constraint::Opening {
            user_query: ctx().user_query,
        };
        let p = initial_prompt(&ctx(), &c);
        assert!(p.contains("SQLite database"));
        assert!(p.contains(r#""action":"validate_user_request""#));
        assert!(!p.contains("generate_sql"));
        assert!(!p.contains("CONVERSATION HISTORY"));
        assert!(p.contains("conversationId: abc"));
    }

    #[test]
    fn test_followup_embeds_last_step_and_constraint() {
        let mut c = ctx();
        c.previous_context = "User: hi\nAI: \"Valid\"".to_string();
        let last = LastStep {
            action: "check_query",
            result: "\"Query Check Passed. Can be executed.\"",
            failure_reason: None,
        };
        let constraint = Constraint::ExecuteChecked {
            sql: "SELECT 1".to_string(),
        };
        let p = followup_prompt(&c, "- execute_query: run", "{}", &last, Some(&constraint));
        assert!(p.contains("Last action: check_query"));
        assert!(p.contains("Query Check Passed"));
        assert!(p.contains("MANDATORY NEXT ACTION"));
        assert!(p.contains("CONVERSATION HISTORY:\nUser: hi"));
        assert!(!p.contains("failureReason: "));
    }

    #[test]
    fn test_followup_failure_reason() {
        let last = LastStep {
            action: "execute_query",
            result: "{\"error\":\"no such column: foo\"}",
            failure_reason: Some("no such column: foo"),
        };
        let p = followup_prompt(&ctx(), "", "{}", &last, None);
        assert!(p.contains("failureReason: no such column: foo"));
        assert!(!p.contains("MANDATORY"));
    }
}
