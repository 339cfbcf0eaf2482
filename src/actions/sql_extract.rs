//! 从模型自由文本中提取单条 SQL
//!
//! 依次尝试：
//! 1. 代码块（``` 或 ```sql）内容以 SELECT 开头；
//! 2. 文本中任意 JSON 对象里名为 sql（大小写不敏感）的字段；
//! 3. 裸的 `SELECT ... ;` 片段。
//!
//! 返回前折叠空白并去掉末尾分号，三种写法得到同一条语句。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::AgentError;

static SQL_FENCE_TAG_RE: OnceLock<Regex> = OnceLock::new();
static JSON_OBJECT_RE: OnceLock<Regex> = OnceLock::new();
static BARE_SELECT_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

/// 提取 SQL；三种策略都失败时返回 NoSqlFound
pub fn extract_sql(output: &str) -> Result<String, AgentError> {
    from_code_block(output)
        .or_else(|| from_json_object(output))
        .or_else(|| from_bare_select(output))
        .ok_or(AgentError::NoSqlFound)
}

/// 折叠空白为单个空格，去掉首尾空白与末尾分号
pub fn normalize_sql(sql: &str) -> String {
    let ws = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    let collapsed = ws.replace_all(sql.trim(), " ");
    collapsed
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

fn from_code_block(output: &str) -> Option<String> {
    // 只看第一个代码块
    let block = output.split("```").nth(1)?;
    let tag = SQL_FENCE_TAG_RE.get_or_init(|| Regex::new(r"(?i)^sql\s*").expect("valid regex"));
    let content = tag.replace(block.trim_start(), "");
    let content = content.trim();
    if starts_with_keyword(content, "SELECT") {
        Some(normalize_sql(content))
    } else {
        None
    }
}

fn from_json_object(output: &str) -> Option<String> {
    // 支持一层嵌套的对象
    let re = JSON_OBJECT_RE
        .get_or_init(|| Regex::new(r"\{(?:[^{}]|\{[^{}]*\})*\}").expect("valid regex"));
    re.find_iter(output).find_map(|m| {
        let value: Value = match serde_json::from_str(m.as_str()) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "JSON-looking fragment did not parse, skipping");
                return None;
            }
        };
        let obj = value.as_object()?;
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("sql"))
            .and_then(|(_, v)| v.as_str())
            .map(normalize_sql)
            .filter(|s| !s.is_empty())
    })
}

fn from_bare_select(output: &str) -> Option<String> {
    let re = BARE_SELECT_RE.get_or_init(|| Regex::new(r"(?is)\bSELECT\b.*?;").expect("valid regex"));
    re.find(output).map(|m| normalize_sql(m.as_str()))
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    s.get(..keyword.len())
        .map(|head| head.eq_ignore_ascii_case(keyword))
        .unwrap_or(false)
}
