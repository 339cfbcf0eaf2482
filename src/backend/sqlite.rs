//! SQLite 后端（rusqlite）
//!
//! 同步连接放在 Mutex 中，经 spawn_blocking 执行。每次查询带自己的截止时间：
//! 拿到锁时已过期则不执行；执行中由 progress handler 检查截止时间并中断本条语句，
//! 不会波及其他请求。只读模式下以 READ_ONLY 打开并设置 `PRAGMA query_only`。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;

use crate::backend::{Row, SqlBackend};
use crate::context::{ForeignKeyReference, TableInfo};
use crate::core::AgentError;

const DEFAULT_MAX_ROWS: usize = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// progress handler 每执行多少条虚拟机指令回调一次
const PROGRESS_OPS: i32 = 1000;

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    max_rows: usize,
    timeout: Duration,
}

impl SqliteBackend {
    /// 打开数据库文件
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| AgentError::Backend(format!("open {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), read_only, "SQLite backend opened");
        Self::from_connection(conn, read_only)
    }

    /// 包装已有连接（测试中先建表灌数据，再切只读）
    pub fn from_connection(conn: Connection, read_only: bool) -> Result<Self, AgentError> {
        if read_only {
            conn.pragma_update(None, "query_only", true)
                .map_err(|e| AgentError::Backend(e.to_string()))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_rows: DEFAULT_MAX_ROWS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_limits(mut self, max_rows: usize, timeout_secs: u64) -> Self {
        self.max_rows = max_rows.max(1);
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    async fn run(&self, sql: String) -> Result<Vec<Row>, String> {
        let conn = self.conn.clone();
        let max_rows = self.max_rows;
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| "database connection lock poisoned".to_string())?;
            query_with_deadline(&conn, &sql, max_rows, deadline, timeout)
        })
        .await
        .map_err(|e| format!("query task failed: {}", e))?
    }

    /// 内省表结构（跳过 sqlite_ 内部表与 _aud 审计表）
    pub async fn table_infos(&self) -> Result<Vec<TableInfo>, AgentError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AgentError::Backend("database connection lock poisoned".to_string()))?;
            introspect(&conn).map_err(|e| AgentError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| AgentError::Backend(e.to_string()))?
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    async fn query(&self, sql: &str) -> Result<Vec<Row>, String> {
        self.run(sql.to_string()).await
    }

    async fn explain(&self, sql: &str) -> Result<Vec<Row>, String> {
        self.run(format!("EXPLAIN QUERY PLAN {}", sql)).await
    }

    fn dialect(&self) -> &str {
        "SQLite"
    }
}

fn query_with_deadline(
    conn: &Connection,
    sql: &str,
    max_rows: usize,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<Row>, String> {
    let timed_out = || format!("Query timed out after {}s", timeout.as_secs());
    if Instant::now() >= deadline {
        tracing::warn!(sql = %sql, "query deadline passed while waiting for the connection");
        return Err(timed_out());
    }
    conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
    let result = query_rows(conn, sql, max_rows);
    conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
    result.map_err(|e| match e.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => timed_out(),
        _ => e.to_string(),
    })
}

fn query_rows(conn: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= max_rows {
            tracing::debug!(max_rows, "result truncated");
            break;
        }
        let mut map = Row::new();
        for (i, name) in columns.iter().enumerate() {
            map.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(map);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn introspect(conn: &Connection) -> rusqlite::Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = Vec::new();
    for name in names {
        if name.to_lowercase().ends_with("_aud") {
            continue;
        }
        let mut info = TableInfo::new(&name);

        let mut cols = conn.prepare("SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let mut pks: Vec<(i64, String)> = Vec::new();
        for col in cols.query_map([&name], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
            let (col, pk) = col?;
            if pk > 0 {
                pks.push((pk, col.clone()));
            }
            info.columns.push(col);
        }
        pks.sort();
        info.primary_keys = pks.into_iter().map(|(_, c)| c).collect();

        let mut fks = conn.prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1)")?;
        for fk in fks.query_map([&name], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })? {
            let (from, table, to) = fk?;
            info.foreign_keys.insert(
                from,
                ForeignKeyReference::new(table, to.unwrap_or_default()),
            );
        }
        tables.push(info);
    }
    Ok(tables)
}
