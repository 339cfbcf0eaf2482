//! 上下文协作方：库结构与检索

pub mod retrieval;
pub mod schema;

pub use retrieval::{ContextRetriever, KeywordRetriever, KnowledgeEntry};
pub use schema::{ForeignKeyReference, SchemaCatalog, SchemaProvider, TableInfo};
