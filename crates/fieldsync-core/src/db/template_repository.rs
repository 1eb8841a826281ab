//! Template repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::Result;
use crate::models::{Template, TemplateId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for template storage operations
pub trait TemplateRepository {
    /// Insert a new template
    fn insert(&self, template: &Template) -> Result<()>;

    /// Get a template by ID
    fn get(&self, id: &TemplateId) -> Result<Option<Template>>;

    /// List templates, newest first
    fn list(&self, limit: usize) -> Result<Vec<Template>>;
}

/// `SQLite` implementation of `TemplateRepository`
pub struct SqliteTemplateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTemplateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
        let id: String = row.get(0)?;
        Ok(Template {
            id: id
                .parse()
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })?,
            name: row.get(1)?,
            version: row.get(2)?,
            checklist_items: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn insert(&self, template: &Template) -> Result<()> {
        self.conn.execute(
            "INSERT INTO templates (id, name, version, checklist_items, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                template.id.as_str(),
                template.name,
                template.version,
                template.checklist_items,
                template.created_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &TemplateId) -> Result<Option<Template>> {
        let template = self
            .conn
            .query_row(
                "SELECT id, name, version, checklist_items, created_at FROM templates WHERE id = ?",
                params![id.as_str()],
                Self::parse_template,
            )
            .optional()?;
        Ok(template)
    }

    fn list(&self, limit: usize) -> Result<Vec<Template>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, version, checklist_items, created_at
             FROM templates
             ORDER BY created_at DESC
             LIMIT ?",
        )?;

        let templates = stmt
            .query_map(params![limit as i64], Self::parse_template)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_create_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("fieldsync.db")).unwrap();
        let conn = db.connect().unwrap();
        let repo = SqliteTemplateRepository::new(&conn);

        let template = Template::new("Electrical", serde_json::json!(["panel", "wiring"]));
        repo.insert(&template).unwrap();

        let fetched = repo.get(&template.id).unwrap().unwrap();
        assert_eq!(fetched, template);
        assert_eq!(repo.list(10).unwrap().len(), 1);
        assert!(repo.get(&TemplateId::new()).unwrap().is_none());
    }
}
