//! Declared tables: column types, idempotent DDL and the identifier allow-list
//! the query engine checks every statement against.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::query::Statement;

/// Name of the primary key every declared table receives.
pub const ID_COLUMN: &str = "ID";

/// SQLite storage classes a declared column may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub fn keyword(self) -> &'static str {
        match self {
            ColumnType::Null => "NULL",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NULL" => Ok(ColumnType::Null),
            "INTEGER" => Ok(ColumnType::Integer),
            "REAL" => Ok(ColumnType::Real),
            "TEXT" => Ok(ColumnType::Text),
            "BLOB" => Ok(ColumnType::Blob),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.keyword().to_string()
    }
}

/// Returns true for plain SQL identifiers: an ASCII letter or `_` followed by
/// letters, digits or `_`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn check_identifier(kind: &str, name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::StatementBuild(format!("{} must not be empty", kind)));
    }
    if !is_identifier(name) {
        return Err(AppError::StatementBuild(format!("{} '{}' is not a valid identifier", kind, name)));
    }
    Ok(())
}

/// A declared table. The implicit `ID` column is not part of `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: BTreeMap<String, ColumnType>,
}

impl TableSchema {
    pub fn new<I, S>(table_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let mut schema = Self { table_name: table_name.into(), columns: BTreeMap::new() };
        for (name, ty) in columns {
            let name = name.into();
            // A declared ID column is folded into the implicit primary key.
            if name.eq_ignore_ascii_case(ID_COLUMN) {
                continue;
            }
            schema.columns.insert(name, ty);
        }
        schema
    }

    pub fn validate(&self) -> AppResult<()> {
        check_identifier("table name", &self.table_name)?;
        for name in self.columns.keys() {
            check_identifier("column name", name)?;
        }
        Ok(())
    }

    /// The declared type of `column`, compared case-insensitively. `ID` is
    /// always an INTEGER.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        if column.eq_ignore_ascii_case(ID_COLUMN) {
            return Some(ColumnType::Integer);
        }
        self.columns.iter().find(|(name, _)| name.eq_ignore_ascii_case(column)).map(|(_, ty)| *ty)
    }

    pub fn create_statement(&self) -> AppResult<Statement> {
        self.validate()?;
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT",
            self.table_name, ID_COLUMN
        );
        for (name, ty) in &self.columns {
            sql.push_str(", ");
            sql.push_str(name);
            sql.push(' ');
            sql.push_str(ty.keyword());
        }
        sql.push(')');
        Ok(Statement::raw(sql))
    }
}

/// Creates the table if absent, then compares the existing columns with the
/// declaration. A divergent table is reported as `SchemaConflict` and left
/// untouched.
pub async fn ensure_table(db: &Database, schema: &TableSchema) -> AppResult<()> {
    let create = schema.create_statement()?;
    db.execute(&create).await?;

    let existing = existing_columns(db, &schema.table_name).await?;
    let mut declared: Vec<(String, String)> = schema
        .columns
        .iter()
        .map(|(name, ty)| (name.to_ascii_lowercase(), ty.keyword().to_string()))
        .collect();
    declared.push((ID_COLUMN.to_ascii_lowercase(), ColumnType::Integer.keyword().to_string()));
    declared.sort();

    if declared != existing {
        let render = |cols: &[(String, String)]| {
            cols.iter().map(|(n, t)| format!("{} {}", n, t)).collect::<Vec<_>>().join(", ")
        };
        return Err(AppError::SchemaConflict(format!(
            "table {} exists with columns ({}) but is declared with ({})",
            schema.table_name,
            render(&existing),
            render(&declared)
        )));
    }
    tracing::debug!("Table {} ensured ({} columns)", schema.table_name, schema.columns.len());
    Ok(())
}

async fn existing_columns(db: &Database, table: &str) -> AppResult<Vec<(String, String)>> {
    // table was validated as an identifier by create_statement
    let sql = format!("PRAGMA table_info({})", table);
    let rows = db.fetch_rows(&Statement::raw(sql)).await?;
    let mut cols = Vec::with_capacity(rows.len());
    for row in rows {
        let name = row.get("name").and_then(|v| v.as_text()).unwrap_or_default().to_ascii_lowercase();
        let mut ty = row.get("type").and_then(|v| v.as_text()).unwrap_or_default().to_ascii_uppercase();
        // `<col> NULL` parses as a constraint, leaving the declared type empty.
        if ty.is_empty() {
            ty = ColumnType::Null.keyword().to_string();
        }
        cols.push((name, ty));
    }
    cols.sort();
    Ok(cols)
}

/// All tables known to the process: the core tables plus every table an
/// extension declared. Doubles as the identifier allow-list.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures the table in the database and records it.
    pub async fn ensure(&mut self, db: &Database, schema: TableSchema) -> AppResult<()> {
        ensure_table(db, &schema).await?;
        self.register(schema);
        Ok(())
    }

    /// Records a schema without touching the database.
    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table_name.to_ascii_lowercase(), schema);
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Checks that `table` is registered and every column in `columns` is
    /// declared on it.
    pub fn check<'a, I>(&self, table: &str, columns: I) -> AppResult<&TableSchema>
    where
        I: IntoIterator<Item = &'a String>,
    {
        check_identifier("table name", table)?;
        let schema = self
            .table(table)
            .ok_or_else(|| AppError::StatementBuild(format!("table '{}' is not declared", table)))?;
        for column in columns {
            check_identifier("column name", column)?;
            if schema.column_type(column).is_none() {
                return Err(AppError::StatementBuild(format!(
                    "column '{}' is not declared on table '{}'",
                    column, schema.table_name
                )));
            }
        }
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_parses_case_insensitively() {
        assert_eq!("text".parse::<ColumnType>().unwrap(), ColumnType::Text);
        assert_eq!(" Integer ".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert!("VARCHAR".parse::<ColumnType>().is_err());
        assert!("".parse::<ColumnType>().is_err());
    }

    #[test]
    fn create_statement_adds_implicit_id() {
        let schema = TableSchema::new(
            "PDFS",
            [("ID", ColumnType::Integer), ("Hash", ColumnType::Text), ("Page", ColumnType::Integer)],
        );
        let stmt = schema.create_statement().unwrap();
        assert_eq!(
            stmt.sql(),
            "CREATE TABLE IF NOT EXISTS PDFS (ID INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, Hash TEXT, Page INTEGER)"
        );
    }

    #[test]
    fn create_statement_rejects_bad_identifiers() {
        let empty = TableSchema::new("", [("a", ColumnType::Text)]);
        assert!(matches!(empty.create_statement(), Err(AppError::StatementBuild(_))));

        let injected = TableSchema::new("t; DROP TABLE x", [("a", ColumnType::Text)]);
        assert!(matches!(injected.create_statement(), Err(AppError::StatementBuild(_))));

        let bad_col = TableSchema::new("t", [("a b", ColumnType::Text)]);
        assert!(matches!(bad_col.create_statement(), Err(AppError::StatementBuild(_))));
    }

    #[test]
    fn registry_check_is_case_insensitive() {
        let mut reg = SchemaRegistry::new();
        reg.register(TableSchema::new("FileSettings", [("Username", ColumnType::Text)]));

        let cols = vec!["username".to_string(), "id".to_string()];
        assert!(reg.check("filesettings", &cols).is_ok());

        let unknown = vec!["Password".to_string()];
        assert!(matches!(reg.check("FileSettings", &unknown), Err(AppError::StatementBuild(_))));
        assert!(matches!(reg.check("Users", &Vec::<String>::new()), Err(AppError::StatementBuild(_))));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("ApplicationLink"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a\"b"));
    }
}
