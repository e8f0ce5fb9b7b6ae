//! Declarative CRUD over declared tables.
//!
//! A [`QuerySpec`] names an operation, a table, the column types used to bind
//! literals, an equality predicate and an assignment. Statements are always
//! parameterized: identifiers are interpolated only after the
//! [`SchemaRegistry`] allow-list accepted them, values travel as binds.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::schema::{ColumnType, SchemaRegistry, TableSchema};

/// A single cell, decoded from the SQLite storage class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One result row. Column order is the order the engine returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn with_capacity(n: usize) -> Self {
        Self { columns: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Statement text with `?` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    binds: Vec<Value>,
}

impl Statement {
    /// A statement without binds (DDL, pragmas).
    pub fn raw(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), binds: Vec::new() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn push_bind(&mut self, value: Value) {
        self.sql.push('?');
        self.binds.push(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operation {
    Insert,
    Select,
    Update,
    Delete,
}

impl Operation {
    pub fn keyword(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Select => "SELECT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "SELECT" => Ok(Operation::Select),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(format!("unknown database operation '{}'", other)),
        }
    }
}

impl TryFrom<String> for Operation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operation> for String {
    fn from(value: Operation) -> Self {
        value.keyword().to_string()
    }
}

/// Predicate and assignment literals rendered as SQL literal text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCorrected {
    pub predicate: BTreeMap<String, String>,
    pub assignment: BTreeMap<String, String>,
}

/// One CRUD operation plus its bound literal values.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub operation: Operation,
    pub table_name: String,
    pub column_types: BTreeMap<String, ColumnType>,
    pub predicate: BTreeMap<String, String>,
    pub assignment: BTreeMap<String, String>,
    pub result_rows: Vec<Row>,
}

impl QuerySpec {
    pub fn new(operation: Operation, table_name: impl Into<String>) -> Self {
        Self {
            operation,
            table_name: table_name.into(),
            column_types: BTreeMap::new(),
            predicate: BTreeMap::new(),
            assignment: BTreeMap::new(),
            result_rows: Vec::new(),
        }
    }

    /// Takes the column types from a declared table.
    pub fn with_schema(mut self, schema: &TableSchema) -> Self {
        self.column_types = schema.columns.clone();
        self
    }

    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.column_types.insert(name.into(), ty);
        self
    }

    pub fn filter(mut self, column: impl Into<String>, literal: impl Into<String>) -> Self {
        self.predicate.insert(column.into(), literal.into());
        self
    }

    pub fn set(mut self, column: impl Into<String>, literal: impl Into<String>) -> Self {
        self.assignment.insert(column.into(), literal.into());
        self
    }

    fn declared_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, ty)| *ty)
    }

    /// Converts a literal into the value bound for `column`.
    fn bind_value(&self, column: &str, literal: &str) -> AppResult<Value> {
        let parse_err = |ty: ColumnType| {
            AppError::StatementBuild(format!("column '{}' expects {}, got '{}'", column, ty, literal))
        };
        match self.declared_type(column) {
            Some(ColumnType::Text) | None => Ok(Value::Text(literal.to_string())),
            Some(ColumnType::Integer) => {
                literal.trim().parse::<i64>().map(Value::Integer).map_err(|_| parse_err(ColumnType::Integer))
            }
            Some(ColumnType::Real) => {
                literal.trim().parse::<f64>().map(Value::Real).map_err(|_| parse_err(ColumnType::Real))
            }
            Some(ColumnType::Blob) => Ok(Value::Blob(literal.as_bytes().to_vec())),
            Some(ColumnType::Null) => Ok(Value::Null),
        }
    }

    /// Renders every literal as SQL literal text: TEXT values are wrapped in
    /// single quotes once, with embedded quotes doubled; every other type is
    /// left as given.
    pub fn type_correct(&self) -> TypeCorrected {
        let render = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(column, literal)| {
                    let text = match self.declared_type(column) {
                        Some(ColumnType::Text) => format!("'{}'", literal.replace('\'', "''")),
                        _ => literal.clone(),
                    };
                    (column.clone(), text)
                })
                .collect()
        };
        TypeCorrected { predicate: render(&self.predicate), assignment: render(&self.assignment) }
    }

    fn push_conjuncts(&self, stmt: &mut Statement, map: &BTreeMap<String, String>, sep: &str) -> AppResult<()> {
        for (i, (column, literal)) in map.iter().enumerate() {
            if i > 0 {
                stmt.push(sep);
            }
            stmt.push(column);
            stmt.push(" = ");
            stmt.push_bind(self.bind_value(column, literal)?);
        }
        Ok(())
    }

    fn check_table(&self) -> AppResult<()> {
        if self.table_name.trim().is_empty() {
            return Err(AppError::StatementBuild("table name must not be empty".into()));
        }
        crate::schema::check_identifier("table name", &self.table_name)
    }

    /// `INSERT INTO t (a, b) VALUES (?, ?)`. Values come from the assignment,
    /// or from the predicate when no assignment is given.
    pub fn build_insert(&self) -> AppResult<Statement> {
        self.check_table()?;
        let source = if self.assignment.is_empty() { &self.predicate } else { &self.assignment };
        if source.is_empty() {
            return Err(AppError::StatementBuild(format!("INSERT into {} has no values", self.table_name)));
        }
        let mut stmt = Statement::raw(format!("INSERT INTO {} (", self.table_name));
        stmt.push(&source.keys().cloned().collect::<Vec<_>>().join(", "));
        stmt.push(") VALUES (");
        for (i, (column, literal)) in source.iter().enumerate() {
            if i > 0 {
                stmt.push(", ");
            }
            stmt.push_bind(self.bind_value(column, literal)?);
        }
        stmt.push(")");
        Ok(stmt)
    }

    /// `SELECT * FROM t [WHERE a = ? AND b = ?]`.
    pub fn build_select(&self) -> AppResult<Statement> {
        self.check_table()?;
        let mut stmt = Statement::raw(format!("SELECT * FROM {}", self.table_name));
        if !self.predicate.is_empty() {
            stmt.push(" WHERE ");
            self.push_conjuncts(&mut stmt, &self.predicate, " AND ")?;
        }
        Ok(stmt)
    }

    /// `UPDATE t SET a = ?, b = ? WHERE c = ?`. Both maps must be non-empty.
    pub fn build_update(&self) -> AppResult<Statement> {
        self.check_table()?;
        if self.assignment.is_empty() {
            return Err(AppError::StatementBuild(format!("UPDATE of {} sets no columns", self.table_name)));
        }
        if self.predicate.is_empty() {
            return Err(AppError::StatementBuild(format!("UPDATE of {} has no predicate", self.table_name)));
        }
        let mut stmt = Statement::raw(format!("UPDATE {} SET ", self.table_name));
        self.push_conjuncts(&mut stmt, &self.assignment, ", ")?;
        stmt.push(" WHERE ");
        self.push_conjuncts(&mut stmt, &self.predicate, " AND ")?;
        Ok(stmt)
    }

    /// `DELETE FROM t WHERE a = ?`. The predicate must be non-empty.
    pub fn build_delete(&self) -> AppResult<Statement> {
        self.check_table()?;
        if self.predicate.is_empty() {
            return Err(AppError::StatementBuild(format!("DELETE from {} has no predicate", self.table_name)));
        }
        let mut stmt = Statement::raw(format!("DELETE FROM {} WHERE ", self.table_name));
        self.push_conjuncts(&mut stmt, &self.predicate, " AND ")?;
        Ok(stmt)
    }

    pub fn build(&self) -> AppResult<Statement> {
        match self.operation {
            Operation::Insert => self.build_insert(),
            Operation::Select => self.build_select(),
            Operation::Update => self.build_update(),
            Operation::Delete => self.build_delete(),
        }
    }

    /// The statement with literals inlined, for logs only.
    pub fn render_sql(&self) -> String {
        let corrected = self.type_correct();
        let join = |map: &BTreeMap<String, String>, sep: &str| {
            map.iter().map(|(c, v)| format!("{} = {}", c, v)).collect::<Vec<_>>().join(sep)
        };
        match self.operation {
            Operation::Insert => {
                let source =
                    if corrected.assignment.is_empty() { &corrected.predicate } else { &corrected.assignment };
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.table_name,
                    source.keys().cloned().collect::<Vec<_>>().join(", "),
                    source.values().cloned().collect::<Vec<_>>().join(", ")
                )
            }
            Operation::Select if corrected.predicate.is_empty() => format!("SELECT * FROM {}", self.table_name),
            Operation::Select => {
                format!("SELECT * FROM {} WHERE {}", self.table_name, join(&corrected.predicate, " AND "))
            }
            Operation::Update => format!(
                "UPDATE {} SET {} WHERE {}",
                self.table_name,
                join(&corrected.assignment, ", "),
                join(&corrected.predicate, " AND ")
            ),
            Operation::Delete => {
                format!("DELETE FROM {} WHERE {}", self.table_name, join(&corrected.predicate, " AND "))
            }
        }
    }

    /// Checks identifiers against the registry, merging in any column types
    /// the query does not declare itself.
    fn resolve(&mut self, registry: &SchemaRegistry) -> AppResult<()> {
        let schema = registry.check(&self.table_name, self.predicate.keys().chain(self.assignment.keys()))?;
        for (name, ty) in &schema.columns {
            if self.declared_type(name).is_none() {
                self.column_types.insert(name.clone(), *ty);
            }
        }
        Ok(())
    }

    /// Builds and runs the statement. A SELECT fills `result_rows` and returns
    /// the row count; a mutation leaves `result_rows` empty and returns the
    /// affected-row count. On error `result_rows` is empty.
    pub async fn execute(&mut self, db: &Database, registry: &SchemaRegistry) -> AppResult<u64> {
        self.result_rows.clear();
        self.resolve(registry)?;
        let stmt = self.build()?;
        tracing::debug!("Executing {}", self.render_sql());
        match self.operation {
            Operation::Select => {
                let rows = db.fetch_rows(&stmt).await?;
                let n = rows.len() as u64;
                self.result_rows = rows;
                Ok(n)
            }
            _ => db.execute(&stmt).await,
        }
    }

    /// UPDATE with the predicate and assignment; if no row matched, INSERT
    /// the union of both. Returns the affected-row count of whichever ran.
    pub async fn upsert(&self, db: &Database, registry: &SchemaRegistry) -> AppResult<u64> {
        let mut update = self.clone();
        update.operation = Operation::Update;
        let affected = update.execute(db, registry).await?;
        if affected > 0 {
            return Ok(affected);
        }
        let mut insert = self.clone();
        insert.operation = Operation::Insert;
        let mut values = self.predicate.clone();
        values.extend(self.assignment.clone());
        insert.assignment = values;
        insert.predicate.clear();
        insert.execute(db, registry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdfs() -> QuerySpec {
        QuerySpec::new(Operation::Select, "PDFS")
            .column("Hash", ColumnType::Text)
            .column("Username", ColumnType::Text)
            .column("Page", ColumnType::Integer)
    }

    #[test]
    fn select_without_predicate() {
        let stmt = pdfs().build_select().unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM PDFS");
        assert!(stmt.binds().is_empty());
    }

    #[test]
    fn select_binds_typed_values() {
        let stmt = pdfs().filter("Username", "alice").filter("Page", "3").build_select().unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM PDFS WHERE Page = ? AND Username = ?");
        assert_eq!(stmt.binds(), &[Value::Integer(3), Value::Text("alice".into())]);
    }

    #[test]
    fn insert_uses_predicate_when_assignment_is_empty() {
        let mut spec = pdfs().filter("Hash", "abc").filter("Page", "1");
        spec.operation = Operation::Insert;
        let stmt = spec.build().unwrap();
        assert_eq!(stmt.sql(), "INSERT INTO PDFS (Hash, Page) VALUES (?, ?)");
        assert_eq!(stmt.binds(), &[Value::Text("abc".into()), Value::Integer(1)]);
    }

    #[test]
    fn update_separates_assignments_with_commas() {
        let stmt = pdfs()
            .filter("Hash", "abc")
            .set("Page", "2")
            .set("Username", "bob")
            .build_update()
            .unwrap();
        assert_eq!(stmt.sql(), "UPDATE PDFS SET Page = ?, Username = ? WHERE Hash = ?");
        assert_eq!(stmt.binds().len(), 3);
    }

    #[test]
    fn unbounded_mutations_are_rejected() {
        assert!(matches!(pdfs().set("Page", "2").build_update(), Err(AppError::StatementBuild(_))));
        assert!(matches!(pdfs().filter("Hash", "x").build_update(), Err(AppError::StatementBuild(_))));
        assert!(matches!(pdfs().build_delete(), Err(AppError::StatementBuild(_))));
        assert!(matches!(pdfs().build_insert(), Err(AppError::StatementBuild(_))));
    }

    #[test]
    fn empty_or_invalid_table_name_fails() {
        let spec = QuerySpec::new(Operation::Select, "");
        assert!(matches!(spec.build(), Err(AppError::StatementBuild(_))));
        let spec = QuerySpec::new(Operation::Select, "PDFS; DROP TABLE PDFS");
        assert!(matches!(spec.build(), Err(AppError::StatementBuild(_))));
    }

    #[test]
    fn unparsable_integer_literal_fails() {
        let spec = pdfs().filter("Page", "two");
        assert!(matches!(spec.build_select(), Err(AppError::StatementBuild(_))));
    }

    #[test]
    fn type_correct_quotes_text_once() {
        let spec = pdfs().filter("Username", "alice").filter("Page", "2").set("Hash", "it's");
        let corrected = spec.type_correct();
        assert_eq!(corrected.predicate["Username"], "'alice'");
        assert_eq!(corrected.predicate["Page"], "2");
        assert_eq!(corrected.assignment["Hash"], "'it''s'");

        // the literals themselves are untouched, so correcting twice does not double-quote
        let again = spec.type_correct();
        assert_eq!(again, corrected);
    }

    #[test]
    fn type_correct_leaves_undeclared_columns_alone() {
        let spec = QuerySpec::new(Operation::Select, "T").filter("Free", "x");
        assert_eq!(spec.type_correct().predicate["Free"], "x");
    }

    #[test]
    fn render_sql_inlines_literals() {
        let spec = pdfs().filter("Username", "alice");
        assert_eq!(spec.render_sql(), "SELECT * FROM PDFS WHERE Username = 'alice'");
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("select".parse::<Operation>().unwrap(), Operation::Select);
        assert!("MERGE".parse::<Operation>().is_err());
    }

    #[test]
    fn row_serializes_in_column_order() {
        let mut row = Row::default();
        row.push("Zeta", Value::Integer(1));
        row.push("Alpha", Value::Text("a".into()));
        row.push("Mid", Value::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Zeta":1,"Alpha":"a","Mid":null}"#);
    }
}
