use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use serde::Deserialize;
use toml::{Table, Value};

use crate::definition::is_empty_value;
use crate::orm::{Action, Candidate, Errors, Orm, OrmError, Row, TableHandle};

/// SQLite-backed implementation of the ORM capabilities. Table shape comes
/// from `pragma_table_info`; there is no schema cache, every `load_table`
/// re-introspects.
pub struct SqliteOrm {
	conn: Connection,
}

impl SqliteOrm {
	pub fn new(conn: Connection) -> Self {
		Self { conn }
	}

	pub fn open(path: &Path) -> Result<Self> {
		let conn = Connection::open(path)
			.with_context(|| format!("opening database {}", path.display()))?;
		conn.pragma_update(None, "foreign_keys", true)
			.context("enabling foreign key enforcement")?;
		Ok(Self::new(conn))
	}
}

impl Orm for SqliteOrm {
	fn load_table<'a>(&'a self, name: &str) -> Result<Box<dyn TableHandle + 'a>, OrmError> {
		let mut stmt = self
			.conn
			.prepare("SELECT name, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)")
			.map_err(backend)?;
		let mut rows = stmt.query(params![name]).map_err(backend)?;

		let mut columns = Vec::new();
		while let Some(row) = rows.next().map_err(backend)? {
			columns.push(ColumnInfo {
				name: row.get(0).map_err(backend)?,
				not_null: row.get::<_, i64>(1).map_err(backend)? != 0,
				has_default: row.get::<_, Option<String>>(2).map_err(backend)?.is_some(),
				primary_key: row.get::<_, i64>(3).map_err(backend)? != 0,
			});
		}

		if columns.is_empty() {
			return Err(OrmError::UnknownTable(name.to_string()));
		}

		let key = columns
			.iter()
			.find(|column| column.primary_key)
			.map(|column| column.name.clone())
			.unwrap_or_else(|| String::from("rowid"));

		Ok(Box::new(SqliteTable {
			conn: &self.conn,
			name: name.to_string(),
			key,
			columns,
		}))
	}
}

#[derive(Debug, Clone)]
struct ColumnInfo {
	name: String,
	not_null: bool,
	has_default: bool,
	primary_key: bool,
}

#[derive(Debug)]
struct SqliteTable<'a> {
	conn: &'a Connection,
	name: String,
	key: String,
	columns: Vec<ColumnInfo>,
}

/// Entity construction options, read from `_entityOptions`. Unknown keys
/// pass through untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EntityBehavior {
	validate: bool,
}

impl Default for EntityBehavior {
	fn default() -> Self {
		Self { validate: true }
	}
}

/// Persistence options, read from `_saveOptions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SaveBehavior {
	check_rules: bool,
	check_existing: bool,
}

impl Default for SaveBehavior {
	fn default() -> Self {
		Self {
			check_rules: true,
			check_existing: true,
		}
	}
}

fn behavior_from_options<T>(options: &Table) -> T
where
	T: for<'de> Deserialize<'de> + Default,
{
	Value::Table(options.clone()).try_into().unwrap_or_default()
}

impl SqliteTable<'_> {
	fn validate_fields(&self, fields: &Table, errors: &mut Errors) {
		for key in fields.keys() {
			if !self.columns.iter().any(|column| &column.name == key) {
				errors
					.entry(key.clone())
					.or_default()
					.push(format!("No such column on table {}.", self.name));
			}
		}

		for column in &self.columns {
			if column.primary_key || !column.not_null || column.has_default {
				continue;
			}
			let missing = match fields.get(&column.name) {
				Some(value) => is_empty_value(value),
				None => true,
			};
			if missing {
				errors
					.entry(column.name.clone())
					.or_default()
					.push("This field cannot be left empty.".to_string());
			}
		}
	}

	fn insert(&self, candidate: &Candidate) -> rusqlite::Result<()> {
		if candidate.fields.is_empty() {
			let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.name));
			self.conn.execute(&sql, [])?;
			return Ok(());
		}

		let columns: Vec<String> = candidate
			.fields
			.keys()
			.map(|key| quote_ident(key))
			.collect();
		let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
		let sql = format!(
			"INSERT INTO {} ({}) VALUES ({})",
			quote_ident(&self.name),
			columns.join(", "),
			placeholders.join(", ")
		);
		let values: Vec<SqlValue> = candidate.fields.values().map(to_sql_value).collect();
		self.conn.execute(&sql, params_from_iter(values))?;
		Ok(())
	}

	fn update(&self, candidate: &Candidate) -> rusqlite::Result<()> {
		let mut assignments = Vec::new();
		let mut values: Vec<SqlValue> = Vec::new();
		for (key, value) in &candidate.fields {
			if key == &self.key {
				continue;
			}
			assignments.push(format!("{} = ?{}", quote_ident(key), assignments.len() + 1));
			values.push(to_sql_value(value));
		}
		if assignments.is_empty() {
			return Ok(());
		}

		let Some(key_value) = candidate.fields.get(&self.key) else {
			return Ok(());
		};
		values.push(to_sql_value(key_value));

		let sql = format!(
			"UPDATE {} SET {} WHERE {} = ?{}",
			quote_ident(&self.name),
			assignments.join(", "),
			quote_ident(&self.key),
			values.len()
		);
		self.conn.execute(&sql, params_from_iter(values))?;
		Ok(())
	}
}

impl TableHandle for SqliteTable<'_> {
	fn name(&self) -> &str {
		&self.name
	}

	fn primary_key(&self) -> &str {
		&self.key
	}

	fn find(&self, key: &Value) -> Option<Row> {
		let column_list: Vec<String> = self
			.columns
			.iter()
			.map(|column| quote_ident(&column.name))
			.collect();
		let sql = format!(
			"SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
			column_list.join(", "),
			quote_ident(&self.name),
			quote_ident(&self.key)
		);

		let mut stmt = self.conn.prepare(&sql).ok()?;
		let mut rows = stmt.query(params![to_sql_value(key)]).ok()?;
		let row = rows.next().ok().flatten()?;

		let mut fields = Table::new();
		for (idx, column) in self.columns.iter().enumerate() {
			let value: SqlValue = row.get(idx).ok()?;
			if let Some(value) = sql_to_toml(value) {
				fields.insert(column.name.clone(), value);
			}
		}
		Some(Row { fields })
	}

	fn new_candidate(&self, fields: Table, options: &Table) -> Candidate {
		let behavior: EntityBehavior = behavior_from_options(options);
		let mut candidate = Candidate::new(Action::Create, fields);
		if behavior.validate {
			let mut errors = Errors::new();
			self.validate_fields(&candidate.fields, &mut errors);
			candidate.errors = errors;
		}
		candidate
	}

	fn patch_candidate(&self, existing: &Row, fields: Table, options: &Table) -> Candidate {
		let behavior: EntityBehavior = behavior_from_options(options);

		let mut changed = false;
		let mut resulting = existing.fields.clone();
		for (key, value) in fields {
			let same = existing
				.fields
				.get(&key)
				.is_some_and(|stored| values_equal(&value, stored));
			if !same {
				changed = true;
			}
			resulting.insert(key, value);
		}

		let mut candidate = Candidate::new(Action::Update, resulting);
		candidate.changed = changed;
		if behavior.validate {
			let mut errors = Errors::new();
			self.validate_fields(&candidate.fields, &mut errors);
			candidate.errors = errors;
		}
		candidate
	}

	fn save(&self, candidate: &mut Candidate, options: &Table) -> bool {
		let behavior: SaveBehavior = behavior_from_options(options);

		if candidate.action == Action::Create && behavior.check_existing {
			if let Some(key) = candidate.fields.get(&self.key) {
				if !is_empty_value(key) && self.find(key).is_some() {
					candidate.add_error(
						self.key.clone(),
						"A record with this key already exists.",
					);
					return false;
				}
			}
		}

		if !behavior.check_rules {
			let _ = self.conn.pragma_update(None, "foreign_keys", false);
		}
		let result = match candidate.action {
			Action::Create => self.insert(candidate),
			Action::Update => self.update(candidate),
		};
		if !behavior.check_rules {
			let _ = self.conn.pragma_update(None, "foreign_keys", true);
		}

		match result {
			Ok(()) => {
				if candidate.action == Action::Create
					&& !candidate.fields.contains_key(&self.key)
				{
					let assigned = self.conn.last_insert_rowid();
					candidate.fields.insert(self.key.clone(), Value::from(assigned));
				}
				true
			}
			Err(err) => {
				record_save_error(candidate, &err.to_string());
				false
			}
		}
	}

	fn truncate(&self) -> bool {
		let sql = format!("DELETE FROM {}", quote_ident(&self.name));
		self.conn.execute(&sql, []).is_ok()
	}
}

/// Maps a constraint failure back to its column(s) when the message names
/// them (`NOT NULL constraint failed: posts.title`), otherwise files the
/// whole message under `database`.
fn record_save_error(candidate: &mut Candidate, message: &str) {
	let mut fields = Vec::new();
	if let Some(rest) = message.split("constraint failed: ").nth(1) {
		for part in rest.split(", ") {
			if let Some((_, column)) = part.rsplit_once('.') {
				fields.push(column.trim().to_string());
			}
		}
	}

	if fields.is_empty() {
		candidate.add_error("database", message);
	} else {
		for field in fields {
			candidate.add_error(field, message);
		}
	}
}

fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn backend(err: rusqlite::Error) -> OrmError {
	OrmError::Backend(err.to_string())
}

/// Seed values map onto SQLite's storage classes; nested arrays/tables are
/// stored as JSON text.
fn to_sql_value(value: &Value) -> SqlValue {
	match value {
		Value::String(text) => SqlValue::Text(text.clone()),
		Value::Integer(number) => SqlValue::Integer(*number),
		Value::Float(number) => SqlValue::Real(*number),
		Value::Boolean(flag) => SqlValue::Integer(*flag as i64),
		Value::Datetime(stamp) => SqlValue::Text(stamp.to_string()),
		Value::Array(_) | Value::Table(_) => SqlValue::Text(json_text(value)),
	}
}

fn sql_to_toml(value: SqlValue) -> Option<Value> {
	match value {
		SqlValue::Integer(number) => Some(Value::from(number)),
		SqlValue::Real(number) => Some(Value::from(number)),
		SqlValue::Text(text) => Some(Value::from(text)),
		SqlValue::Null | SqlValue::Blob(_) => None,
	}
}

/// Equality across the storage coercions above, so a re-run of the same
/// seed reads back as unchanged.
fn values_equal(new: &Value, stored: &Value) -> bool {
	match (new, stored) {
		(Value::Boolean(flag), Value::Integer(number)) => (*flag as i64) == *number,
		(Value::Integer(int), Value::Float(float))
		| (Value::Float(float), Value::Integer(int)) => (*int as f64) == *float,
		(Value::Datetime(stamp), Value::String(text)) => stamp.to_string() == *text,
		(Value::Array(_) | Value::Table(_), Value::String(text)) => json_text(new) == *text,
		_ => new == stored,
	}
}

fn json_text(value: &Value) -> String {
	serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}
