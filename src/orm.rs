use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use toml::{Table, Value};

use crate::definition::{display_value, is_empty_value};

/// Field-level error messages, keyed by field name.
pub type Errors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum OrmError {
	#[error("unknown table `{0}`")]
	UnknownTable(String),

	#[error("database error: {0}")]
	Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Create,
	Update,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Action::Create => write!(f, "create"),
			Action::Update => write!(f, "update"),
		}
	}
}

/// A stored row, keyed by column name. Absent columns are simply missing.
#[derive(Debug, Clone, Default)]
pub struct Row {
	pub fields: Table,
}

/// A row candidate produced by reconciliation, ready to persist. Backends
/// populate `errors` at construction (validation) and again on a failed
/// save.
#[derive(Debug, Clone)]
pub struct Candidate {
	pub action: Action,
	pub fields: Table,
	pub changed: bool,
	pub errors: Errors,
}

impl Candidate {
	pub fn new(action: Action, fields: Table) -> Self {
		Self {
			action,
			fields,
			changed: true,
			errors: Errors::new(),
		}
	}

	pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.errors.entry(field.into()).or_default().push(message.into());
	}

	/// The key value to show in console output, or the literal `unknown`.
	pub fn key_display(&self, key_field: &str) -> String {
		match self.fields.get(key_field) {
			Some(value) if !is_empty_value(value) => display_value(value),
			_ => "unknown".to_string(),
		}
	}
}

/// The capability interface the seed runner is handed. Implemented by the
/// SQLite backend and by the in-memory ORM the tests use.
pub trait Orm {
	fn load_table<'a>(&'a self, name: &str) -> Result<Box<dyn TableHandle + 'a>, OrmError>;
}

pub trait TableHandle: std::fmt::Debug {
	fn name(&self) -> &str;

	fn primary_key(&self) -> &str;

	/// Looks up the row whose primary key equals `key`.
	fn find(&self, key: &Value) -> Option<Row>;

	/// Builds a create candidate, validating `fields` unless the entity
	/// options disable it.
	fn new_candidate(&self, fields: Table, options: &Table) -> Candidate;

	/// Builds an update candidate by applying `fields` onto `existing`.
	/// `changed` reports whether any field actually differs.
	fn patch_candidate(&self, existing: &Row, fields: Table, options: &Table) -> Candidate;

	/// Persists the candidate. On failure the candidate's error map is
	/// populated and `false` returned.
	fn save(&self, candidate: &mut Candidate, options: &Table) -> bool;

	/// Removes every row. Failure is reported, not fatal.
	fn truncate(&self) -> bool;
}
