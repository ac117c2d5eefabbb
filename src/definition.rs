use std::fs;
use std::path::Path;

use thiserror::Error;
use toml::{Table, Value};

use crate::core::display;

/// Pseudo-keys recognized inside a table block. Everything else in the
/// block is data records.
const KEY_TRUNCATE: &str = "_truncate";
const KEY_DEFAULTS: &str = "_defaults";
const KEY_ENTITY_OPTIONS: &str = "_entityOptions";
const KEY_OPTIONS_LEGACY: &str = "_options";
const KEY_SAVE_OPTIONS: &str = "_saveOptions";

#[derive(Debug, Error)]
pub enum DefinitionError {
	#[error("reading seed file {path}: {source}")]
	Read {
		path: String,
		source: std::io::Error,
	},

	#[error("parsing seed file {path}: {source}")]
	Parse {
		path: String,
		source: toml::de::Error,
	},

	#[error("seed definition entry `{0}` must be a table block")]
	BadTable(String),

	#[error("table `{table}`: `{key}` must be {expected}")]
	BadPseudoKey {
		table: String,
		key: &'static str,
		expected: &'static str,
	},

	#[error("table `{table}`: unrecognized pseudo-key `{key}`")]
	UnknownPseudoKey { table: String, key: String },

	#[error("table `{table}`: entry `{key}` must be a record table or an array of record tables")]
	BadRecord { table: String, key: String },
}

/// One parsed seed file: table names mapped to their seed specs, in the
/// order the file declares them.
#[derive(Debug, Clone, Default)]
pub struct SeedDefinition {
	pub tables: Vec<(String, TableSeedSpec)>,
}

#[derive(Debug, Clone, Default)]
pub struct TableSeedSpec {
	pub truncate: bool,
	pub defaults: Table,
	pub entity_options: Table,
	pub save_options: Table,
	pub records: Vec<Table>,
	/// Set when the spec used the deprecated `_options` alias.
	pub legacy_options: bool,
}

/// Reads and parses a seed definition file. Both a missing file and a
/// malformed one are fatal to the run.
pub fn load(path: &Path) -> Result<SeedDefinition, DefinitionError> {
	let raw = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
		path: display(path),
		source,
	})?;

	parse(&raw).map_err(|err| match err {
		DefinitionError::Parse { source, .. } => DefinitionError::Parse {
			path: display(path),
			source,
		},
		other => other,
	})
}

/// Parses an already-loaded TOML string. Used by `load` and by tests.
pub fn parse(raw: &str) -> Result<SeedDefinition, DefinitionError> {
	let document: Table = toml::from_str(raw).map_err(|source| DefinitionError::Parse {
		path: "<inline>".to_string(),
		source,
	})?;

	definition_from_document(document)
}

fn definition_from_document(document: Table) -> Result<SeedDefinition, DefinitionError> {
	let mut tables = Vec::with_capacity(document.len());

	for (name, value) in document {
		let Value::Table(block) = value else {
			return Err(DefinitionError::BadTable(name));
		};
		let spec = spec_from_block(&name, block)?;
		tables.push((name, spec));
	}

	Ok(SeedDefinition { tables })
}

fn spec_from_block(table: &str, block: Table) -> Result<TableSeedSpec, DefinitionError> {
	let mut spec = TableSeedSpec::default();
	let mut legacy_entity_options: Option<Table> = None;

	for (key, value) in block {
		match key.as_str() {
			KEY_TRUNCATE => match value {
				Value::Boolean(flag) => spec.truncate = flag,
				_ => return Err(bad_pseudo_key(table, KEY_TRUNCATE, "a boolean")),
			},
			KEY_DEFAULTS => spec.defaults = expect_table(table, KEY_DEFAULTS, value)?,
			KEY_ENTITY_OPTIONS => {
				spec.entity_options = expect_table(table, KEY_ENTITY_OPTIONS, value)?;
			}
			KEY_OPTIONS_LEGACY => {
				legacy_entity_options = Some(expect_table(table, KEY_OPTIONS_LEGACY, value)?);
				spec.legacy_options = true;
			}
			KEY_SAVE_OPTIONS => spec.save_options = expect_table(table, KEY_SAVE_OPTIONS, value)?,
			_ if key.starts_with('_') => {
				return Err(DefinitionError::UnknownPseudoKey {
					table: table.to_string(),
					key,
				});
			}
			_ => match value {
				Value::Table(record) => spec.records.push(record),
				Value::Array(elements) => {
					for element in elements {
						let Value::Table(record) = element else {
							return Err(bad_record(table, &key));
						};
						spec.records.push(record);
					}
				}
				_ => return Err(bad_record(table, &key)),
			},
		}
	}

	// `_entityOptions` wins when both spellings are present.
	if spec.entity_options.is_empty() {
		if let Some(options) = legacy_entity_options {
			spec.entity_options = options;
		}
	}

	Ok(spec)
}

fn expect_table(table: &str, key: &'static str, value: Value) -> Result<Table, DefinitionError> {
	match value {
		Value::Table(inner) => Ok(inner),
		_ => Err(bad_pseudo_key(table, key, "a table of values")),
	}
}

fn bad_pseudo_key(table: &str, key: &'static str, expected: &'static str) -> DefinitionError {
	DefinitionError::BadPseudoKey {
		table: table.to_string(),
		key,
		expected,
	}
}

fn bad_record(table: &str, key: &str) -> DefinitionError {
	DefinitionError::BadRecord {
		table: table.to_string(),
		key: key.to_string(),
	}
}

/// Merges `over` onto `base`. Leaf values from `over` win, nested tables
/// merge recursively, everything else replaces outright.
pub fn deep_merge(base: &Table, over: &Table) -> Table {
	let mut out = base.clone();
	for (key, value) in over {
		let merged = match (out.get(key), value) {
			(Some(Value::Table(existing)), Value::Table(incoming)) => {
				Value::Table(deep_merge(existing, incoming))
			}
			_ => value.clone(),
		};
		out.insert(key.clone(), merged);
	}
	out
}

/// Only a missing key or an empty string counts as an absent value; `0`
/// and `false` are legitimate primary keys.
pub fn is_empty_value(value: &Value) -> bool {
	match value {
		Value::String(text) => text.is_empty(),
		_ => false,
	}
}

/// Renders a value for console output: strings without quoting, anything
/// else via its TOML display form.
pub fn display_value(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pseudo_keys_are_extracted_from_the_block() {
		let def = parse(
			r#"
			[posts]
			_truncate = true
			_entityOptions = { validate = false }
			_saveOptions = { checkRules = false }

			[posts._defaults]
			author = "Jane Doe"

			[posts.faq]
			id = 1
			title = "Frequently Asked Questions"
			"#,
		)
		.expect("definition should parse");

		assert_eq!(def.tables.len(), 1);
		let (name, spec) = &def.tables[0];
		assert_eq!(name, "posts");
		assert!(spec.truncate);
		assert_eq!(spec.defaults["author"], Value::from("Jane Doe"));
		assert_eq!(spec.entity_options["validate"], Value::from(false));
		assert_eq!(spec.save_options["checkRules"], Value::from(false));
		assert!(!spec.legacy_options);
		assert_eq!(spec.records.len(), 1);
		assert_eq!(spec.records[0]["id"], Value::from(1));
	}

	#[test]
	fn legacy_options_alias_behaves_like_entity_options() {
		let def = parse(
			r#"
			[posts]
			_options = { validate = false }

			[posts.faq]
			id = 1
			"#,
		)
		.expect("definition should parse");

		let (_, spec) = &def.tables[0];
		assert!(spec.legacy_options);
		assert_eq!(spec.entity_options["validate"], Value::from(false));
	}

	#[test]
	fn entity_options_wins_over_legacy_alias() {
		let def = parse(
			r#"
			[posts]
			_options = { validate = false }
			_entityOptions = { validate = true }
			"#,
		)
		.expect("definition should parse");

		let (_, spec) = &def.tables[0];
		assert!(spec.legacy_options);
		assert_eq!(spec.entity_options["validate"], Value::from(true));
	}

	#[test]
	fn records_keep_their_declared_order() {
		let def = parse(
			r#"
			[posts.zebra]
			id = 3

			[posts.apple]
			id = 1

			[[posts.extra]]
			id = 7

			[[posts.extra]]
			id = 8
			"#,
		)
		.expect("definition should parse");

		let (_, spec) = &def.tables[0];
		let ids: Vec<_> = spec.records.iter().map(|r| r["id"].clone()).collect();
		assert_eq!(
			ids,
			vec![Value::from(3), Value::from(1), Value::from(7), Value::from(8)]
		);
	}

	#[test]
	fn tables_keep_their_declared_order() {
		let def = parse(
			r#"
			[second]
			[first]
			[third]
			"#,
		)
		.expect("definition should parse");

		let names: Vec<_> = def.tables.iter().map(|(name, _)| name.clone()).collect();
		assert_eq!(names, vec!["second", "first", "third"]);
	}

	#[test]
	fn scalar_record_entries_are_rejected() {
		let err = parse(
			r#"
			[posts]
			stray = 42
			"#,
		)
		.expect_err("scalar entry should fail");
		assert!(matches!(err, DefinitionError::BadRecord { .. }));
	}

	#[test]
	fn unknown_pseudo_keys_are_rejected() {
		let err = parse(
			r#"
			[posts]
			_rename = true
			"#,
		)
		.expect_err("unknown pseudo-key should fail");
		assert!(matches!(err, DefinitionError::UnknownPseudoKey { .. }));
	}

	#[test]
	fn top_level_scalars_are_rejected() {
		let err = parse("posts = 1\n").expect_err("scalar table should fail");
		assert!(matches!(err, DefinitionError::BadTable(_)));
	}

	#[test]
	fn deep_merge_prefers_record_values() {
		let defaults = toml::toml! {
			author = "Jane Doe"
			is_published = true
		};
		let record = toml::toml! {
			author = "John Doe"
			title = "About Us"
		};

		let merged = deep_merge(&defaults, &record);
		assert_eq!(merged["author"], Value::from("John Doe"));
		assert_eq!(merged["is_published"], Value::from(true));
		assert_eq!(merged["title"], Value::from("About Us"));
	}

	#[test]
	fn deep_merge_recurses_into_nested_tables() {
		let defaults = toml::toml! {
			[meta]
			lang = "en"
			draft = true
		};
		let record = toml::toml! {
			[meta]
			draft = false
		};

		let merged = deep_merge(&defaults, &record);
		let meta = merged["meta"].as_table().expect("meta should be a table");
		assert_eq!(meta["lang"], Value::from("en"));
		assert_eq!(meta["draft"], Value::from(false));
	}

	#[test]
	fn deep_merge_replaces_non_table_values_outright() {
		let defaults = toml::toml! {
			tags = ["a", "b"]
		};
		let record = toml::toml! {
			tags = ["c"]
		};

		let merged = deep_merge(&defaults, &record);
		assert_eq!(merged["tags"], Value::Array(vec![Value::from("c")]));
	}

	#[test]
	fn empty_value_covers_missing_and_blank_strings_only() {
		assert!(is_empty_value(&Value::from("")));
		assert!(!is_empty_value(&Value::from("x")));
		assert!(!is_empty_value(&Value::from(0)));
		assert!(!is_empty_value(&Value::from(false)));
	}

	#[test]
	fn display_value_renders_strings_bare() {
		assert_eq!(display_value(&Value::from("abc")), "abc");
		assert_eq!(display_value(&Value::from(7)), "7");
	}
}
