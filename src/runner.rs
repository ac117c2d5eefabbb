use std::path::{Path, PathBuf};

use anyhow::Result;
use toml::Table;

use crate::core::display;
use crate::definition::{self, SeedDefinition, TableSeedSpec, deep_merge, display_value, is_empty_value};
use crate::orm::{Candidate, Errors, Orm, TableHandle};

pub const CONFIG_DIR: &str = "config";
pub const SEED_FILE: &str = "seed.toml";
pub const SEED_DEV_FILE: &str = "seed_dev.toml";

/// Picks the seed file for this run. An explicit `--file` wins over
/// `--dev`, which wins over the default. Relative names resolve under the
/// `config/` directory; absolute paths are used as-is.
pub fn resolve_file_path(dev: bool, explicit: Option<&str>) -> PathBuf {
	let name = match explicit {
		Some(file) if !file.is_empty() => file,
		_ if dev => SEED_DEV_FILE,
		_ => SEED_FILE,
	};
	Path::new(CONFIG_DIR).join(name)
}

/// Runs seed definitions against whatever ORM backend it is handed.
pub struct SeedRunner<'a> {
	orm: &'a dyn Orm,
}

impl<'a> SeedRunner<'a> {
	pub fn new(orm: &'a dyn Orm) -> Self {
		Self { orm }
	}

	/// Loads the definition file and imports everything it declares. A
	/// missing or malformed file aborts with an error; so does an unknown
	/// table name.
	pub fn execute_definition(&self, path: &Path) -> Result<()> {
		println!("Loading seed file `{}`...", display(path));
		let data = definition::load(path)?;
		self.import_tables(&data)?;
		println!("...Done!");
		Ok(())
	}

	pub fn import_tables(&self, data: &SeedDefinition) -> Result<()> {
		println!("Starting seed of {} table(s).", data.tables.len());

		for (name, spec) in &data.tables {
			println!("{name}");

			if spec.legacy_options {
				eprintln!("{name}: `_options` is deprecated, use `_entityOptions` instead.");
			}
			if !spec.defaults.is_empty() {
				println!("{name}: Default values set.");
			}

			let table = self.orm.load_table(name)?;

			if spec.truncate {
				if table.truncate() {
					println!("{name}: Existing records truncated.");
				} else {
					eprintln!("{name}: Can not truncate existing records.");
				}
			}

			for record in &spec.records {
				self.import_record(table.as_ref(), record.clone(), spec);
			}
		}

		println!("Seeding complete.");
		Ok(())
	}

	fn import_record(&self, table: &dyn TableHandle, record: Table, spec: &TableSeedSpec) {
		let Some(mut candidate) = self.reconcile(table, record, spec) else {
			return;
		};

		let saved = table.save(&mut candidate, &spec.save_options);
		// Key display comes after the save so backend-assigned keys show.
		let key = candidate.key_display(table.primary_key());
		if saved {
			println!("{} ({}): Save successful.", table.name(), key);
		} else {
			eprintln!("{} ({}): {} failed.", table.name(), key, candidate.action);
			print_field_errors(table.name(), &key, &candidate.errors);
		}
	}

	/// Decides create vs. patch vs. skip for one raw record. Returns the
	/// candidate to persist, or `None` when the record is a no-op or fails
	/// validation.
	fn reconcile(
		&self,
		table: &dyn TableHandle,
		record: Table,
		spec: &TableSeedSpec,
	) -> Option<Candidate> {
		let mut merged = deep_merge(&spec.defaults, &record);
		let key_field = table.primary_key();

		let id = merged
			.get(key_field)
			.filter(|value| !is_empty_value(value))
			.cloned();

		let candidate = match &id {
			Some(id) => match table.find(id) {
				Some(existing) => {
					let candidate =
						table.patch_candidate(&existing, merged, &spec.entity_options);
					if !candidate.changed {
						println!("{} ({}): No changes.", table.name(), display_value(id));
						return None;
					}
					candidate
				}
				// Creation may carry its own key value.
				None => table.new_candidate(merged, &spec.entity_options),
			},
			None => {
				// Drop a blank key so the backend can generate one.
				merged.remove(key_field);
				table.new_candidate(merged, &spec.entity_options)
			}
		};

		if !candidate.errors.is_empty() {
			let key = candidate.key_display(key_field);
			print_field_errors(table.name(), &key, &candidate.errors);
			return None;
		}

		Some(candidate)
	}
}

fn print_field_errors(table: &str, id: &str, errors: &Errors) {
	for (field, messages) in errors {
		for message in messages {
			eprintln!("{table} ({id}): {field}: {message}");
		}
	}
}
