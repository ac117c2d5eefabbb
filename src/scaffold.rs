use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::core::display;

/// Writes an empty seed template at `path` when none exists yet, so a run
/// always has a file to read. Never overwrites.
pub fn exists_or_create(path: &Path) -> Result<()> {
	if path.exists() {
		return Ok(());
	}

	println!(
		"Seed file `{}` does not exist. Creating empty seed.",
		display(path)
	);

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)
			.with_context(|| format!("creating seed file directory {}", display(parent)))?;
	}

	fs::write(path, DEFAULT_SEED).with_context(|| format!("writing {}", display(path)))?;
	Ok(())
}

pub const DEFAULT_SEED: &str = r#"# Data seed file.
#
# Each top-level block names a database table. Keys starting with `_`
# configure the import; every other entry is one record to create or
# update. Records only need their unique fields, plus an explicit key
# to target an existing row.
#
# [posts]
# _truncate = false
#
# [posts._defaults]
# author = "Jane Doe"
# is_published = true
#
# [posts.faq]
# id = 1
# title = "Frequently Asked Questions"
# body = "Lorum ipsum."
#
# [posts.about]
# id = 2
# title = "About Us"
# body = "Bacon fillet tenderloin."
"#;
