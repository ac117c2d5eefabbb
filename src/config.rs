use anyhow::Result;
use rust_dotenv::dotenv::DotEnv;

#[derive(Debug, Clone)]
pub struct DbCfg {
	path: String,
}

impl DbCfg {
	pub const DEFAULT_PATH: &'static str = "database.sqlite";

	pub fn from_env(_env: &DotEnv) -> Result<Self> {
		let dotenv = DotEnv::new("");

		// DotEnv has already populated std::env; pull from there.
		let path = dotenv
			.get_var("DATABASE_PATH".to_string())
			.unwrap_or(String::from(Self::DEFAULT_PATH));

		Ok(Self { path })
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}
