use std::path::Path;

use clap::{Parser, Subcommand};
use rust_dotenv::dotenv::DotEnv;

mod config;
mod core;
mod definition;
mod orm;
mod runner;
mod scaffold;
mod sqlite;

use config::DbCfg;
use runner::{SeedRunner, resolve_file_path};
use sqlite::SqliteOrm;

#[derive(Parser, Debug)]
#[command(version, about = "BasicSeed CLI")]
pub struct Cli {
	/// Use the dev seed file instead of the default
	#[arg(short, long, global = true)]
	dev: bool,

	/// Manually specify the seed file; overrides --dev
	#[arg(short, long, global = true)]
	file: Option<String>,

	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Create the seed file if it is missing, without running it
	Init,
}

fn load_env() -> DotEnv {
	// Load .env in CWD if present, ignore missing
	let env = DotEnv::new("");
	env
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Cli::parse();
	let env = load_env();

	let path = resolve_file_path(args.dev, args.file.as_deref());

	match args.command {
		Some(Commands::Init) => scaffold::exists_or_create(&path)?,
		None => {
			scaffold::exists_or_create(&path)?;
			let orm = open_from_env(&env)?;
			let runner = SeedRunner::new(&orm);
			runner.execute_definition(&path)?;
		}
	}

	Ok(())
}

fn open_from_env(env: &DotEnv) -> anyhow::Result<SqliteOrm> {
	let cfg = DbCfg::from_env(env)?;
	SqliteOrm::open(Path::new(cfg.path()))
}
