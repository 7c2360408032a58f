use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Run statements against a database through a pooled tether driver")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	#[command(subcommand)]
	pub command: Commands,
}

/// Where and as whom to connect.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
	/// Backend address: host, host:port or tether://host:port
	#[arg(long, global = true, env = "TETHER_ADDRESS", default_value = "localhost:7687")]
	pub address: String,

	/// User for basic authentication; omit to connect without credentials
	#[arg(short, long, global = true, env = "TETHER_USER")]
	pub user: Option<String>,

	/// Password for basic authentication
	#[arg(long, global = true, env = "TETHER_PASSWORD", hide_env_values = true)]
	pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Open a session and run a trivial statement
	Ping,

	/// Run a statement, each repetition on a fresh session
	Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Statement text
	pub statement: String,

	/// Parameters as a JSON object
	#[arg(short, long, value_name = "JSON")]
	pub params: Option<String>,

	/// Number of times to run the statement
	#[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
	pub repeat: u32,
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[test]
	fn parse_ping_with_defaults() {
		let cli = Cli::try_parse_from(["tether", "ping"]).unwrap();

		assert!(matches!(cli.command, Commands::Ping));
		assert_eq!(cli.verbose, 0);
		assert_eq!(cli.connection.address, "localhost:7687");
	}

	#[test]
	fn parse_run_command() {
		let args = [
			"tether",
			"-vv",
			"--address",
			"db:9000",
			"--user",
			"neo",
			"run",
			"RETURN $x",
			"--params",
			r#"{"x": 1}"#,
			"--repeat",
			"3",
		];
		let cli = Cli::try_parse_from(args).unwrap();

		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.connection.address, "db:9000");
		assert_eq!(cli.connection.user.as_deref(), Some("neo"));
		match cli.command {
			Commands::Run(args) => {
				assert_eq!(args.statement, "RETURN $x");
				assert_eq!(args.params.as_deref(), Some(r#"{"x": 1}"#));
				assert_eq!(args.repeat, 3);
			}
			_ => panic!("Expected Run command"),
		}
	}

	#[test]
	fn global_flags_after_subcommand() {
		let cli = Cli::try_parse_from(["tether", "ping", "-v", "--address", "other"]).unwrap();

		assert_eq!(cli.verbose, 1);
		assert_eq!(cli.connection.address, "other");
	}

	#[test]
	fn repeat_must_be_positive() {
		let result = Cli::try_parse_from(["tether", "run", "RETURN 1", "--repeat", "0"]);
		assert!(result.is_err());
	}

	#[test]
	fn run_requires_statement() {
		assert!(Cli::try_parse_from(["tether", "run"]).is_err());
	}
}
