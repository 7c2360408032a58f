use anyhow::{Context, Result, bail};
use serde_json::Value;
use tether::{Address, AuthToken, Driver, DriverConfig, Parameters};
use tracing::info;

use crate::cli::{Cli, Commands, ConnectionArgs, RunArgs};

const USER_AGENT: &str = concat!("tether-cli/", env!("CARGO_PKG_VERSION"));

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = driver_config(&cli.connection)?;
	let driver = Driver::new(config);

	let result = match cli.command {
		Commands::Ping => ping(&driver).await,
		Commands::Run(args) => run(&driver, args).await,
	};

	let closed = driver.close().await.context("failed to close driver");
	result?;
	closed
}

fn driver_config(args: &ConnectionArgs) -> Result<DriverConfig> {
	let address: Address = args
		.address
		.parse()
		.with_context(|| format!("invalid address '{}'", args.address))?;

	let auth = match &args.user {
		Some(user) => AuthToken::basic(user.clone(), args.password.clone().unwrap_or_default()),
		None => AuthToken::none(),
	};

	Ok(DriverConfig::new(address)
		.with_user_agent(USER_AGENT)
		.with_auth(auth))
}

fn parse_params(raw: Option<&str>) -> Result<Parameters> {
	let Some(raw) = raw else {
		return Ok(Parameters::new());
	};
	match serde_json::from_str(raw).context("--params is not valid JSON")? {
		Value::Object(map) => Ok(map),
		other => bail!("--params must be a JSON object, got {other}"),
	}
}

async fn ping(driver: &Driver) -> Result<()> {
	let mut session = driver.session().await.context("failed to open session")?;
	let metadata = session.run("RETURN 1", Parameters::new()).await?;
	session.close();

	println!("{}", Value::Object(metadata));
	Ok(())
}

async fn run(driver: &Driver, args: RunArgs) -> Result<()> {
	let parameters = parse_params(args.params.as_deref())?;

	for n in 1..=args.repeat {
		let mut session = driver.session().await.context("failed to open session")?;
		let metadata = session
			.run(args.statement.clone(), parameters.clone())
			.await
			.with_context(|| format!("run {n} of {} failed", args.repeat))?;
		session.close();

		println!("{}", Value::Object(metadata));
	}

	let status = driver.pool_status();
	info!(
		connections = driver.registered(),
		idle = status.idle,
		in_use = status.in_use,
		max_size = status.max_size,
		"pool status"
	);
	Ok(())
}
