use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter used when `RUST_LOG` is unset.
///
/// Connection lifecycle events (`tether`, `tether_runtime`) are logged at
/// debug, so they only show up with `-vv`. A single `-v` adds the cli's own
/// info lines, such as the pool status after `run`.
fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		1 => "info,tether=warn,tether_runtime=warn",
		_ => "debug",
	}
}

/// Installs the global subscriber. Logs go to stderr; stdout carries results.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
