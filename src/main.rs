use mindmeld::app::AppBuilder;
use mindmeld::config::Config;

#[tokio::main]
async fn main() {
	let config = match Config::from_env() {
		Ok(c) => c,
		Err(e) => {
			eprintln!("invalid configuration: {e}");
			std::process::exit(1);
		}
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

	if let Err(e) = AppBuilder::new().config(config).run().await {
		tracing::error!(error = %e, "server exited with an error");
		std::process::exit(1);
	}
}

// vim: ts=4
