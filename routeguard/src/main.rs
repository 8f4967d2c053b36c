use args::{Args, CheckArgs, Command};
use clap::Parser;
use config::LimiterConfig;
use rate_limit::{RateLimitError, RateLimiter, RouteLimit, RouteRegistry};

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = args.config()?;

    for warning in config.warnings() {
        log::warn!("{warning}");
    }

    match &args.command {
        Command::Check(check) => {
            let _telemetry = telemetry::init(&config.telemetry)?;

            if let Err(e) = run_checks(&config.limiter, check).await {
                log::error!("Rate limit check for '{}' failed: {e}", check.route);
                std::process::exit(1);
            }
        }
        Command::Routes => match configured_routes(&config.limiter) {
            Ok(registry) => list_routes(&registry),
            Err(e) => {
                log::error!("Invalid route limit configuration: {e}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

async fn run_checks(config: &LimiterConfig, check: &CheckArgs) -> Result<(), RateLimitError> {
    let limiter = RateLimiter::new(config).await?;
    limiter.initialize().await?;

    for call in 1..=check.repeat {
        let allowed = match (check.threshold, check.window) {
            (Some(threshold), Some(window)) => limiter.check_or_register(&check.route, threshold, window).await?,
            (Some(threshold), None) => limiter.check_or_register_threshold(&check.route, threshold).await?,
            (None, _) => limiter.check(&check.route).await?,
        };

        let decision = if allowed { "allowed" } else { "denied" };
        println!("{} call={call} {decision}", check.route);
    }

    Ok(())
}

/// The static route limits, without touching the counter store.
fn configured_routes(config: &LimiterConfig) -> Result<RouteRegistry, RateLimitError> {
    let limits = config
        .routes
        .iter()
        .map(RouteLimit::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let registry = RouteRegistry::new();
    registry.load_static(limits);

    Ok(registry)
}

fn list_routes(registry: &RouteRegistry) {
    for limit in registry.routes() {
        println!(
            "{} threshold={} window={}s",
            limit.route(),
            limit.threshold(),
            limit.window_secs()
        );
    }
}
