//! MailRoute CLI
//!
//! Command-line interface for checking, simulating and operating MailRoute

mod backends;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mailroute_config_file::{FilePolicyStore, RouterConfig};
use mailroute_core::{
    DeliveryRequest, PolicyStore, WeightedOption,
    flow::{MAIL_SERVICE, RECEIVE_MAIL_SERVICE},
};
use mailroute_routing::{Dispatcher, MailRouter};
use mailroute_weights::{SimulationLedger, projected_distribution, to_weighted_option};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "mailroute")]
#[command(about = "MailRoute - Weighted email provider routing", long_about = None)]
struct Cli {
    /// Path to the YAML or TOML configuration file
    #[arg(
        short,
        long,
        env = "MAILROUTE_CONFIG",
        default_value = "~/.mailroute/config.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and its provider weights
    Check,
    /// Simulate how a batch of sends would be split across providers
    Simulate {
        /// Number of requests in the batch
        #[arg(long, default_value = "1000")]
        total: u64,
    },
    /// Route one message through the configured backends
    Send {
        /// Which flow to route on
        #[arg(long, value_enum, default_value = "send")]
        flow: FlowArg,

        /// Selection key, usually the originating user id
        #[arg(long, allow_negative_numbers = true)]
        key: i64,

        #[arg(long, default_value = "noreply@example.com")]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long, default_value = "")]
        content: String,
    },
    /// Manage routing policies stored in the configuration file
    Policies {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Reload routing policies whenever the configuration file changes
    Watch,
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// List every stored policy
    List,
    /// Create a policy from an explicit option list
    Create {
        #[arg(long, value_enum)]
        flow: FlowArg,

        /// Backend ids; repeat an id to raise its share
        #[arg(long, value_delimiter = ',', required = true)]
        options: Vec<String>,

        /// Store the policy without activating it
        #[arg(long, default_value = "false")]
        inactive: bool,
    },
    /// Create a policy expanded from the configured provider weights
    FromWeights {
        #[arg(long, value_enum)]
        flow: FlowArg,

        #[arg(long, default_value = "false")]
        inactive: bool,
    },
    /// Flip a policy between active and inactive
    Toggle { id: u64 },
    /// Delete a policy
    Delete { id: u64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum FlowArg {
    Send,
    Receive,
}

impl FlowArg {
    fn name(self) -> &'static str {
        match self {
            FlowArg::Send => MAIL_SERVICE,
            FlowArg::Receive => RECEIVE_MAIL_SERVICE,
        }
    }
}

fn init_logging(config: &RouterConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RouterConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.merge_env();
    init_logging(&config)?;

    match cli.command {
        Commands::Check => check(&config)?,
        Commands::Simulate { total } => simulate(&config, total)?,
        Commands::Send {
            flow,
            key,
            from,
            to,
            content,
        } => {
            let request = DeliveryRequest::new(key, from, to, content);
            send(&cli.config, &config, flow, &request).await?;
        }
        Commands::Policies { command } => policies(&cli.config, &config, command).await?,
        Commands::Watch => watch(&cli.config).await?,
    }

    Ok(())
}

fn check(config: &RouterConfig) -> anyhow::Result<()> {
    config.validate()?;

    println!(
        "Configuration OK: {} backend(s) enabled, {} policy record(s)",
        config.enabled_backends().count(),
        config.policies.len()
    );

    if config.weights.is_empty() {
        println!("No provider weights configured");
        return Ok(());
    }

    // validate() has already rejected unnormalized weights
    let book = config.weight_book()?;
    println!("Provider weights OK ({} active)", book.active().count());
    Ok(())
}

fn simulate(config: &RouterConfig, total: u64) -> anyhow::Result<()> {
    let book = config.weight_book()?;
    let ledger = SimulationLedger::new();
    let run = ledger.run(book.weights(), total)?;

    // Compare the arithmetic split with what the selector would do over keys 0..total
    let options = to_weighted_option(book.weights())?;
    let measured = projected_distribution(&options, total)?;

    let report = serde_json::json!({
        "simulation": run,
        "unallocated": run.unallocated(),
        "selector": measured,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn send(
    path: &Path,
    config: &RouterConfig,
    flow: FlowArg,
    request: &DeliveryRequest,
) -> anyhow::Result<()> {
    config.validate()?;

    let registry = Arc::new(backends::build_registry(config)?);
    let store = Arc::new(FilePolicyStore::new(path).await?);
    let dispatcher =
        Arc::new(Dispatcher::new(registry, store).with_attempt_timeout(config.attempt_timeout()));

    let router = MailRouter::new(dispatcher)
        .with_send_retry(config.retry.send.clone())
        .with_receive_retry(config.retry.receive.clone());

    let result = match flow {
        FlowArg::Send => router.send_mail(request).await?,
        FlowArg::Receive => router.receive_mail(request).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn policies(
    path: &Path,
    config: &RouterConfig,
    command: PolicyCommand,
) -> anyhow::Result<()> {
    let store = FilePolicyStore::new(path).await?;

    match command {
        PolicyCommand::List => {
            let policies = store.list_policies().await?;
            println!("{}", serde_json::to_string_pretty(&policies)?);
        }
        PolicyCommand::Create {
            flow,
            options,
            inactive,
        } => {
            let policy = store
                .create_policy(flow.name(), WeightedOption::new(options), !inactive)
                .await?;
            println!("Created policy {} for {}", policy.id, policy.flow);
        }
        PolicyCommand::FromWeights { flow, inactive } => {
            let book = config.weight_book()?;
            let options = to_weighted_option(book.weights())?;
            let policy = store.create_policy(flow.name(), options, !inactive).await?;
            println!(
                "Created policy {} for {} with {} slot(s)",
                policy.id,
                policy.flow,
                policy.options.len()
            );
        }
        PolicyCommand::Toggle { id } => {
            let policy = store.toggle_policy(id).await?;
            let state = if policy.is_active { "active" } else { "inactive" };
            println!("Policy {} is now {}", policy.id, state);
        }
        PolicyCommand::Delete { id } => {
            store.delete_policy(id).await?;
            println!("Deleted policy {}", id);
        }
    }

    Ok(())
}

async fn watch(path: &Path) -> anyhow::Result<()> {
    let store = Arc::new(FilePolicyStore::new(path).await?);
    let reloader = store.clone().spawn_reloader();

    tracing::info!(
        path = %store.path().display(),
        "Watching for policy changes, press Ctrl+C to stop"
    );
    tokio::signal::ctrl_c().await?;

    reloader.abort();
    tracing::info!(version = store.version(), "Stopped watching");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroute_weights::ProviderWeight;

    fn config_with_weights(weights: Vec<ProviderWeight>) -> RouterConfig {
        RouterConfig {
            weights,
            ..Default::default()
        }
    }

    #[test]
    fn test_check_rejects_unnormalized_weights() {
        let config = config_with_weights(vec![ProviderWeight::new("sendgrid", 60)]);
        assert!(check(&config).is_err());

        let config = config_with_weights(vec![
            ProviderWeight::new("sendgrid", 60),
            ProviderWeight::new("mailgun", 40),
        ]);
        assert!(check(&config).is_ok());
        assert!(check(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_simulate_large_batch_completes() {
        let config = config_with_weights(vec![
            ProviderWeight::new("sendgrid", 70),
            ProviderWeight::new("mailgun", 30),
        ]);
        assert!(simulate(&config, 10_000_000_000).is_ok());
        assert!(simulate(&config, u64::MAX).is_ok());
    }
}
