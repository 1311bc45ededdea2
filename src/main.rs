//! fraud-ensemble - command-line entry point

use clap::Parser;
use fraud_ensemble::cli::{cmd_evaluate, cmd_inspect, cmd_predict, cmd_profile, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fraud_ensemble=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            model,
            config,
            trees,
            threshold,
            test_split,
            seed,
            output,
        } => {
            cmd_train(
                &data,
                model,
                config.as_deref(),
                trees,
                threshold,
                test_split,
                seed,
                output.as_deref(),
            )
            .await?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Evaluate { model, data } => {
            cmd_evaluate(&model, &data)?;
        }
        Commands::Inspect { model } => {
            cmd_inspect(&model)?;
        }
        Commands::Profile { data, config } => {
            cmd_profile(&data, config.as_deref())?;
        }
    }

    Ok(())
}
