//! IssueOps - deployment coordination from pull request comments
//!
//! Usage:
//!   issueops run                    # Main phase of the workflow step
//!   issueops post --status success  # Post phase: deployment status and lock release
//!   issueops parse ".deploy noop"   # Show how a comment is parsed
//!   issueops status --env staging   # Show who holds a lock

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use issueops_core::config;
use issueops_core::github::{
    GitHubClient, GitHubComments, GitHubDeployments, GitHubPermissions, GitHubPrechecks,
};
use issueops_core::lock::StoreSpec;
use issueops_core::report::keys;
use issueops_core::prelude::*;

#[derive(Parser)]
#[command(name = "issueops")]
#[command(about = "Deployment coordination from pull request comments", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.config/issueops/issueops.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where lock refs live: `github` or `git:<path>`
    #[arg(long, global = true, default_value = "github")]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle the comment event of the current workflow run
    Run,

    /// Finish a run: record the deployment status and release its lock
    Post {
        /// Result of the workflow job (success, failure, cancelled)
        #[arg(long)]
        status: JobStatus,
    },

    /// Parse a comment body and print the resulting command
    Parse {
        /// Comment body
        body: String,
    },

    /// Show the lock covering an environment
    Status {
        /// Environment name (defaults to the configured environment)
        #[arg(long)]
        env: Option<String>,

        /// Show the global lock only
        #[arg(short = 'g', long)]
        global: bool,
    },
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the run result.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issueops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let load = || -> Result<(ActionConfig, StoreSpec)> {
        let config = config::load(cli.config.as_deref(), env_lookup)?;
        Ok((config, StoreSpec::parse(&cli.store)?))
    };

    match cli.command {
        Commands::Run => run_main(load()).await,
        Commands::Post { status } => {
            let (config, store) = load()?;
            run_post(&config, &store, status).await
        }
        Commands::Parse { body } => run_parse(&load()?.0, &body),
        Commands::Status { env, global } => {
            let (config, store) = load()?;
            run_status(&config, &store, env, global).await
        }
    }
}

fn github_client(config: &ActionConfig, token: &str) -> Result<GitHubClient> {
    let repository = env_lookup("GITHUB_REPOSITORY").context("GITHUB_REPOSITORY is not set")?;
    GitHubClient::new(&config.github_api_url, token, repository)
}

/// Setup failures are reported through the workflow like any failed run.
async fn run_main(loaded: Result<(ActionConfig, StoreSpec)>) -> Result<ExitCode> {
    let report = match loaded.and_then(|(config, store)| prepare(&config, &store)) {
        Ok((orchestrator, context)) => orchestrator.run(&context).await,
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::error!(error = %message, "run setup failed");
            RunReport::failed(message)
        }
    };
    ActionsWriter::from_env(env_lookup).write(&report)?;

    let outcome = report.outcome();
    println!("{}", outcome);
    Ok(if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn prepare(
    config: &ActionConfig,
    store: &StoreSpec,
) -> Result<(DeploymentOrchestrator, EventContext)> {
    let token = config::github_token(env_lookup)?;
    let context = EventContext::from_env(env_lookup)?;
    let client = GitHubClient::new(&config.github_api_url, &token, &context.repository)?;

    let locks = LockCoordinator::new(store.open(Some(client.clone()))?);
    let gates = Collaborators {
        permissions: Arc::new(GitHubPermissions::new(client.clone())),
        prechecks: Arc::new(GitHubPrechecks::new(client.clone(), config)),
        deployments: Arc::new(GitHubDeployments::new(
            client.clone(),
            config.required_contexts.clone(),
        )),
        comments: Arc::new(GitHubComments::new(client)),
    };

    let orchestrator = DeploymentOrchestrator::new(config.clone(), token, locks, gates);
    Ok((orchestrator, context))
}

async fn run_post(config: &ActionConfig, store: &StoreSpec, status: JobStatus) -> Result<ExitCode> {
    let state = SavedState::from_lookup(env_lookup);
    if !state.flag(keys::IS_POST) {
        println!("skipped");
        return Ok(ExitCode::SUCCESS);
    }

    let token = match state.get(keys::TOKEN) {
        Some(token) => token.to_string(),
        None => config::github_token(env_lookup)?,
    };
    let client = github_client(config, &token)?;

    let locks = LockCoordinator::new(store.open(Some(client.clone()))?);
    let deployments = Arc::new(GitHubDeployments::new(
        client,
        config.required_contexts.clone(),
    ));
    let report = PostPhase::new(locks, deployments).run(&state, status).await?;

    println!(
        "{}",
        serde_json::json!({
            "deployment_status": report.deployment_status.map(|s| s.as_str()),
            "released": report.released,
        })
    );
    Ok(ExitCode::SUCCESS)
}

fn run_parse(config: &ActionConfig, body: &str) -> Result<ExitCode> {
    let parser = CommandParser::from_config(config);
    match parser.parse(body) {
        Ok(command) => {
            println!("{}", serde_json::to_string_pretty(&command)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_status(
    config: &ActionConfig,
    store: &StoreSpec,
    env: Option<String>,
    global: bool,
) -> Result<ExitCode> {
    let client = match store {
        StoreSpec::GitHub => Some(github_client(config, &config::github_token(env_lookup)?)?),
        StoreSpec::Git(_) => None,
    };
    let locks = LockCoordinator::new(store.open(client)?);

    let environment = env.unwrap_or_else(|| config.environment.clone());
    let record = if global {
        locks.check_status(&LockScope::Global).await?
    } else {
        locks.covering_lock(&environment).await?
    };

    match record {
        Some(record) => {
            let output = serde_json::json!({
                "environment": record.environment,
                "global": record.global,
                "holder": record.holder,
                "reason": record.reason,
                "sticky": record.sticky,
                "created_at": record.created_at.to_rfc3339(),
                "link": record.link,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        None => println!("{} is not locked", if global { "global" } else { environment.as_str() }),
    }
    Ok(ExitCode::SUCCESS)
}
