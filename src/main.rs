mod azure;
mod config;
mod gateway;
mod github;
mod preview;
#[cfg(test)]
mod testing;

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gateway::{ClientRegistry, RepoRef};
use github::event::{self, EventAction, EventError};
use preview::{DeployParams, Orchestrator, PullRequestContext, RepositoryConfig, StorageTarget};

/// preview-deploy: provision and tear down per-pull-request preview slots
/// on Azure App Service, reporting status back to the pull request.
#[derive(Parser, Debug)]
#[command(name = "preview-deploy", version, about)]
struct Cli {
    /// GitHub token used for status comments (overrides config and GITHUB_TOKEN)
    #[arg(long, global = true, env = "INPUT_GITHUBTOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Login that authors the status comment (overrides config)
    #[arg(long, global = true)]
    comment_user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload the package and deploy it to the pull request's slot
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        package: PackageArgs,

        /// Repository owner
        #[arg(long)]
        owner: String,

        /// Repository name
        #[arg(long)]
        repo: String,
    },

    /// Delete the pull request's slot
    Cleanup {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Deploy or clean up based on the GitHub Actions event that triggered the run
    Event {
        #[command(flatten)]
        app: AppArgs,

        #[command(flatten)]
        package: EventPackageArgs,

        /// Clean up even when the pull request is still open
        #[arg(long, env = "INPUT_CLEANUP", value_parser = FalseyValueParser::new())]
        cleanup: bool,
    },
}

#[derive(Args, Debug)]
struct AppArgs {
    #[arg(long, env = "INPUT_SUBSCRIPTIONID")]
    subscription_id: String,

    #[arg(long, env = "INPUT_RESOURCEGROUP")]
    resource_group: String,

    /// Name of the parent web app
    #[arg(long, env = "INPUT_WEBAPPNAME")]
    app_name: String,
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Pull request number
    #[arg(long)]
    pull_request: u64,
}

#[derive(Args, Debug)]
struct PackageArgs {
    /// Path to the zip package to deploy
    #[arg(long, env = "INPUT_DEPLOYPACKAGEPATH")]
    package_path: PathBuf,

    #[arg(long, env = "INPUT_STORAGEACCOUNT")]
    storage_account: String,

    #[arg(long, env = "INPUT_STORAGECONTAINER")]
    storage_container: String,
}

/// Package inputs of the `event` command. Only a deploy needs them, so a
/// cleanup job can run without building a package.
#[derive(Args, Debug)]
struct EventPackageArgs {
    #[arg(long, env = "INPUT_DEPLOYPACKAGEPATH")]
    package_path: Option<PathBuf>,

    #[arg(long, env = "INPUT_STORAGEACCOUNT")]
    storage_account: Option<String>,

    #[arg(long, env = "INPUT_STORAGECONTAINER")]
    storage_container: Option<String>,
}

impl EventPackageArgs {
    fn require(self) -> Result<PackageArgs, EventError> {
        let package_path = self
            .package_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(EventError::MissingInput("deployPackagePath"))?;
        Ok(PackageArgs {
            package_path,
            storage_account: non_empty(self.storage_account, "storageAccount")?,
            storage_container: non_empty(self.storage_container, "storageContainer")?,
        })
    }
}

/// Actions pass unset inputs as empty strings.
fn non_empty(value: Option<String>, input: &'static str) -> Result<String, EventError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(EventError::MissingInput(input))
}

impl AppArgs {
    fn context(self, pull_request: u64) -> PullRequestContext {
        PullRequestContext {
            subscription_id: self.subscription_id,
            resource_group: self.resource_group,
            app_name: self.app_name,
            pull_request,
        }
    }
}

impl PackageArgs {
    fn storage(&self) -> StorageTarget {
        StorageTarget {
            account: self.storage_account.clone(),
            container: self.storage_container.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("loading configuration");
    let config = config::Config::load()?;
    let comment_user = cli
        .comment_user
        .unwrap_or_else(|| config.comment_user().to_string());
    let registry = ClientRegistry::from_config(&config).with_github_token(cli.github_token);
    let orchestrator = Orchestrator::new(Arc::new(registry));

    match cli.command {
        Command::Deploy {
            target,
            package,
            owner,
            repo,
        } => {
            let params = DeployParams {
                storage: package.storage(),
                package_path: package.package_path,
                context: target.app.context(target.pull_request),
                repository: RepositoryConfig {
                    repo: RepoRef { owner, name: repo },
                    comment_user,
                },
            };
            deploy(&orchestrator, &params).await
        }
        Command::Cleanup { target } => {
            cleanup(&orchestrator, &target.app.context(target.pull_request)).await
        }
        Command::Event {
            app,
            package,
            cleanup: force_cleanup,
        } => {
            let event = event::from_env(force_cleanup)?;
            debug!(pr = event.pull_request, action = ?event.action, "resolved pull request event");
            let context = app.context(event.pull_request);
            match event.action {
                EventAction::Cleanup => cleanup(&orchestrator, &context).await,
                EventAction::Deploy => {
                    let package = package.require()?;
                    let params = DeployParams {
                        storage: package.storage(),
                        package_path: package.package_path,
                        context,
                        repository: RepositoryConfig {
                            repo: event.repo,
                            comment_user,
                        },
                    };
                    deploy(&orchestrator, &params).await
                }
            }
        }
    }
}

async fn deploy(
    orchestrator: &Orchestrator,
    params: &DeployParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let hostname = orchestrator.deploy(params).await?;
    println!("{} https://{}", "Deployed:".green().bold(), hostname);
    Ok(())
}

async fn cleanup(
    orchestrator: &Orchestrator,
    context: &PullRequestContext,
) -> Result<(), Box<dyn std::error::Error>> {
    orchestrator.cleanup(context).await?;
    println!("{} slot {}", "Removed:".green().bold(), context.slot_name());
    Ok(())
}
