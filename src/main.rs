use clap::{Parser, Subcommand, ValueEnum};
use pr_radar::commands::{self, status::StatusResponse, AddProjectInput};
use pr_radar::error::AppError;
use pr_radar::services::poll_engine::{spawn_settings_watcher, PollEngine};
use pr_radar::services::poller::CycleReport;
use pr_radar::{AppContext, AppPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often `run` checks the settings file for outside edits.
const SETTINGS_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "pr-radar")]
#[command(about = "Watch Azure DevOps pull requests and report what changed")]
#[command(version)]
struct Cli {
    /// Directory holding settings.json
    #[arg(long, global = true, env = "PR_RADAR_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Directory holding the poll-state database
    #[arg(long, global = true, env = "PR_RADAR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll in the background until interrupted
    Run,

    /// Run a single poll cycle and print what changed
    Poll,

    /// Show pull requests from the last poll
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Add a project and verify its personal access token
    AddProject {
        /// Organization name
        #[arg(short, long)]
        organization: String,
        /// Project name
        #[arg(short, long)]
        project: String,
        /// Personal access token (Code read scope)
        #[arg(long, env = "PR_RADAR_PAT", hide_env_values = true)]
        pat: String,
    },

    /// Re-resolve the user for a configured project
    Connect {
        organization: String,
        project: String,
    },

    /// Stop monitoring a project
    RemoveProject {
        organization: String,
        project: String,
    },

    /// List configured projects
    Projects,

    /// Mark merged pull requests as seen
    AckMerges,

    /// Set the poll interval in minutes
    SetInterval { minutes: u64 },

    /// Turn notifications on or off
    Notifications { state: Toggle },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pr_radar=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = resolve_paths(cli.config_dir, cli.data_dir)?;
    let ctx = AppContext::open(&paths).await?;

    match cli.command {
        Commands::Run => {
            let settings = ctx.settings.load().await?;
            let handle = PollEngine::start_background(ctx.poller.clone(), settings);
            let watcher =
                spawn_settings_watcher(handle.clone(), ctx.settings.clone(), SETTINGS_CHECK_INTERVAL);

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl-C: {}", e)))?;

            log::info!("Shutting down");
            watcher.abort();
            handle.stop().await
        }

        Commands::Poll => {
            let report = commands::poll_now(&ctx.poller).await?;
            print_report(&report);
            Ok(())
        }

        Commands::Status { json } => {
            let status =
                commands::get_status(&ctx.settings, ctx.state.as_ref(), chrono::Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }

        Commands::AddProject {
            organization,
            project,
            pat,
        } => {
            let response = commands::add_project(
                &ctx.settings,
                ctx.source.as_ref(),
                AddProjectInput {
                    organization,
                    project,
                    pat,
                },
            )
            .await?;
            println!(
                "Connected {} as {}",
                response.project.label(),
                response.display_name
            );
            Ok(())
        }

        Commands::Connect {
            organization,
            project,
        } => {
            let response = commands::connect_project(
                &ctx.settings,
                ctx.source.as_ref(),
                &organization,
                &project,
            )
            .await?;
            println!(
                "Connected {} as {}",
                response.project.label(),
                response.display_name
            );
            Ok(())
        }

        Commands::RemoveProject {
            organization,
            project,
        } => {
            commands::remove_project(&ctx.settings, &organization, &project).await?;
            println!("Removed {}/{}", organization, project);
            Ok(())
        }

        Commands::Projects => {
            let projects = commands::list_projects(&ctx.settings).await?;
            if projects.is_empty() {
                println!("No projects configured yet.");
            }
            for p in projects {
                match p.connected_as {
                    Some(name) => println!("{}/{}  connected as {}", p.organization, p.project, name),
                    None => println!("{}/{}  not connected", p.organization, p.project),
                }
                println!("    {}", p.url);
            }
            Ok(())
        }

        Commands::AckMerges => {
            commands::ack_merges(ctx.state.as_ref(), chrono::Utc::now()).await?;
            println!("Merges acknowledged");
            Ok(())
        }

        Commands::SetInterval { minutes } => {
            let settings = commands::set_poll_interval(&ctx.settings, minutes).await?;
            println!("Polling every {} minute(s)", settings.poll_interval_minutes);
            Ok(())
        }

        Commands::Notifications { state } => {
            let enabled = matches!(state, Toggle::On);
            commands::set_notifications_enabled(&ctx.settings, enabled).await?;
            println!("Notifications {}", if enabled { "on" } else { "off" });
            Ok(())
        }
    }
}

fn resolve_paths(
    config_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
) -> Result<AppPaths, AppError> {
    if let (Some(config_dir), Some(data_dir)) = (&config_dir, &data_dir) {
        return Ok(AppPaths {
            config_dir: config_dir.clone(),
            data_dir: data_dir.clone(),
        });
    }
    let defaults = AppPaths::platform_default()?;
    Ok(AppPaths {
        config_dir: config_dir.unwrap_or(defaults.config_dir),
        data_dir: data_dir.unwrap_or(defaults.data_dir),
    })
}

fn print_report(report: &CycleReport) {
    if report.skipped {
        println!("No projects configured. Add one with `pr-radar add-project`.");
        return;
    }

    println!("{} open pull request(s)", report.snapshot_count);
    for event in &report.events {
        match &event.details {
            Some(details) if !details.is_empty() => {
                println!("  {}: {}", event.description, details)
            }
            _ => println!("  {}", event.description),
        }
    }
    for failure in &report.failures {
        println!(
            "  {}/{} failed ({}): {}",
            failure.organization, failure.project, failure.category, failure.message
        );
    }
    if report.has_unseen_merge {
        println!("Merged since you last looked. Run `pr-radar ack-merges` to clear.");
    }
}

fn print_status(status: &StatusResponse) {
    if !status.configured {
        println!("No projects configured. Add one with `pr-radar add-project`.");
        return;
    }

    println!("Last updated: {}", status.last_updated);
    if status.items.is_empty() {
        println!("No open pull requests.");
        return;
    }

    for item in &status.items {
        let marker = if item.needs_attention { "!" } else { " " };
        println!(
            "{} #{} [{}] {}",
            marker, item.identity.pull_request_id, item.status_class, item.title
        );
        println!(
            "    {} · {} → {} · {}",
            item.created_by_name, item.source_branch, item.target_branch, item.repository_url
        );
        if !item.badges.is_empty() {
            println!("    {}", item.badges.join(", "));
        }
        println!("    {}", item.url);
    }
}
