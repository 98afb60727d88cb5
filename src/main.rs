use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facetrack::{config, App, CapturedImage, Verdict};
use log::{error, info};

#[derive(Parser)]
#[command(name = "facetrack")]
#[command(version, about = "Face enrollment and face login")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user from a captured face image
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        /// Still image of the user's face
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Log in by matching a captured face against enrolled users
    Verify {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Print every registered profile as JSON
    Profiles,
    /// Report orphaned images, templates and stale probes
    Reconcile,
    /// Open config file in editor
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    match cli.command {
        Commands::Config => open_config(),
        command => {
            let app = App::from_config(&cfg);
            run(&app, command).await
        }
    }
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Enroll { name, email, image } => {
            let image = CapturedImage::from_file(&image)?;
            match app.enroller.enroll(&name, &email, Some(image)).await {
                Ok(record) => {
                    info!("✓ Registration successful for {}", record.name);
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                Err(e) => {
                    error!("{}", e.user_message());
                    Err(e).context("Registration failed")
                }
            }
        }
        Commands::Verify { image } => {
            let image = CapturedImage::from_file(&image)?;
            match app.verifier.verify(Some(image)).await {
                Ok(Verdict::Accepted(profile)) => {
                    info!("✓ Login successful! Welcome, {}", profile.name);
                    println!("{}", serde_json::to_string_pretty(&profile)?);
                    Ok(())
                }
                Ok(Verdict::Rejected(rejection)) => {
                    anyhow::bail!("Not recognized: {}", rejection)
                }
                Err(e) => {
                    error!("{}", e.user_message());
                    Err(e).context("Login failed")
                }
            }
        }
        Commands::Profiles => {
            let profiles = app
                .registry
                .scan()
                .await
                .context("Failed to load profiles")?;
            println!("{}", serde_json::to_string_pretty(&profiles)?);
            Ok(())
        }
        Commands::Reconcile => {
            let report = app.reconciler.scan().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Config => open_config(),
    }
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
