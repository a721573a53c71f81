//! Example: a command-line deployment host driving stagehand.
//!
//! Loads a service manifest, fires the packaging hook so the selection
//! plugin can prune the configuration for the target region and stage, then
//! writes the resulting deployment template. Run with `-v` (or `-vv`) to see
//! what stagehand does under the hood.
//!
//! ```sh
//! cargo run -p stagehand-example -- service.yml --region us-east-1 --stage prod
//! ```

use clap::Parser;
use stage::{DeployContext, HookPoint, SelectResource, Selection, Service};

#[derive(Parser)]
#[command(name = "deploy", about = "Select and emit deployment resources for a service manifest")]
struct Cli {
    /// Path to the service manifest.
    manifest: std::path::PathBuf,

    /// Target deployment region.
    #[arg(long)]
    region: Option<String>,

    /// Target deployment stage.
    #[arg(long)]
    stage: Option<String>,

    /// Skip deployment, leaving the configuration untouched.
    #[arg(long)]
    no_deploy: bool,

    /// Where to write the generated deployment template.
    #[arg(long, default_value = "template.json")]
    out: std::path::PathBuf,

    /// Sets the verbosity level
    #[arg(short, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("stage", level)
        .filter_module("deploy", level)
        .init();

    let mut service = Service::read_from_path(&cli.manifest)?;
    let plugin = SelectResource::new(DeployContext {
        region: cli.region,
        stage: cli.stage,
        no_deploy: cli.no_deploy,
    });
    for hook in plugin.hooks() {
        log::debug!("registered hook {hook}");
    }

    match plugin.on_hook(HookPoint::AfterPackageInitialize, &mut service) {
        Selection::Skipped => {
            log::warn!("--no-deploy set, leaving the configuration untouched");
            return Ok(());
        }
        Selection::Selected(report) => {
            println!("{report}");
        }
    }

    service.write_template(&cli.out).await?;
    log::info!("wrote deployment template to {}", cli.out.display());

    Ok(())
}
