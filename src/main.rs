mod config;
mod runner;
mod tasks;
mod ui;

use anyhow::Result;
use clap::Parser;

/// Run your dev-tool update tasks from one terminal UI.
#[derive(Parser)]
#[command(
    name = "ddup",
    after_help = "Examples:\n  ddup                 Update all enabled tasks\n  ddup --interactive   Choose which tasks to run\n  ddup --init          Create config file\n  ddup --config        Show config file location"
)]
struct Cli {
    /// Interactive mode to select what to update
    #[arg(short, long)]
    interactive: bool,

    /// Create a configuration file at ~/.ddup.yml
    #[arg(long)]
    init: bool,

    /// Show configuration file path
    #[arg(long)]
    config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init {
        match config::write_example_config() {
            Ok(path) => {
                println!("✓ Created config file at {}", path.display());
                println!("Edit this file to customize your update tasks, then run ddup again.");
            }
            Err(e) => eprintln!("✗ Failed to create config file: {e:#}"),
        }
        return Ok(());
    }

    if cli.config {
        println!("Config file location: {}", config::config_path().display());
        return Ok(());
    }

    let (cfg, diagnostic) = config::load();
    let tasks = cfg
        .tasks
        .iter()
        .map(runner::RunnableTask::from_config)
        .collect();

    let mut run = runner::Runner::new(tasks);
    if let Some(diag) = diagnostic {
        run.note(diag);
        run.note("Using default configuration...");
    }

    ui::run(ui::RunOpts {
        runner: run,
        interactive: cli.interactive,
    })
    .await
}
