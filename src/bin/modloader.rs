//! Modloader CLI
//!
//! Управление директорией модов без запуска хоста.
//!
//! # Использование
//!
//! ```bash
//! # Список модов
//! modloader list
//! modloader list --json
//!
//! # Порядок загрузки
//! modloader order
//!
//! # Проверка зависимостей
//! modloader check
//!
//! # Включить / выключить мод
//! modloader enable better-ui
//! modloader disable better-ui
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use modloader::modules::{plan, LoadPlan};
use modloader::{init_logging, LoaderConfig};

/// Тип результата команды.
type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Mod loader
#[derive(Parser)]
#[command(name = "modloader")]
#[command(author = "Pavel (Xzdes)")]
#[command(version)]
#[command(about = "Inspect and manage a mods directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Mods directory (overrides the config file)
    #[arg(long, global = true)]
    mods_dir: Option<PathBuf>,

    /// Loader config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered mods
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the load order of enabled mods
    Order,

    /// Check for duplicates, missing dependencies and cycles
    Check,

    /// Enable a mod
    Enable {
        /// Mod name
        name: String,
    },

    /// Disable a mod
    Disable {
        /// Mod name
        name: String,
    },
}

fn load_config(cli: &Cli) -> Result<LoaderConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    };
    if let Some(dir) = &cli.mods_dir {
        config.mods_dir = dir.clone();
    }
    // Инспекция не должна создавать директорию
    config.create_mods_dir = false;

    if cli.quiet {
        config.log_filter = Some("error".to_string());
    } else if cli.verbose {
        config.log_filter = Some("debug".to_string());
    } else if config.log_filter.is_none() {
        config.log_filter = Some("warn".to_string());
    }
    Ok(config)
}

fn list_mods(plan: &LoadPlan, json: bool) -> CommandResult {
    let mods = plan.registry.all();

    if json {
        println!("{}", serde_json::to_string_pretty(&mods)?);
        return Ok(());
    }

    if mods.is_empty() {
        println!("{} No mods found", "ℹ".yellow());
        return Ok(());
    }

    for m in &mods {
        let state = if m.enabled() {
            "enabled".green()
        } else {
            "disabled".red()
        };
        println!(
            "{} {} {} [{}]",
            m.name().bold(),
            m.version().dimmed(),
            format!("by {}", m.author()).dimmed(),
            state
        );
        if !m.description().is_empty() {
            println!("  {}", m.description());
        }
        if !m.dependencies().is_empty() {
            println!("  {} {}", "requires:".dimmed(), m.dependencies().join(", "));
        }
    }
    Ok(())
}

fn show_order(plan: &LoadPlan) -> CommandResult {
    let order = &plan.resolution.order;
    if order.is_empty() {
        println!("{} No enabled mods", "ℹ".yellow());
        return Ok(());
    }

    for (i, name) in order.iter().enumerate() {
        println!("{:>3}. {}", i + 1, name);
    }
    Ok(())
}

fn check_mods(plan: &LoadPlan, quiet: bool) -> CommandResult {
    let mut problems = 0;

    for dup in &plan.duplicates {
        problems += 1;
        println!(
            "{} duplicate name: {} and {}, the latter will not be loaded",
            "✗".red(),
            dup.accepted.label(),
            dup.rejected.label()
        );
    }
    for missing in &plan.resolution.missing {
        problems += 1;
        println!(
            "{} \"{}\" depends on \"{}\", which is missing or disabled",
            "✗".red(),
            missing.dependent,
            missing.dependency
        );
    }
    for cycle in &plan.resolution.cycles {
        problems += 1;
        println!("{} dependency cycle: {}", "✗".red(), cycle.join(" -> "));
    }

    if problems > 0 {
        return Err(format!("{} problem(s) found", problems).into());
    }
    if !quiet {
        println!(
            "{} {} mod(s), no problems found",
            "✓".green(),
            plan.registry.len()
        );
    }
    Ok(())
}

fn toggle_mod(plan: &LoadPlan, name: &str, enabled: bool, quiet: bool) -> CommandResult {
    plan.registry.set_enabled(name, enabled)?;

    if !quiet {
        let action = if enabled { "Enabled" } else { "Disabled" };
        println!("{} {} '{}'", "✓".green(), action, name);
        let restart = plan
            .registry
            .get(name)
            .is_some_and(|m| m.requires_restart());
        if restart {
            println!("  {}", "restart the game to apply".dimmed());
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> CommandResult {
    let config = load_config(cli)?;
    init_logging(&config)?;
    let plan = plan(&config)?;

    match &cli.command {
        Commands::List { json } => list_mods(&plan, *json),
        Commands::Order => show_order(&plan),
        Commands::Check => check_mods(&plan, cli.quiet),
        Commands::Enable { name } => toggle_mod(&plan, name, true, cli.quiet),
        Commands::Disable { name } => toggle_mod(&plan, name, false, cli.quiet),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{}: {}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}
