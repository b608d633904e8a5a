//! Stool - stage manager
//!
//! Usage:
//!   stool create <name> --app web   # Create a stage and allocate its ports
//!   stool start --stage a,b         # Start stages
//!   stool status --all              # Show every stage
//!   stool locks --repair            # Drop locks of dead processes
//!   stool config --init             # Write the default stool.toml

mod output;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stool_core::commands::{CreateOptions, StageService};
use stool_core::context::AppContext;
use stool_core::locking::LockManager;
use stool_core::orchestrator::{FailPolicy, Invocation};
use stool_core::select::SelectionArgs;
use stool_core::stage::{StageEngine, StageState};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "stool")]
#[command(about = "Stage manager", long_about = None)]
struct Cli {
    /// Installation directory (defaults to $STOOL_HOME, then the data dir)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new stage and allocate its ports
    Create {
        /// Stage name
        name: String,
        /// Application vhost; repeat for several
        #[arg(long = "app", value_name = "NAME")]
        apps: Vec<String>,
        /// Pin a label to an even port
        #[arg(long = "port", value_name = "LABEL=PORT")]
        ports: Vec<String>,
        /// Do not make the new stage the selected one
        #[arg(long)]
        no_select: bool,
    },

    /// Stop and delete stages
    #[command(alias = "rm")]
    Remove {
        #[command(flatten)]
        select: SelectFlags,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Allocate ports and start stages
    Start(SelectFlags),

    /// Stop stages
    Stop(SelectFlags),

    /// Stop and start stages, keeping their ports
    Restart(SelectFlags),

    /// Show stage status
    Status(SelectFlags),

    /// Check stages for problems
    Validate(SelectFlags),

    /// Make a stage the default target
    Select {
        /// Stage name
        name: String,
    },

    /// Show allocated ports
    Ports,

    /// Show the installation config
    Config {
        /// Write the defaults to stool.toml
        #[arg(long)]
        init: bool,
    },

    /// Show held locks
    Locks {
        /// Release locks held by dead processes on this host
        #[arg(long)]
        repair: bool,
    },
}

/// Stage selection, shared by every stage command
#[derive(Args, Clone, Default)]
struct SelectFlags {
    /// Comma-separated stage names
    #[arg(long = "stage", value_delimiter = ',', value_name = "NAMES")]
    stages: Vec<String>,

    /// All stages
    #[arg(long)]
    all: bool,

    /// All stages owned by this user
    #[arg(long)]
    owner: Option<String>,

    /// All stages in this state (down, up)
    #[arg(long)]
    state: Option<String>,

    /// When to fail on stages that cannot be resolved (before, after, never)
    #[arg(long)]
    fail: Option<String>,
}

impl SelectFlags {
    fn selection(&self) -> Result<SelectionArgs> {
        let state = match &self.state {
            Some(s) => Some(s.parse::<StageState>().map_err(anyhow::Error::msg)?),
            None => None,
        };
        Ok(SelectionArgs {
            names: self.stages.clone(),
            all: self.all,
            owner: self.owner.clone(),
            state,
        })
    }

    fn policy(&self) -> Result<Option<FailPolicy>> {
        self.fail
            .as_deref()
            .map(|s| s.parse::<FailPolicy>().map_err(anyhow::Error::msg))
            .transpose()
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stool=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::discover(cli.home.clone())?;
    let config = ctx.config_store().load()?;

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let invocation = Invocation::new(command_line.clone());
    let locks = Arc::new(ctx.lock_manager(&command_line, config.locks.options()));
    install_interrupt_handler(Arc::clone(&locks));

    let engine: Arc<dyn StageEngine> = Arc::new(ctx.local_engine());
    let console = cli.format.console();
    let service = StageService::new(
        ctx.stage_store(),
        locks,
        engine,
        config,
        console,
        invocation,
    );

    run_cli(&ctx, &service, cli.command, cli.format)
}

fn run_cli(
    ctx: &AppContext,
    service: &StageService,
    command: Commands,
    format: OutputFormat,
) -> Result<()> {
    match command {
        Commands::Create {
            name,
            apps,
            ports,
            no_select,
        } => {
            let mut options = CreateOptions::new(name);
            options.apps = apps;
            options.pinned = parse_ports(&ports)?;
            options.select = !no_select;
            let stage = service.create(options)?;
            output::print_stage_created(format, &stage)?;
        }
        Commands::Remove { select, yes } => {
            let args = select.selection()?;
            if !yes && !confirm_remove(service, &args)? {
                println!("Remove cancelled.");
                return Ok(());
            }
            let report = service.remove(&args, select.policy()?)?;
            output::print_run_report(format, "removed", &report)?;
        }
        Commands::Start(select) => {
            let report = service.start(&select.selection()?, select.policy()?)?;
            output::print_run_report(format, "started", &report)?;
        }
        Commands::Stop(select) => {
            let report = service.stop(&select.selection()?, select.policy()?)?;
            output::print_run_report(format, "stopped", &report)?;
        }
        Commands::Restart(select) => {
            let report = service.restart(&select.selection()?, select.policy()?)?;
            output::print_run_report(format, "restarted", &report)?;
        }
        Commands::Status(select) => {
            let (stages, warnings) = service.status(&select.selection()?, select.policy()?)?;
            output::print_status(format, &stages, &warnings)?;
        }
        Commands::Validate(select) => {
            let reports = service.validate(&select.selection()?, select.policy()?)?;
            output::print_validation(format, &reports)?;
            if reports.iter().any(|r| !r.problems.is_empty()) {
                anyhow::bail!("validation found problems");
            }
        }
        Commands::Select { name } => {
            service.select(&name)?;
        }
        Commands::Ports => {
            let report = service.ports()?;
            let range = service.config().ports.range()?;
            output::print_ports(format, range, &report)?;
        }
        Commands::Config { init } => {
            let store = ctx.config_store();
            if init {
                if store.config_path().exists() {
                    anyhow::bail!("Config already exists: {}", store.config_path().display());
                }
                store.save(service.config())?;
                eprintln!("{} Wrote {}", style("✓").green(), store.config_path().display());
            }
            output::print_config(format, service.config())?;
        }
        Commands::Locks { repair } => {
            let report = service.locks_report(repair)?;
            output::print_locks(format, &report)?;
        }
    }
    Ok(())
}

/// Parse `LABEL=PORT` pairs
fn parse_ports(pairs: &[String]) -> Result<BTreeMap<String, u16>> {
    let mut result = BTreeMap::new();
    for pair in pairs {
        let (label, port) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid port '{pair}': expected LABEL=PORT"))?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid port number in '{pair}'"))?;
        result.insert(label.trim().to_string(), port);
    }
    Ok(result)
}

fn confirm_remove(service: &StageService, args: &SelectionArgs) -> Result<bool> {
    let selected = service.resolve(args)?;
    if selected.stages.is_empty() {
        return Ok(true);
    }
    let names = selected.names().join(", ");
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remove {}?", style(names).yellow()))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// Release held locks on Ctrl-C; guards on the main thread's stack would
/// never be dropped by the default handler.
fn install_interrupt_handler(locks: Arc<LockManager>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::warn!("cannot install interrupt handler: {err}");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            match locks.release_active() {
                Ok(0) => {}
                Ok(count) => eprintln!("interrupted: released {count} lock(s)"),
                Err(err) => eprintln!("interrupted: failed to release locks: {err}"),
            }
            std::process::exit(130);
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_pairs() {
        let ports = parse_ports(&["web=9100".to_string(), " api = 9102".to_string()]).unwrap();

        assert_eq!(ports.get("web"), Some(&9100));
        assert_eq!(ports.get("api"), Some(&9102));
        assert!(parse_ports(&["web".to_string()]).is_err());
        assert!(parse_ports(&["web=x".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_selection_flags() {
        let cli = Cli::try_parse_from(["stool", "start", "--stage", "a,b", "--fail", "never"])
            .unwrap();

        let Commands::Start(select) = cli.command else {
            panic!("expected start");
        };
        let args = select.selection().unwrap();
        assert_eq!(args.names, vec!["a", "b"]);
        assert_eq!(select.policy().unwrap(), Some(FailPolicy::Never));
    }

    #[test]
    fn cli_parses_config_init() {
        let cli = Cli::try_parse_from(["stool", "config", "--init", "-f", "json"]).unwrap();

        assert!(matches!(cli.command, Commands::Config { init: true }));
        assert!(cli.format == OutputFormat::Json);
    }
}
