use clap::{Parser, Subcommand};
use cloudtiger::aggregate::DEFAULT_SECTION;
use cloudtiger::ip::FpingProbe;
use cloudtiger::orchestrator;
use cloudtiger::utils::keys::{check_private_key, PRIVATE_KEY_ENV};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;

/// Expands a platform description into per-scope configurations and assigns VM addresses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scope folder holding meta_config.yml or config.yml
    #[arg(short, long, global = true, default_value = ".")]
    scope: PathBuf,

    /// Private SSH key used by later provisioning steps
    #[arg(long, global = true, env = PRIVATE_KEY_ENV)]
    ssh_key: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expand meta_config.yml into one folder and config.yml per scope
    Distribute {
        /// Project VM catalog extending the built-in one
        #[arg(long)]
        standard: Option<PathBuf>,
    },
    /// Consolidate one section of every config.yml below the scope
    Aggregate {
        #[arg(long, default_value = DEFAULT_SECTION)]
        section: String,

        /// Output file, meta_config_aggregated.yml in the scope by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assign addresses to the VMs of a scope and write config_ips.yml
    ConfigureIp {
        /// Provisioner output with the addresses of existing VMs
        #[arg(long)]
        learned: Option<PathBuf>,

        /// Command used to scan a subnet, called as `<cmd> -g <cidr>`.
        /// Split on whitespace, so `sudo fping` works; no shell quoting
        #[arg(long, default_value = "fping")]
        probe_command: String,
    },
    /// Check that the private SSH key is configured and readable
    CheckKeys,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Scope folder: {:?}", args.scope);

    if let Err(e) = run(args) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    // Preconditions are checked before anything is written
    match &args.command {
        Command::CheckKeys => {
            let key = check_private_key(args.ssh_key.as_deref())?;
            info!("Private key found at {:?}", key);
            return Ok(());
        }
        Command::Distribute { .. } | Command::ConfigureIp { .. } if args.ssh_key.is_some() => {
            check_private_key(args.ssh_key.as_deref())?;
        }
        _ => {}
    }

    match args.command {
        Command::Distribute { standard } => {
            let summary = orchestrator::run_distribute(&args.scope, standard.as_deref())?;
            info!(
                "Distribution completed: {} scopes, {} VMs addressed",
                summary.scopes, summary.vms
            );
        }
        Command::Aggregate { section, output } => {
            let path = orchestrator::run_aggregate(&args.scope, &section, output.as_deref())?;
            info!("Aggregation completed: {:?}", path);
        }
        Command::ConfigureIp {
            learned,
            probe_command,
        } => {
            let probe = FpingProbe::new(&probe_command);
            let reconciliation =
                orchestrator::configure_ips(&args.scope, learned.as_deref(), &probe)?;
            if !reconciliation.anomalies.is_empty() {
                for anomaly in &reconciliation.anomalies {
                    error!("{}", anomaly);
                }
                return Err(eyre!(
                    "{} subnet(s) ran out of free addresses",
                    reconciliation.anomalies.len()
                ));
            }
            info!("IP configuration completed");
        }
        Command::CheckKeys => {}
    }

    Ok(())
}
