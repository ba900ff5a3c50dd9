//! ClinicGate CLI: runs the console server and inspects its configuration.
//!
//! ```bash
//! clinicgate serve
//! clinicgate --config /etc/clinicgate.toml grants
//! clinicgate check-config
//! ```
//!
//! See `clinicgate --help` for all available commands and options.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clinicgate", about = "Role-scoped schema console for the clinic database", version)]
struct Cli {
    /// Config file (default: ./clinicgate.toml when present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP console
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the roles and privileges parsed from the grant script
    Grants {
        /// Only show this role
        #[arg(long)]
        role: Option<String>,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(cli.config.as_deref(), host, port),
        Commands::Grants { role } => commands::grants::run(cli.config.as_deref(), role.as_deref()),
        Commands::CheckConfig => commands::check_config::run(cli.config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
