//! Tienda CLI - management commands for the admin data directory.
//!
//! # Usage
//!
//! ```bash
//! # Create the first super admin
//! tienda admin create -u duenio -e duenio@example.com -n "Dueño" -r super_admin
//!
//! # Take a backup before a risky change
//! tienda backup create --label "antes de importar"
//!
//! # Ask MercadoPago again about an order
//! tienda payments reprocess ORD-20240501-AB12
//! ```
//!
//! # Commands
//!
//! - `admin` - Create and list admin users
//! - `backup` - Create, list and restore backups
//! - `payments` - Reprocess MercadoPago payments
//!
//! Every command works on `--data-dir` (or `TIENDA_DATA_DIR`) directly, so
//! it is safe to run while the server is stopped. With the server running,
//! prefer the panel for writes: locks are per process.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tienda")]
#[command(author, version, about = "Tienda admin management tools")]
struct Cli {
    /// Data directory holding the JSON files
    #[arg(long, global = true, env = "TIENDA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Reprocess MercadoPago payments
    Payments {
        #[command(subcommand)]
        action: PaymentsAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin user
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name (defaults to the username)
        #[arg(short, long, default_value = "")]
        name: String,

        /// Admin role (`super_admin`, `admin`, `viewer`)
        #[arg(short, long, default_value = "admin")]
        role: String,

        /// Password
        #[arg(short, long, env = "TIENDA_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List admin users
    List,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Take a backup now
    Create {
        /// Free-text label stored in the bundle
        #[arg(short, long)]
        label: Option<String>,
    },
    /// List backups, newest first
    List,
    /// Restore a backup over the live data (takes a safety backup first)
    Restore {
        /// Backup file name as shown by `backup list`
        name: String,
    },
}

#[derive(Subcommand)]
enum PaymentsAction {
    /// Re-fetch one order's payment and sync the order
    Reprocess {
        /// Order ID
        order_id: String,
    },
    /// Re-fetch every pending MercadoPago order
    ReprocessPending,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tienda=info,tienda_admin=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    let state = commands::open_state(cli.data_dir).await?;

    match cli.command {
        Commands::Admin { action } => match action {
            AdminAction::Create {
                username,
                email,
                name,
                role,
                password,
            } => {
                commands::admin::create_user(&state, &username, &email, &name, &role, password.into())
                    .await?;
            }
            AdminAction::List => commands::admin::list_users(&state).await?,
        },
        Commands::Backup { action } => match action {
            BackupAction::Create { label } => {
                commands::backup::create(&state, label.as_deref()).await?;
            }
            BackupAction::List => commands::backup::list(&state).await?,
            BackupAction::Restore { name } => commands::backup::restore(&state, &name).await?,
        },
        Commands::Payments { action } => match action {
            PaymentsAction::Reprocess { order_id } => {
                commands::payments::reprocess(&state, &order_id).await?;
            }
            PaymentsAction::ReprocessPending => commands::payments::reprocess_pending(&state).await?,
        },
    }
    Ok(())
}
