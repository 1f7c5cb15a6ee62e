//! Clinic client command-line interface.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use clinic_api_client::{HealthRecordUpdate, NewHealthRecord};
use clinic_client::ClinicClient;
use clinic_core::{init_logging, Config, Paths};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Clinic client command-line interface.
#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Command-line client for the clinic management backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for config and credentials. Defaults to ~/.clinic-client
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email, password, and a one-time code
    Login {
        /// Account email; prompted for when omitted
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the current session and identity
    Whoami,
    /// Log out and erase the stored credential
    Logout,
    /// Operations on health records (requires step-up approval)
    #[command(subcommand)]
    Records(RecordCommands),
}

#[derive(Subcommand)]
enum RecordCommands {
    /// List health records
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Create a health record
    Create {
        #[arg(long)]
        patient_id: i64,
        /// ISO date, e.g. 2026-08-06
        #[arg(long)]
        record_date: String,
        #[arg(long)]
        diagnosis: String,
        #[arg(long)]
        treatment: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Update a health record
    Update {
        #[arg(long)]
        record_id: i64,
        #[arg(long)]
        patient_id: i64,
        #[arg(long)]
        record_date: String,
        #[arg(long)]
        diagnosis: String,
        #[arg(long)]
        treatment: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a health record
    Delete {
        #[arg(long)]
        record_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let client = ClinicClient::new(&config, &paths);
    client
        .bootstrap()
        .await
        .context("Failed to restore session")?;

    match cli.command {
        Commands::Login { email } => run_login(&client, email).await?,
        Commands::Whoami => run_whoami(&client),
        Commands::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        Commands::Records(command) => run_records(&client, command).await?,
    }

    Ok(())
}

async fn run_login(client: &ClinicClient, email: Option<String>) -> anyhow::Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = prompt("Password: ")?;

    client.login(&email, &password).await?;

    let code = prompt("One-time code: ")?;
    client.verify_code(&code).await?;

    match client.identity() {
        Some(identity) => println!("Logged in as {} ({})", identity.full_name, identity.role_name),
        None => println!("Logged in."),
    }
    Ok(())
}

fn run_whoami(client: &ClinicClient) {
    let session = client.session();
    println!("Stage: {:?}", session.stage);
    match session.identity {
        Some(identity) => {
            println!("Name:   {}", identity.full_name);
            println!("Email:  {}", identity.email);
            println!("Role:   {}", identity.role_name);
            println!("Active: {}", identity.is_active);
        }
        None => println!("No identity loaded."),
    }
    println!("Elevated access: {}", client.is_elevated());
}

async fn run_records(client: &ClinicClient, command: RecordCommands) -> anyhow::Result<()> {
    if !client.session().is_logged_in() {
        bail!("You must be logged in. Run `clinic login` first.");
    }

    if !client.is_elevated() {
        println!("Health records require approval from your registered mobile device.");
        println!("Waiting for approval...");
    }

    match command {
        RecordCommands::List { page, limit } => {
            let result = client.records().list(page, limit).await?;
            println!("{} record(s) total", result.count);
            for record in result.data {
                let notes = record.notes.as_deref().unwrap_or("-");
                println!(
                    "#{:<5} patient {:<5} {}  {} / {}  notes: {}",
                    record.id,
                    record.patient_id,
                    record.record_date,
                    record.diagnosis,
                    record.treatment,
                    notes
                );
            }
        }
        RecordCommands::Create {
            patient_id,
            record_date,
            diagnosis,
            treatment,
            notes,
        } => {
            let record = client
                .records()
                .create(&NewHealthRecord {
                    patient_id,
                    record_date,
                    diagnosis,
                    treatment,
                    notes,
                })
                .await?;
            println!("Created record #{}", record.id);
        }
        RecordCommands::Update {
            record_id,
            patient_id,
            record_date,
            diagnosis,
            treatment,
            notes,
        } => {
            let record = client
                .records()
                .update(
                    record_id,
                    &HealthRecordUpdate {
                        patient_id,
                        record_date,
                        diagnosis,
                        treatment,
                        notes,
                    },
                )
                .await?;
            println!("Updated record #{}", record.id);
        }
        RecordCommands::Delete { record_id } => {
            client.records().delete(record_id).await?;
            println!("Deleted record #{}", record_id);
        }
    }

    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}
