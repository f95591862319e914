use anyhow::Result;
use clap::{Parser, Subcommand};
use std::env;

pub mod init;
pub mod serve;
pub mod user;

#[derive(Subcommand)]
enum Command {
    /// Initialize the database schema
    Init {},
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "5000")]
        port: String,
    },
    /// Create a user account and print its id
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    let storage_path = env::var("CHATD_STORAGE_PATH").unwrap_or("./".to_string());
    let db_path = format!("{}/db", storage_path);

    // Handle each sub command
    match args.command {
        Some(Command::Init {}) => {
            init::run(&db_path).await?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port).await;
        }
        Some(Command::AddUser { username, email }) => {
            user::run(&db_path, &username, &email).await?;
        }
        None => {}
    }

    Ok(())
}
