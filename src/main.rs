use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall::{
    auth::{AuthContext, FileAuthStore},
    config::Config,
    kiosk,
    models::attendance::AttendanceForm,
    services::{
        attendance::{AttendanceClient, device_info},
        qr::QrClient,
    },
    submission::{FileCamera, SUBMIT_FAILED_MESSAGE, SUCCESS_MESSAGE, SubmissionFlow},
};

/// attendance capture client: rotating QR kiosk and selfie submission
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// keep a fresh QR code on display and serve it over HTTP
    Kiosk {
        /// listen address, overrides KIOSK_ADDR
        #[clap(long)]
        addr: Option<SocketAddr>,
        /// seconds between QR polls, overrides QR_POLL_INTERVAL_SECS
        #[clap(long)]
        interval: Option<u64>,
    },
    /// submit attendance for a scanned QR link
    Submit {
        /// the scanned URL, carrying sessionId and expiryTime
        url: String,
        #[clap(long)]
        full_name: String,
        #[clap(long)]
        phone_number: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        branch: String,
        #[clap(long)]
        section: String,
        /// defaults to the signed-in student id
        #[clap(long)]
        roll_number: Option<String>,
        /// still image used as the selfie
        #[clap(long)]
        selfie: PathBuf,
    },
    /// ask the backend whether a session is still valid
    Status { session_id: String },
    /// remember a student id on this device
    Login { student_id: String },
    /// forget the remembered student id
    Logout,
    /// show the remembered student id
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    tracing::debug!("Configuration loaded: backend {}", config.api_base_url);

    match cli.command {
        Command::Kiosk { addr, interval } => {
            if let Some(addr) = addr {
                config.kiosk_addr = addr;
            }
            if let Some(secs) = interval.filter(|s| *s > 0) {
                config.poll_interval = std::time::Duration::from_secs(secs);
            }
            kiosk::serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Submit {
            url,
            full_name,
            phone_number,
            email,
            branch,
            section,
            roll_number,
            selfie,
        } => {
            let auth = AuthContext::init(FileAuthStore::with_path(&config.auth_store_path))?;
            let roll_number = roll_number
                .or_else(|| auth.student_id().map(str::to_string))
                .unwrap_or_default();

            let mut flow = SubmissionFlow::open(&url, FileCamera::new(selfie), device_info(), Utc::now());
            if flow.is_blocked() {
                eprintln!("{}", flow.error().unwrap_or("Invalid attendance URL"));
                return Ok(ExitCode::FAILURE);
            }

            flow.fill(AttendanceForm {
                full_name,
                phone_number,
                email,
                branch,
                section,
                roll_number,
            });

            if flow.open_camera().is_err() || flow.capture_selfie().is_err() {
                eprintln!("{}", flow.error().unwrap_or("Failed to access camera. Please try again."));
                return Ok(ExitCode::FAILURE);
            }

            let client = AttendanceClient::new(&config)?;
            match flow.submit(&client).await {
                Ok(_) => {
                    println!("{}", SUCCESS_MESSAGE);
                    flow.leave_after(config.success_redirect).await;
                    Ok(ExitCode::SUCCESS)
                }
                Err(_) => {
                    eprintln!("{}", flow.error().unwrap_or(SUBMIT_FAILED_MESSAGE));
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Command::Status { session_id } => {
            let client = QrClient::new(&config)?;
            if client.check_status(&session_id).await {
                println!("Session {} is valid", session_id);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Session {} is not valid", session_id);
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Login { student_id } => {
            let mut auth = AuthContext::init(FileAuthStore::with_path(&config.auth_store_path))?;
            auth.login(&student_id)?;
            println!("Signed in as {}", student_id.trim());
            Ok(ExitCode::SUCCESS)
        }

        Command::Logout => {
            let mut auth = AuthContext::init(FileAuthStore::with_path(&config.auth_store_path))?;
            auth.logout()?;
            println!("Signed out");
            Ok(ExitCode::SUCCESS)
        }

        Command::Whoami => {
            let auth = AuthContext::init(FileAuthStore::with_path(&config.auth_store_path))?;
            match auth.student_id() {
                Some(id) => println!("{}", id),
                None => println!("Not signed in"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
