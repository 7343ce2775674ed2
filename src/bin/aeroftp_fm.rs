//! aeroftp-fm — FTP file manager from the command line
//!
//! Usage:
//!   aeroftp-fm ls [path]                          List a folder
//!   aeroftp-fm mkdir <path> <name>                Create a folder
//!   aeroftp-fm rm <path> <names>...               Delete files/folders
//!   aeroftp-fm rename <path> <name> <new-name>    Rename an entry
//!   aeroftp-fm cp <path> <target> <names>...      Copy entries
//!   aeroftp-fm mv <path> <target> <names>...      Move entries
//!   aeroftp-fm search <path> <pattern>            Recursive glob search
//!   aeroftp-fm details <path> [names]...          Size and location
//!   aeroftp-fm get <path> <names>... [-o file]    Download (ZIP for several)
//!   aeroftp-fm put <path> <files>...              Upload local files
//!   aeroftp-fm exec [json]                        Raw request JSON (stdin if omitted)
//!
//! The server comes from the settings file or `--url`; the password from
//! `--password` or `AEROFTP_PASSWORD`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aeroftp_filemanager::settings::{config_path, load_settings};
use aeroftp_filemanager::{OperationResult, UploadAction, UploadFile};

#[derive(Parser)]
#[command(
    name = "aeroftp-fm",
    about = "AeroFTP File Manager — FTP-backed virtual filesystem",
    version,
    long_about = "Runs file manager operations against an FTP/FTPS server.\nPaths are virtual: '/' is the folder named by the server URL."
)]
struct Cli {
    /// Settings file (default: <config_dir>/aeroftp/filemanager.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Server URL, e.g. ftp://host/pub/ (overrides settings)
    #[arg(long, global = true)]
    url: Option<String>,
    /// Username (overrides settings)
    #[arg(long, short = 'u', global = true)]
    user: Option<String>,
    /// Password (falls back to AEROFTP_PASSWORD, then settings)
    #[arg(long, global = true)]
    password: Option<String>,
    /// More logging (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Include dot files
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Create a folder
    Mkdir { path: String, name: String },
    /// Delete files or folders (recursively)
    Rm {
        path: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Rename a file or folder
    Rename {
        path: String,
        name: String,
        new_name: String,
        /// Remove an existing destination first
        #[arg(long)]
        replace: bool,
    },
    /// Copy entries into another folder
    Cp {
        path: String,
        target: String,
        #[arg(required = true)]
        names: Vec<String>,
        /// Write conflicting names as name(N) instead of failing
        #[arg(long)]
        keep_both: bool,
    },
    /// Move entries into another folder
    Mv {
        path: String,
        target: String,
        #[arg(required = true)]
        names: Vec<String>,
        /// Write conflicting names as name(N) instead of failing
        #[arg(long)]
        keep_both: bool,
    },
    /// Search below a folder (`*` and `?` wildcards)
    Search {
        path: String,
        pattern: String,
        #[arg(long)]
        case_sensitive: bool,
        /// Include dot files
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Size and location of a folder or entries
    Details { path: String, names: Vec<String> },
    /// Download entries; several entries or folders arrive as one ZIP
    Get {
        path: String,
        #[arg(required = true)]
        names: Vec<String>,
        /// Local destination (default: the served file name)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Upload local files into a folder
    Put {
        path: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// save, replace or keepboth
        #[arg(long, default_value = "save")]
        action: UploadAction,
    },
    /// Run a raw request JSON and print the JSON result
    Exec { request: Option<String> },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "aeroftp_filemanager=warn",
        1 => "aeroftp_filemanager=info",
        _ => "aeroftp_filemanager=debug,suppaftp=debug",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_result(result: &OperationResult) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings_path = cli.config.clone().unwrap_or_else(config_path);
    let mut settings = load_settings(&settings_path)?;
    if let Some(url) = cli.url {
        settings.connection.url = url;
    }
    if let Some(user) = cli.user {
        settings.connection.username = user;
    }
    let password = cli.password.or_else(|| std::env::var("AEROFTP_PASSWORD").ok());
    let manager = settings.file_manager(password.as_deref())?;

    let result = match cli.command {
        Commands::Ls { path, all } => manager.read(&path, all, &[]).await,
        Commands::Mkdir { path, name } => manager.create(&path, &name).await,
        Commands::Rm { path, names } => manager.delete(&path, &names, &[]).await,
        Commands::Rename {
            path,
            name,
            new_name,
            replace,
        } => manager.rename(&path, &name, &new_name, replace, &[]).await,
        Commands::Cp {
            path,
            target,
            names,
            keep_both,
        } => {
            let flagged = if keep_both { names.clone() } else { Vec::new() };
            manager.copy(&path, &target, &names, &flagged, &[]).await
        }
        Commands::Mv {
            path,
            target,
            names,
            keep_both,
        } => {
            let flagged = if keep_both { names.clone() } else { Vec::new() };
            manager.move_items(&path, &target, &names, &flagged, &[]).await
        }
        Commands::Search {
            path,
            pattern,
            case_sensitive,
            all,
        } => manager.search(&path, &pattern, all, case_sensitive, &[]).await,
        Commands::Details { path, names } => manager.details(&path, &names, &[]).await,
        Commands::Put { path, files, action } => {
            let mut uploads = Vec::with_capacity(files.len());
            for file in &files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .with_context(|| format!("Not a file: {}", file.display()))?;
                let data = tokio::fs::read(file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                uploads.push(UploadFile::new(name, data));
            }
            manager.upload(&path, uploads, action).await
        }
        Commands::Get { path, names, output } => {
            return match manager.download(&path, &names, &[]).await {
                Ok(download) => {
                    let destination = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
                    let bytes = download
                        .save_to(&destination)
                        .await
                        .with_context(|| format!("Failed to write {}", destination.display()))?;
                    println!("{} ({} bytes)", destination.display(), bytes);
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    println!("{}", serde_json::to_string_pretty(&error)?);
                    Ok(ExitCode::FAILURE)
                }
            };
        }
        Commands::Exec { request } => {
            let body = match request {
                Some(body) => body,
                None => {
                    let mut body = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut body)
                        .await
                        .context("Failed to read request from stdin")?;
                    body
                }
            };
            let response = manager.dispatch_json(&body).await;
            println!("{}", response);
            let failed = serde_json::from_str::<OperationResult>(&response)
                .map(|result| !result.is_ok())
                .unwrap_or(true);
            return Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS });
        }
    };

    print_result(&result)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
