// Main entry point for the application

use std::io;
use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use ftpx::client::{progress, Client, Shell};
use ftpx::common::types::{DEFAULT_BIND_ADDR, DEFAULT_CLIENT_DIR, DEFAULT_ROOT_DIR};
use ftpx::{ClientConfig, Server, ServerConfig};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ftpx")]
#[command(about = "Minimal TCP file transfer server and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory
    Serve {
        /// Address to listen on
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        bind: String,

        /// Directory exposed to clients (created if missing)
        #[arg(long, default_value = DEFAULT_ROOT_DIR)]
        root: PathBuf,

        /// Run sessions on a fixed pool of N workers instead of a thread each.
        /// Without a value, one worker per CPU.
        #[arg(long, value_name = "N", num_args = 0..=1)]
        workers: Option<Option<usize>>,

        /// Serialize concurrent uploads to the same file name
        #[arg(long)]
        serialize_writes: bool,
    },

    /// Interactive session against a server
    Connect {
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        server: String,

        /// Where downloads are saved and uploads are looked up
        #[arg(long, default_value = DEFAULT_CLIENT_DIR)]
        dir: PathBuf,
    },

    /// List files on a server
    Ls {
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        server: String,
    },

    /// Download one file
    Get {
        file: String,

        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        server: String,

        #[arg(long, default_value = DEFAULT_CLIENT_DIR)]
        dir: PathBuf,
    },

    /// Upload one file
    Put {
        path: PathBuf,

        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        server: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, root, workers, serialize_writes } => {
            std::fs::create_dir_all(&root)?;

            let mut config = ServerConfig::new(bind, root).with_serialized_writes(serialize_writes);
            config = match workers {
                Some(Some(n)) => config.with_workers(n),
                Some(None) => config.with_cpu_workers(),
                None => config,
            };

            let server = Server::bind(config)?;

            // first Ctrl+C drains open sessions, a second one stops at once
            let shutdown = server.shutdown_handle();
            ctrlc::set_handler(move || {
                if shutdown.is_requested() {
                    log::warn!("Second interrupt, not waiting for open sessions");
                    shutdown.force();
                } else {
                    log::info!("Interrupt received, finishing open sessions (Ctrl+C again to force)");
                    shutdown.shutdown();
                }
            })?;

            println!("Serving on {} (Ctrl+C to stop)", server.local_addr()?);
            server.run()?;
        }

        Commands::Connect { server, dir } => {
            std::fs::create_dir_all(&dir)?;
            let client = Client::connect(ClientConfig::new(server).with_local_dir(&dir))?;

            let stdin = io::stdin();
            let mut shell = Shell::new(stdin.lock(), io::stdout(), dir);
            shell.run(client)?;
        }

        Commands::Ls { server } => {
            let mut client = Client::connect(ClientConfig::new(server))?;
            let listing = client.list()?;
            println!("{}", listing.message);
            for file in &listing.files {
                println!("  {:<32} {:>12} bytes", file.name, file.size);
            }
            client.quit()?;
        }

        Commands::Get { file, server, dir } => {
            std::fs::create_dir_all(&dir)?;
            let mut client = Client::connect(ClientConfig::new(server).with_local_dir(&dir))?;

            let bar = progress::transfer_bar(&file, 0);
            match client.download_to(&file, &dir, &bar) {
                Ok(path) => {
                    progress::finish_success(&bar, &file);
                    println!("Saved {}", path.display());
                }
                Err(e) => {
                    progress::finish_error(&bar, &file);
                    return Err(e.into());
                }
            }
            client.quit()?;
        }

        Commands::Put { path, server } => {
            if !path.is_file() {
                return Err(format!("local file not found: {}", path.display()).into());
            }
            let mut client = Client::connect(ClientConfig::new(server))?;

            let label = display_name(&path);
            let bar = progress::transfer_bar(&label, 0);
            match client.upload_file(&path, &bar) {
                Ok(reply) => {
                    progress::finish_success(&bar, &label);
                    println!("{}", reply);
                }
                Err(e) => {
                    progress::finish_error(&bar, &label);
                    return Err(e.into());
                }
            }
            client.quit()?;
        }
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
