use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatprobe")]
#[command(about = "Scripted debug client for the real-time chat backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the scripted probe (two clients, fixed-timer joins and messages) against the chat server, then print a delivery report.
    Run {
        /// Config file path (default: CHATPROBE_CONFIG_PATH or ~/.chatprobe/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// WebSocket URL override (default built from config, e.g. ws://127.0.0.1:5000/chat)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Base step in milliseconds between scripted phases (default from config or 3000)
        #[arg(long, value_name = "MS")]
        step_ms: Option<u64>,
    },

    /// Run the in-process stub chat server, for probing without the real backend.
    Serve {
        /// Config file path (default: CHATPROBE_CONFIG_PATH or ~/.chatprobe/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from config or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chatprobe {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run { config, url, step_ms }) => {
            if let Err(e) = run_probe(config, url, step_ms).await {
                log::error!("probe failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_probe(
    config_path: Option<std::path::PathBuf>,
    url: Option<String>,
    step_ms: Option<u64>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(ms) = step_ms {
        config.pacing.step_millis = ms;
    }
    let url = url.unwrap_or_else(|| lib::config::chat_url(&config));
    log::info!("probing chat server at {}", url);

    let report = lib::scenario::run_probe(&config, &url).await?;
    println!("{}", report.summary());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting stub chat server on {}:{}",
        config.server.host,
        config.server.port
    );
    lib::server::run_server(config).await
}
