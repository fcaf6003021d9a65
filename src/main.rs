//! MediaBridge - media service transaction server and client

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediabridge::config::{self, Config};
use mediabridge::network::{NetworkConfig, Server, ServerEvent, TcpTransport};
use mediabridge::protocol::{
    schema_for, Opcode, RemoteHandle, INTERFACE_DESCRIPTOR, SCHEMA_VERSION,
};
use mediabridge::service::MediaPlayerServiceProxy;

/// MediaBridge - media service transaction bridge
#[derive(Parser)]
#[command(name = "mediabridge")]
#[command(author = "MediaBridge Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Serve or call the media service over TCP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference service behind a TCP listener
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind to (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Issue one call against a running server
    Call {
        /// Server host
        #[arg(short, long, default_value = "127.0.0.1")]
        server: String,

        /// Server port (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        #[command(subcommand)]
        op: CallOp,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the opcode table
    Info,
}

#[derive(Subcommand, Debug, PartialEq)]
enum CallOp {
    /// Create a player
    Create {
        /// Client object id (0 for none)
        #[arg(long, default_value_t = 0)]
        client: u64,
        #[arg(long, default_value_t = 0)]
        session: i32,
    },
    /// Create a recorder
    CreateMediaRecorder { package: String },
    /// Create a metadata retriever
    CreateMetadataRetriever,
    /// Fetch the codec host
    GetOmx,
    /// Create an HDCP module
    MakeHdcp {
        #[arg(long)]
        encryption: bool,
    },
    /// Record a battery usage event
    AddBatteryData { params: u32 },
    /// Fetch the battery payload
    PullBatteryData,
    /// Start listening for remote displays
    ListenForRemoteDisplay {
        package: String,
        /// Client object id (0 for none)
        #[arg(long, default_value_t = 0)]
        client: u64,
        #[arg(long, default_value = "")]
        interface: String,
    },
    /// Fetch the codec list
    GetCodecList,
    /// Fetch the acoustics snapshot as JSON
    #[command(alias = "acoustics")]
    GetAcousticsData {
        #[arg(long, default_value_t = 16)]
        capacity: usize,
    },
    /// Check that the server answers
    Ping,
    /// Print the descriptor the server speaks
    Descriptor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, bind } => {
            let mut network = config.network_config();
            if let Some(port) = port {
                network.port = port;
            }
            if let Some(bind) = bind {
                network.bind_address = bind;
            }
            run_server(&config, network).await?;
        }
        Commands::Call { server, port, op } => {
            let mut network = config.network_config();
            if let Some(port) = port {
                network.port = port;
            }
            let output =
                tokio::task::spawn_blocking(move || run_call(&server, &network, op)).await??;
            println!("{}", output);
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

/// Serve the reference implementation until Ctrl+C
async fn run_server(config: &Config, network: NetworkConfig) -> anyhow::Result<()> {
    let service = Arc::new(config.build_service());
    let dispatcher = Arc::new(config.build_dispatcher(service.clone()));

    let mut server = Server::new(network, dispatcher);
    let mut event_rx = server
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;

    let addr = server.start().await?;

    println!("\n========================================");
    println!("  MediaBridge Server Running");
    println!("========================================");
    println!("  Interface: {}", INTERFACE_DESCRIPTOR);
    println!("  Address: {}", addr);
    println!("  Acoustics: {}", config.capabilities.acoustics);
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ServerEvent::ClientConnected { addr } => {
                        println!("+ Client connected: {}", addr);
                    }
                    ServerEvent::ClientDisconnected { addr, reason } => {
                        tracing::info!("Client disconnected: {} - {}", addr, reason);
                        println!("- Client disconnected: {} ({})", addr, reason);
                    }
                    ServerEvent::TransactionHandled { addr, code, status } => {
                        let name = Opcode::from_code(code).map_or("fallback", Opcode::name);
                        tracing::debug!("{} from {} -> {}", name, addr, status);
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    server.stop().await?;
    tracing::info!("Server stopped; {} objects were registered", service.registry().len());

    Ok(())
}

/// Connect, issue one call and render its result
fn run_call(host: &str, network: &NetworkConfig, op: CallOp) -> anyhow::Result<String> {
    let transport = TcpTransport::connect_hostname(host, network)?;
    let proxy = MediaPlayerServiceProxy::new(transport);

    let output = match op {
        CallOp::Create { client, session } => {
            proxy.create(RemoteHandle::new(client), session)?.to_string()
        }
        CallOp::CreateMediaRecorder { package } => {
            proxy.create_media_recorder(&package)?.to_string()
        }
        CallOp::CreateMetadataRetriever => proxy.create_metadata_retriever()?.to_string(),
        CallOp::GetOmx => proxy.get_omx()?.to_string(),
        CallOp::MakeHdcp { encryption } => proxy.make_hdcp(encryption)?.to_string(),
        CallOp::AddBatteryData { params } => {
            proxy.add_battery_data(params)?;
            "ok".to_string()
        }
        CallOp::PullBatteryData => {
            let payload = proxy.pull_battery_data()?;
            let hex: Vec<String> = payload.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
            format!("{} bytes: {}", payload.data_size(), hex.join(" "))
        }
        CallOp::ListenForRemoteDisplay {
            package,
            client,
            interface,
        } => proxy
            .listen_for_remote_display(&package, RemoteHandle::new(client), &interface)?
            .to_string(),
        CallOp::GetCodecList => proxy.get_codec_list()?.to_string(),
        CallOp::GetAcousticsData { capacity } => {
            let snapshot = proxy.acoustics_snapshot(capacity)?;
            serde_json::to_string_pretty(&snapshot)?
        }
        CallOp::Ping => {
            proxy.ping()?;
            "alive".to_string()
        }
        CallOp::Descriptor => proxy.interface_descriptor()?,
    };

    Ok(output)
}

/// Print the opcode table
fn print_info() {
    println!("MediaBridge Interface");
    println!("=====================\n");
    println!("Descriptor: {}", INTERFACE_DESCRIPTOR);
    println!("Schema version: {}\n", SCHEMA_VERSION);

    for opcode in Opcode::ALL {
        let schema = schema_for(opcode);
        println!(
            "{:>3}  {:<28} request {:?}  reply {:?}",
            opcode.code(),
            opcode.name(),
            schema.request,
            schema.reply
        );
    }
}
