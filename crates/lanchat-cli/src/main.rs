//! LANChat CLI - chat and share files with everyone on the LAN
//!
//! Commands:
//! - lanchat                          - start a node and open the interactive shell
//! - lanchat devices                  - list devices discovered on the LAN
//! - lanchat devices --peer <ip:port> - ask another node for its device list

mod commands;
mod prompt;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{is_chat_exit, parse_command, print_help, Command};
use lanchat_core::registry::parse_address;
use lanchat_core::{load_config, resolve_target, save_config, ChatError, Envelope, NodeConfig, TransferClient};
use lanchat_daemon::{ChatSession, LanNode};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// LANChat - serverless LAN chat and file sharing
#[derive(Parser)]
#[command(name = "lanchat", version, about = "Serverless LAN chat and file sharing")]
struct Cli {
    /// HTTP port to serve and advertise (default: any free port)
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Label for the advertised instance name ({label}_{port})
    #[arg(long, global = true)]
    label: Option<String>,
    /// Chat name (asked on /chat when unset)
    #[arg(short, long)]
    username: Option<String>,
    /// LAN address to advertise (default: auto-detect)
    #[arg(long, global = true)]
    ip: Option<Ipv4Addr>,
    /// Directory served to peers and filled by their uploads
    #[arg(long)]
    shared_dir: Option<PathBuf>,
    /// Where downloads are written
    #[arg(long)]
    download_dir: Option<PathBuf>,
    /// Forget peers not seen for this many seconds
    #[arg(long)]
    peer_ttl: Option<u64>,
    /// Write the effective settings to ~/.lanchat/config.json
    #[arg(long)]
    save_config: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices on the LAN
    Devices {
        /// Ask this node (ip:port) instead of browsing locally
        #[arg(long)]
        peer: Option<String>,
        /// Seconds to browse before printing
        #[arg(long, default_value_t = 3)]
        wait: u64,
    },
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(label) = &self.label {
            config.label = label.clone();
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(ip) = self.ip {
            config.advertise_ip = Some(ip);
        }
        if let Some(dir) = &self.shared_dir {
            config.shared_dir = dir.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        if let Some(ttl) = self.peer_ttl {
            config.peer_ttl_secs = Some(ttl);
        }
    }
}

/// Logs go to stderr so chat output stays readable
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lanchat=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring unreadable config: {}", e);
            NodeConfig::default()
        }
    };
    cli.apply(&mut config);
    if cli.save_config {
        save_config(&config)?;
    }

    match cli.command {
        Some(Commands::Devices { peer: Some(peer), .. }) => list_remote_devices(&peer).await,
        Some(Commands::Devices { peer: None, wait }) => list_local_devices(config, wait).await,
        None => run_shell(config).await,
    }
}

async fn list_remote_devices(peer: &str) -> Result<()> {
    let addr = parse_address(peer)?;
    let devices = TransferClient::new(".").list_devices(addr).await?;

    if devices.is_empty() {
        println!("📭 {} sees no devices", addr);
        return Ok(());
    }

    println!("📋 Devices seen by {}:", addr);
    for (i, device) in devices.iter().enumerate() {
        println!("   {}. {} ({}:{})", i + 1, device.name, device.ip, device.port);
    }
    Ok(())
}

async fn list_local_devices(config: NodeConfig, wait: u64) -> Result<()> {
    let node = LanNode::start(config).await?;
    println!("🔍 Browsing for {}s...", wait);
    tokio::time::sleep(Duration::from_secs(wait)).await;

    print_devices(&node);
    node.shutdown();
    Ok(())
}

fn print_devices(node: &LanNode) {
    let devices = node.registry().list();
    if devices.is_empty() {
        println!("📭 No devices online");
        return;
    }

    println!("📋 Online devices ({}):", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!("   {}. {} ({})", i + 1, device.name, device.address);
    }
}

fn print_incoming(envelope: &Envelope, source: SocketAddr) {
    if envelope.is_system() {
        println!("\nℹ️  {}", envelope.text);
    } else if let Some(file) = &envelope.file_info {
        println!(
            "\n📎 {} shared {} ({} bytes, {}) from {}",
            envelope.sender,
            file.name,
            file.size_bytes,
            file.mime_type,
            source.ip()
        );
    } else {
        println!("\n{}: {}", envelope.sender, envelope.text);
    }
    prompt_marker();
}

fn prompt_marker() {
    print!(">>> ");
    let _ = std::io::stdout().flush();
}

/// Interactive loop; in chat mode plain lines are messages
async fn run_shell(config: NodeConfig) -> Result<()> {
    let node = LanNode::start(config).await?;
    let client = node.transfer_client();
    let mut username = node.config().username.clone();
    let mut session: Option<ChatSession> = None;

    println!("🌐 LANChat node at http://{}", node.local_address());
    if !node.is_discoverable() {
        println!("⚠️  Not advertised on the LAN, others can still reach you by address");
    }
    println!("💡 Type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        if let Some(chat) = &session {
            if is_chat_exit(&line) {
                chat.leave().await;
                session = None;
                println!("👋 Left chat");
                continue;
            }
            if !line.trim_start().starts_with('/') {
                if let Err(e) = chat.say(&line).await {
                    println!("❌ {}", e);
                }
                continue;
            }
        }

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("❌ {}", msg);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Devices => print_devices(&node),
            Command::Chat => {
                if session.is_some() {
                    println!("💬 Already in chat");
                    continue;
                }
                if username.is_none() {
                    username = tokio::task::block_in_place(prompt::ask_username);
                }
                let Some(name) = username.clone() else {
                    println!("❌ A name is needed to chat");
                    continue;
                };

                let chat = node.chat_session(name);
                match chat.join(|envelope, source| print_incoming(&envelope, source)).await {
                    Ok(()) => {
                        println!("✓ Chat started! Type messages, /quit to leave");
                        session = Some(chat);
                    }
                    Err(e) => println!("❌ Could not start chat: {}", e),
                }
            }
            Command::Share { path } => match &session {
                Some(chat) => match chat.share_file(&path).await {
                    Ok(info) => println!("📎 Shared {} ({} bytes)", info.name, info.size_bytes),
                    Err(e) => println!("❌ {}", e),
                },
                None => println!("💡 Join the chat first with /chat"),
            },
            Command::Upload { path, target } => {
                if let Err(e) = upload(&node, &client, &path, target.as_deref()).await {
                    println!("❌ Upload failed: {}", e);
                }
            }
            Command::Download { name, source } => {
                if let Err(e) = download(&node, &client, &name, source).await {
                    println!("❌ Download failed: {}", e);
                }
            }
        }
    }

    if let Some(chat) = session.take() {
        chat.leave().await;
    }
    println!("\n👋 Bye");
    node.shutdown();
    Ok(())
}

async fn upload(
    node: &LanNode,
    client: &TransferClient,
    path: &Path,
    target: Option<&str>,
) -> lanchat_core::Result<()> {
    let devices = node.registry().list();
    let target = tokio::task::block_in_place(|| resolve_target(&devices, target, &prompt::TerminalPrompt))?;

    let info = client.upload(target.address(), path).await?;
    println!("✅ Uploaded {} ({} bytes) to {}", info.name, info.size_bytes, target.address());
    Ok(())
}

/// The source is always named by the user, never picked from the registry
async fn download(
    node: &LanNode,
    client: &TransferClient,
    name: &str,
    source: Option<String>,
) -> lanchat_core::Result<()> {
    let source = match source {
        Some(source) => source,
        None => {
            print_devices(node);
            tokio::task::block_in_place(|| prompt::ask_address("Source device"))
                .ok_or_else(|| ChatError::InvalidSelection("no source given".into()))?
        }
    };
    let source = node.registry().resolve_address(&source)?;

    let saved = client.download(source, name).await?;
    println!("✅ Saved {}", saved.display());
    Ok(())
}
