mod mcp;
mod repl;

use chatdrive_core::ChatConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "chatdrive")]
#[command(about = "Chat with a web agent through a real browser")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (YAML). Built-in Alice defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long, global = true, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window (overrides config)
    #[arg(long, global = true)]
    headed: bool,

    /// Chat page URL (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Reply timeout in milliseconds (overrides config)
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation (default)
    Chat,
    /// Send one message, print the reply and exit
    Ask {
        /// Message text. Defaults to a greeting
        text: Vec<String>,
    },
    /// Serve the chat as MCP tools over stdio
    Mcp,
    /// Validate the config without launching a browser
    Check,
}

impl Cli {
    fn load_config(&self) -> chatdrive_core::Result<ChatConfig> {
        let mut config = match self.config {
            Some(ref path) => ChatConfig::load(path)?,
            None => ChatConfig::default(),
        };
        if self.headless {
            config.browser.headless = true;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(ref url) = self.url {
            config.target.url = url.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.detect.timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stderr keeps stdout for replies and MCP framing
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = cli.load_config()?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => repl::run(&config).await,
        Command::Ask { text } => {
            let text = if text.is_empty() {
                "Привет!".to_string()
            } else {
                text.join(" ")
            };
            let reply = chatdrive_core::ask(&config, &text).await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Mcp => mcp::run_server(config).await,
        Command::Check => {
            print_config(&config);
            Ok(())
        }
    }
}

fn print_config(config: &ChatConfig) {
    println!("Config valid");
    println!("  Target: {} (ready: {})", config.target.url, config.target.ready);
    println!(
        "  Browser: {}, {}x{}",
        if config.browser.headless {
            "headless"
        } else {
            "headed"
        },
        config.browser.viewport.width,
        config.browser.viewport.height
    );
    if let Some(ref proxy) = config.browser.proxy {
        println!("  Proxy: {}", proxy);
    }
    println!("  Input selectors: {}", config.selectors.input.join(" | "));
    println!("  Reply selector: {}", config.selectors.reply);
    println!(
        "  Detection: stable {}ms, poll {}ms, timeout {}ms",
        config.detect.stable_ms, config.detect.poll_ms, config.detect.timeout_ms
    );
}
