use anyhow::Context;
use clap::{Parser, Subcommand};
use herald_cli::{load_credentials, App, LoopbackConnector, Menu, RecipientStore, SendOptions};
use herald_core::{GroupId, HeraldConfig, Message, PartitionPolicy, BUILD_INFO};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Herald CLI - deliver one message to many recipients through a pool of agents")]
#[command(version = herald_core::VERSION)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,

    /// Newline- or comma-separated agent credentials
    #[arg(long, env = "HERALD_CREDENTIALS", default_value = "credentials.txt")]
    credentials: PathBuf,

    /// Persisted recipient list
    #[arg(long, env = "HERALD_RECIPIENTS", default_value = "recipients.txt")]
    recipients: PathBuf,

    /// Where the run report is written
    #[arg(long, env = "HERALD_REPORT", default_value = "report.json")]
    report: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Menu,
    /// Fetch a group's members into the recipient list
    Fetch {
        #[arg(long)]
        group: GroupId,
    },
    /// Run a delivery campaign
    Send {
        #[arg(long)]
        message: String,
        /// Fetch recipients from this group instead of the stored list
        #[arg(long)]
        group: Option<GroupId>,
        #[arg(long, env = "HERALD_POLICY")]
        policy: Option<PartitionPolicy>,
        /// One worker per agent (static policy only)
        #[arg(long, env = "HERALD_PARALLEL")]
        parallel: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Cancelled on Ctrl-C so a running campaign stops between sends.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    info!("Starting {}", BUILD_INFO);

    let config = match &cli.config {
        Some(path) => HeraldConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => HeraldConfig::default(),
    };
    let credentials = load_credentials(&cli.credentials)?;

    let app = App::new(
        config,
        Arc::new(LoopbackConnector::new()),
        RecipientStore::new(cli.recipients),
        cli.report,
    );
    let ready = app.start(credentials).await?;
    println!("🤖 {ready} agent(s) ready");

    let cancel = interrupt_token();
    let result = match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => {
            let stdin = BufReader::new(tokio::io::stdin());
            Menu::new(stdin, std::io::stdout()).run(&app, &cancel).await
        }
        Commands::Fetch { group } => app.fetch(group).await.map(|fetched| {
            println!(
                "📥 Fetched {} recipients into {}",
                fetched.len(),
                app.recipients().path().display()
            );
        }),
        Commands::Send {
            message,
            group,
            policy,
            parallel,
        } => {
            let options = SendOptions {
                group,
                policy,
                parallel: parallel.then_some(true),
            };
            app.send(Message::new(message), options, cancel.clone())
                .await
                .map(|report| {
                    println!(
                        "📊 Campaign {}: {} sent, {} failed. Report written to {}",
                        report.state,
                        report.sent,
                        report.failed,
                        app.report_path().display()
                    );
                })
        }
    };

    app.shutdown().await;
    result
}
