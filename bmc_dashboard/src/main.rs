use bmc_dashboard::config::{DEFAULT_FAN_COUNT, DEFAULT_URL};
use bmc_dashboard::console::{self, ConsoleCommand, HELP};
use bmc_dashboard::render::render;
use bmc_dashboard::{
    ClientConfig, ClientError, ReconnectPolicy, RefreshTiming, Snapshot, SyncClient,
};
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bmc-dashboard", about = "Terminal dashboard for a BMC telemetry websocket")]
struct Args {
    #[arg(long, env = "BMC_WS_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Start with the auto-refresh switch off.
    #[arg(long, default_value_t = false)]
    no_auto_refresh: bool,

    #[arg(long, default_value_t = 1000)]
    slow_ms: u64,

    #[arg(long, default_value_t = 250)]
    fast_ms: u64,

    #[arg(long, default_value_t = 600)]
    startup_delay_ms: u64,

    #[arg(long, default_value_t = DEFAULT_FAN_COUNT)]
    fan_count: u32,

    /// immediate | backoff
    #[arg(long, default_value = "backoff")]
    reconnect: ReconnectPolicy,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Minimum interval between redraws.
    #[arg(long, default_value_t = 500)]
    render_ms: u64,

    /// Print snapshots as JSON lines instead of the text panel.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    fn config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.trim().to_string(),
            auto_refresh: !self.no_auto_refresh,
            refresh: RefreshTiming {
                slow: Duration::from_millis(self.slow_ms),
                fast: Duration::from_millis(self.fast_ms),
                startup_delay: Duration::from_millis(self.startup_delay_ms),
            },
            fan_count: self.fan_count,
            reconnect: self.reconnect,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = SyncClient::spawn(args.config())?;
    let mut updates = client.subscribe();
    updates.mark_changed();

    let mut redraw = tokio::time::interval(Duration::from_millis(args.render_ms.max(1)));
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    eprintln!("{HELP}");

    loop {
        tokio::select! {
            _ = redraw.tick() => {
                if updates.has_changed().unwrap_or(false) {
                    let snap = updates.borrow_and_update().clone();
                    print_snapshot(&snap, args.json)?;
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                match console::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(cmd)) => {
                        if let Err(e) = run_command(&client, cmd).await {
                            warn!("{e}");
                        }
                    }
                    Err(msg) => eprintln!("{msg}\n{HELP}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let last = client.dispose().await;
    info!(state = last.connection.label(), "dashboard stopped");
    Ok(())
}

async fn run_command(client: &SyncClient, cmd: ConsoleCommand) -> Result<(), ClientError> {
    match cmd {
        ConsoleCommand::Power(None) => client.toggle_power().await,
        ConsoleCommand::Power(Some(on)) => client.set_power_state(on).await,
        ConsoleCommand::Fan {
            fan_id,
            duty_cycle,
        } => client.set_fan_duty_cycle(fan_id, duty_cycle).await,
        ConsoleCommand::AllFans { duty_cycle } => client.set_all_fans_duty_cycle(duty_cycle).await,
        ConsoleCommand::AutoRefresh(enabled) => client.set_auto_refresh(enabled).await,
        ConsoleCommand::Info => client.request_bmc_info().await,
        ConsoleCommand::Connect => client.connect().await,
        ConsoleCommand::Disconnect => client.disconnect().await,
        ConsoleCommand::Quit => Ok(()),
    }
}

fn print_snapshot(snap: &Snapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snap)?);
    } else {
        println!("{}", render(snap));
    }
    Ok(())
}
