use bmc_sim::{MainLoop, NetworkThread, SimulatedBmc};
use crossbeam_channel::bounded;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(33);

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("BMC_SIM_ADDR").ok())
        .unwrap_or_else(|| bmc_sim::WS_ADDR.to_string());

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);
    let fan_count = parse_arg_value(&args, "--fans")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(3);
    let throttled = parse_arg_value(&args, "--throttled")
        .and_then(|s| u32::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0);

    let (in_tx, in_rx) = bounded(bmc_sim::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(bmc_sim::OUTBOUND_CAP);

    let net = match NetworkThread::spawn_with_addr(&addr, in_tx, out_rx) {
        Ok(n) => n,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, net.listen_addr().to_string());
    }

    info!(fans = fan_count, "mock_bmc listening on ws://{}", net.listen_addr());

    let api = SimulatedBmc::new(fan_count).with_throttled(throttled);
    let mut main_loop = MainLoop::new(in_rx, out_tx);

    let start = Instant::now();
    loop {
        main_loop.tick(&api);
        thread::sleep(TICK);
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    net.shutdown();
}
