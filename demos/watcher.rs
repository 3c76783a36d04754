//! Example Watcher (Reader)
//!
//! Runs a bridge refresh loop and prints every buffer whose version moved.
//! Optionally writes a message back through the writer path first.

use clap::Parser;
use mirrorbuf::{Bridge, BridgeConfig, Outcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Mirror shared buffers and print updates")]
struct Args {
    /// Registry file (defaults to MIRRORBUF_REGISTRY)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Single buffer file, published as "state" (defaults to MIRRORBUF_PATH)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Refresh interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Write NAME=TEXT through the writer path after the first pass
    #[arg(long)]
    send: Option<String>,

    /// Stop after this many passes (0 = run forever)
    #[arg(long, default_value_t = 0)]
    passes: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = BridgeConfig::from_env();
    if let Some(registry) = args.registry {
        config = config.with_registry(registry);
    }
    if let Some(path) = args.path {
        config = config.with_direct_path(path);
    }
    if let Some(ms) = args.interval_ms {
        config = config.with_refresh_interval(Duration::from_millis(ms));
    }

    let mut bridge = Bridge::new(config);
    println!("[Watcher] Source: {:?}", bridge.source());

    let mut send = args.send;
    let mut seen: HashMap<String, u64> = HashMap::new();
    let mut pass = 0u64;

    bridge.run(|bridge, report| {
        pass += 1;

        match report {
            Ok(report) => {
                for (name, outcome) in &report.outcomes {
                    if let Outcome::Failed(kind) = outcome {
                        println!("[Watcher] {}: failed ({:?})", name, kind);
                        continue;
                    }
                    let Some(buf) = bridge.shared_buffer(Some(name)) else {
                        continue;
                    };
                    let version = bridge
                        .cache()
                        .get(name)
                        .map_or(0, |entry| entry.last_published().0);
                    if seen.insert(name.clone(), version) != Some(version) {
                        let payload = buf.payload();
                        println!(
                            "[Watcher] {} ({} bytes): {}",
                            name,
                            payload.len(),
                            String::from_utf8_lossy(&payload)
                        );
                    }
                }
            }
            Err(e) => println!("[Watcher] Refresh failed: {}", e),
        }

        if let Some(cmd) = send.take() {
            match cmd.split_once('=') {
                Some((name, text)) => match bridge.write(name, text.as_bytes()) {
                    Ok(version) => println!("[Watcher] Sent to {} (v{})", name, version),
                    Err(e) => println!("[Watcher] Send failed: {}", e),
                },
                None => println!("[Watcher] --send expects NAME=TEXT"),
            }
        }

        args.passes == 0 || pass < args.passes
    });

    println!("[Watcher] Published: {:?}", bridge.debug_info());
}
