//! Example Producer (Writer)
//!
//! Creates buffer files and a registry, then writes a ticking payload into
//! each buffer at a fixed rate.

use clap::Parser;
use mirrorbuf::buffer_file::create_buffer_file;
use mirrorbuf::registry::write_registry;
use mirrorbuf::writer;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(about = "Write ticking payloads into shared buffer files")]
struct Args {
    /// Directory for buffer files and the registry
    #[arg(long, default_value = "/dev/shm/mirrorbuf_demo")]
    dir: PathBuf,

    /// Buffer names to create
    #[arg(long, value_delimiter = ',', default_value = "state,stats")]
    names: Vec<String>,

    /// Payload capacity per buffer, in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    capacity: usize,

    /// Milliseconds between writes
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Stop after this many ticks (0 = run forever)
    #[arg(long, default_value_t = 0)]
    ticks: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(e) = std::fs::create_dir_all(&args.dir) {
        eprintln!("[Producer] Failed to create {}: {}", args.dir.display(), e);
        std::process::exit(1);
    }

    let buffers: Vec<(String, PathBuf)> = args
        .names
        .iter()
        .map(|name| (name.clone(), args.dir.join(format!("{}.bin", name))))
        .collect();

    for (name, path) in &buffers {
        if let Err(e) = create_buffer_file(path, args.capacity) {
            eprintln!("[Producer] Failed to create buffer '{}': {}", name, e);
            std::process::exit(1);
        }
    }

    let registry = args.dir.join("registry.txt");
    if let Err(e) = write_registry(
        &registry,
        buffers.iter().map(|(n, p)| (n.as_str(), p.as_path())),
    ) {
        eprintln!("[Producer] Failed to write registry: {}", e);
        std::process::exit(1);
    }

    println!("[Producer] Registry: {}", registry.display());
    println!("[Producer] Run the watcher with: MIRRORBUF_REGISTRY={}", registry.display());

    let start = Instant::now();
    let mut tick = 0u64;
    loop {
        tick += 1;
        for (name, path) in &buffers {
            let payload = format!(
                "{{\"buffer\":\"{}\",\"tick\":{},\"uptime_ms\":{}}}",
                name,
                tick,
                start.elapsed().as_millis()
            );
            match writer::write_to_path(name, path, payload.as_bytes()) {
                Ok(version) => println!("[Producer] {} -> v{}", name, version),
                Err(e) => eprintln!("[Producer] {} write failed: {}", name, e),
            }
        }

        if args.ticks != 0 && tick >= args.ticks {
            break;
        }
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    println!("[Producer] Done after {} ticks", tick);
}
