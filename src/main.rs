use clap::Parser;
use rping::config::{self, Config};
use rping::echo::{EchoSession, ReplyStatus, SessionConfig};
use rping::telemetry::{init_logging, LogConfig, MetricsRegistry};
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rping")]
#[command(about = "ICMP echo client built on a raw-socket ping engine")]
struct Cli {
    /// Destination host (IPv4 literal or name)
    destination: String,

    /// Number of echo requests to send
    #[arg(short = 'c', long)]
    count: Option<u32>,

    /// Echo payload size in bytes
    #[arg(short = 's', long)]
    size: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(short = 'W', long, value_name = "MS")]
    timeout: Option<u64>,

    /// Delay between requests in milliseconds
    #[arg(short = 'i', long, value_name = "MS")]
    interval: Option<u64>,

    /// IP time-to-live override
    #[arg(short = 't', long)]
    ttl: Option<u8>,

    /// IP type-of-service override
    #[arg(short = 'Q', long)]
    tos: Option<u8>,

    /// Source address to bind
    #[arg(short = 'S', long)]
    source: Option<String>,

    /// Reply buffer capacity in bytes
    #[arg(short = 'b', long)]
    buffer_size: Option<usize>,

    /// Path to config.toml with defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print engine metrics after the run
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(2);
        }
    };

    init_logging(Some(&LogConfig {
        level: config.log.level.clone(),
        format: config.log.format.clone(),
    }));

    match run(&cli, config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(2);
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, String> {
    match path {
        Some(path) => {
            config::load(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))
        }
        None => Ok(Config::default()),
    }
}

fn run(cli: &Cli, mut config: Config) -> Result<i32, String> {
    // Command-line flags override file defaults
    let ping = &mut config.ping;
    if let Some(count) = cli.count {
        ping.count = count;
    }
    if let Some(size) = cli.size {
        ping.payload_size = size;
    }
    if let Some(timeout) = cli.timeout {
        ping.timeout_ms = timeout;
    }
    if let Some(interval) = cli.interval {
        ping.interval_ms = interval;
    }
    if let Some(buffer_size) = cli.buffer_size {
        ping.buffer_size = buffer_size;
    }
    if cli.ttl.is_some() {
        ping.ttl = cli.ttl;
    }
    if cli.tos.is_some() {
        ping.tos = cli.tos;
    }
    if cli.source.is_some() {
        ping.source = cli.source.clone();
    }

    let validation = config::validate(&config);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("invalid configuration".to_string());
    }

    let ping = config.ping;
    let destination = resolve_destination(&cli.destination)?;
    let source = match ping.source {
        Some(ref addr) => Some(
            addr.parse::<Ipv4Addr>()
                .map_err(|_| format!("invalid source address: {}", addr))?,
        ),
        None => None,
    };
    let payload = payload_pattern(ping.payload_size);

    println!(
        "PING {} ({}) with {} bytes of data",
        cli.destination,
        destination,
        payload.len()
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let mut replies_received: u64 = 0;

    for attempt in 1..=ping.count {
        let session_config = SessionConfig {
            destination,
            source,
            payload: payload.clone(),
            ttl: ping.ttl,
            tos: ping.tos,
            reply_capacity: ping.buffer_size,
            timeout: Duration::from_millis(ping.timeout_ms),
        };
        let session = EchoSession::new(session_config, metrics.clone());

        match session.run() {
            Ok(replies) => {
                for reply in replies.iter() {
                    if reply.status == ReplyStatus::Success {
                        replies_received += 1;
                        println!(
                            "{} bytes from {}: seq={} ttl={} time={} ms",
                            reply.data().len(),
                            reply.source,
                            attempt,
                            reply.options.ttl,
                            reply.rtt.as_millis()
                        );
                    } else {
                        println!("From {}: {}", reply.source, reply.status);
                    }
                }
            }
            Err(rping::Error::TimedOut) => {
                println!("Request timed out (seq {})", attempt);
            }
            Err(e) => return Err(e.to_string()),
        }

        if attempt < ping.count && ping.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(ping.interval_ms));
        }
    }

    let transmitted = metrics.echo_requests_sent.get();
    let loss = if transmitted > 0 {
        100 - replies_received.min(transmitted) * 100 / transmitted
    } else {
        100
    };
    println!();
    println!("--- {} ping statistics ---", cli.destination);
    println!(
        "{} requests transmitted, {} replies received, {}% loss",
        transmitted, replies_received, loss
    );

    if cli.stats {
        println!();
        for (name, value) in metrics.export() {
            println!("{} = {}", name, value);
        }
    }

    Ok(if replies_received == 0 { 1 } else { 0 })
}

fn resolve_destination(host: &str) -> Result<Ipv4Addr, String> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    let addrs = (host, 0)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {}: {}", host, e))?;
    addrs
        .filter_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| format!("no IPv4 address found for {}", host))
}

/// Cyclic lowercase fill, the classic echo payload pattern
fn payload_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 23) as u8).collect()
}
