// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Binary entry point: loads configuration, assembles the pipeline and
//! its backing subsystems, and runs every configured listener until a
//! shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dnsguard::blocklist::BlocklistEngine;
use dnsguard::cache::ResponseCache;
use dnsguard::config::ServerConfig;
use dnsguard::disable_timer::DisableTimer;
use dnsguard::management::ManagementApi;
use dnsguard::metrics::InMemoryMetrics;
use dnsguard::pipeline::Pipeline;
use dnsguard::ratelimit::RateLimiter;
use dnsguard::repository::sqlite::SqliteRepository;
use dnsguard::repository::Repository;
use dnsguard::server;
use dnsguard::upstream::UpstreamPool;
use dnsguard::zone::{ReplayGuard, TsigKeyRing, ZoneStore};

#[derive(Parser, Debug)]
#[command(name = "dnsguard", about = "Recursive-forwarding DNS resolver, authoritative server and blocklist engine")]
struct Cli {
    /// Path to a TOML configuration file; environment variables always
    /// take precedence over values loaded from it.
    #[arg(long, env = "DNSGUARD_CONFIG")]
    config: Option<String>,

    /// SQLite database path; omit to run with no persistence (zones,
    /// TSIG keys, blocklist and query log all live in memory only).
    #[arg(long, env = "DNSGUARD_DATABASE")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;

    let repository: Option<Arc<dyn Repository>> = match &cli.database {
        Some(path) => Some(Arc::new(SqliteRepository::open(std::path::Path::new(path))?)),
        None => None,
    };

    let zone_store = Arc::new(ZoneStore::new());
    let tsig_keys = Arc::new(match &repository {
        Some(repo) => TsigKeyRing::from_rows(repo.list_tsig_keys().await?),
        None => TsigKeyRing::new(),
    });

    let blocklist = Arc::new(BlocklistEngine::new());
    let pipeline = Arc::new(Pipeline {
        config: config.clone(),
        metrics: Arc::new(InMemoryMetrics::default()),
        cache: Arc::new(ResponseCache::new(config.cache_max_entries)),
        blocklist,
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_max, config.rate_limit_window())),
        disable_timer: Arc::new(DisableTimer::new()),
        upstream_pool: Arc::new(UpstreamPool::new(&config.upstream_dns, Duration::from_millis(config.request_deadline_ms))?),
        zone_store,
        tsig_keys,
        transfer_replay_guard: Arc::new(ReplayGuard::new()),
        repository,
        client_policies: None,
        local_overrides: None,
        conditional_forwarding: None,
    });

    let management = ManagementApi::new(pipeline.clone());
    if let Err(e) = management.load_zones_from_repository().await {
        warn!(error = %e, "zone bootstrap skipped (no repository configured, or load failed)");
    }
    if let Err(e) = management.reload_blocklist().await {
        warn!(error = %e, "initial blocklist reload skipped (no repository configured, or load failed)");
    }

    let bind_ip = config.bind_address;
    let mut tasks = Vec::new();

    let udp_addr = SocketAddr::new(bind_ip, config.dns_port);
    let udp_socket = UdpSocket::bind(udp_addr).await?;
    info!(%udp_addr, "UDP listener bound");
    tasks.push(tokio::spawn(server::udp::serve(pipeline.clone(), udp_socket)));

    let tcp_addr = SocketAddr::new(bind_ip, config.dns_port);
    let tcp_listener = TcpListener::bind(tcp_addr).await?;
    info!(%tcp_addr, "TCP listener bound");
    tasks.push(tokio::spawn(server::tcp::serve(pipeline.clone(), tcp_listener)));

    if config.tls_cert_path.is_some() && config.tls_key_path.is_some() {
        match server::dot::build_acceptor(&config) {
            Ok(acceptor) => {
                let dot_addr = SocketAddr::new(bind_ip, config.dot_port);
                let dot_listener = TcpListener::bind(dot_addr).await?;
                info!(%dot_addr, "DoT listener bound");
                tasks.push(tokio::spawn(server::dot::serve(pipeline.clone(), dot_listener, acceptor)));
            }
            Err(e) => error!(error = %e, "DoT disabled: could not build TLS acceptor"),
        }

        let doq_addr = SocketAddr::new(bind_ip, config.doq_port);
        match server::doq::build_endpoint(&config, doq_addr) {
            Ok(endpoint) => {
                info!(%doq_addr, "DoQ listener bound");
                let pipeline = pipeline.clone();
                tasks.push(tokio::spawn(async move {
                    server::doq::serve(pipeline, endpoint).await;
                    Ok::<(), std::io::Error>(())
                }));
            }
            Err(e) => error!(error = %e, "DoQ disabled: could not build QUIC endpoint"),
        }
    } else {
        info!("DoT/DoQ disabled: no tls_cert_path/tls_key_path configured");
    }

    let doh_addr = SocketAddr::new(bind_ip, config.doh_port);
    let doh_path = config.doh_path.clone();
    info!(%doh_addr, path = %doh_path, "DoH listener bound");
    tasks.push(tokio::spawn(server::doh::serve(pipeline.clone(), doh_addr, doh_path)));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = futures::future::select_all(tasks) => {
            let (outcome, _, _) = result;
            error!(?outcome, "a listener task exited unexpectedly");
        }
    }

    Ok(())
}
