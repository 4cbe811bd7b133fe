use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

mod addressing;
mod api;
mod cli;
mod error;
mod jobs;
mod media;
mod path_encoding;
mod roots;
mod state;
mod thumbnail;
mod waiter;

use cli::Args;
use jobs::TranscodeRegistry;
use roots::RootRegistry;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(
            "media_browser=info".parse().expect("valid default directive"),
        ))
        .init();

    let args = Args::parse();

    let roots = match RootRegistry::build(&args.directories) {
        Ok(roots) => roots,
        Err(e) => {
            eprintln!("media_browser: {e:#}");
            std::process::exit(1);
        }
    };

    let cache_root = cli::resolve_cache_dir(&args)?;
    let thumb_cache = cache_root.clone();
    let hls_root = cache_root.join("hls");
    std::fs::create_dir_all(&thumb_cache)?;
    std::fs::create_dir_all(&hls_root)?;
    info!("cache directory: {cache_root:?}");

    let transcodes = TranscodeRegistry::new(hls_root);
    tokio::spawn(transcodes.clone().run_reaper());

    let state = AppState {
        roots: std::sync::Arc::new(roots),
        thumb_cache,
        transcodes,
    };

    let static_dir = resolve_static_dir();
    let app = api::router(state, &static_dir);

    let addr: std::net::IpAddr = args.bind.parse().unwrap_or_else(|_| {
        eprintln!("media_browser: invalid bind address {:?}, falling back to 0.0.0.0", args.bind);
        std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
    });
    let socket_addr = SocketAddr::from((addr, args.port));

    let display_host = if addr.is_unspecified() {
        cli::local_hostname()
    } else {
        addr.to_string()
    };
    info!("serving on http://{display_host}:{}", args.port);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Static assets ship alongside the binary's source tree; this is the
/// thinnest thing that works for a locally-run service.
fn resolve_static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static")
}