//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "media_browser")]
#[command(about = "Browse, thumbnail, and stream local media directories over HTTP", long_about = None)]
pub struct Args {
    /// Directories to serve. Each contributes a top-level root named after
    /// its own basename; two roots sharing a basename is a startup error.
    #[arg(required = true)]
    pub directories: Vec<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7000)]
    pub port: u16,

    /// Override the cache directory. Defaults to the OS-appropriate
    /// per-user cache directory joined with `media_browser_cache`.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Resolve the cache directory: the `--cache-dir` override if given, else
/// a single `media_browser_cache` directory under the bare OS cache root
/// (e.g. `~/.cache/media_browser_cache` on Linux) — not namespaced under
/// a further per-project subdirectory.
pub fn resolve_cache_dir(args: &Args) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &args.cache_dir {
        return Ok(dir.clone());
    }
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("could not determine a cache directory for this platform"))?;
    Ok(dirs.cache_dir().join("media_browser_cache"))
}

/// Best-effort local hostname, used only for the startup banner when
/// binding to a wildcard address.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
