//! The in-memory transcode job registry: the heart of the HLS surface.
//!
//! A handful of long-lived ffmpeg children, keyed by content address,
//! reference-counted by wall-clock access rather than Arc, and reaped by a
//! background sweep when nobody has asked for a segment in a while.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::process::Child;
use tokio::sync::Mutex as AsyncMutex;

use crate::addressing::job_dir;
use crate::media::ffmpeg::{self, VideoInfo};

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const REAP_INTERVAL: Duration = Duration::from_secs(5);
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

struct JobEntry {
    out_dir: PathBuf,
    last_access: Instant,
    /// Set once the watcher has observed the child exit. A job stays in
    /// the map after that — the reaper, not the watcher, removes it, so
    /// that `reap()` is the single place job records disappear.
    waited: bool,
    child: Arc<AsyncMutex<Child>>,
}

pub struct TranscodeRegistry {
    hls_root: PathBuf,
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl TranscodeRegistry {
    pub fn new(hls_root: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            hls_root,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn out_dir(&self, key: &str) -> PathBuf {
        job_dir(&self.hls_root, key)
    }

    /// Refresh a job's liveness clock; called on every segment/playlist
    /// fetch so an actively-watched stream is never reaped mid-playback.
    pub fn bump(&self, key: &str) {
        if let Some(entry) = self.jobs.lock().unwrap().get_mut(key) {
            if !entry.waited {
                entry.last_access = Instant::now();
            }
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(key)
    }

    /// Start a transcode for `key`, or reuse one already in flight. Returns
    /// the job's artifact directory.
    pub async fn start_or_reuse(
        self: &Arc<Self>,
        key: String,
        src: PathBuf,
        info: VideoInfo,
    ) -> Result<PathBuf> {
        self.start_or_reuse_with(key, move |out_dir| ffmpeg::spawn_hls(&src, out_dir, &info))
            .await
    }

    /// Core of `start_or_reuse`, parameterized over how the subprocess is
    /// spawned so tests can substitute a stand-in child without invoking
    /// `ffmpeg`.
    ///
    /// The existence check, directory setup, marker writes, and the spawn
    /// itself all happen inside one `std::sync::Mutex` critical section —
    /// none of it awaits — so two concurrent callers for the same key
    /// cannot both observe "no entry" and both spawn a transcoder. This
    /// mirrors `original_source`'s single `with hls_jobs_lock:` block,
    /// which is a blocking lock held across the equivalent synchronous
    /// sequence (`Popen` doesn't block either).
    async fn start_or_reuse_with(
        self: &Arc<Self>,
        key: String,
        spawn: impl FnOnce(&Path) -> Result<Child>,
    ) -> Result<PathBuf> {
        let (out_dir, child) = {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(entry) = jobs.get_mut(&key) {
                entry.last_access = Instant::now();
                return Ok(entry.out_dir.clone());
            }

            let out_dir = job_dir(&self.hls_root, &key);
            std::fs::create_dir_all(&out_dir)?;

            // A stale playlist from a prior run (now stopped, or reaped)
            // must not be served as if it were this run's output.
            let _ = std::fs::remove_file(out_dir.join("index.m3u8"));
            let _ = std::fs::remove_file(out_dir.join("error"));
            let _ = std::fs::remove_file(out_dir.join("complete"));
            std::fs::write(out_dir.join("incomplete"), [])?;

            let child = spawn(&out_dir)?;
            let child = Arc::new(AsyncMutex::new(child));
            jobs.insert(
                key.clone(),
                JobEntry {
                    out_dir: out_dir.clone(),
                    last_access: Instant::now(),
                    waited: false,
                    child: child.clone(),
                },
            );

            (out_dir, child)
        };

        let registry = self.clone();
        let watch_dir = out_dir.clone();
        tokio::spawn(async move {
            registry.watch(key, watch_dir, child).await;
        });

        Ok(out_dir)
    }

    /// Wait on the job's child and leave the on-disk markers that `file`
    /// handlers and later `start_or_reuse` calls inspect: `complete` on a
    /// clean exit, `error` on an unexpected non-zero exit, and the
    /// `incomplete` marker left untouched on a signal or ffmpeg's own 255
    /// "interrupted" code, since those are deliberate stops a caller may
    /// resume. The record itself is left in the map with `waited = true`;
    /// `reap()` is solely responsible for eventually removing it.
    async fn watch(self: Arc<Self>, key: String, out_dir: PathBuf, child: Arc<AsyncMutex<Child>>) {
        let status = child.lock().await.wait().await;

        if let Some(entry) = self.jobs.lock().unwrap().get_mut(&key) {
            entry.waited = true;
        }

        match status {
            Ok(status) => match status.code() {
                Some(0) => {
                    let _ =
                        tokio::fs::rename(out_dir.join("incomplete"), out_dir.join("complete"))
                            .await;
                }
                Some(255) | None => {}
                Some(_) => {
                    let _ = tokio::fs::write(out_dir.join("error"), []).await;
                }
            },
            Err(e) => {
                tracing::warn!("failed to wait on ffmpeg for job {key}: {e:#}");
                let _ = tokio::fs::write(out_dir.join("error"), []).await;
            }
        }
    }

    /// Evict every job idle past `IDLE_TIMEOUT`. A job not yet waited on
    /// is killed first, with a bounded wait for it to actually exit;
    /// each eviction runs as its own task so one wedged child cannot
    /// stall reaping of every other job, or of future reap cycles.
    pub async fn reap(self: &Arc<Self>) {
        let expired: Vec<(String, bool, Arc<AsyncMutex<Child>>)> = {
            let jobs = self.jobs.lock().unwrap();
            jobs.iter()
                .filter(|(_, entry)| entry.last_access.elapsed() > IDLE_TIMEOUT)
                .map(|(key, entry)| (key.clone(), entry.waited, entry.child.clone()))
                .collect()
        };

        for (key, waited, child) in expired {
            let registry = self.clone();
            tokio::spawn(async move {
                if !waited {
                    tracing::info!("reaping idle transcode job {key}");
                    let mut guard = child.lock().await;
                    if let Err(e) = guard.kill().await {
                        tracing::warn!("failed to signal ffmpeg for job {key}: {e:#}");
                    }
                    match tokio::time::timeout(KILL_WAIT_TIMEOUT, guard.wait()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            tracing::warn!("error waiting on killed job {key}: {e:#}")
                        }
                        Err(_) => tracing::warn!(
                            "job {key} did not exit within {KILL_WAIT_TIMEOUT:?} of being killed"
                        ),
                    }
                } else {
                    tracing::info!("reaping already-finished transcode job {key}");
                }
                registry.jobs.lock().unwrap().remove(&key);
            });
        }
    }

    /// The reaper task spawned once at startup.
    pub async fn run_reaper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            self.reap().await;
        }
    }
}
