//! Shared application state, threaded through request handlers rather than
//! reached for as process globals.

use std::path::PathBuf;
use std::sync::Arc;

use crate::jobs::TranscodeRegistry;
use crate::roots::RootRegistry;

#[derive(Clone)]
pub struct AppState {
    pub roots: Arc<RootRegistry>,
    pub thumb_cache: PathBuf,
    pub transcodes: Arc<TranscodeRegistry>,
}
