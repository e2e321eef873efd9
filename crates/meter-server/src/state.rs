//! Shared state handed to every axum handler (root spec §4.9).

use std::path::PathBuf;
use std::sync::Arc;

use meter_stats::UserDataManager;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<UserDataManager>,
    pub settings_path: PathBuf,
    pub logs_dir: PathBuf,
    /// Carries the serialized `"data"` message produced by the realtime
    /// broadcast ticker (root spec §4.9: "every 100 ms ... broadcast to all
    /// connected subscribers"). Each WebSocket connection subscribes its own
    /// receiver.
    pub broadcast: broadcast::Sender<Arc<str>>,
}
