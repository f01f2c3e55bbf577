use std::{net::IpAddr, path::PathBuf, time::Duration};

use clipsync_core::{ActivityState, DEFAULT_MAX_BODY_BYTES, DEFAULT_PENDING_CAPACITY, DEFAULT_PORT};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; discovered from the local interfaces when `None`.
    pub host: Option<IpAddr>,
    pub port: u16,
    /// Cap on an accumulated `/send` body.
    pub max_body_bytes: usize,
    pub pending_path: PathBuf,
    /// 1 keeps only the newest undelivered message.
    pub pending_capacity: usize,
    /// Landing template on disk; the embedded page is served when `None`.
    pub landing_page: Option<PathBuf>,
    pub initial_activity: ActivityState,
    pub restart_grace: Duration,
    pub shutdown_timeout: Duration,
    pub window_delay: Duration,
    pub window_budget: Duration,
    pub window_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            pending_path: pending_store_path(),
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            landing_page: None,
            initial_activity: ActivityState::Active,
            restart_grace: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(3),
            window_delay: Duration::from_secs(1),
            window_budget: Duration::from_secs(30),
            window_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl ServerConfig {
    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            host: self.host,
            port: self.port,
            restart_grace: self.restart_grace,
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    pub fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            delay: self.window_delay,
            budget: self.window_budget,
            interval: self.window_interval,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    pub host: Option<IpAddr>,
    pub port: u16,
    pub restart_grace: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSettings {
    /// Wait before a requested window starts.
    pub delay: Duration,
    /// Expiration of a single window.
    pub budget: Duration,
    /// Spacing of follow-up windows while the app stays backgrounded.
    pub interval: Duration,
}

pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CLIPSYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(base) = std::env::var_os("LOCALAPPDATA") {
        return PathBuf::from(base).join("ClipSync");
    }
    if let Some(base) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(base).join("clipsync");
    }
    PathBuf::from(".clipsync")
}

pub fn pending_store_path() -> PathBuf {
    data_dir().join("pending.json")
}
