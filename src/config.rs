// Loaded once at startup from the environment, then threaded through the
// pipeline as an explicit value instead of scattered process globals.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_port: u16,
    pub base_server: String,
    pub base_server_port: u16,
    pub timeout: Duration,
    pub cache_dir: PathBuf,
    pub max_dupe_downloads: usize,
    pub cache_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        let listen_port = env_u16("GOFFLOADPORT", 8080);
        let base_server = std::env::var("GBASESERVER").unwrap_or_else(|_| "localhost".to_string());
        let base_server_port = env_u16("GBASESERVERPORT", 80);
        let timeout_secs = env_u64("GTIMEOUT", 60);
        let cache_dir = std::env::var("GOFFLOADDIR").unwrap_or_else(|_| "./cache".to_string());
        let max_dupe_downloads = env_u64("GMAXDUPEDOWNLOADS", 0) as usize;
        let cache_name = std::env::var("GOFFLOADCACHENAME").unwrap_or_else(|_| "modoffload".to_string());

        Config {
            listen_port,
            base_server,
            base_server_port,
            timeout: Duration::from_secs(timeout_secs),
            cache_dir: PathBuf::from(cache_dir),
            max_dupe_downloads,
            cache_name,
        }
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("metadata-{key}"))
    }

    pub fn filedata_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("filedata-{key}"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir.join(format!(".offload-{}.lock", self.cache_name))
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
