use clap::Parser;

use crate::review::models::GameKind;

/// Esports decision-review client: timeline replay and what-if simulation
#[derive(Parser, Debug, Clone)]
#[command(name = "decision-lens", version, about)]
pub struct Config {
    /// Inference backend base URL
    #[arg(
        long,
        env = "DECISION_LENS_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub backend_url: String,

    /// Review API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Match to load on startup
    #[arg(long, env = "MATCH_ID")]
    pub match_id: Option<String>,

    /// Game used for the live match listing when none is requested
    #[arg(long, env = "GAME", default_value = "lol")]
    pub game: GameKind,

    /// Seconds between snapshots during live playback
    #[arg(long, env = "TICK_INTERVAL_SECS", default_value = "5")]
    pub tick_interval_secs: u64,

    /// Timeout for backend HTTP requests, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be at least 1");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be at least 1");
        }
        if let Some(id) = &self.match_id {
            if id.trim().is_empty() {
                anyhow::bail!("match_id must not be blank");
            }
        }
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            anyhow::bail!(
                "backend_url must be an http(s) URL, got '{}'",
                self.backend_url
            );
        }
        Ok(())
    }
}
