//! Engine configuration
//!
//! Runtime knobs come from the environment (`.env` is loaded by the binary);
//! the competition -> result file mapping and the team alias table come from
//! an optional TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: String,
    pub results_dir: PathBuf,
    pub sources_path: Option<PathBuf>,
    /// How long a parsed result file is reused before it is read again
    pub source_ttl: Duration,
    pub settlement_interval: Duration,
    /// Upper bound on result lookups for one slip
    pub lookup_timeout: Duration,
    /// Max distance between kick-off and a dated result line
    pub result_window: Duration,
    pub settlement_enabled: bool,
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "betslip.db".to_string(),
            results_dir: PathBuf::from("data/results"),
            sources_path: None,
            source_ttl: Duration::from_secs(300),
            settlement_interval: Duration::from_secs(60),
            lookup_timeout: Duration::from_millis(5_000),
            result_window: Duration::from_secs(72 * 3600),
            settlement_enabled: true,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(path) = env::var("BETSLIP_DB_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            cfg.db_path = path;
        }

        if let Some(dir) = env::var("BETSLIP_RESULTS_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            cfg.results_dir = PathBuf::from(dir);
        }

        cfg.sources_path = env::var("BETSLIP_SOURCES_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        cfg.source_ttl = env::var("BETSLIP_SOURCE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(cfg.source_ttl);

        cfg.settlement_interval = env::var("BETSLIP_SETTLEMENT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v >= 5)
            .map(Duration::from_secs)
            .unwrap_or(cfg.settlement_interval);

        cfg.lookup_timeout = env::var("BETSLIP_LOOKUP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(cfg.lookup_timeout);

        cfg.result_window = env::var("BETSLIP_RESULT_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .map(|h| Duration::from_secs(h * 3600))
            .unwrap_or(cfg.result_window);

        cfg.settlement_enabled = env::var("BETSLIP_SETTLEMENT_ENABLED")
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(cfg.settlement_enabled);

        if let Some(addr) = env::var("BETSLIP_BIND_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            cfg.bind_addr = addr;
        }

        cfg
    }

    /// Sources from `sources_path` when set, built-in defaults otherwise
    pub fn load_sources(&self) -> Result<SourcesConfig> {
        match &self.sources_path {
            Some(path) => SourcesConfig::from_file(path),
            None => Ok(SourcesConfig::default()),
        }
    }
}

/// Recognised on/off spellings; anything else is `None` so the caller keeps
/// its default
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Where results live and which team names are the same club
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcesConfig {
    /// Competition name -> result files under the results dir
    #[serde(default)]
    pub competitions: HashMap<String, Vec<String>>,
    /// Alternate/historical name -> canonical name
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl SourcesConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sources config at {}", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("Invalid sources config at {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let competitions = [
            ("Premier League", "eng.1.txt"),
            ("Championship", "eng.2.txt"),
            ("La Liga", "es.1.txt"),
            ("Serie A", "it.1.txt"),
            ("Bundesliga", "de.1.txt"),
            ("Ligue 1", "fr.1.txt"),
            ("Eredivisie", "nl.1.txt"),
            ("Primeira Liga", "pt.1.txt"),
        ]
        .into_iter()
        .map(|(name, file)| (name.to_string(), vec![file.to_string()]))
        .collect();

        let aliases = [
            ("Man Utd", "Manchester United"),
            ("Man United", "Manchester United"),
            ("Man City", "Manchester City"),
            ("Spurs", "Tottenham Hotspur"),
            ("Tottenham", "Tottenham Hotspur"),
            ("Wolves", "Wolverhampton Wanderers"),
            ("Nottm Forest", "Nottingham Forest"),
            ("Newcastle", "Newcastle United"),
            ("West Ham", "West Ham United"),
            ("Brighton", "Brighton & Hove Albion"),
            ("Inter", "Internazionale"),
            ("Inter Milan", "Internazionale"),
            ("Bayern Munich", "Bayern München"),
            ("Gladbach", "Borussia Mönchengladbach"),
            ("Atletico Madrid", "Atlético de Madrid"),
            ("PSG", "Paris Saint-Germain"),
        ]
        .into_iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect();

        Self {
            competitions,
            aliases,
        }
    }
}
