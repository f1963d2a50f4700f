use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KiraError;
use crate::taxonomy::Taxonomy;

pub const CONFIG_FILE: &str = "kira-sb.json";
pub const DEFAULT_WEBDRIVER: &str = "http://127.0.0.1:9515";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub webdriver: Option<String>,
    #[serde(default)]
    pub fastq_dump: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub browser_proxy: Option<String>,
    #[serde(default)]
    pub retry: Option<usize>,
    #[serde(default)]
    pub settle_delay_secs: Option<u64>,
    #[serde(default)]
    pub taxonomy: Vec<TaxonEntry>,
}

/// `"7160:Aedes albopictus"` or `{"taxid": 7160, "species": "Aedes albopictus"}`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaxonEntry {
    Shorthand(String),
    Detailed(TaxonEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TaxonEntryObject {
    pub taxid: u32,
    pub species: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source: Option<PathBuf>,
    pub webdriver: String,
    pub fastq_dump: Option<PathBuf>,
    pub proxy: Option<String>,
    pub browser_proxy: Option<String>,
    pub retry: usize,
    pub settle_delay: Duration,
    pub taxonomy: BTreeMap<u32, String>,
}

impl ResolvedConfig {
    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::new(self.taxonomy.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; otherwise the first existing default
    /// location wins, and without one the built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::search_paths().into_iter().find(|path| path.exists()),
        };

        let Some(config_path) = config_path else {
            debug!("no config file found, using defaults");
            return Self::resolve_config(Config::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        debug!(path = %config_path.display(), "loaded config");

        let mut resolved = Self::resolve_config(config)?;
        resolved.source = Some(config_path);
        Ok(resolved)
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = BaseDirs::new() {
            paths.push(dirs.config_dir().join("kira-sb").join(CONFIG_FILE));
        }
        paths
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let webdriver = config
            .webdriver
            .unwrap_or_else(|| DEFAULT_WEBDRIVER.to_string());
        Url::parse(&webdriver)
            .map_err(|err| KiraError::ConfigParse(format!("webdriver URL {webdriver}: {err}")))?;

        let taxonomy = config
            .taxonomy
            .into_iter()
            .map(|entry| match entry {
                TaxonEntry::Shorthand(value) => parse_taxon_shorthand(&value),
                TaxonEntry::Detailed(obj) => Ok((obj.taxid, obj.species)),
            })
            .collect::<Result<BTreeMap<_, _>, KiraError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            source: None,
            webdriver,
            fastq_dump: config.fastq_dump.map(PathBuf::from),
            proxy: config.proxy,
            browser_proxy: config.browser_proxy,
            retry: config.retry.unwrap_or(5),
            settle_delay: Duration::from_secs(config.settle_delay_secs.unwrap_or(4)),
            taxonomy,
        })
    }
}

fn parse_taxon_shorthand(value: &str) -> Result<(u32, String), KiraError> {
    let invalid = || KiraError::ConfigParse(format!("taxonomy entry {value:?}, expected TAXID:SPECIES"));
    let (taxid, species) = value.split_once(':').ok_or_else(invalid)?;
    let taxid = taxid.trim().parse().map_err(|_| invalid())?;
    let species = species.trim();
    if species.is_empty() {
        return Err(invalid());
    }
    Ok((taxid, species.to_string()))
}
