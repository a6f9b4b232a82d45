use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::construct::Representation;
use crate::error::Result;
use crate::persist::PersistenceMode;

pub const DEFAULT_SETTINGS_FILE: &str = "knowledge_repo";
pub const ENV_PREFIX: &str = "KAR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Keeper,
    Triple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    // file backing for the keeper index, in memory when absent
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    pub allow_clear_all: bool,
    pub surrogate_language: String,
    pub surrogate_format: String,
    /// Carrier negotiation settles for any carrier when the strongest client
    /// preference weighs no more than this.
    pub lenient_weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub index: IndexSettings,
    pub repository: RepositorySettings,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            allow_clear_all: false,
            surrogate_language: "Knowledge_Asset_Surrogate_2_0".to_string(),
            surrogate_format: "JSON".to_string(),
            lenient_weight: 0.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind: "127.0.0.1:8080".to_string(),
                base_url: "http://localhost:8080".to_string(),
            },
            index: IndexSettings {
                backend: IndexBackend::Keeper,
                path: None,
            },
            repository: RepositorySettings::default(),
        }
    }
}

impl RepositorySettings {
    pub fn surrogate_representation(&self) -> Representation {
        Representation::new(&self.surrogate_language).with_format(&self.surrogate_format)
    }
}

impl Settings {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let d = Settings::default();
        Ok(Config::builder()
            .set_default("server.bind", d.server.bind)?
            .set_default("server.base_url", d.server.base_url)?
            .set_default("index.backend", "keeper")?
            .set_default("repository.allow_clear_all", d.repository.allow_clear_all)?
            .set_default("repository.surrogate_language", d.repository.surrogate_language)?
            .set_default("repository.surrogate_format", d.repository.surrogate_format)?
            .set_default("repository.lenient_weight", f64::from(d.repository.lenient_weight))?)
    }

    /// Layers built-in defaults, an optional settings file and `KAR__`
    /// prefixed environment variables, e.g. `KAR__INDEX__BACKEND=triple`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::with_name(path.unwrap_or(DEFAULT_SETTINGS_FILE)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Settings from TOML text layered over the defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.index.path {
            Some(path) => PersistenceMode::File(path.clone()),
            None => PersistenceMode::InMemory,
        }
    }
}
