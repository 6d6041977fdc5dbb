//! The cluster settings asset every other asset derives from.

use kiln_config::ClusterSettings;
use kiln_engine::{
    fetch_optional, OutputFile, OutputStore, Parents, Target, TargetError, TargetId, TargetKind,
};

/// File name of the persisted cluster settings.
pub const CLUSTER_CONFIG_FILE: &str = "cluster-config.toml";

/// Cluster settings, persisted as `cluster-config.toml`.
///
/// Generated from the settings it was seeded with (normally `kiln.toml`).
/// A `cluster-config.toml` left by an earlier run takes precedence.
#[derive(Debug, Default)]
pub struct ClusterConfig {
    seed: Option<ClusterSettings>,
    settings: Option<ClusterSettings>,
    file: Option<OutputFile>,
}

impl ClusterConfig {
    pub fn seeded(settings: ClusterSettings) -> Self {
        Self {
            seed: Some(settings),
            ..Self::default()
        }
    }

    /// Settings in effect with no persisted document behind them.
    #[cfg(test)]
    pub(crate) fn without_file(settings: ClusterSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    /// The settings in effect, once loaded or generated.
    pub fn settings(&self) -> Option<&ClusterSettings> {
        self.settings.as_ref()
    }

    /// The settings, or an error naming this asset as incomplete.
    ///
    /// # Errors
    /// Returns [`TargetError::MissingFile`] before load or generate has run.
    pub fn require_settings(&self) -> Result<&ClusterSettings, TargetError> {
        self.settings.as_ref().ok_or_else(|| TargetError::MissingFile {
            name: Self::NAME.to_owned(),
            file: CLUSTER_CONFIG_FILE.to_owned(),
        })
    }

    /// The raw persisted document, once loaded or generated.
    pub fn file(&self) -> Option<&OutputFile> {
        self.file.as_ref()
    }
}

impl Target for ClusterConfig {
    fn dependencies(&self) -> Vec<TargetId> {
        Vec::new()
    }

    fn load(&mut self, store: &dyn OutputStore) -> Result<bool, TargetError> {
        let Some(file) = fetch_optional(store, CLUSTER_CONFIG_FILE)? else {
            return Ok(false);
        };
        let content = file.as_str().ok_or_else(|| TargetError::Parse {
            name: CLUSTER_CONFIG_FILE.to_owned(),
            message: "content is not valid UTF-8".to_owned(),
        })?;
        let settings = ClusterSettings::from_toml(content, CLUSTER_CONFIG_FILE).map_err(|e| {
            TargetError::Parse {
                name: CLUSTER_CONFIG_FILE.to_owned(),
                message: e.to_string(),
            }
        })?;

        self.settings = Some(settings);
        self.file = Some(file);
        Ok(true)
    }

    fn generate(&mut self, _parents: &Parents<'_>) -> Result<(), TargetError> {
        let Some(settings) = self.seed.clone() else {
            return Err(TargetError::step(
                "failed to generate cluster config",
                "no cluster settings were provided",
            ));
        };
        settings
            .validate(CLUSTER_CONFIG_FILE)
            .map_err(|e| TargetError::step("failed to validate cluster config", e))?;
        let content = settings
            .to_toml()
            .map_err(|e| TargetError::step("failed to render cluster config", e))?;

        self.file = Some(OutputFile::new(CLUSTER_CONFIG_FILE, content));
        self.settings = Some(settings);
        Ok(())
    }

    fn files(&self) -> Vec<&OutputFile> {
        self.file.iter().collect()
    }
}

impl TargetKind for ClusterConfig {
    const NAME: &'static str = "Cluster Config";
}
