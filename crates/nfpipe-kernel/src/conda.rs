//! Conda environment creation for steps that ship an environment YAML
//! instead of pointing at an existing runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use nfpipe_types::{NfpipeError, Result};

use crate::runner::{run_checked, CommandRunner};
use crate::ProvisionerConfig;

/// Creates a named runtime environment from a specification file and returns
/// the environment's location.
pub trait EnvironmentProvisioner: Send + Sync {
    fn create_environment(&self, name: &str, spec_file: &Path) -> Result<PathBuf>;
}

#[derive(Deserialize)]
struct CondaInfo {
    #[serde(default)]
    envs_dirs: Vec<PathBuf>,
}

/// Recreates environments with `conda env remove` + `mamba env create`.
pub struct CondaEnvironmentProvisioner {
    runner: Arc<dyn CommandRunner>,
    config: ProvisionerConfig,
}

impl CondaEnvironmentProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ProvisionerConfig) -> Self {
        Self { runner, config }
    }

    /// Location conda will use for an environment called `name`.
    pub fn environment_path(&self, name: &str) -> Result<PathBuf> {
        let args = vec!["info".to_string(), "--json".to_string()];
        let output = run_checked(self.runner.as_ref(), &self.config.conda, &args)?;
        let info: CondaInfo = serde_json::from_str(&output.stdout)?;
        let envs_dir = info
            .envs_dirs
            .into_iter()
            .next()
            .ok_or_else(|| NfpipeError::Provisioning {
                command: "conda info --json".into(),
                message: "no envs_dirs reported".into(),
            })?;
        Ok(envs_dir.join(name))
    }
}

impl EnvironmentProvisioner for CondaEnvironmentProvisioner {
    fn create_environment(&self, name: &str, spec_file: &Path) -> Result<PathBuf> {
        let remove: Vec<String> = ["env", "remove", "-y", "--name", name]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // A missing environment makes `remove` fail; that is the common case.
        match self.runner.run(&self.config.conda, &remove) {
            Ok(out) if !out.success() => {
                tracing::debug!(env = name, "No stale environment to remove");
            }
            Ok(_) => tracing::info!(env = name, "Removed stale environment"),
            Err(e) => return Err(e),
        }

        let spec = spec_file.to_string_lossy().to_string();
        let create: Vec<String> = ["env", "create", "-y", "-n", name, "-f", spec.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        tracing::info!(env = name, spec = %spec, "Creating environment");
        run_checked(self.runner.as_ref(), &self.config.mamba, &create)?;

        self.environment_path(name)
    }
}
