//! Jupyter kernel discovery and installation for notebook steps.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use nfpipe_types::{NfpipeError, Result};

use crate::runner::{run_checked, CommandRunner};
use crate::ProvisionerConfig;

/// Path segment that precedes the environment name in a conda env location.
const CONDA_ENVS_SEGMENT: &str = "/.conda/envs/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelFamily {
    Python,
    R,
}

impl KernelFamily {
    /// Parse a kernel-family hint. Anything mentioning `python` is the
    /// python family; only the exact hint `r` selects R.
    pub fn from_hint(hint: &str) -> Result<Self> {
        if hint.contains("python") {
            Ok(KernelFamily::Python)
        } else if hint == "r" {
            Ok(KernelFamily::R)
        } else {
            Err(NfpipeError::UnsupportedLanguage {
                language: hint.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KernelFamily::Python => "python",
            KernelFamily::R => "r",
        }
    }

    /// Whether a kernel executable path belongs to this family.
    fn matches_executable(&self, executable: &str) -> bool {
        match self {
            KernelFamily::Python => executable.contains("/bin/python"),
            KernelFamily::R => executable.contains("lib/R/bin/R"),
        }
    }
}

impl std::fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies the name of an installed kernel able to run notebooks of the
/// given family inside a runtime environment.
pub trait KernelProvisioner: Send + Sync {
    fn provision_kernel(&self, runtime: &Path, family: KernelFamily) -> Result<String>;
}

/// An installed kernel as reported by `jupyter kernelspec list --json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub name: String,
    pub resource_dir: String,
    /// First `argv` entry of the kernel spec: the interpreter it launches.
    pub executable: String,
}

#[derive(Deserialize)]
struct KernelSpecList {
    #[serde(default)]
    kernelspecs: BTreeMap<String, KernelSpecEntry>,
}

#[derive(Deserialize)]
struct KernelSpecEntry {
    #[serde(default)]
    resource_dir: String,
    spec: KernelSpecBody,
}

#[derive(Deserialize)]
struct KernelSpecBody {
    #[serde(default)]
    argv: Vec<String>,
}

/// Parse the JSON listing printed by `jupyter kernelspec list --json`.
pub fn parse_kernel_list(json: &str) -> Result<Vec<KernelSpec>> {
    let list: KernelSpecList = serde_json::from_str(json)?;
    Ok(list
        .kernelspecs
        .into_iter()
        .filter_map(|(name, entry)| match entry.spec.argv.into_iter().next() {
            Some(executable) => Some(KernelSpec {
                name,
                resource_dir: entry.resource_dir,
                executable,
            }),
            None => {
                tracing::warn!(kernel = %name, "Kernel spec has no argv; ignoring");
                None
            }
        })
        .collect())
}

/// Derive the name to register a new kernel under, e.g.
/// `/home/u/.conda/envs/analysis` + R → `analysis_r`.
pub fn kernel_name_for(runtime: &Path, family: KernelFamily) -> Result<String> {
    let location = runtime.to_string_lossy();
    let env_name = location
        .split_once(CONDA_ENVS_SEGMENT)
        .map(|(_, rest)| rest.trim_end_matches('/'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| NfpipeError::Provisioning {
            command: "kernel naming".into(),
            message: format!(
                "environment path '{location}' is not under a '{CONDA_ENVS_SEGMENT}' directory"
            ),
        })?;
    Ok(format!("{env_name}_{family}"))
}

/// Provisions kernels with the Jupyter, conda and mamba command-line tools.
pub struct JupyterKernelProvisioner {
    runner: Arc<dyn CommandRunner>,
    config: ProvisionerConfig,
}

impl JupyterKernelProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ProvisionerConfig) -> Self {
        Self { runner, config }
    }

    /// Kernels whose interpreter lives inside `runtime` and belongs to `family`.
    ///
    /// A failing `kernelspec list` is treated as "no kernels installed".
    pub fn existing_kernels(&self, runtime: &Path, family: KernelFamily) -> Vec<String> {
        let args = vec!["kernelspec".to_string(), "list".to_string(), "--json".to_string()];
        let listing = match run_checked(self.runner.as_ref(), &self.config.jupyter, &args)
            .and_then(|out| parse_kernel_list(&out.stdout))
        {
            Ok(specs) => specs,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list installed kernels");
                return Vec::new();
            }
        };

        let location = runtime.to_string_lossy();
        listing
            .into_iter()
            .filter(|spec| spec.executable.contains(location.as_ref()))
            .filter(|spec| family.matches_executable(&spec.executable))
            .map(|spec| spec.name)
            .collect()
    }

    fn install_kernel(&self, runtime: &Path, family: KernelFamily, name: &str) -> Result<()> {
        let env = runtime.to_string_lossy().to_string();
        let (channel, package) = match family {
            KernelFamily::Python => ("anaconda", "ipykernel"),
            KernelFamily::R => ("conda-forge", "r-irkernel"),
        };
        let install: Vec<String> = ["install", "-y", "-p", env.as_str(), "-c", channel, package]
            .iter()
            .map(|s| s.to_string())
            .collect();
        run_checked(self.runner.as_ref(), &self.config.mamba, &install)?;

        let register: Vec<String> = match family {
            KernelFamily::Python => vec![
                "run".into(),
                "-p".into(),
                env,
                "python".into(),
                "-m".into(),
                "ipykernel".into(),
                "install".into(),
                "--name".into(),
                name.into(),
                "--display-name".into(),
                name.into(),
                "--user".into(),
            ],
            KernelFamily::R => vec![
                "run".into(),
                "-p".into(),
                env,
                "Rscript".into(),
                "-e".into(),
                format!(
                    "IRkernel::installspec(name='{name}', displayname='{name}', user=TRUE)"
                ),
            ],
        };
        run_checked(self.runner.as_ref(), &self.config.conda, &register)?;
        Ok(())
    }
}

impl KernelProvisioner for JupyterKernelProvisioner {
    fn provision_kernel(&self, runtime: &Path, family: KernelFamily) -> Result<String> {
        if !runtime.exists() {
            return Err(NfpipeError::EnvironmentNotFound {
                path: runtime.display().to_string(),
            });
        }

        if let Some(existing) = self.existing_kernels(runtime, family).into_iter().next() {
            tracing::debug!(kernel = %existing, runtime = %runtime.display(), "Reusing installed kernel");
            return Ok(existing);
        }

        let name = kernel_name_for(runtime, family)?;
        tracing::info!(kernel = %name, family = %family, runtime = %runtime.display(), "Installing kernel");
        self.install_kernel(runtime, family, &name)?;
        Ok(name)
    }
}
