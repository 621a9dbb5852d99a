//! Runtime provisioning collaborators for nfpipe.
//!
//! Generated workflows run each step inside a conda environment; notebook
//! steps additionally need a Jupyter kernel registered for that environment.
//! This crate owns every external process the generator relies on:
//! - [`CommandRunner`]: the process-spawning seam
//! - [`KernelProvisioner`] / [`JupyterKernelProvisioner`]: kernel lookup and install
//! - [`EnvironmentProvisioner`] / [`CondaEnvironmentProvisioner`]: env creation from YAML

pub mod conda;
pub mod kernel;
pub mod runner;

pub use conda::{CondaEnvironmentProvisioner, EnvironmentProvisioner};
pub use kernel::{
    kernel_name_for, parse_kernel_list, JupyterKernelProvisioner, KernelFamily,
    KernelProvisioner, KernelSpec,
};
pub use runner::{render_command, CommandOutput, CommandRunner, LocalCommandRunner};

/// Executables used by the provisioners. Defaults resolve through `PATH`.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub jupyter: String,
    pub conda: String,
    pub mamba: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            jupyter: "jupyter".into(),
            conda: "conda".into(),
            mamba: "mamba".into(),
        }
    }
}
