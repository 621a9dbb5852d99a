//! Output directory scaffolding: the skeleton, config and empty module dirs
//! that generation fills in.

use std::path::{Path, PathBuf};

use nfpipe_types::{NfpipeError, Result};

use crate::template::{DEFAULT_CONFIG, DEFAULT_TEMPLATE, TEMPLATE_FILE};

pub const MODULES_DIR: &str = "modules";
pub const ENV_DIR: &str = "env";
pub const CONFIG_FILE: &str = "nextflow.config";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TemplateSource {
    /// The skeleton and config bundled with the generator.
    #[default]
    Embedded,
    /// A directory copied as-is into the output directory.
    Directory(PathBuf),
}

/// Prepare `output_dir` for generation. An existing directory is refused
/// unless `force` is set, in which case the template is copied over it.
pub fn scaffold(output_dir: &Path, source: &TemplateSource, force: bool) -> Result<()> {
    if output_dir.exists() && !force {
        return Err(NfpipeError::OutputExists(output_dir.display().to_string()));
    }
    std::fs::create_dir_all(output_dir)?;

    match source {
        TemplateSource::Embedded => {
            std::fs::write(output_dir.join(TEMPLATE_FILE), DEFAULT_TEMPLATE)?;
            std::fs::write(output_dir.join(CONFIG_FILE), DEFAULT_CONFIG)?;
        }
        TemplateSource::Directory(dir) => {
            if !dir.join(TEMPLATE_FILE).is_file() {
                return Err(NfpipeError::Template(format!(
                    "template directory {} has no {TEMPLATE_FILE}",
                    dir.display()
                )));
            }
            copy_tree(dir, output_dir)?;
        }
    }

    std::fs::create_dir_all(output_dir.join(MODULES_DIR))?;
    std::fs::create_dir_all(output_dir.join(ENV_DIR))?;
    tracing::info!(output = %output_dir.display(), "Scaffolded output directory");
    Ok(())
}

/// Recursively copy the contents of `from` into `to`, overwriting files.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_template_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("wf");
        scaffold(&out, &TemplateSource::Embedded, false).unwrap();

        assert_eq!(
            std::fs::read_to_string(out.join("template.nf")).unwrap(),
            DEFAULT_TEMPLATE
        );
        assert!(out.join("nextflow.config").is_file());
        assert!(out.join("modules").is_dir());
        assert!(out.join("env").is_dir());
    }

    #[test]
    fn existing_directory_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        let err = scaffold(dir.path(), &TemplateSource::Embedded, false).unwrap_err();
        assert!(matches!(err, NfpipeError::OutputExists(_)));

        scaffold(dir.path(), &TemplateSource::Embedded, true).unwrap();
        assert!(dir.path().join("template.nf").is_file());
    }

    #[test]
    fn template_directory_is_copied_recursively() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("template.nf"), "custom").unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::write(src.path().join("bin/helper.sh"), "#!/bin/sh").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("wf");
        scaffold(&out, &TemplateSource::Directory(src.path().to_path_buf()), false).unwrap();

        assert_eq!(std::fs::read_to_string(out.join("template.nf")).unwrap(), "custom");
        assert!(out.join("bin/helper.sh").is_file());
        assert!(!out.join("nextflow.config").exists());
        assert!(out.join("modules").is_dir());
    }

    #[test]
    fn template_directory_without_skeleton_is_rejected() {
        let src = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = scaffold(
            &dir.path().join("wf"),
            &TemplateSource::Directory(src.path().to_path_buf()),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, NfpipeError::Template(_)));
    }
}
