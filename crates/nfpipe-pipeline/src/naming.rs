//! Identifier derivation for generated processes.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use nfpipe_document::NodeDef;
use nfpipe_types::{NfpipeError, Result};

/// Number of leading id characters appended to every name.
const ID_SUFFIX_LEN: usize = 3;

fn non_identifier_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static regex"))
}

/// A syntax-safe, per-node identifier used for module files, params and channels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(String);

impl NodeName {
    /// Derive the name of `node` from its label, falling back to the stem of
    /// its filename, suffixed with the first characters of its id.
    pub fn resolve(node: &NodeDef) -> Result<Self> {
        let label = node
            .app_data
            .label
            .as_deref()
            .filter(|l| !l.trim().is_empty());

        let base = match label {
            Some(label) => label.to_string(),
            None => {
                let filename = node
                    .app_data
                    .filename
                    .as_deref()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| NfpipeError::MissingField {
                        node_id: node.id.clone(),
                        field: "filename".into(),
                    })?;
                file_stem(filename).to_string()
            }
        };

        let suffix: String = node.id.chars().take(ID_SUFFIX_LEN).collect();
        Ok(NodeName(to_camel_case(&format!("{base}_{suffix}"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased symbol of the node's process definition.
    pub fn process_label(&self) -> String {
        self.0.to_uppercase()
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything outside `[A-Za-z0-9_]`, lower-case, then join the
/// underscore-separated words in camel case.
pub fn to_camel_case(input: &str) -> String {
    let cleaned = non_identifier_chars().replace_all(input, "").to_lowercase();
    let mut words = cleaned.split('_');
    let mut out = words.next().unwrap_or_default().to_string();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Base name of `path` up to its first `.`.
fn file_stem(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.split('.').next().unwrap_or(base)
}

/// Base name of `path` including its extension.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Anchor a relative path at the user's home directory.
pub fn resolve_home_relative(path: &str, home: &Path) -> PathBuf {
    if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        home.join(path)
    }
}
