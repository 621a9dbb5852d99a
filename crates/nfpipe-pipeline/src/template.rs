//! The workflow skeleton with its three typed substitution slots.
//!
//! A skeleton is parsed once into literal lines and slots. Each slot marker
//! must sit alone on its line and appear exactly once. Rendering inserts the
//! slot's lines at the marker's indentation and never rescans inserted text,
//! so generated content that happens to contain a marker is left alone.

use nfpipe_types::{NfpipeError, Result};

/// File name of the skeleton inside a scaffolded output directory.
pub const TEMPLATE_FILE: &str = "template.nf";

/// Skeleton shipped with the generator.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../../templates/workflow/template.nf");

/// Nextflow configuration shipped next to the default skeleton.
pub const DEFAULT_CONFIG: &str = include_str!("../../../templates/workflow/nextflow.config");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Params,
    Imports,
    Workflow,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Params, Slot::Imports, Slot::Workflow];

    pub fn marker(&self) -> &'static str {
        match self {
            Slot::Params => "/*>>>>>[PARAMS DEFINE SECTION]*/",
            Slot::Imports => "/*>>>>>[IMPORT MODULES SECTION]*/",
            Slot::Workflow => "/*>>>>>[COMPOSE WORFLOW ]*/",
        }
    }
}

/// Content for each slot, one entry per output line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSections {
    pub params: Vec<String>,
    pub imports: Vec<String>,
    pub workflow: Vec<String>,
}

impl TemplateSections {
    fn lines(&self, slot: Slot) -> &[String] {
        match slot {
            Slot::Params => &self.params,
            Slot::Imports => &self.imports,
            Slot::Workflow => &self.workflow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot { slot: Slot, indent: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTemplate {
    segments: Vec<Segment>,
}

impl WorkflowTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut seen: Vec<Slot> = Vec::new();

        for (i, line) in source.split('\n').enumerate() {
            let Some(slot) = Slot::ALL.into_iter().find(|s| line.contains(s.marker())) else {
                segments.push(Segment::Text(line.to_string()));
                continue;
            };

            if line.trim() != slot.marker() {
                return Err(NfpipeError::Template(format!(
                    "line {}: marker {} must be alone on its line",
                    i + 1,
                    slot.marker()
                )));
            }
            if seen.contains(&slot) {
                return Err(NfpipeError::Template(format!(
                    "line {}: marker {} appears more than once",
                    i + 1,
                    slot.marker()
                )));
            }
            seen.push(slot);

            let indent_len = line.len() - line.trim_start().len();
            segments.push(Segment::Slot {
                slot,
                indent: line[..indent_len].to_string(),
            });
        }

        if let Some(missing) = Slot::ALL.into_iter().find(|s| !seen.contains(s)) {
            return Err(NfpipeError::Template(format!(
                "missing marker {}",
                missing.marker()
            )));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, sections: &TemplateSections) -> String {
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push(text.clone()),
                Segment::Slot { slot, indent } => {
                    out.extend(sections.lines(*slot).iter().map(|line| {
                        if line.is_empty() {
                            String::new()
                        } else {
                            format!("{indent}{line}")
                        }
                    }));
                }
            }
        }
        out.join("\n")
    }
}
