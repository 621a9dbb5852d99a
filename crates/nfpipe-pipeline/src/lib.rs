//! Pipeline graph resolution and Nextflow code generation.
//!
//! This crate turns a parsed pipeline document into a Nextflow project:
//! graph indexing, step naming, execution ordering, data-flow binding,
//! process and composition emission, plus the 7 built-in lint rules and the
//! run checkpoint/registry used by the run-config flow.

pub mod binding;
pub mod checkpoint;
pub mod compose;
pub mod generator;
pub mod graph;
pub mod naming;
pub mod order;
pub mod process;
pub mod scaffold;
pub mod template;
pub mod validation;

pub use binding::{bind_inputs, producers_of, BindingPolicy, ChannelBinding, ChannelSource, UpstreamCandidate};
pub use checkpoint::{load_checkpoint, save_checkpoint, RunConfig, RunRegistry, RUN_FILE};
pub use compose::{ComposedStep, Composer};
pub use generator::{GenerationReport, Generator, GeneratorConfig, PlannedStep, MAIN_FILE};
pub use graph::{PipelineGraph, OUTPUT_PORT};
pub use naming::{resolve_home_relative, to_camel_case, NodeName};
pub use order::resolve_execution_order;
pub use process::{notebook_language, KernelMapping, ProcessCommand, ProcessDefinition, ProcessEmitter};
pub use scaffold::{scaffold, TemplateSource};
pub use template::{Slot, TemplateSections, WorkflowTemplate, DEFAULT_TEMPLATE};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
