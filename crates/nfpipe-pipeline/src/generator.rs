//! Generation driver: pipeline document in, Nextflow project out.
//!
//! Steps are processed strictly in execution order. Binding a step needs the
//! names and outputs of every upstream step, which are recorded in the
//! [`GenerationContext`] once that step has been emitted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfpipe_document::NodeDef;
use nfpipe_kernel::{EnvironmentProvisioner, KernelProvisioner};
use nfpipe_types::{NfpipeError, Result};

use crate::binding::{bind_inputs, BindingPolicy, ChannelBinding, UpstreamCandidate};
use crate::compose::{ComposedStep, Composer};
use crate::graph::{PipelineGraph, OUTPUT_PORT};
use crate::naming::{file_name, resolve_home_relative, NodeName};
use crate::order::resolve_execution_order;
use crate::process::{KernelMapping, ProcessEmitter};
use crate::scaffold::{ENV_DIR, MODULES_DIR};
use crate::template::{WorkflowTemplate, TEMPLATE_FILE};
use crate::validation::{has_environment_yaml, validate, Diagnostic};

/// File name of the composed workflow.
pub const MAIN_FILE: &str = "main.nf";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Scaffolded directory receiving modules and `main.nf`.
    pub output_dir: PathBuf,
    /// Anchor for relative filenames in the document.
    pub home_dir: PathBuf,
    pub kernel_mapping: KernelMapping,
    pub binding_policy: BindingPolicy,
    /// Port id marking a link as a data dependency.
    pub output_port: String,
    /// Working directory passed to papermill for notebook steps.
    pub notebook_cwd: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            home_dir: PathBuf::from("."),
            kernel_mapping: KernelMapping::default(),
            binding_policy: BindingPolicy::default(),
            output_port: OUTPUT_PORT.to_string(),
            notebook_cwd: ".".to_string(),
        }
    }
}

/// A step as it will be generated, without any side effects applied.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub node_id: String,
    pub name: NodeName,
    pub operator: String,
    pub bindings: Vec<ChannelBinding>,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub main_path: PathBuf,
    pub module_paths: Vec<PathBuf>,
    /// Names of the emitted steps, in execution order.
    pub order: Vec<NodeName>,
    pub diagnostics: Vec<Diagnostic>,
}

/// State carried across the per-step loop.
struct GenerationContext<'g> {
    graph: &'g PipelineGraph,
    /// Steps already handled, by node id.
    processed: HashMap<&'g str, NodeName>,
    diagnostics: Vec<Diagnostic>,
}

impl<'g> GenerationContext<'g> {
    fn new(graph: &'g PipelineGraph) -> Self {
        Self {
            graph,
            processed: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Whether `node` is emitted at all.
    fn should_emit(&self, node: &NodeDef) -> bool {
        if !node.is_execution() {
            tracing::debug!(node_id = %node.id, "Skipping non-execution node");
            return false;
        }
        if node.op.is_none() {
            tracing::warn!(node_id = %node.id, "Skipping execution node without operator");
            return false;
        }
        true
    }

    /// Already-emitted steps feeding `node` through data links.
    fn upstream_candidates(&self, node: &NodeDef) -> Result<Vec<UpstreamCandidate>> {
        Ok(self
            .graph
            .data_upstream(node)?
            .into_iter()
            .filter_map(|upstream| {
                self.processed
                    .get(upstream.id.as_str())
                    .map(|name| UpstreamCandidate::new(upstream, name.clone()))
            })
            .collect())
    }

    fn bind(&self, node: &NodeDef, name: &NodeName, policy: BindingPolicy) -> Result<Vec<ChannelBinding>> {
        let upstream = self.upstream_candidates(node)?;
        bind_inputs(node, name, &upstream, policy)
    }
}

pub struct Generator {
    config: GeneratorConfig,
    kernels: Arc<dyn KernelProvisioner>,
    environments: Arc<dyn EnvironmentProvisioner>,
}

impl Generator {
    pub fn new(
        config: GeneratorConfig,
        kernels: Arc<dyn KernelProvisioner>,
        environments: Arc<dyn EnvironmentProvisioner>,
    ) -> Self {
        Self {
            config,
            kernels,
            environments,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Parse the document at `path` into a graph using the configured port.
    pub fn load_graph(&self, path: &Path) -> Result<PipelineGraph> {
        let document = nfpipe_document::parse_file(path)?;
        Ok(PipelineGraph::with_output_port(document, self.config.output_port.clone()))
    }

    /// Names and bindings of every step, without provisioning or writing.
    pub fn plan(&self, graph: &PipelineGraph) -> Result<Vec<PlannedStep>> {
        let order = resolve_execution_order(graph)?;
        let mut ctx = GenerationContext::new(graph);
        let mut steps = Vec::new();

        for node in order {
            if !ctx.should_emit(node) {
                continue;
            }
            let name = NodeName::resolve(node)?;
            let bindings = ctx.bind(node, &name, self.config.binding_policy)?;
            ctx.processed.insert(node.id.as_str(), name.clone());
            steps.push(PlannedStep {
                node_id: node.id.clone(),
                name,
                operator: node.op.as_ref().map(|op| op.to_string()).unwrap_or_default(),
                bindings,
            });
        }
        Ok(steps)
    }

    /// Generate the workflow for the document at `input` into the configured
    /// output directory, which must already hold the skeleton.
    pub fn generate(&self, input: &Path) -> Result<GenerationReport> {
        let graph = self.load_graph(input)?;
        tracing::info!(input = %input.display(), nodes = graph.len(), "Loaded pipeline document");

        let order = resolve_execution_order(&graph)?;

        let out = &self.config.output_dir;
        let modules_dir = out.join(MODULES_DIR);
        std::fs::create_dir_all(&modules_dir)?;

        let mut ctx = GenerationContext::new(&graph);
        for diagnostic in validate(&graph) {
            tracing::warn!(rule = %diagnostic.rule, node_id = ?diagnostic.node_id, "{}", diagnostic.message);
            ctx.diagnostics.push(diagnostic);
        }

        let emitter = ProcessEmitter::new(
            self.kernels.as_ref(),
            self.config.kernel_mapping,
            &self.config.notebook_cwd,
        );
        let mut composer = Composer::new();
        let mut module_paths = Vec::new();
        let mut emitted = Vec::new();

        for node in order {
            if !ctx.should_emit(node) {
                continue;
            }
            let name = NodeName::resolve(node)?;
            let filename = self.source_path(node)?;
            let runtime = self.runtime_for(node, &name)?;

            let bindings = ctx.bind(node, &name, self.config.binding_policy)?;
            let process = emitter.emit(node, &name, &filename, &runtime, bindings.len())?;

            let module_path = modules_dir.join(format!("{name}.nf"));
            tracing::info!(node_id = %node.id, node_name = %name, path = %module_path.display(), "Writing module");
            std::fs::write(&module_path, process.render())?;

            let inputs = node.app_data.input_files();
            let outputs = node.app_data.output_files();
            composer.add_step(&ComposedStep {
                name: &name,
                filename: &filename,
                runtime: &runtime,
                cpu: node.app_data.cpu,
                inputs: &inputs,
                outputs: &outputs,
                bindings: &bindings,
            });

            ctx.processed.insert(node.id.as_str(), name.clone());
            module_paths.push(module_path);
            emitted.push(name);
        }

        let steps = composer.step_count();
        let main_path = self.write_main(composer)?;
        self.copy_input(input)?;

        tracing::info!(output = %out.display(), steps, "Finished generating workflow");
        Ok(GenerationReport {
            main_path,
            module_paths,
            order: emitted,
            diagnostics: ctx.diagnostics,
        })
    }

    /// Absolute path of the step's script or notebook.
    fn source_path(&self, node: &NodeDef) -> Result<String> {
        let filename = node
            .app_data
            .filename
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| NfpipeError::MissingField {
                node_id: node.id.clone(),
                field: "filename".into(),
            })?;
        Ok(resolve_home_relative(filename, &self.config.home_dir)
            .display()
            .to_string())
    }

    /// The step's runtime, provisioning one from its inline YAML if needed.
    fn runtime_for(&self, node: &NodeDef, name: &NodeName) -> Result<String> {
        let runtime = &node.app_data.runtime_environment;
        if !runtime.is_empty() || !has_environment_yaml(node) {
            return Ok(runtime.clone());
        }

        let env_name = format!("{name}_env");
        let env_dir = self.config.output_dir.join(ENV_DIR);
        std::fs::create_dir_all(&env_dir)?;
        let spec_file = env_dir.join(format!("{env_name}.yaml"));
        std::fs::write(&spec_file, format!("{}\n", node.app_data.environment_yaml.trim()))?;

        tracing::info!(node_name = %name, env = %env_name, "Provisioning environment from inline YAML");
        let location = self.environments.create_environment(&env_name, &spec_file)?;
        Ok(location.display().to_string())
    }

    fn write_main(&self, composer: Composer) -> Result<PathBuf> {
        let out = &self.config.output_dir;
        let template_path = out.join(TEMPLATE_FILE);
        let source = std::fs::read_to_string(&template_path).map_err(|e| {
            NfpipeError::Template(format!("cannot read {}: {e}", template_path.display()))
        })?;
        let template = WorkflowTemplate::parse(&source)?;

        let main_path = out.join(MAIN_FILE);
        std::fs::write(&main_path, template.render(&composer.into_sections()))?;
        std::fs::remove_file(&template_path)?;
        Ok(main_path)
    }

    /// Keep the source document next to the generated project.
    fn copy_input(&self, input: &Path) -> Result<()> {
        let name = file_name(&input.display().to_string()).to_string();
        let target = self.config.output_dir.join(name);
        let same = match (input.canonicalize(), target.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same {
            std::fs::copy(input, &target)?;
        }
        Ok(())
    }
}
