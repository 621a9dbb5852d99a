//! CLI binary for converting pipeline documents into Nextflow workflows.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nfpipe_kernel::{
    CondaEnvironmentProvisioner, JupyterKernelProvisioner, LocalCommandRunner, ProvisionerConfig,
};
use nfpipe_pipeline::{
    save_checkpoint, scaffold, BindingPolicy, ChannelSource, Generator, GeneratorConfig,
    KernelMapping, RunConfig, RunRegistry, Severity, TemplateSource, MAIN_FILE,
};
use nfpipe_types::{RunMetadata, RunStatus};

#[derive(Parser)]
#[command(name = "nfpipe", version, about = "Pipeline document to Nextflow workflow generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Options shared by every command that generates a workflow.
#[derive(clap::Args)]
struct GenerateArgs {
    /// Overwrite an existing output directory
    #[arg(short, long)]
    force: bool,

    /// Launch the generated workflow with nextflow once written
    #[arg(short, long)]
    run: bool,

    /// Directory relative filenames in the document resolve against (default: $HOME)
    #[arg(long)]
    home_dir: Option<PathBuf>,

    /// Directory holding a custom template.nf (default: the bundled skeleton)
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Notebook language to kernel family mapping: inverted or direct
    #[arg(long, default_value = "inverted")]
    kernel_mapping: KernelMapping,

    /// Fail when an input file is produced by more than one upstream step
    #[arg(long)]
    strict_bindings: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a pipeline document into a Nextflow project
    Convert {
        /// Path to the pipeline document
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for the generated project
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        generate: GenerateArgs,
    },

    /// Convert and optionally launch a pipeline described by a run config
    Run {
        /// Path to the run config JSON submitted by the editor
        #[arg(long)]
        run_config: PathBuf,

        /// Log file for workflow output, relative to the output directory
        #[arg(long, default_value = "run.log")]
        append_log: PathBuf,

        #[command(flatten)]
        generate: GenerateArgs,
    },

    /// Validate a pipeline document
    Validate {
        /// Path to the pipeline document
        pipeline: PathBuf,
    },

    /// Show the execution plan of a pipeline document
    Info {
        /// Path to the pipeline document
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag.
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            generate,
        } => {
            cmd_convert(&input, &output, &generate).await?;
        }
        Commands::Run {
            run_config,
            append_log,
            generate,
        } => {
            cmd_run(&run_config, &append_log, &generate).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

fn home_dir(args: &GenerateArgs) -> PathBuf {
    args.home_dir
        .clone()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn build_generator(config: GeneratorConfig) -> Generator {
    let runner = Arc::new(LocalCommandRunner::new());
    let provisioners = ProvisionerConfig::default();
    let kernels = Arc::new(JupyterKernelProvisioner::new(runner.clone(), provisioners.clone()));
    let environments = Arc::new(CondaEnvironmentProvisioner::new(runner, provisioners));
    Generator::new(config, kernels, environments)
}

fn generator_for(output: &Path, args: &GenerateArgs) -> Generator {
    build_generator(GeneratorConfig {
        output_dir: output.to_path_buf(),
        home_dir: home_dir(args),
        kernel_mapping: args.kernel_mapping,
        binding_policy: if args.strict_bindings {
            BindingPolicy::Strict
        } else {
            BindingPolicy::FirstMatch
        },
        ..GeneratorConfig::default()
    })
}

/// Generator used only to read and plan documents; nothing is provisioned.
fn inspector() -> Generator {
    build_generator(GeneratorConfig::default())
}

fn template_source(args: &GenerateArgs) -> TemplateSource {
    match &args.template_dir {
        Some(dir) => TemplateSource::Directory(dir.clone()),
        None => TemplateSource::Embedded,
    }
}

/// Scaffold `output` and generate the workflow for `input` into it.
async fn convert(input: &Path, output: &Path, args: &GenerateArgs) -> anyhow::Result<()> {
    scaffold(output, &template_source(args), true)?;

    let generator = generator_for(output, args);
    let input = input.to_path_buf();
    // Provisioning blocks on external commands.
    let report = match tokio::task::spawn_blocking(move || generator.generate(&input)).await? {
        Ok(report) => report,
        Err(e) => {
            if let Some(node_id) = e.node_id() {
                tracing::error!(node_id, "Generation stopped at node");
            }
            return Err(e.into());
        }
    };

    println!(
        "Generated {} ({} modules, {} diagnostics)",
        report.main_path.display(),
        report.module_paths.len(),
        report.diagnostics.len()
    );
    Ok(())
}

fn refuse_existing(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "output directory {} already exists (use --force to overwrite)",
            output.display()
        );
    }
    Ok(())
}

async fn cmd_convert(input: &Path, output: &Path, args: &GenerateArgs) -> anyhow::Result<()> {
    refuse_existing(output, args.force)?;

    if !args.run {
        return convert(input, output, args).await;
    }

    // Launched conversions get a checkpoint of their own.
    let mut metadata = RunMetadata::new(uuid::Uuid::new_v4().to_string());
    save_checkpoint(&metadata, output).await?;
    prepare_and_launch(input, output, args, &mut metadata, None).await
}

async fn cmd_run(run_config: &Path, append_log: &Path, args: &GenerateArgs) -> anyhow::Result<()> {
    let config = RunConfig::load(run_config).await?;
    let home = home_dir(args);
    let output = config.output_dir(&home);
    let pipeline = config.pipeline_file(&home);

    refuse_existing(&output, args.force)?;
    RunRegistry::for_home(&home).register(&config).await?;

    println!("Run: {}", config.run_id);
    if let Some(name) = &config.run_name {
        println!("Name: {}", name);
    }
    println!("Pipeline: {}", pipeline.display());
    println!("Output: {}", output.display());

    let mut metadata = RunMetadata::new(config.run_id.clone());
    save_checkpoint(&metadata, &output).await?;

    let log = output.join(append_log);
    prepare_and_launch(&pipeline, &output, args, &mut metadata, Some(&log)).await
}

/// Drive `metadata` through generation and, when requested, the nextflow run,
/// checkpointing every status change.
async fn prepare_and_launch(
    input: &Path,
    output: &Path,
    args: &GenerateArgs,
    metadata: &mut RunMetadata,
    log: Option<&Path>,
) -> anyhow::Result<()> {
    if let Err(e) = convert(input, output, args).await {
        metadata.fail(RunStatus::PrepareFailure, e.to_string());
        save_checkpoint(metadata, output).await?;
        return Err(e);
    }
    metadata.transition(RunStatus::PrepareSuccess);
    save_checkpoint(metadata, output).await?;

    if !args.run {
        return Ok(());
    }

    metadata.transition(RunStatus::Running);
    save_checkpoint(metadata, output).await?;
    tracing::info!(run_id = %metadata.run_id, output = %output.display(), "Launching workflow");

    match launch_nextflow(output, log).await {
        Ok(status) if status.success() => {
            metadata.transition(RunStatus::RunSuccess);
            save_checkpoint(metadata, output).await?;
            println!("\nWorkflow completed");
            Ok(())
        }
        Ok(status) => {
            let message = format!("nextflow exited with {}", status);
            metadata.fail(RunStatus::RunError, message.clone());
            save_checkpoint(metadata, output).await?;
            anyhow::bail!(message)
        }
        Err(e) => {
            metadata.fail(RunStatus::RunError, e.to_string());
            save_checkpoint(metadata, output).await?;
            Err(e)
        }
    }
}

/// Run `nextflow run main.nf -with-dag -profile conda` inside `output`,
/// appending its output to `log` when given.
async fn launch_nextflow(
    output: &Path,
    log: Option<&Path>,
) -> anyhow::Result<std::process::ExitStatus> {
    let mut cmd = tokio::process::Command::new("nextflow");
    cmd.args(["run", MAIN_FILE, "-with-dag", "-profile", "conda"])
        .current_dir(output);

    if let Some(log) = log {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)?;
        cmd.stderr(Stdio::from(file.try_clone()?));
        cmd.stdout(Stdio::from(file));
        println!("Log: {}", log.display());
    }

    let status = cmd.status().await?;
    tracing::debug!(?status, "nextflow exited");
    Ok(status)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let graph = inspector().load_graph(path)?;
    let diagnostics = nfpipe_pipeline::validate(&graph);

    if diagnostics.is_empty() {
        println!("Pipeline is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        match &diag.node_id {
            Some(id) => println!("[{}] {} ({}): {}", severity, diag.rule, id, diag.message),
            None => println!("[{}] {}: {}", severity, diag.rule, diag.message),
        }
        if let Some(fix) = &diag.fix {
            println!("    fix: {}", fix);
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let generator = inspector();
    let graph = generator.load_graph(path)?;
    let steps = generator.plan(&graph)?;

    println!("Pipeline: {}", path.display());
    println!("Nodes: {}", graph.len());
    println!("Steps: {}", steps.len());

    println!("\nExecution order:");
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {} [{}] op={}", i + 1, step.name, step.node_id, step.operator);
        for binding in &step.bindings {
            let source = match &binding.source {
                ChannelSource::Wired { process, output } => format!("{}.output{}", process, output),
                ChannelSource::Raw => "filesystem".to_string(),
            };
            println!("       input{} {} <- {}", binding.position, binding.filename, source);
        }
    }

    Ok(())
}
