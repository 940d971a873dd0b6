//! CLI command definitions for mlops-forge.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::manifest::WorkflowManifest;
use crate::orchestrator::{Orchestrator, Provisioner};

/// MLOps project generator for annotated ML workflows.
#[derive(Parser)]
#[command(name = "mlops-forge")]
#[command(about = "Generate a deployable MLOps project from an annotated ML workflow")]
#[command(version)]
#[command(
    long_about = "mlops-forge converts a workflow manifest plus annotated Python component\n\
functions into a deployable MLOps project: containerized components, a compiled\n\
pipeline spec, CI/CD build configuration and provisioning scripts.\n\n\
Example usage:\n  mlops-forge generate --manifest workflow.yaml --output ."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate the MLOps project from a workflow manifest.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Provision resources, then build and submit the generated pipeline
    /// (or push to the source repo in CI/CD mode).
    Run(GenerateArgs),

    /// Generate, provision and submit in one shot.
    Go(GenerateArgs),
}

/// Provisioning flavor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProvisionerArg {
    Gcloud,
    Terraform,
    Pulumi,
}

impl From<ProvisionerArg> for Provisioner {
    fn from(arg: ProvisionerArg) -> Self {
        match arg {
            ProvisionerArg::Gcloud => Provisioner::Gcloud,
            ProvisionerArg::Terraform => Provisioner::Terraform,
            ProvisionerArg::Pulumi => Provisioner::Pulumi,
        }
    }
}

/// Arguments shared by `generate`, `run` and `go`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Path to the workflow manifest.
    #[arg(short, long, default_value = "workflow.yaml", env = "MLOPS_FORGE_MANIFEST")]
    pub manifest: PathBuf,

    /// Directory the project is generated into.
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Which provisioning artifacts to emit and execute.
    #[arg(long, value_enum, default_value_t = ProvisionerArg::Gcloud)]
    pub provisioner: ProvisionerArg,
}

/// Parses the CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => {
            let orchestrator = build_orchestrator(&args)?;
            orchestrator.generate()?;
            info!(
                "project generated at {}",
                orchestrator.layout().root().display()
            );
        }
        Commands::Run(args) => {
            let orchestrator = build_orchestrator(&args)?;
            orchestrator.run()?;
        }
        Commands::Go(args) => {
            let orchestrator = build_orchestrator(&args)?;
            orchestrator.generate()?;
            orchestrator.run()?;
        }
    }
    Ok(())
}

fn build_orchestrator(args: &GenerateArgs) -> anyhow::Result<Orchestrator> {
    let manifest = WorkflowManifest::load(&args.manifest)?;
    Ok(Orchestrator::new(
        manifest,
        args.output.clone(),
        args.provisioner.into(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_generate_command() {
        let cli = Cli::try_parse_from([
            "mlops-forge",
            "generate",
            "--manifest",
            "workflow.yaml",
            "--output",
            "/tmp/out",
            "--provisioner",
            "terraform",
        ])
        .expect("valid args");
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.manifest, PathBuf::from("workflow.yaml"));
                assert_eq!(args.output, PathBuf::from("/tmp/out"));
                assert_eq!(args.provisioner, ProvisionerArg::Terraform);
            }
            _ => panic!("expected generate command"),
        }
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["mlops-forge", "gen"]).expect("valid args");
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.manifest, PathBuf::from("workflow.yaml"));
                assert_eq!(args.provisioner, ProvisionerArg::Gcloud);
            }
            _ => panic!("expected generate command"),
        }
    }
}
