use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info, warn};
use stitch::{
    BuildError, BuildOutput, Bundler, Config, ProjectConfig, emitter::render_loader_script,
    extensions::BuildSummary, sources::collect_sources,
};

const DEFAULT_CONFIG_FILE: &str = "stitch.toml";

/// Stitch declared JavaScript modules into one dependency-ordered bundle
#[derive(Parser, Debug)]
#[command(name = "stitch", version, about, long_about = None)]
struct Cli {
    /// Project configuration file (defaults to ./stitch.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Build only the named target(s)
    #[arg(short, long = "target", value_name = "NAME")]
    targets: Vec<String>,

    /// Entry module name
    #[arg(short, long)]
    entry: Option<String>,

    /// Source glob pattern(s); `!pattern` excludes
    #[arg(long, value_name = "GLOB")]
    src: Vec<String>,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write a loader script referencing the original files instead of a bundle
    #[arg(long)]
    debug: bool,

    /// Module supplied outside the build
    #[arg(long = "external", value_name = "MODULE")]
    external_modules: Vec<String>,

    /// Module never included
    #[arg(long, value_name = "MODULE")]
    exclude: Vec<String>,

    /// Regex selecting header-less files to include anyway
    #[arg(long, value_name = "REGEX")]
    standalone: Option<String>,

    /// Parameter name of emitted module closures
    #[arg(long, value_name = "NAME")]
    module_var: Option<String>,

    /// Rename differently named closure parameters instead of warning
    #[arg(long)]
    rename_module_variable: bool,

    /// Continue past warnings
    #[arg(short, long)]
    force: bool,

    /// Skip sandbox validation of unwrapped code
    #[arg(long)]
    no_validate: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Apply command-line overrides to a target
    fn apply(&self, config: &mut Config) {
        if let Some(entry) = &self.entry {
            config.entry = Some(entry.clone());
        }
        if !self.src.is_empty() {
            config.src.clone_from(&self.src);
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if let Some(standalone) = &self.standalone {
            config.standalone = Some(standalone.clone());
        }
        if let Some(module_var) = &self.module_var {
            config.module_var.clone_from(module_var);
        }
        config
            .external_modules
            .extend(self.external_modules.iter().cloned());
        config.exclude.extend(self.exclude.iter().cloned());
        config.debug |= self.debug;
        config.rename_module_variable |= self.rename_module_variable;
        config.force |= self.force;
        if self.no_validate {
            config.validate = false;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let targets = select_targets(cli, load_project(cli)?)?;

    let mut failed = 0;
    for (name, mut config) in targets {
        cli.apply(&mut config);
        if let Err(err) = build_target(&name, config) {
            error!("Target '{name}' failed: {err:#}");
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} target(s) failed");
    }
    Ok(())
}

fn load_project(cli: &Cli) -> Result<ProjectConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => {
            let mut project = ProjectConfig::default();
            project
                .targets
                .insert("default".to_owned(), Config::default());
            return Ok(project);
        }
    };
    info!("Loading configuration from {}", path.display());
    ProjectConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn select_targets(cli: &Cli, mut project: ProjectConfig) -> Result<Vec<(String, Config)>> {
    if cli.targets.is_empty() {
        return Ok(project.targets.into_iter().collect());
    }
    cli.targets
        .iter()
        .map(|name| {
            project
                .targets
                .shift_remove(name)
                .map(|config| (name.clone(), config))
                .with_context(|| format!("unknown target '{name}'"))
        })
        .collect()
}

fn build_target(name: &str, config: Config) -> Result<()> {
    if config.entry.is_none() {
        return Err(BuildError::MissingEntry.into());
    }
    let output_path = config.output.clone().ok_or(BuildError::NoOutput)?;
    if config.src.is_empty() {
        return Err(BuildError::NoSources.into());
    }

    let sources = collect_sources(&config.src)
        .with_context(|| format!("failed to collect sources for target '{name}'"))?;
    let mut bundler = Bundler::new(config).with_extension(BuildSummary::new(name));
    let result = bundler.build(&sources)?;
    if !result.warnings.is_empty() {
        warn!(
            "Target '{name}' finished with {} warning(s)",
            result.warnings.len()
        );
    }

    let text = match result.output {
        BuildOutput::Bundle(text) => text,
        BuildOutput::ReferenceList(paths) => {
            render_loader_script(&paths, &bundler.config().reference_prefix)
        }
    };
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(&output_path, text)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    info!("Target '{name}' written to {}", output_path.display());
    Ok(())
}
