use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::Style;

use stratos_domain::{
    ComponentName, DebugLevel, EnvironmentId, OperationKind, RunReport, Urn,
};
use stratos_engine::{
    DiscoveredStack, ManagerOptions, ProcessEngine, Stack, StackManager, discover_stacks,
    read_stack_settings,
};
use stratos_report::{
    ColorChoice, OutputFormat, RenderOptions, redact_sensitive, render_run,
};

mod error;
mod prompt;
mod registry;
mod select;

pub use error::CliError;

use prompt::{IndexSelection, Prompter, SilentPrompter, TermPrompter, parse_index_selection, parse_operation};
use select::select_stacks;

#[derive(Debug, Parser)]
#[command(name = "stratos", about = "Stack orchestration for declarative infrastructure")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a lifecycle operation across the stacks of a workspace.
    Run {
        /// Workspace directory containing stack settings files.
        workspace: PathBuf,
        /// Lifecycle operation; prompted when omitted.
        #[arg(long, value_enum)]
        op: Option<OpArg>,
        /// Pre-selected resource identifiers; skips the target prompt.
        #[arg(long, value_delimiter = ',')]
        target: Vec<String>,
        /// Include dependents of targets even without composite expansion.
        #[arg(long)]
        target_dependents: bool,
        /// Stack selection: comma-separated env:name or name tokens, or the
        /// literal all.
        #[arg(long)]
        select: Option<String>,
        /// Shortcut for --select all.
        #[arg(long)]
        all: bool,
        /// Restrict discovered stacks to one environment.
        #[arg(long)]
        env: Option<String>,
        /// Elevate engine and provider log verbosity, keep engine temp dirs.
        #[arg(long, value_enum)]
        debug: Option<DebugArg>,
        /// Engine binary name or path (default: vega on PATH).
        #[arg(long)]
        engine: Option<String>,
        /// Project name recorded in the workspace settings.
        #[arg(long)]
        project: Option<String>,
        /// Backend URL recorded in the workspace settings.
        #[arg(long)]
        backend: Option<String>,
        #[command(flatten)]
        render: RenderFlags,
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OpArg {
    Preview,
    Up,
    Destroy,
    Refresh,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DebugArg {
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct RenderFlags {
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
    #[arg(long)]
    verbose: bool,
}

impl RenderFlags {
    fn render_options(&self, target: &str) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
            target: Some(target.to_string()),
        }
    }
}

impl From<OpArg> for OperationKind {
    fn from(value: OpArg) -> Self {
        match value {
            OpArg::Preview => Self::Preview,
            OpArg::Up => Self::Up,
            OpArg::Destroy => Self::Destroy,
            OpArg::Refresh => Self::Refresh,
        }
    }
}

impl From<DebugArg> for DebugLevel {
    fn from(value: DebugArg) -> Self {
        match value {
            DebugArg::Debug => Self::Debug,
            DebugArg::Trace => Self::Trace,
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version) or
/// command execution fails.
pub fn run() -> Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(error.into()),
        },
    };

    match cli.command {
        Commands::Run {
            workspace,
            op,
            target,
            target_dependents,
            select,
            all,
            env,
            debug,
            engine,
            project,
            backend,
            render,
            format,
        } => run_stacks(&RunInputs {
            workspace,
            op,
            target,
            target_dependents,
            select,
            all,
            env,
            debug,
            engine,
            project,
            backend,
            render,
            format,
        }),
    }
}

struct RunInputs {
    workspace: PathBuf,
    op: Option<OpArg>,
    target: Vec<String>,
    target_dependents: bool,
    select: Option<String>,
    all: bool,
    env: Option<String>,
    debug: Option<DebugArg>,
    engine: Option<String>,
    project: Option<String>,
    backend: Option<String>,
    render: RenderFlags,
    format: FormatArg,
}

fn run_stacks(inputs: &RunInputs) -> Result<i32, CliError> {
    let environment = inputs
        .env
        .as_deref()
        .map(EnvironmentId::try_from)
        .transpose()?;
    let (discovered, discovery_warnings) =
        discover_stacks(&inputs.workspace, environment.as_ref())?;
    if discovered.is_empty() {
        return Err(CliError::NoStacks {
            workspace: inputs.workspace.clone(),
        });
    }

    let interactive = std::io::stdin().is_terminal();
    let mut prompter: Box<dyn Prompter> = if interactive {
        Box::new(TermPrompter)
    } else {
        Box::new(SilentPrompter)
    };

    let operation = resolve_operation(inputs.op, prompter.as_mut())?;
    let mut selected = resolve_stacks(
        &discovered,
        inputs.select.as_deref(),
        inputs.all,
        interactive,
        prompter.as_mut(),
    )?;
    if operation.reverses_stack_order() {
        selected.reverse();
    }

    let engine = ProcessEngine::resolve(inputs.engine.as_deref())?;
    let project = inputs.project.clone().unwrap_or_else(|| {
        inputs
            .workspace
            .file_name()
            .map_or_else(|| "stratos".to_string(), |name| name.to_string_lossy().to_string())
    });
    let mut manager = StackManager::new(
        &engine,
        project,
        inputs.workspace.clone(),
        ManagerOptions {
            backend: inputs.backend.clone(),
            debug: inputs.debug.map(DebugLevel::from),
        },
    );

    let mut report = RunReport::new(operation);
    report.warnings.extend(discovery_warnings);
    let mut sensitive_values = BTreeSet::new();
    let dim = Style::new().dim();

    for discovered_stack in selected {
        let stack = prepare_stack(&mut manager, discovered_stack)?;
        collect_sensitive_values(&discovered_stack.settings_path, &mut sensitive_values);

        let (targets, expanded_any) = choose_targets(
            &manager,
            &stack,
            &inputs.target,
            interactive,
            prompter.as_mut(),
        )?;
        // Composite expansion implies intent to also affect dependents of
        // the expanded children.
        let dependents = inputs.target_dependents || expanded_any;

        let operation_report = manager.run_operation(
            &stack,
            operation,
            &targets,
            dependents,
            &mut |line| println!("    {}", dim.apply_to(line)),
        );
        report.operations.push(operation_report);
    }

    let render_options = inputs
        .render
        .render_options(&inputs.workspace.display().to_string());
    let rendered = render_run(&report, inputs.format.into(), &render_options)?;
    emit_output(&redact_sensitive(&rendered, &sensitive_values));
    Ok(i32::from(report.has_failures()))
}

fn resolve_operation(
    flag: Option<OpArg>,
    prompter: &mut dyn Prompter,
) -> Result<OperationKind, CliError> {
    if let Some(operation) = flag {
        return Ok(operation.into());
    }
    let answer = prompter.ask("operation [preview/up/destroy/refresh] (preview)")?;
    Ok(parse_operation(&answer))
}

fn resolve_stacks<'stacks>(
    discovered: &'stacks [DiscoveredStack],
    select: Option<&str>,
    all: bool,
    interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<Vec<&'stacks DiscoveredStack>, CliError> {
    if all {
        return Ok(discovered.iter().collect());
    }
    if let Some(expression) = select {
        return Ok(select_stacks(discovered, expression));
    }

    if interactive {
        println!("Stacks:");
        for (index, stack) in discovered.iter().enumerate() {
            println!("  {}. {}", index + 1, stack.name);
        }
    }
    let answer = prompter.ask("select stacks (all or comma-separated numbers)")?;
    match parse_index_selection(&answer, discovered.len()) {
        IndexSelection::All => Ok(discovered.iter().collect()),
        IndexSelection::Indices(indices) => Ok(indices
            .into_iter()
            .filter_map(|index| discovered.get(index))
            .collect()),
    }
}

fn prepare_stack(
    manager: &mut StackManager<'_>,
    discovered: &DiscoveredStack,
) -> Result<Stack, CliError> {
    let environment = EnvironmentId::try_from(discovered.name.environment())?;
    let component = ComponentName::try_from(discovered.name.component())?;

    match registry::setup(&environment, &component) {
        Some(setup) => {
            let mut config = setup.config;
            config.workdir = Some(discovered.workdir.clone());
            Ok(manager.create_or_select(&environment, &component, config, Some(setup.program))?)
        }
        None => Ok(manager.adopt(discovered.name.clone(), discovered.workdir.clone())),
    }
}

/// Resolve the targets for one stack and expand composites to all their
/// descendants. Returns the expanded target list and whether expansion added
/// anything.
fn choose_targets(
    manager: &StackManager<'_>,
    stack: &Stack,
    flag_targets: &[String],
    interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<(Vec<Urn>, bool), CliError> {
    let chosen: Vec<Urn> = if flag_targets.is_empty() {
        if !interactive {
            return Ok((Vec::new(), false));
        }
        let state = manager.export_state(stack)?;
        let selectable = state.selectable_resources();
        if selectable.is_empty() {
            return Ok((Vec::new(), false));
        }

        println!("Resources in {}:", stack.name);
        let dim = Style::new().dim();
        for (index, resource) in selectable.iter().enumerate() {
            let marker = if resource.composite { "[group] " } else { "" };
            println!(
                "  {}. {marker}{} {}",
                index + 1,
                resource.name,
                dim.apply_to(resource.urn.as_str())
            );
        }
        let answer = prompter.ask(&format!(
            "targets for {} (all = no target filter)",
            stack.name
        ))?;
        match parse_index_selection(&answer, selectable.len()) {
            IndexSelection::All => return Ok((Vec::new(), false)),
            IndexSelection::Indices(indices) => {
                let chosen: Vec<Urn> = indices
                    .into_iter()
                    .filter_map(|index| selectable.get(index))
                    .map(|resource| resource.urn.clone())
                    .collect();
                if chosen.is_empty() {
                    return Ok((Vec::new(), false));
                }
                let expanded = state.expand_targets(&chosen);
                let grew = expanded.len() > chosen.len();
                return Ok((expanded, grew));
            }
        }
    } else {
        flag_targets
            .iter()
            .map(|target| Urn::try_from(target.as_str()))
            .collect::<Result<_, _>>()?
    };

    let state = manager.export_state(stack)?;
    let expanded = state.expand_targets(&chosen);
    let grew = expanded.len() > chosen.len();
    Ok((expanded, grew))
}

fn collect_sensitive_values(settings_path: &Path, sensitive_values: &mut BTreeSet<String>) {
    let Ok(settings) = read_stack_settings(settings_path) else {
        return;
    };
    for value in settings.config.values() {
        if value.secret {
            sensitive_values.insert(value.value.clone());
        }
    }
}

fn emit_output(rendered: &str) {
    if rendered.ends_with('\n') {
        print!("{rendered}");
    } else {
        println!("{rendered}");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::run_from;

    #[test]
    fn help_exits_successfully() {
        let code = run_from(["stratos", "--help"]).expect("help must not error");
        assert_eq!(code, 0);
    }

    #[test]
    fn unknown_flags_are_argument_errors() {
        let error = run_from(["stratos", "run", "/tmp", "--bogus"]).expect_err("must fail");
        assert!(matches!(error, super::CliError::ArgumentParse(_)));
    }

    #[test]
    fn missing_workspace_is_a_discovery_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("absent");
        let error = run_from([
            "stratos",
            "run",
            missing.to_string_lossy().as_ref(),
            "--op",
            "preview",
            "--all",
        ])
        .expect_err("must fail");
        assert!(matches!(error, super::CliError::Discovery(_)));
    }

    #[test]
    fn empty_workspace_reports_no_stacks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = run_from([
            "stratos",
            "run",
            temp.path().to_string_lossy().as_ref(),
            "--op",
            "preview",
            "--all",
        ])
        .expect_err("must fail");
        assert!(matches!(error, super::CliError::NoStacks { .. }));
    }
}
