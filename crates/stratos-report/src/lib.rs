use std::fmt::Write;
use std::io::{self, IsTerminal};

use console::Style;
use stratos_domain::{OperationKind, OperationReport, RunReport};

mod error;
mod options;
mod redaction;

pub use error::ReportError;
pub use options::{ColorChoice, OutputFormat, RenderOptions};
pub use redaction::redact_sensitive;

/// Render a run report in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_run(
    report: &RunReport,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|source| ReportError::JsonSerialize { source }),
        OutputFormat::Text => Ok(render_run_text(report, options)),
    }
}

fn render_run_text(report: &RunReport, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);

    let _ = write!(
        output,
        "{}",
        style.header_command(report.operation.as_str())
    );
    if let Some(target) = options.target.as_deref() {
        let _ = write!(output, " {}", style.header_target(target));
    }
    let _ = writeln!(output);

    if report.operations.is_empty() {
        let _ = writeln!(output, "  Nothing to do.");
        append_warnings_and_errors(&mut output, &report.warnings, &report.errors, &style);
        return output;
    }

    let _ = writeln!(output);
    append_warnings_and_errors(&mut output, &report.warnings, &report.errors, &style);
    for operation in &report.operations {
        append_operation_line(&mut output, operation, options, &style);
    }

    let _ = writeln!(output);
    let tally = RunTally::from_operations(&report.operations);
    let _ = writeln!(output, "{}", tally.format(&style));

    output
}

fn append_operation_line(
    output: &mut String,
    operation: &OperationReport,
    options: &RenderOptions,
    style: &TextStyle,
) {
    let (symbol, label) = operation_symbol_and_label(operation, style);
    let scope = if operation.targets.is_empty() {
        style.dim("(all resources)")
    } else {
        style.dim(&format!("({} target(s))", operation.targets.len()))
    };
    let _ = writeln!(
        output,
        "  {symbol} {label}{} {scope}",
        style.primary_text(operation.stack.as_str())
    );

    if options.verbose {
        for target in &operation.targets {
            let _ = writeln!(output, "      {}", style.dim(target.as_str()));
        }
    }

    if let Some(error) = &operation.error {
        for line in error.lines() {
            let _ = writeln!(output, "    {} {line}", style.error_prefix("error:"));
        }
    }
}

fn append_warnings_and_errors(
    output: &mut String,
    warnings: &[String],
    errors: &[String],
    style: &TextStyle,
) {
    if warnings.is_empty() && errors.is_empty() {
        return;
    }
    for warning in warnings {
        let _ = writeln!(output, "  {} {warning}", style.warn_prefix("warn:"));
    }
    for error in errors {
        let _ = writeln!(output, "  {} {error}", style.error_prefix("error:"));
    }
    let _ = writeln!(output);
}

fn operation_symbol_and_label(
    operation: &OperationReport,
    style: &TextStyle,
) -> (String, String) {
    if operation.cancelled {
        return (
            style.cancel_symbol("!"),
            TextStyle::pad_label(&style.cancel_label("cancelled")),
        );
    }
    if !operation.success {
        return (
            style.error_op_symbol("!"),
            TextStyle::pad_label(&style.error_op_label("failed")),
        );
    }

    let (symbol, label) = match operation.operation {
        OperationKind::Preview => ("=", "previewed"),
        OperationKind::Up => ("+", "deployed"),
        OperationKind::Destroy => ("-", "destroyed"),
        OperationKind::Refresh => ("~", "refreshed"),
    };
    match symbol {
        "+" => (
            style.add_symbol("+"),
            TextStyle::pad_label(&style.add_label(label)),
        ),
        "-" => (
            style.remove_symbol("-"),
            TextStyle::pad_label(&style.remove_label(label)),
        ),
        "~" => (
            style.change_symbol("~"),
            TextStyle::pad_label(&style.change_label(label)),
        ),
        _ => (
            style.noop_symbol("="),
            TextStyle::pad_label(&style.noop_label(label)),
        ),
    }
}

// ---------------------------------------------------------------------------
// Run Tally
// ---------------------------------------------------------------------------

struct RunTally {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl RunTally {
    fn from_operations(operations: &[OperationReport]) -> Self {
        let mut tally = Self {
            succeeded: 0,
            failed: 0,
            cancelled: 0,
        };
        for operation in operations {
            if operation.cancelled {
                tally.cancelled += 1;
            } else if operation.success {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }
        tally
    }

    fn format(&self, style: &TextStyle) -> String {
        let mut parts = Vec::new();
        if self.succeeded > 0 {
            parts.push(style.add_label(&format!("{} succeeded", self.succeeded)));
        }
        if self.failed > 0 {
            parts.push(style.error_op_label(&format!("{} failed", self.failed)));
        }
        if self.cancelled > 0 {
            parts.push(style.cancel_label(&format!("{} cancelled", self.cancelled)));
        }
        if parts.is_empty() {
            format!("{} nothing to do", style.tally_label("Run:"))
        } else {
            format!("{} {}", style.tally_label("Run:"), parts.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// TextStyle
// ---------------------------------------------------------------------------

const LABEL_WIDTH: usize = 12;

#[derive(Debug, Clone)]
struct TextStyle {
    color_enabled: bool,
    add_sym_style: Style,
    remove_sym_style: Style,
    change_sym_style: Style,
    error_sym_style: Style,
    cancel_sym_style: Style,
    noop_sym_style: Style,
    add_label_style: Style,
    remove_label_style: Style,
    change_label_style: Style,
    error_label_style: Style,
    cancel_label_style: Style,
    noop_label_style: Style,
    primary_style: Style,
    dim_style: Style,
    header_cmd_style: Style,
    header_target_style: Style,
    warn_prefix_style: Style,
    error_prefix_style: Style,
    tally_label_style: Style,
}

impl TextStyle {
    fn new(choice: ColorChoice) -> Self {
        let enabled = should_color(choice);
        Self {
            color_enabled: enabled,
            add_sym_style: Style::new().green().bold(),
            remove_sym_style: Style::new().red().bold(),
            change_sym_style: Style::new().cyan().bold(),
            error_sym_style: Style::new().red().bold(),
            cancel_sym_style: Style::new().yellow().bold(),
            noop_sym_style: Style::new().dim(),
            add_label_style: Style::new().green(),
            remove_label_style: Style::new().red(),
            change_label_style: Style::new().cyan(),
            error_label_style: Style::new().red(),
            cancel_label_style: Style::new().yellow(),
            noop_label_style: Style::new().dim(),
            primary_style: Style::new().white(),
            dim_style: Style::new().dim(),
            header_cmd_style: Style::new().white().bold(),
            header_target_style: Style::new().dim(),
            warn_prefix_style: Style::new().yellow().bold(),
            error_prefix_style: Style::new().red().bold(),
            tally_label_style: Style::new().white().bold(),
        }
    }

    fn paint<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if self.color_enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn pad_label(painted: &str) -> String {
        let visible_len = console::measure_text_width(painted);
        if visible_len < LABEL_WIDTH {
            format!("{painted}{}", " ".repeat(LABEL_WIDTH - visible_len))
        } else {
            format!("{painted} ")
        }
    }

    fn add_symbol(&self, text: &str) -> String {
        self.paint(&self.add_sym_style, text)
    }
    fn remove_symbol(&self, text: &str) -> String {
        self.paint(&self.remove_sym_style, text)
    }
    fn change_symbol(&self, text: &str) -> String {
        self.paint(&self.change_sym_style, text)
    }
    fn error_op_symbol(&self, text: &str) -> String {
        self.paint(&self.error_sym_style, text)
    }
    fn cancel_symbol(&self, text: &str) -> String {
        self.paint(&self.cancel_sym_style, text)
    }
    fn noop_symbol(&self, text: &str) -> String {
        self.paint(&self.noop_sym_style, text)
    }

    fn add_label(&self, text: &str) -> String {
        self.paint(&self.add_label_style, text)
    }
    fn remove_label(&self, text: &str) -> String {
        self.paint(&self.remove_label_style, text)
    }
    fn change_label(&self, text: &str) -> String {
        self.paint(&self.change_label_style, text)
    }
    fn error_op_label(&self, text: &str) -> String {
        self.paint(&self.error_label_style, text)
    }
    fn cancel_label(&self, text: &str) -> String {
        self.paint(&self.cancel_label_style, text)
    }
    fn noop_label(&self, text: &str) -> String {
        self.paint(&self.noop_label_style, text)
    }

    fn primary_text(&self, text: &str) -> String {
        self.paint(&self.primary_style, text)
    }
    fn dim(&self, text: &str) -> String {
        self.paint(&self.dim_style, text)
    }
    fn header_command(&self, text: &str) -> String {
        self.paint(&self.header_cmd_style, text)
    }
    fn header_target(&self, text: &str) -> String {
        self.paint(&self.header_target_style, text)
    }
    fn warn_prefix(&self, text: &str) -> String {
        self.paint(&self.warn_prefix_style, text)
    }
    fn error_prefix(&self, text: &str) -> String {
        self.paint(&self.error_prefix_style, text)
    }
    fn tally_label(&self, text: &str) -> String {
        self.paint(&self.tally_label_style, text)
    }
}

fn should_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stdout().is_terminal(),
    }
}
