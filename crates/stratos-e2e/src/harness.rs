use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

static BUILD_STRATOS: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    #[must_use]
    pub fn transcript(&self) -> String {
        format!(
            "$ {}\n[exit: {}]\n[stdout]\n{}[stderr]\n{}",
            self.command_line, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Run `stratos run` as an external process with stdin closed, so the CLI
/// takes its non-interactive defaults.
///
/// # Errors
///
/// Returns an error if building/running the `stratos` binary fails.
pub fn run_cli(workspace: &Path, flags: &[&str]) -> Result<RunResult, String> {
    ensure_stratos_built()?;
    let bin = stratos_bin()?;

    let mut command = Command::new(bin);
    command.stdin(Stdio::null());
    command.arg("run");
    command.arg(workspace);
    command.args(flags);

    let mut command_parts = vec![
        "stratos".to_string(),
        "run".to_string(),
        workspace.display().to_string(),
    ];
    command_parts.extend(flags.iter().map(|flag| (*flag).to_string()));

    let output = command
        .output()
        .map_err(|error| format!("failed to run stratos: {error}"))?;

    Ok(RunResult {
        command_line: command_parts.join(" "),
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Write a text file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directories or file contents cannot be written.
pub fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Install a fake engine executable under `dir`.
///
/// Every invocation is appended to `engine.log`. `stack export` replies with
/// `state.json` when present (empty state otherwise), and a
/// `fail-<operation>` marker file makes that lifecycle operation exit
/// non-zero.
///
/// # Errors
///
/// Returns an error if the script cannot be written or made executable.
#[cfg(unix)]
pub fn install_fake_engine(dir: &Path) -> Result<PathBuf, String> {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
dir="{dir}"
echo "$@" >> "$dir/engine.log"
cmd="$1"
case "$cmd" in
  stack)
    case "$2" in
      select) exit 0 ;;
      init) exit 0 ;;
      export)
        if [ -f "$dir/state.json" ]; then cat "$dir/state.json"; else printf '{{"resources":[]}}'; fi
        exit 0 ;;
    esac
    exit 64 ;;
  preview|up|destroy|refresh)
    if [ -f "$dir/fail-$cmd" ]; then
      echo "$cmd failed: quota exceeded" >&2
      exit 3
    fi
    echo "engine: $cmd $3"
    exit 0 ;;
  cancel) exit 0 ;;
esac
exit 64
"#,
        dir = dir.display()
    );

    let path = dir.join("vega");
    fs::write(&path, script).map_err(|error| format!("failed to write fake engine: {error}"))?;
    let mut permissions = fs::metadata(&path)
        .map_err(|error| format!("failed to stat fake engine: {error}"))?
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions)
        .map_err(|error| format!("failed to chmod fake engine: {error}"))?;
    Ok(path)
}

fn ensure_stratos_built() -> Result<(), String> {
    match BUILD_STRATOS.get_or_init(|| {
        let status = Command::new("cargo")
            .arg("build")
            .arg("-q")
            .arg("-p")
            .arg("stratos")
            .status()
            .map_err(|error| format!("failed to build stratos binary: {error}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!(
                "failed to build stratos binary: cargo exited with status {status}"
            ))
        }
    }) {
        Ok(()) => Ok(()),
        Err(error) => Err(error.clone()),
    }
}

fn stratos_bin() -> Result<PathBuf, String> {
    let mut path = std::env::current_exe()
        .map_err(|error| format!("failed to determine current executable: {error}"))?;
    if !path.pop() {
        return Err("failed to resolve test executable directory".to_string());
    }
    if path.ends_with("deps") {
        let _ = path.pop();
    }
    Ok(path.join(format!("stratos{}", std::env::consts::EXE_SUFFIX)))
}
