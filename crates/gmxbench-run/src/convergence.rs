//! Solver invocation and JIT-cache convergence detection.

use crate::error::{Result, RunError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info};

/// Marker emitted while the adaptive compilation cache is still being
/// populated; a log without it means the run executed fully optimized.
pub const CACHE_MARKER: &str = "kernel_cache";

/// Trailing log lines attached to a command failure.
const LOG_TAIL_LINES: usize = 20;

/// True when the captured output shows the JIT cache has stabilized.
///
/// A missing or unreadable log counts as "not converged" so the caller
/// re-runs instead of trusting stale data.
pub fn is_converged(outfile: &Path) -> bool {
    if !outfile.is_file() {
        return false;
    }
    match std::fs::read_to_string(outfile) {
        Ok(content) => !content.contains(CACHE_MARKER),
        Err(e) => {
            error!(outfile = %outfile.display(), error = %e, "could not read convergence log");
            false
        }
    }
}

/// Build the solver invocation for one run context.
///
/// `tune_pme = false` inserts `-notunepme` for the final profiled run.
pub fn solver_command(
    executable: &Path,
    pme: &str,
    pmefft: &str,
    ncpu: u32,
    tpr: &Path,
    time_control: &[String],
    tune_pme: bool,
) -> Vec<String> {
    let mut command: Vec<String> = Vec::new();
    command.push(executable.display().to_string());
    command.push("mdrun".to_string());
    if !tune_pme {
        command.push("-notunepme".to_string());
    }
    for flag in [
        "-noconfout",
        "-nb",
        "gpu",
        "-bonded",
        "gpu",
        "-update",
        "gpu",
        "-pme",
    ] {
        command.push(flag.to_string());
    }
    command.push(pme.to_string());
    command.push("-pmefft".to_string());
    command.push(pmefft.to_string());
    command.push("-ntmpi".to_string());
    command.push("1".to_string());
    command.push("-ntomp".to_string());
    command.push(ncpu.to_string());
    command.push("-s".to_string());
    command.push(tpr.display().to_string());
    command.extend_from_slice(time_control);
    command
}

/// Run a command with combined stdout/stderr captured to `log_path`,
/// blocking until completion.
///
/// The child gets exactly the supplied environment. A missing executable
/// maps to [`RunError::ExecutableNotFound`]; a non-zero exit maps to
/// [`RunError::ExternalCommandFailed`] carrying the exit code and the tail
/// of the captured log.
pub fn run_logged(
    command: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    log_path: &Path,
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(RunError::Config("empty command".to_string()));
    };

    info!(
        command = %command.join(" "),
        cwd = %cwd.display(),
        log = %log_path.display(),
        "running command"
    );

    let log_out = File::create(log_path)?;
    let log_err = log_out.try_clone()?;

    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdout(Stdio::from(log_out))
        .stderr(Stdio::from(log_err))
        .status();

    let status = match status {
        Ok(status) => status,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RunError::ExecutableNotFound(PathBuf::from(program)));
        }
        Err(e) => return Err(RunError::Io(e)),
    };

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        let log_tail = read_log_tail(log_path, LOG_TAIL_LINES);
        error!(code = code, log = %log_path.display(), "command exited with non-zero code");
        return Err(RunError::ExternalCommandFailed {
            code,
            log: log_path.to_path_buf(),
            log_tail,
        });
    }

    Ok(())
}

fn read_log_tail(path: &Path, lines: usize) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(lines);
            all[start..].join("\n")
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        env
    }

    #[test]
    fn missing_log_is_not_converged() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_converged(&dir.path().join("absent.log")));
    }

    #[test]
    fn marker_in_log_means_still_optimizing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        std::fs::write(&log, "step 100\nbuilding kernel_cache entry 7\n").unwrap();
        assert!(!is_converged(&log));
    }

    #[test]
    fn clean_log_means_converged() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        std::fs::write(&log, "step 100\nPerformance: 120 ns/day\n").unwrap();
        assert!(is_converged(&log));
    }

    #[test]
    fn solver_command_flag_layout() {
        let command = solver_command(
            Path::new("/opt/gmx/build/bin/gmx"),
            "auto",
            "cpu",
            32,
            Path::new("/boxes/0012/rf/water.tpr"),
            &["-nsteps".to_string(), "100".to_string()],
            true,
        );

        assert_eq!(command[0], "/opt/gmx/build/bin/gmx");
        assert_eq!(command[1], "mdrun");
        assert!(!command.contains(&"-notunepme".to_string()));
        let pme_index = command.iter().position(|a| a == "-pme").unwrap();
        assert_eq!(command[pme_index + 1], "auto");
        assert_eq!(command[command.len() - 2], "-nsteps");
        assert_eq!(command[command.len() - 1], "100");
    }

    #[test]
    fn profiled_command_disables_pme_tuning() {
        let command = solver_command(
            Path::new("gmx"),
            "gpu",
            "gpu",
            16,
            Path::new("water.tpr"),
            &[],
            false,
        );
        assert_eq!(command[2], "-notunepme");
    }

    #[test]
    fn run_logged_captures_combined_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo to-stdout; echo to-stderr >&2".to_string(),
        ];

        run_logged(&command, dir.path(), &sh_env(), &log).unwrap();

        let captured = std::fs::read_to_string(&log).unwrap();
        assert!(captured.contains("to-stdout"));
        assert!(captured.contains("to-stderr"));
    }

    #[test]
    fn non_zero_exit_carries_code_and_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo fatal device error; exit 3".to_string(),
        ];

        let err = run_logged(&command, dir.path(), &sh_env(), &log).unwrap_err();
        match err {
            RunError::ExternalCommandFailed {
                code, log_tail, ..
            } => {
                assert_eq!(code, 3);
                assert!(log_tail.contains("fatal device error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_executable_is_a_dedicated_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let command = vec!["/nonexistent/bin/gmx".to_string()];

        let err = run_logged(&command, dir.path(), &sh_env(), &log).unwrap_err();
        assert!(matches!(err, RunError::ExecutableNotFound(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_logged(&[], dir.path(), &sh_env(), &dir.path().join("out.log")).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn log_tail_is_limited_to_the_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let content: String = (0..40).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, content).unwrap();

        let tail = read_log_tail(&log, 20);
        assert!(tail.starts_with("line 20"));
        assert!(tail.ends_with("line 39"));
    }
}
