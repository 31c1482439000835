//! A stand-in for the k6 executable.
//!
//! The fake is a POSIX shell script run through `/bin/sh`, so tests never
//! `exec` a freshly written file. It takes the script path as its last
//! argument, records it, and then acts out an [`EngineBehavior`]. The report
//! path is read from the script's `const REPORT_PATH = '...';` line, which
//! every template used with the fake must contain.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// What the fake engine does once it has been started.
#[derive(Debug, Clone)]
pub enum EngineBehavior {
    /// Copies the script it was given to the report path and exits 0.
    EchoScriptAsReport,
    /// Writes `html` to the report path and exits 0.
    WriteReport(String),
    /// Exits 0 without writing a report.
    SkipReport,
    /// Prints `stderr` to standard error and exits with `code`.
    Fail { code: i32, stderr: String },
    /// Sleeps for `secs` seconds, then writes a short report and exits 0.
    Sleep { secs: u64 },
}

/// A fake k6 installed in its own temporary directory.
pub struct FakeEngine {
    dir: TempDir,
    script: PathBuf,
    invocation_log: PathBuf,
}

impl FakeEngine {
    /// Writes the fake engine script for `behavior`.
    pub fn install(behavior: EngineBehavior) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("fake-k6-")
            .tempdir()
            .expect("Failed to create fake engine directory");
        let script = dir.path().join("fake-k6.sh");
        let invocation_log = dir.path().join("invocations.log");

        std::fs::write(&script, render_script(&behavior, &invocation_log))
            .expect("Failed to write fake engine script");

        Self {
            dir,
            script,
            invocation_log,
        }
    }

    /// Program to launch in place of `k6`.
    pub fn program(&self) -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    /// Arguments that precede the script path, in place of `run`.
    pub fn args(&self) -> Vec<String> {
        vec![self.script.display().to_string(), "run".to_string()]
    }

    /// Directory the fake lives in; removed when the fake is dropped.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Script paths the fake has been invoked with, in order.
    pub fn invocations(&self) -> Vec<PathBuf> {
        std::fs::read_to_string(&self.invocation_log)
            .map(|log| log.lines().map(PathBuf::from).collect())
            .unwrap_or_default()
    }
}

fn render_script(behavior: &EngineBehavior, invocation_log: &Path) -> String {
    let action = match behavior {
        EngineBehavior::EchoScriptAsReport => "cat \"$script\" > \"$report\"\nexit 0".to_string(),
        EngineBehavior::WriteReport(html) => {
            format!("printf '%s' {} > \"$report\"\nexit 0", shell_quote(html))
        }
        EngineBehavior::SkipReport => "echo 'no report this time'\nexit 0".to_string(),
        EngineBehavior::Fail { code, stderr } => {
            format!("printf '%s' {} >&2\nexit {}", shell_quote(stderr), code)
        }
        EngineBehavior::Sleep { secs } => format!(
            "sleep {}\nprintf '%s' '<html>slow</html>' > \"$report\"\nexit 0",
            secs
        ),
    };

    format!(
        r#"#!/bin/sh
for arg in "$@"; do script="$arg"; done
printf '%s\n' "$script" >> {log}
if [ ! -f "$script" ]; then
  echo "script not found: $script" >&2
  exit 97
fi
report=$(sed -n "s/^const REPORT_PATH = '\(.*\)';$/\1/p" "$script")
if [ -z "$report" ]; then
  echo "no REPORT_PATH in script" >&2
  exit 98
fi
{action}
"#,
        log = shell_quote(&invocation_log.display().to_string()),
        action = action,
    )
}

/// Quotes `value` as a single shell word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
