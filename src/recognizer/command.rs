//! Recognizer backed by an external command

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{parse_output, RecognitionCounts, Recognizer};
use crate::{Error, Result};

const BASE_TOKEN: &str = "{base}";
const TEST_SET_TOKEN: &str = "{test_set}";
const STDERR_TAIL_LINES: usize = 5;

/// How to invoke the recognition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments; `{base}` and `{test_set}` are substituted. If neither token
    /// appears, the base and test-set paths are appended.
    #[serde(default)]
    pub args: Vec<String>,
    /// Hard limit for one run, in seconds
    #[serde(default = "RecognizerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RecognizerConfig {
    const fn default_timeout_secs() -> u64 {
        600
    }

    /// Config for `program` with default timeout and no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }

    /// Argument list for one invocation.
    #[must_use]
    pub fn arguments(&self, base: &Path, test_set: &Path) -> Vec<String> {
        let base = base.to_string_lossy();
        let test_set = test_set.to_string_lossy();
        let templated = self
            .args
            .iter()
            .any(|a| a.contains(BASE_TOKEN) || a.contains(TEST_SET_TOKEN));

        let mut out: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(BASE_TOKEN, &base).replace(TEST_SET_TOKEN, &test_set))
            .collect();
        if !templated {
            out.push(base.into_owned());
            out.push(test_set.into_owned());
        }
        out
    }
}

/// Runs the recognizer as a child process with a hard timeout.
///
/// A timed-out child is killed.
#[derive(Debug)]
pub struct CommandRecognizer {
    config: RecognizerConfig,
    runtime: tokio::runtime::Runtime,
}

impl CommandRecognizer {
    /// Create a recognizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty program or zero timeout,
    /// and [`Error::Io`] if the process runtime cannot be created.
    pub fn new(config: RecognizerConfig) -> Result<Self> {
        if config.program.as_os_str().is_empty() {
            return Err(Error::Configuration("recognizer program is empty".into()));
        }
        if config.timeout_secs == 0 {
            return Err(Error::Configuration("recognizer timeout must be positive".into()));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { config, runtime })
    }

    /// Invocation config.
    #[must_use]
    pub const fn config(&self) -> &RecognizerConfig {
        &self.config
    }
}

impl Recognizer for CommandRecognizer {
    fn recognize(&mut self, base: &Path, test_set: &Path) -> Result<RecognitionCounts> {
        let program = self.config.program.clone();
        let args = self.config.arguments(base, test_set);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        debug!(program = %program.display(), ?args, "invoking recognizer");

        self.runtime.block_on(async move {
            let child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    Error::ExternalProcess(format!("cannot spawn {}: {e}", program.display()))
                })?;

            let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(|e| {
                    Error::ExternalProcess(format!("waiting for {} failed: {e}", program.display()))
                })?,
                Err(_) => {
                    return Err(Error::ExternalProcess(format!(
                        "{} timed out after {}s",
                        program.display(),
                        timeout.as_secs()
                    )))
                }
            };

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let lines: Vec<&str> = stderr.lines().collect();
                let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
                return Err(Error::ExternalProcess(format!(
                    "{} exited with {}: {tail}",
                    program.display(),
                    output.status
                )));
            }

            parse_output(&String::from_utf8_lossy(&output.stdout))
        })
    }
}
