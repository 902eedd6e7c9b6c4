use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PickerConfig;

#[derive(Error, Debug)]
pub enum PickerError {
    #[error("failed to launch picker '{0}': {1}")]
    LaunchError(String, std::io::Error),
    #[error("picker i/o failed: {0}")]
    IoError(#[from] std::io::Error),
    #[error("picker exited with status {0}")]
    Exited(i32),
}

/// Outcome of a prompt. An empty pick means "go back".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<T> {
    Chosen(T),
    Cancelled,
}

/// Fuzzy-search prompt over an ordered list of labels.
#[allow(async_fn_in_trait)]
pub trait Picker {
    /// Returns the index of the chosen entry.
    async fn pick(&mut self, header: &str, entries: &[String]) -> Result<Selection<usize>, PickerError>;
}

/// Print a message for the user between prompts.
pub fn notify(message: &str) {
    eprintln!("{}", message);
}

/// Runs `fzf` (or a compatible command) once per prompt.
pub struct FzfPicker {
    command: String,
    args: Vec<String>,
}

impl FzfPicker {
    pub fn new(config: &PickerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl Picker for FzfPicker {
    async fn pick(&mut self, header: &str, entries: &[String]) -> Result<Selection<usize>, PickerError> {
        let mut cmd = Command::new(&self.command);
        cmd.args([
            "--height=50%",
            "--layout=reverse",
            "--no-multi",
            "--delimiter=\t",
            "--with-nth=2..",
            "--prompt=> ",
        ]);
        cmd.arg(format!("--header={}", single_line(header)));
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| PickerError::LaunchError(self.command.clone(), e))?;

        // Each line carries its index so duplicate titles stay distinguishable
        let input: String = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}\t{}\n", i, single_line(entry)))
            .collect();

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let index = stdout
                    .lines()
                    .next()
                    .and_then(|line| line.split('\t').next())
                    .and_then(|i| i.trim().parse::<usize>().ok());

                match index {
                    Some(i) if i < entries.len() => {
                        debug!(header, index = i, "picked entry");
                        Ok(Selection::Chosen(i))
                    }
                    _ => {
                        warn!(output = %stdout, "could not read picker selection");
                        Ok(Selection::Cancelled)
                    }
                }
            }
            // 1: no match, 130: interrupted with Esc or Ctrl-C
            Some(1) | Some(130) => Ok(Selection::Cancelled),
            Some(code) => Err(PickerError::Exited(code)),
            None => Ok(Selection::Cancelled),
        }
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}
