//! Sequential execution of invocations.

use std::ffi::OsStr;
use std::io::Write;
use std::process::Command;

use mb_core::{Error, Result};
use serde::Serialize;

use crate::template::{CommandTemplate, Invocation};

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Non-zero exit or killed by a signal; rendered status.
    Failed(String),
    /// Not executed (dry run).
    Skipped,
}

/// Executes invocations one at a time.
pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome>;
}

/// Spawns each invocation and waits for it. The child inherits stdio.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .map_err(|source| Error::Spawn { program: invocation.program.clone(), source })?;
        if status.success() {
            Ok(Outcome::Success)
        } else {
            Ok(Outcome::Failed(status.to_string()))
        }
    }
}

/// Writes each invocation as one JSON line instead of running it.
pub struct DryRunRunner<W: Write> {
    out: W,
}

impl<W: Write> DryRunRunner<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> CommandRunner for DryRunRunner<W> {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome> {
        serde_json::to_writer(&mut self.out, invocation)?;
        self.out.write_all(b"\n")?;
        Ok(Outcome::Skipped)
    }
}

/// Batch behavior shared by the local and remote enumerators.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Stop at the first failed invocation instead of moving on.
    pub fail_fast: bool,
}

/// Counts reported at the end of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub invoked: usize,
    pub failed: usize,
    /// Inputs that were never run because their name is not valid UTF-8.
    pub skipped: usize,
    /// True when `fail_fast` cut the batch short.
    pub stopped_early: bool,
}

/// Incremental batch driver: feed inputs one at a time.
pub struct Batch<'a, R: CommandRunner + ?Sized> {
    template: &'a CommandTemplate,
    runner: &'a mut R,
    opts: &'a BatchOptions,
    summary: BatchSummary,
}

impl<'a, R: CommandRunner + ?Sized> Batch<'a, R> {
    pub fn new(template: &'a CommandTemplate, runner: &'a mut R, opts: &'a BatchOptions) -> Self {
        Self { template, runner, opts, summary: BatchSummary::default() }
    }

    /// Run the template for `input`. Returns `false` when the batch should stop.
    pub fn submit(&mut self, input: &str) -> Result<bool> {
        let inv = self.template.invocation(input);
        tracing::info!(input, "running {}", inv);
        self.summary.invoked += 1;
        match self.runner.run(&inv)? {
            Outcome::Success | Outcome::Skipped => Ok(true),
            Outcome::Failed(status) => {
                self.summary.failed += 1;
                tracing::warn!(input, %status, "command failed");
                if self.opts.fail_fast {
                    self.summary.stopped_early = true;
                    return Ok(false);
                }
                Ok(true)
            }
        }
    }

    /// Count `input` as not run. The batch goes on.
    pub fn skip(&mut self, input: &str, reason: &str) {
        tracing::warn!(input, reason, "input skipped");
        self.summary.skipped += 1;
    }

    pub fn finish(self) -> BatchSummary {
        tracing::info!(
            invoked = self.summary.invoked,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            stopped_early = self.summary.stopped_early,
            "batch finished"
        );
        self.summary
    }
}

/// Run the template once per input, in order.
///
/// The macro argument is a C++ string literal, so an input that is not valid
/// UTF-8 cannot be passed through unchanged; it is skipped and counted.
pub fn run_batch<I, S, R>(
    inputs: I,
    template: &CommandTemplate,
    runner: &mut R,
    opts: &BatchOptions,
) -> Result<BatchSummary>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    R: CommandRunner + ?Sized,
{
    let mut batch = Batch::new(template, runner, opts);
    for input in inputs {
        let input = input.as_ref();
        let keep_going = match input.to_str() {
            Some(s) => batch.submit(s)?,
            None => {
                batch.skip(&input.to_string_lossy(), "name is not valid UTF-8");
                true
            }
        };
        if !keep_going {
            break;
        }
    }
    Ok(batch.finish())
}

/// Records invocations; fails those whose input contains a marker.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingRunner {
    pub(crate) seen: Vec<Invocation>,
    pub(crate) fail_marker: Option<String>,
}

#[cfg(test)]
impl CommandRunner for RecordingRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome> {
        self.seen.push(invocation.clone());
        let failed = self
            .fail_marker
            .as_deref()
            .is_some_and(|m| invocation.args.iter().any(|a| a.contains(m)));
        Ok(if failed { Outcome::Failed("exit status: 1".to_string()) } else { Outcome::Success })
    }
}
