//! Command-line hook scripts.
//!
//! # Responsibilities
//! - Spawn the configured command with its args, env and working directory
//! - One-shot: wait for exit, fail on non-zero status, kill on cancellation
//! - Kept: spawn on start, kill on close
//!
//! # Design Decisions
//! - Children are `kill_on_drop` so an abandoned run never outlives its future
//! - Output of one-shot runs is forwarded to the script's logger line by line

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{ScriptConfig, ScriptMode};
use crate::error::BoxError;
use crate::observability::Logger;
use crate::script::HookScript;

/// Hook script running an external command.
pub struct CommandScript {
    tag: String,
    mode: ScriptMode,
    keep: bool,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    work_dir: Option<PathBuf>,
    logger: Logger,
    /// Child of a kept script while it runs.
    child: Mutex<Option<Child>>,
}

impl CommandScript {
    pub fn new(logger: Logger, tag: &str, config: &ScriptConfig) -> Result<Self, BoxError> {
        if config.command.trim().is_empty() {
            return Err("missing command".into());
        }
        Ok(Self {
            tag: tag.to_string(),
            mode: config.mode,
            keep: config.keep,
            program: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            work_dir: config.work_dir.as_ref().map(PathBuf::from),
            logger,
            child: Mutex::new(None),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env).kill_on_drop(true);
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn forward_output(&self, stdout: &[u8], stderr: &[u8]) {
        for line in String::from_utf8_lossy(stdout).lines() {
            self.logger.info(line);
        }
        for line in String::from_utf8_lossy(stderr).lines() {
            self.logger.warn(line);
        }
    }
}

#[async_trait]
impl HookScript for CommandScript {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn mode(&self) -> ScriptMode {
        self.mode
    }

    fn keep(&self) -> bool {
        self.keep
    }

    async fn start(&self) -> Result<(), BoxError> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err("script already running".into());
        }
        let child = self.command().stdin(Stdio::null()).spawn()?;
        self.logger
            .info(format_args!("started {} (pid {:?})", self.program, child.id()));
        *slot = Some(child);
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Some(status) = child.try_wait()? {
            self.logger.debug(format_args!("exited before close: {}", status));
            return Ok(());
        }
        child.kill().await?;
        self.logger.info("stopped");
        Ok(())
    }

    async fn run_once(&self, context: CancellationToken) -> Result<(), BoxError> {
        let child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        tokio::select! {
            output = child.wait_with_output() => {
                let output = output?;
                self.forward_output(&output.stdout, &output.stderr);
                if output.status.success() {
                    Ok(())
                } else {
                    Err(format!("{}", output.status).into())
                }
            }
            _ = context.cancelled() => {
                Err("script cancelled".into())
            }
        }
    }
}
