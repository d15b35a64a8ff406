//! Docker CLI container runtime

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::assembler::BuildContext;
use crate::deploy::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ContainerStatus, InspectReport, StopOutcome,
};
use crate::errors::EngineError;
use crate::utils::{tail_lines, truncate_message};

/// Lines of build output kept in a build failure
const BUILD_OUTPUT_LINES: usize = 20;

/// Max length of a command error message
const MAX_ERROR_CHARS: usize = 1000;

/// Seconds `docker stop` waits before killing
const STOP_TIMEOUT_SECS: u32 = 5;

/// Docker CLI options
#[derive(Debug, Clone)]
pub struct DockerOptions {
    /// Path or name of the docker binary
    pub bin: String,

    /// Log lines returned by inspect
    pub log_tail: usize,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            bin: "docker".to_string(),
            log_tail: 50,
        }
    }
}

pub fn build_args(dir: &Path, tag: &str, cache_from: Option<&str>) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-t".to_string(), tag.to_string()];
    if let Some(cache_from) = cache_from {
        args.push("--cache-from".to_string());
        args.push(cache_from.to_string());
    }
    args.push(dir.to_string_lossy().into_owned());
    args
}

pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        spec.name.clone(),
        "--network".into(),
        spec.network.clone(),
        "--memory".into(),
        spec.limits.memory.clone(),
        "--cpus".into(),
        spec.limits.cpus.to_string(),
        "--restart".into(),
        spec.restart.as_str().into(),
    ];
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        args.push("--label".into());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args
}

pub fn stop_args(reference: &str) -> Vec<String> {
    vec![
        "stop".into(),
        "-t".into(),
        STOP_TIMEOUT_SECS.to_string(),
        reference.into(),
    ]
}

pub fn rm_args(reference: &str) -> Vec<String> {
    vec!["rm".into(), "-f".into(), reference.into()]
}

pub fn inspect_args(reference: &str) -> Vec<String> {
    vec![
        "inspect".into(),
        "--type".into(),
        "container".into(),
        "--format".into(),
        "{{json .State}}".into(),
        reference.into(),
    ]
}

pub fn logs_args(reference: &str, tail: usize) -> Vec<String> {
    vec![
        "logs".into(),
        "--tail".into(),
        tail.to_string(),
        reference.into(),
    ]
}

/// Whether docker reported a missing container or image
pub fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

/// Status from `docker inspect --format '{{json .State}}'` output
pub fn parse_state(stdout: &str) -> ContainerStatus {
    serde_json::from_str::<serde_json::Value>(stdout.trim())
        .ok()
        .and_then(|state| {
            state
                .get("Status")
                .and_then(|s| s.as_str())
                .map(ContainerStatus::parse)
        })
        .unwrap_or_else(|| ContainerStatus::Other("unknown".to_string()))
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Container runtime driving the docker binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    options: DockerOptions,
}

impl DockerCli {
    pub fn new(options: DockerOptions) -> Self {
        Self { options }
    }

    async fn exec(&self, args: &[String]) -> Result<Output, EngineError> {
        debug!("{} {}", self.options.bin, args.join(" "));
        let output = Command::new(&self.options.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(output)
    }

    async fn materialize(context: &BuildContext, dir: &Path) -> Result<(), EngineError> {
        for (path, content) in context.files() {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }
        Ok(())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DockerOptions::default())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_exists(&self, tag: &str) -> Result<bool, EngineError> {
        let args = vec!["image".to_string(), "inspect".to_string(), tag.to_string()];
        let output = self.exec(&args).await?;
        Ok(output.status.success())
    }

    async fn build_image(
        &self,
        context: &BuildContext,
        tag: &str,
        cache_from: Option<&str>,
    ) -> Result<(), EngineError> {
        let dir = tempfile::tempdir()?;
        Self::materialize(context, dir.path()).await?;

        let output = self
            .exec(&build_args(dir.path(), tag, cache_from))
            .await?;

        if !output.status.success() {
            let combined = format!(
                "{}\n{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let tail = tail_lines(combined.trim(), BUILD_OUTPUT_LINES);
            return Err(EngineError::BuildFailure(truncate_message(
                &tail,
                MAX_ERROR_CHARS,
            )));
        }

        info!("Built image {}", tag);
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        let args = vec!["tag".to_string(), source.to_string(), target.to_string()];
        let output = self.exec(&args).await?;
        if !output.status.success() {
            return Err(EngineError::RuntimeError(format!(
                "docker tag {} {} failed: {}",
                source,
                target,
                stderr_of(&output)
            )));
        }
        Ok(())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<ContainerRef, EngineError> {
        let output = self.exec(&run_args(spec)).await?;
        if !output.status.success() {
            return Err(EngineError::RuntimeStartFailure(truncate_message(
                &stderr_of(&output),
                MAX_ERROR_CHARS,
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(EngineError::RuntimeStartFailure(format!(
                "docker run for {} returned no container id",
                spec.name
            )));
        }

        info!("Started container {} ({})", spec.name, id);
        Ok(ContainerRef(id))
    }

    async fn stop_and_remove(&self, reference: &str) -> Result<StopOutcome, EngineError> {
        let stop = self.exec(&stop_args(reference)).await?;
        if !stop.status.success() {
            let stderr = stderr_of(&stop);
            if is_not_found(&stderr) {
                debug!("Container {} already gone", reference);
                return Ok(StopOutcome::NotFound);
            }
            warn!("docker stop {} failed: {}", reference, stderr);
        }

        let rm = self.exec(&rm_args(reference)).await?;
        if !rm.status.success() {
            let stderr = stderr_of(&rm);
            if is_not_found(&stderr) {
                return Ok(StopOutcome::NotFound);
            }
            return Err(EngineError::RuntimeError(format!(
                "docker rm {} failed: {}",
                reference, stderr
            )));
        }

        Ok(StopOutcome::Removed)
    }

    async fn inspect(&self, reference: &str) -> Result<InspectReport, EngineError> {
        let output = self.exec(&inspect_args(reference)).await?;
        if !output.status.success() {
            let stderr = stderr_of(&output);
            if is_not_found(&stderr) {
                return Ok(InspectReport::not_found());
            }
            return Err(EngineError::RuntimeError(format!(
                "docker inspect {} failed: {}",
                reference, stderr
            )));
        }
        let status = parse_state(&String::from_utf8_lossy(&output.stdout));

        // Containers log to both streams
        let logs = match self.exec(&logs_args(reference, self.options.log_tail)).await {
            Ok(out) => {
                let text = format!(
                    "{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                );
                tail_lines(&text, self.options.log_tail)
            }
            Err(e) => {
                warn!("Failed to read logs of {}: {}", reference, e);
                String::new()
            }
        };

        Ok(InspectReport { status, logs })
    }
}
