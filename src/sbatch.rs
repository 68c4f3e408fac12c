use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::debug;

use crate::domain::{ArrayRange, JobId, Partition};
use crate::error::LaunchError;
use crate::runner::{CommandRunner, Invocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub command: Vec<String>,
    pub job_name: String,
    pub log_file: Utf8PathBuf,
    pub partition: Partition,
    pub nodes: u32,
    pub tasks: u32,
    pub array: Option<ArrayRange>,
    pub dependency: Option<JobId>,
}

impl SubmitRequest {
    pub fn new(
        command: Vec<String>,
        job_name: impl Into<String>,
        log_file: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            command,
            job_name: job_name.into(),
            log_file: log_file.into(),
            partition: Partition::Short,
            nodes: 1,
            tasks: 1,
            array: None,
            dependency: None,
        }
    }

    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn resources(mut self, nodes: u32, tasks: u32) -> Self {
        self.nodes = nodes;
        self.tasks = tasks;
        self
    }

    pub fn array(mut self, min: u32, max: u32) -> Self {
        self.array = Some(ArrayRange { min, max });
        self
    }

    pub fn after(mut self, dependency: JobId) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Scheduler arguments in fixed order: resources, partition, array,
    /// dependency, job name, log file, command.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-N".to_string(),
            self.nodes.to_string(),
            "-n".to_string(),
            self.tasks.to_string(),
            format!("--partition={}", self.partition),
        ];
        if let Some(array) = self.array {
            args.push(format!("--array={array}"));
        }
        if let Some(dependency) = self.dependency.filter(|id| id.get() > 0) {
            args.push("-d".to_string());
            args.push(dependency.to_string());
        }
        args.push("-J".to_string());
        args.push(self.job_name.clone());
        args.push("-o".to_string());
        args.push(self.log_file.to_string());
        args.extend(self.command.iter().cloned());
        args
    }
}

#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn CommandRunner>,
    sbatch: String,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CommandRunner>, sbatch: impl Into<String>) -> Self {
        Self {
            runner,
            sbatch: sbatch.into(),
        }
    }

    pub fn invocation(&self, request: &SubmitRequest) -> Invocation {
        Invocation::new(&self.sbatch).args(request.to_args())
    }

    pub fn submit(&self, request: &SubmitRequest) -> Result<JobId, LaunchError> {
        let invocation = self.invocation(request);
        debug!("submit command: {invocation}");
        let output = self
            .runner
            .run(&invocation)?
            .require_success(&self.sbatch)?;
        parse_job_id(&output.stdout).ok_or_else(|| LaunchError::UnparseableOutput {
            program: self.sbatch.clone(),
            output: output.stdout.clone(),
        })
    }
}

/// Job id from sbatch output such as `Submitted batch job 4821`: the last
/// whitespace separated token, which must be a positive integer.
pub fn parse_job_id(output: &str) -> Option<JobId> {
    output
        .split_whitespace()
        .last()?
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .map(JobId::new)
}
