use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info};

use crate::catalog::SampleCatalog;
use crate::config::{ResolvedConfig, Tools};
use crate::domain::{JobId, Partition, TrainId};
use crate::error::LaunchError;
use crate::runner::CommandRunner;
use crate::sbatch::{Scheduler, SubmitRequest};
use crate::trains::TrainDb;

const MERGE_SCRIPT: &str = "merge/submitMergeRun.py";

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub repo: Utf8PathBuf,
    pub output_base: Utf8PathBuf,
    pub merge_repo: Utf8PathBuf,
    pub download_script: String,
    pub tools: Tools,
}

impl LaunchSettings {
    pub fn from_config(repo: Utf8PathBuf, output_base: Utf8PathBuf, config: &ResolvedConfig) -> Self {
        Self {
            repo,
            output_base,
            merge_repo: config.merge_repo.clone(),
            download_script: config.download_script.clone(),
            tools: config.tools.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSubmission {
    pub sample: String,
    pub download_job: JobId,
    pub merge_job: Option<JobId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchSummary {
    pub year: u32,
    pub train_run: String,
    pub samples: Vec<SampleSubmission>,
}

pub struct LaunchHandler {
    settings: LaunchSettings,
    legotrain: String,
    train_run: Option<String>,
    partition_download: Partition,
    cert: Option<Utf8PathBuf>,
    key: Option<Utf8PathBuf>,
    catalog: SampleCatalog,
    scheduler: Scheduler,
}

impl LaunchHandler {
    pub fn new(
        settings: LaunchSettings,
        legotrain: &str,
        train_run: u32,
        catalog: SampleCatalog,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let resolved = legotrain.parse::<TrainId>().and_then(|train| {
            let db = TrainDb::build(runner.as_ref(), &settings.tools.alien_ls, train);
            db.identifier(train_run).map(str::to_string)
        });
        let train_run = match resolved {
            Ok(id) => {
                info!("Train run {train_run} resolved to {id}");
                Some(id)
            }
            Err(err) => {
                error!("{err}");
                None
            }
        };
        let scheduler = Scheduler::new(runner, settings.tools.sbatch.clone());

        Self {
            settings,
            legotrain: legotrain.trim().to_string(),
            train_run,
            partition_download: Partition::Long,
            cert: None,
            key: None,
            catalog,
            scheduler,
        }
    }

    pub fn train_run(&self) -> Option<&str> {
        self.train_run.as_deref()
    }

    pub fn partition_for_download(&self) -> Partition {
        self.partition_download
    }

    // Names outside the allow-list keep the current partition.
    pub fn set_partition_for_download(&mut self, name: &str) {
        if let Ok(partition) = name.parse() {
            self.partition_download = partition;
        }
    }

    pub fn set_credentials(&mut self, cert: impl Into<Utf8PathBuf>, key: impl Into<Utf8PathBuf>) {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
    }

    /// Stops at the first failed download submission. Jobs already submitted
    /// stay in the queue.
    pub fn submit(&self, year: u32, subsample: &str) -> Result<LaunchSummary, LaunchError> {
        let Some(train_run) = self.train_run.as_deref() else {
            error!("Failed initializing train run");
            return Err(LaunchError::TrainRunUnresolved);
        };
        let Some(samples) = self.catalog.samples(year) else {
            error!("No sample for year {year}");
            return Err(LaunchError::UnknownYear(year));
        };
        if !subsample.is_empty() && !self.catalog.contains(year, subsample) {
            error!("Requested subsample {subsample} not found for year {year} ...");
            return Err(LaunchError::UnknownSubsample {
                year,
                sample: subsample.to_string(),
            });
        }

        let mut summary = LaunchSummary {
            year,
            train_run: train_run.to_string(),
            samples: Vec::new(),
        };
        for sample in samples
            .iter()
            .filter(|sample| subsample.is_empty() || *sample == subsample)
        {
            let download_job = self
                .submit_download(sample)
                .inspect_err(|err| error!("Download of {sample} not submitted: {err}"))?;
            info!("Submitting download job with ID: {download_job}");

            let merge_job = match self.submit_merge(sample, download_job) {
                Ok(id) => {
                    info!("Submitting merge job with ID: {id} (waiting for {download_job})");
                    Some(id)
                }
                Err(err) => {
                    error!("Merge of {sample} not submitted: {err}");
                    None
                }
            };
            summary.samples.push(SampleSubmission {
                sample: sample.clone(),
                download_job,
                merge_job,
            });
        }
        Ok(summary)
    }

    pub fn submit_download(&self, sample: &str) -> Result<JobId, LaunchError> {
        let (Some(cert), Some(key)) = (&self.cert, &self.key) else {
            error!("Alien token not provided - cannot download ...");
            return Err(LaunchError::MissingCredentials);
        };
        let train_run = self
            .train_run
            .as_deref()
            .ok_or(LaunchError::TrainRunUnresolved)?;

        let output_dir = self.sample_dir(sample);
        ensure_output_dir(&output_dir)?;

        let executable = self.settings.repo.join(&self.settings.download_script);
        let command = vec![
            executable.to_string(),
            self.settings.repo.to_string(),
            output_dir.to_string(),
            sample.to_string(),
            format!("{}/{}", self.legotrain, train_run),
            cert.to_string(),
            key.to_string(),
        ];
        let request = SubmitRequest::new(
            command,
            format!("down_{sample}"),
            output_dir.join("download.log"),
        )
        .partition(self.partition_download)
        .resources(1, 4);
        self.scheduler.submit(&request)
    }

    pub fn submit_merge(&self, sample: &str, wait_for: JobId) -> Result<JobId, LaunchError> {
        let work_dir = self.sample_dir(sample);
        let executable = self.settings.merge_repo.join(MERGE_SCRIPT);
        let command = vec![
            executable.to_string(),
            work_dir.to_string(),
            "-w".to_string(),
            wait_for.to_string(),
        ];
        let request = SubmitRequest::new(
            command,
            format!("merge_{sample}"),
            work_dir.join("merge.log"),
        )
        .partition(Partition::Short);
        self.scheduler.submit(&request)
    }

    fn sample_dir(&self, sample: &str) -> Utf8PathBuf {
        self.settings.output_base.join(sample)
    }
}

fn ensure_output_dir(dir: &Utf8Path) -> Result<(), LaunchError> {
    if dir.as_std_path().is_dir() {
        return Ok(());
    }
    if dir.as_std_path().exists() {
        return Err(LaunchError::Filesystem(format!(
            "{dir} exists and is not a directory"
        )));
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(dir.as_std_path())
        .map_err(|err| LaunchError::Filesystem(format!("create {dir}: {err}")))
}
