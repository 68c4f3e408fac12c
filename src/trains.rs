use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use crate::domain::TrainId;
use crate::error::LaunchError;
use crate::runner::{CommandRunner, Invocation};

pub const ALITRAIN_BASE: &str = "/alice/cern.ch/user/a/alitrain";

const CHILD_MARKER: &str = "_child";

// Run number -> train directory, e.g. `123` -> `123_20190315-1805`.
#[derive(Debug, Clone)]
pub struct TrainDb {
    train: TrainId,
    trains: Option<BTreeMap<u32, String>>,
}

impl TrainDb {
    pub fn build(runner: &dyn CommandRunner, alien_ls: &str, train: TrainId) -> Self {
        let path = remote_train_path(&train);
        let invocation = Invocation::new(alien_ls).arg(path);
        let listing = runner
            .run(&invocation)
            .and_then(|output| output.require_success(alien_ls));
        let trains = match listing {
            Ok(output) => Some(parse_listing(&output.stdout)),
            Err(err) => {
                error!("Failed building trains DB for train {train}: {err}");
                None
            }
        };
        Self { train, trains }
    }

    pub fn from_listing(train: TrainId, listing: &str) -> Self {
        Self {
            train,
            trains: Some(parse_listing(listing)),
        }
    }

    pub fn uninitialized(train: TrainId) -> Self {
        Self {
            train,
            trains: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.trains.is_some()
    }

    pub fn identifier(&self, train_run: u32) -> Result<&str, LaunchError> {
        let trains = self.trains.as_ref().ok_or(LaunchError::Uninitialized)?;
        debug!("looking up run {train_run} of {}", self.train);
        trains
            .get(&train_run)
            .map(String::as_str)
            .ok_or(LaunchError::TrainNotFound(train_run))
    }
}

pub fn remote_train_path(train: &TrainId) -> String {
    format!("{ALITRAIN_BASE}/{}/{}", train.pwg(), train.train())
}

pub fn parse_listing(listing: &str) -> BTreeMap<u32, String> {
    let mut trains = BTreeMap::new();
    for line in listing.lines() {
        let mut entry = line.replace('/', "").trim().to_string();
        if entry.is_empty() {
            continue;
        }
        if let Some(pos) = entry.find(CHILD_MARKER) {
            entry.truncate(pos);
        }
        let run = entry.split('_').next().unwrap_or_default();
        let Ok(run) = run.parse::<u32>() else {
            warn!("skipping train directory without run number: {entry}");
            continue;
        };
        if trains.contains_key(&run) {
            debug!("{run}: ignoring duplicate {entry}");
            continue;
        }
        debug!("{run}: adding ID {entry}");
        trains.insert(run, entry);
    }
    trains
}
