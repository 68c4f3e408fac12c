use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::LaunchError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrainId {
    pwg: String,
    train: String,
}

impl TrainId {
    pub fn pwg(&self) -> &str {
        &self.pwg
    }

    pub fn train(&self) -> &str {
        &self.train
    }
}

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pwg, self.train)
    }
}

impl FromStr for TrainId {
    type Err = LaunchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (pwg, train) = trimmed
            .split_once('/')
            .ok_or_else(|| LaunchError::InvalidTrain(value.to_string()))?;
        let is_valid = !pwg.is_empty() && !train.is_empty() && !train.contains('/');
        if !is_valid {
            return Err(LaunchError::InvalidTrain(value.to_string()));
        }
        Ok(Self {
            pwg: pwg.to_string(),
            train: train.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Long,
    Short,
    Vip,
    LoginOnly,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Long => "long",
            Partition::Short => "short",
            Partition::Vip => "vip",
            Partition::LoginOnly => "loginOnly",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPartition(pub String);

impl FromStr for Partition {
    type Err = UnknownPartition;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "long" => Ok(Partition::Long),
            "short" => Ok(Partition::Short),
            "vip" => Ok(Partition::Vip),
            "loginOnly" => Ok(Partition::LoginOnly),
            _ => Err(UnknownPartition(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub min: u32,
    pub max: u32,
}

impl fmt::Display for ArrayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}
