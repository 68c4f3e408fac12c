use std::fs;
use std::sync::{Arc, LazyLock};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone};
use nix::unistd::{User, getuid};
use regex::Regex;
use tempfile::Builder;
use tracing::{debug, error, info, warn};

use crate::error::LaunchError;
use crate::runner::{CommandRunner, Invocation};

pub const VALIDITY_MARGIN_HOURS: i64 = 2;

pub const TOKEN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CERT_ENV: &str = "JALIEN_TOKEN_CERT";
const KEY_ENV: &str = "JALIEN_TOKEN_KEY";

static TOKEN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]+)\s*>>>\s*(.*?)\s*$").unwrap());

/// Grid token as reported by `alien-token-info`. Timestamps are wall-clock
/// local time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlienToken {
    pub dn: String,
    pub issuer: String,
    pub begin: Option<NaiveDateTime>,
    pub expire: Option<NaiveDateTime>,
}

impl AlienToken {
    pub fn expires_in<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<TimeDelta, LaunchError> {
        let expire = self.expire.ok_or(LaunchError::MissingExpiry)?;
        let expire = now
            .timezone()
            .from_local_datetime(&expire)
            .earliest()
            .ok_or_else(|| {
                LaunchError::InvalidTimestamp(expire.format(TOKEN_TIME_FORMAT).to_string())
            })?;
        Ok(expire.naive_utc() - now.naive_utc())
    }

    pub fn is_usable<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        match self.expires_in(now) {
            Ok(left) if left > validity_margin() => true,
            Ok(left) => {
                info!("Token expires in {} minutes", left.num_minutes());
                false
            }
            Err(err) => {
                warn!("{err}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPaths {
    pub cert: Utf8PathBuf,
    pub key: Utf8PathBuf,
}

impl TokenPaths {
    pub fn in_dir(dir: &Utf8Path, uid: u32) -> Self {
        Self {
            cert: dir.join(format!("tokencert_{uid}.pem")),
            key: dir.join(format!("tokenkey_{uid}.pem")),
        }
    }

    pub fn exist(&self) -> bool {
        self.cert.as_std_path().exists() && self.key.as_std_path().exists()
    }
}

#[derive(Debug, Clone)]
pub struct TokenLayout {
    pub token_dir: Utf8PathBuf,
    pub tmp_dir: Utf8PathBuf,
    pub uid: u32,
}

impl TokenLayout {
    pub fn for_current_user(
        token_dir: Option<Utf8PathBuf>,
        tmp_dir: Utf8PathBuf,
    ) -> Result<Self, LaunchError> {
        let uid = getuid().as_raw();
        let token_dir = match token_dir {
            Some(dir) => dir,
            None => Utf8PathBuf::from("/software")
                .join(current_user()?.name)
                .join("tokens"),
        };
        Ok(Self {
            token_dir,
            tmp_dir,
            uid,
        })
    }

    pub fn persisted(&self) -> TokenPaths {
        TokenPaths::in_dir(&self.token_dir, self.uid)
    }

    pub fn scratch(&self) -> TokenPaths {
        TokenPaths::in_dir(&self.tmp_dir, self.uid)
    }
}

pub struct TokenManager {
    layout: TokenLayout,
    runner: Arc<dyn CommandRunner>,
    info_tool: String,
    init_tool: String,
}

impl TokenManager {
    pub fn new(
        layout: TokenLayout,
        runner: Arc<dyn CommandRunner>,
        info_tool: impl Into<String>,
        init_tool: impl Into<String>,
    ) -> Self {
        Self {
            layout,
            runner,
            info_tool: info_tool.into(),
            init_tool: init_tool.into(),
        }
    }

    pub fn obtain(&self) -> Result<TokenPaths, LaunchError> {
        if let Some(paths) = self.check_existing()? {
            return Ok(paths);
        }
        info!("No valid tokens found, recreating ...");
        self.recreate()
    }

    pub fn check_existing(&self) -> Result<Option<TokenPaths>, LaunchError> {
        self.check_existing_at(&Local::now())
    }

    pub fn check_existing_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Option<TokenPaths>, LaunchError> {
        let paths = self.layout.persisted();
        if !paths.exist() {
            warn!("Either token certificate or key missing in {}", self.layout.token_dir);
            return Ok(None);
        }

        let token = self.token_info(&paths)?;
        debug!(
            "token for {} issued by {}, expires {:?}",
            token.dn, token.issuer, token.expire
        );
        Ok(token.is_usable(now).then_some(paths))
    }

    pub fn token_info(&self, paths: &TokenPaths) -> Result<AlienToken, LaunchError> {
        let invocation = Invocation::new(&self.info_tool)
            .env(CERT_ENV, paths.cert.as_str())
            .env(KEY_ENV, paths.key.as_str());
        let output = self
            .runner
            .run(&invocation)
            .and_then(|output| output.require_success(&self.info_tool))
            .inspect_err(|_| {
                error!("Tokenfiles {} and {} invalid ...", paths.cert, paths.key);
            })?;
        parse_token_info(&output.stdout)
    }

    pub fn recreate(&self) -> Result<TokenPaths, LaunchError> {
        self.runner
            .run(&Invocation::new(&self.init_tool))?
            .require_success(&self.init_tool)?;

        let scratch = self.layout.scratch();
        if !scratch.exist() {
            return Err(LaunchError::Filesystem(format!(
                "{} did not produce {} and {}",
                self.init_tool, scratch.cert, scratch.key
            )));
        }

        let persisted = self.layout.persisted();
        copy_file_atomic(&scratch.cert, &persisted.cert)?;
        copy_file_atomic(&scratch.key, &persisted.key)?;
        info!("Token written to {}", self.layout.token_dir);
        Ok(persisted)
    }
}

pub fn parse_token_info(text: &str) -> Result<AlienToken, LaunchError> {
    let mut token = AlienToken::default();
    for line in text.lines() {
        let Some(caps) = TOKEN_LINE.captures(line) else {
            continue;
        };
        let value = &caps[2];
        match &caps[1] {
            "DN" => token.dn = value.to_string(),
            "ISSUER" => token.issuer = value.to_string(),
            "BEGIN" => token.begin = Some(parse_time(value)?),
            "EXPIRE" => token.expire = Some(parse_time(value)?),
            _ => {}
        }
    }
    Ok(token)
}

fn validity_margin() -> TimeDelta {
    TimeDelta::hours(VALIDITY_MARGIN_HOURS)
}

fn parse_time(value: &str) -> Result<NaiveDateTime, LaunchError> {
    NaiveDateTime::parse_from_str(value, TOKEN_TIME_FORMAT)
        .map_err(|_| LaunchError::InvalidTimestamp(value.to_string()))
}

fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), LaunchError> {
    let parent = dest
        .parent()
        .ok_or_else(|| LaunchError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| LaunchError::Filesystem(format!("create {parent}: {err}")))?;
    let temp = Builder::new()
        .prefix(".token")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LaunchError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| LaunchError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| LaunchError::Filesystem(err.to_string()))?;
    Ok(())
}

fn current_user() -> Result<User, LaunchError> {
    let uid = getuid();
    User::from_uid(uid)
        .map_err(|err| LaunchError::UserLookup(format!("uid {uid}: {err}")))?
        .ok_or_else(|| LaunchError::UserLookup(format!("no passwd entry for uid {uid}")))
}
