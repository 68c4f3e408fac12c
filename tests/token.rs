use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{FixedOffset, Local, NaiveDate, TimeDelta, TimeZone};

use mc_train_launcher::error::LaunchError;
use mc_train_launcher::runner::{CommandOutput, CommandRunner, Invocation};
use mc_train_launcher::token::{TOKEN_TIME_FORMAT, TokenLayout, TokenManager, TokenPaths};

struct ScriptedRunner {
    responses: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    fn with(responses: Vec<CommandOutput>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.program.clone())
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, LaunchError> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::failure(127, "unexpected command")))
    }
}

fn token_info(expires_in: TimeDelta) -> CommandOutput {
    let now = Local::now().naive_local();
    CommandOutput::success(format!(
        "DN >>> /C=ch/O=AliEn2/CN=Users/CN=jdoe\n\
         ISSUER >>> /C=ch/O=AliEn2/CN=JAliEn CA\n\
         SERIAL >>> 1234\n\
         BEGIN >>> {}\n\
         EXPIRE >>> {}\n",
        (now - TimeDelta::hours(20)).format(TOKEN_TIME_FORMAT),
        (now + expires_in).format(TOKEN_TIME_FORMAT),
    ))
}

struct Fixture {
    _temp: tempfile::TempDir,
    layout: TokenLayout,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let tmp_dir = root.join("tmp");
        fs::create_dir_all(tmp_dir.as_std_path()).unwrap();
        let layout = TokenLayout {
            token_dir: root.join("tokens"),
            tmp_dir,
            uid: 1000,
        };
        Self {
            _temp: temp,
            layout,
        }
    }

    fn manager(&self, runner: Arc<ScriptedRunner>) -> TokenManager {
        TokenManager::new(self.layout.clone(), runner, "alien-token-info", "alien-token-init")
    }

    fn write(paths: &TokenPaths, content: &str) {
        fs::create_dir_all(paths.cert.parent().unwrap().as_std_path()).unwrap();
        fs::write(paths.cert.as_std_path(), format!("cert {content}")).unwrap();
        fs::write(paths.key.as_std_path(), format!("key {content}")).unwrap();
    }
}

#[test]
fn token_file_names_carry_uid() {
    let fixture = Fixture::new();
    let persisted = fixture.layout.persisted();
    assert!(persisted.cert.ends_with("tokens/tokencert_1000.pem"));
    assert!(persisted.key.ends_with("tokens/tokenkey_1000.pem"));
    assert!(fixture.layout.scratch().cert.ends_with("tmp/tokencert_1000.pem"));
}

#[test]
fn missing_files_skip_introspection() {
    let fixture = Fixture::new();
    let runner = ScriptedRunner::with(vec![]);
    let manager = fixture.manager(runner.clone());

    assert_eq!(manager.check_existing().unwrap(), None);
    assert!(runner.programs().is_empty());
}

#[test]
fn token_valid_for_three_hours_is_reused() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    let runner = ScriptedRunner::with(vec![token_info(TimeDelta::hours(3))]);
    let manager = fixture.manager(runner.clone());

    let paths = manager.check_existing().unwrap();
    assert_eq!(paths, Some(fixture.layout.persisted()));

    let calls = runner.calls.lock().unwrap();
    let persisted = fixture.layout.persisted();
    assert_eq!(calls[0].program, "alien-token-info");
    assert!(calls[0]
        .env
        .contains(&("JALIEN_TOKEN_CERT".to_string(), persisted.cert.to_string())));
    assert!(calls[0]
        .env
        .contains(&("JALIEN_TOKEN_KEY".to_string(), persisted.key.to_string())));
}

#[test]
fn token_expiring_within_margin_is_rejected() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    let runner = ScriptedRunner::with(vec![token_info(TimeDelta::minutes(90))]);
    let manager = fixture.manager(runner);

    assert_eq!(manager.check_existing().unwrap(), None);
}

#[test]
fn expiry_is_read_in_the_given_zone() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    let info = || CommandOutput::success("EXPIRE >>> 2026-03-28 12:00:00\n");
    let runner = ScriptedRunner::with(vec![info(), info()]);
    let manager = fixture.manager(runner);
    let local = NaiveDate::from_ymd_opt(2026, 3, 28)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();

    let cet = FixedOffset::east_opt(3600).unwrap();
    let now = cet.from_local_datetime(&local).unwrap();
    assert_eq!(
        manager.check_existing_at(&now).unwrap(),
        Some(fixture.layout.persisted())
    );

    let later = now + TimeDelta::minutes(90);
    assert_eq!(manager.check_existing_at(&later).unwrap(), None);
}

#[test]
fn failing_introspection_is_an_error() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    let runner = ScriptedRunner::with(vec![CommandOutput::failure(1, "token invalid")]);
    let manager = fixture.manager(runner);

    let err = manager.check_existing().unwrap_err();
    assert!(err.is_external_failure());
    assert_matches!(err, LaunchError::CommandFailed { .. });
}

#[test]
fn recreate_overwrites_persisted_token() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    Fixture::write(&fixture.layout.scratch(), "fresh");
    let runner = ScriptedRunner::with(vec![CommandOutput::success("")]);
    let manager = fixture.manager(runner.clone());

    let paths = manager.recreate().unwrap();
    assert_eq!(paths, fixture.layout.persisted());
    assert_eq!(fs::read_to_string(paths.cert.as_std_path()).unwrap(), "cert fresh");
    assert_eq!(fs::read_to_string(paths.key.as_std_path()).unwrap(), "key fresh");
    assert_eq!(runner.programs(), vec!["alien-token-init"]);
}

#[test]
fn recreate_creates_token_dir() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.scratch(), "fresh");
    let manager = fixture.manager(ScriptedRunner::with(vec![CommandOutput::success("")]));

    let paths = manager.recreate().unwrap();
    assert!(paths.exist());
}

#[test]
fn recreate_fails_when_issuance_fails() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.scratch(), "stale");
    let manager = fixture.manager(ScriptedRunner::with(vec![CommandOutput::failure(2, "no cert")]));

    let err = manager.recreate().unwrap_err();
    assert!(err.is_external_failure());
    assert!(!fixture.layout.persisted().exist());
}

#[test]
fn recreate_fails_without_fresh_files() {
    let fixture = Fixture::new();
    let manager = fixture.manager(ScriptedRunner::with(vec![CommandOutput::success("")]));

    let err = manager.recreate().unwrap_err();
    assert_matches!(err, LaunchError::Filesystem(_));
}

#[test]
fn obtain_renews_expiring_token() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    Fixture::write(&fixture.layout.scratch(), "fresh");
    let runner = ScriptedRunner::with(vec![
        token_info(TimeDelta::minutes(30)),
        CommandOutput::success(""),
    ]);
    let manager = fixture.manager(runner.clone());

    let paths = manager.obtain().unwrap();
    assert_eq!(runner.programs(), vec!["alien-token-info", "alien-token-init"]);
    assert_eq!(fs::read_to_string(paths.cert.as_std_path()).unwrap(), "cert fresh");
}

#[test]
fn obtain_keeps_valid_token() {
    let fixture = Fixture::new();
    Fixture::write(&fixture.layout.persisted(), "old");
    let runner = ScriptedRunner::with(vec![token_info(TimeDelta::hours(12))]);
    let manager = fixture.manager(runner.clone());

    let paths = manager.obtain().unwrap();
    assert_eq!(runner.programs(), vec!["alien-token-info"]);
    assert_eq!(fs::read_to_string(paths.cert.as_std_path()).unwrap(), "cert old");
}
