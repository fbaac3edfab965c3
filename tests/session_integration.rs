//! Session integration tests.
//!
//! These tests drive a [`Session`] over a recording transport and check the
//! exact command strings sent, the errors raised, and the events emitted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;

use exec_session::execution::VersionPattern;
use exec_session::{
    CommandEvent, CommandOptions, CommandSpec, ExecutionResult, Host, Invocation,
    LocalCopyTransfer, Script, Session, SessionError, TarArgs, TransferMeta, Transport,
    TransportError,
};

// ============================================================================
// Recording transport
// ============================================================================

type Responder = dyn Fn(&str) -> Result<ExecutionResult, TransportError> + Send + Sync;

struct State {
    sent: Mutex<Vec<(String, Option<CommandOptions>)>>,
    respond: Box<Responder>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Clone)]
struct Recorder {
    state: Arc<State>,
}

impl Recorder {
    fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<ExecutionResult, TransportError> + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(State {
                sent: Mutex::new(Vec::new()),
                respond: Box::new(respond),
                delay: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    fn ok() -> Self {
        Self::new(|_| Ok(ExecutionResult::new(0, "", "")))
    }

    fn exit(code: i32) -> Self {
        Self::new(move |_| Ok(ExecutionResult::new(code, "", "")))
    }

    fn with_delay<F>(delay: Duration, respond: F) -> Self
    where
        F: Fn(&str) -> Result<ExecutionResult, TransportError> + Send + Sync + 'static,
    {
        let mut recorder = Self::new(respond);
        if let Some(state) = Arc::get_mut(&mut recorder.state) {
            state.delay = Some(delay);
        }
        recorder
    }

    fn commands(&self) -> Vec<String> {
        self.state
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    fn last_options(&self) -> Option<CommandOptions> {
        self.state
            .sent
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, opts)| opts.clone())
    }

    fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn send(
        &self,
        command: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult, TransportError> {
        self.state
            .sent
            .lock()
            .unwrap()
            .push((command.to_string(), options.cloned()));

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.state.delay {
            tokio::time::sleep(delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.state.respond)(command)
    }
}

fn session(recorder: &Recorder) -> Session {
    Session::new(recorder.clone(), CommandOptions::new())
}

// ============================================================================
// Command formatting
// ============================================================================

#[tokio::test]
async fn test_mkdir_flag_rules() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    session.mkdir("/srv/app", None, None).await.unwrap();
    session.mkdir("/srv/app", Some(""), None).await.unwrap();
    session.mkdir("/srv/app", Some("pv"), None).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec!["mkdir -p /srv/app", "mkdir /srv/app", "mkdir -pv /srv/app"]
    );
}

#[tokio::test]
async fn test_file_builders() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    session.pwd(None, None).await.unwrap();
    session.symlink("/srv/releases/42", "/srv/current", None, None).await.unwrap();
    session.readlink("/srv/current", Some("f"), None).await.unwrap();
    session.rm("/tmp/old", Some("rf"), None).await.unwrap();
    session.ls(None, None, None).await.unwrap();
    session.cat("/etc/hostname", None, None).await.unwrap();
    session.chown("/srv/app", "www", "www", Some("R"), None).await.unwrap();
    session.chmod("/srv/app/run.sh", "755", None, None).await.unwrap();
    session.rename("a.conf", "b.conf", None, None).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec![
            "pwd",
            "ln -nfs /srv/releases/42 /srv/current",
            "readlink -f /srv/current",
            "rm -rf /tmp/old",
            "ls",
            "cat /etc/hostname",
            "chown -R www:www /srv/app",
            "chmod 755 /srv/app/run.sh",
            "mv a.conf b.conf",
        ]
    );
}

#[tokio::test]
async fn test_extract_and_wget() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    session.extract("app.tgz", "/srv", None, None).await.unwrap();
    session
        .extract("app.tgz", "/srv", Some(&TarArgs::default()), None)
        .await
        .unwrap();
    session
        .extract(
            "app.tar.bz2",
            "/srv",
            Some(&TarArgs::flags("xjf").post_args("--strip-components=1")),
            None,
        )
        .await
        .unwrap();
    session
        .wget("https://example.com/app.tgz", "/tmp/app.tgz", Some("q"), None)
        .await
        .unwrap();

    assert_eq!(
        recorder.commands(),
        vec![
            "tar app.tgz -C /srv",
            "tar -xzf app.tgz -C /srv",
            "tar -xjf app.tar.bz2 -C /srv --strip-components=1",
            "wget -q -O /tmp/app.tgz https://example.com/app.tgz",
        ]
    );
}

#[tokio::test]
async fn test_extract_spec_matches_builder() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let bare: CommandSpec = serde_json::from_str(
        r#"{"method":"extract","args":{"filename":"app.tgz","output_dir":"/srv"}}"#,
    )
    .unwrap();
    session.run_spec(&bare, None).await.unwrap();
    session.extract("app.tgz", "/srv", None, None).await.unwrap();

    let strip = CommandSpec::new(Invocation::Extract {
        filename: "app.tgz".to_string(),
        output_dir: "/srv".to_string(),
        args: None,
        post_args: Some("--strip-components=1".to_string()),
    });
    session.run_spec(&strip, None).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec![
            "tar app.tgz -C /srv",
            "tar app.tgz -C /srv",
            "tar -xzf app.tgz -C /srv --strip-components=1",
        ]
    );
}

#[tokio::test]
async fn test_missing_argument_sends_nothing() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let err = session.mkdir("", None, None).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingArgument("dirname")));

    let err = session.chown("/srv", "www", "", None, None).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingArgument("group")));

    assert!(recorder.commands().is_empty());
}

// ============================================================================
// Service control
// ============================================================================

#[tokio::test]
async fn test_service_and_supervisorctl() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    session.service("nginx", "reload", None).await.unwrap();
    session.supervisorctl("worker", "restart", None).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec!["service nginx reload", "supervisorctl restart worker"]
    );
}

#[tokio::test]
async fn test_invalid_action_sends_nothing() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let err = session.service("nginx", "bogus", None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidAction(ref a) if a == "bogus"));

    let err = session.supervisorctl("worker", "kill", None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidAction(_)));

    assert!(recorder.commands().is_empty());
}

// ============================================================================
// run_command and command specs
// ============================================================================

#[tokio::test]
async fn test_spec_exit_code_rejected() {
    let recorder = Recorder::exit(1);
    let session = session(&recorder);

    let spec = CommandSpec::new(Invocation::Pwd { flags: None }).exit_codes([0]);
    let err = session.run_command(spec, None).await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidExitCode(Some(1))));
    assert_eq!(err.to_string(), "invalid exit code: 1");
    assert_eq!(recorder.commands(), vec!["pwd"]);
}

#[tokio::test]
async fn test_spec_rejects_signal_terminated_run() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::signaled("SIGKILL", "", "")));
    let session = session(&recorder);

    let spec = CommandSpec::new(Invocation::Pwd { flags: None }).exit_codes([0]);
    let err = session.run_command(spec, None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidExitCode(None)));
    assert_eq!(err.to_string(), "invalid exit code: null");

    // no policy: the signaled result comes back untouched
    let spec = CommandSpec::new(Invocation::Pwd { flags: None });
    let result = session.run_command(spec, None).await.unwrap();
    assert_eq!(result.exit_code, None);
    assert_eq!(result.signal.as_deref(), Some("SIGKILL"));
}

#[tokio::test]
async fn test_spec_exit_code_allowed() {
    let recorder = Recorder::exit(2);
    let session = session(&recorder);

    let spec = CommandSpec::new(Invocation::Run {
        script: "grep -q x /etc/hosts".to_string(),
    })
    .exit_codes([0, 2]);
    let result = session.run_command(spec, None).await.unwrap();
    assert_eq!(result.exit_code, Some(2));

    // without a policy any exit code is returned as-is
    let result = session.run_command("false", None).await.unwrap();
    assert_eq!(result.exit_code, Some(2));
}

#[tokio::test]
async fn test_spec_from_json_dispatches_to_builder() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let spec: CommandSpec = serde_json::from_str(
        r#"{"method":"symlink","args":{"src":"/a","dest":"/b","flags":"s"},"exit_codes":[0]}"#,
    )
    .unwrap();
    session.run_spec(&spec, None).await.unwrap();

    assert_eq!(recorder.commands(), vec!["ln -s /a /b"]);
}

#[tokio::test]
async fn test_spec_validation_errors_pass_through() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let spec = CommandSpec::new(Invocation::Service {
        name: "nginx".to_string(),
        action: "explode".to_string(),
    });
    let err = session.run_command(spec, None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidAction(_)));
    assert!(recorder.commands().is_empty());
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    let recorder = Recorder::new(|_| Err(TransportError::Ssh("connection reset".to_string())));
    let session = session(&recorder);

    let err = session.run_command("uptime", None).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Ssh(ref msg)) if msg == "connection reset"
    ));
    assert_eq!(err.to_string(), TransportError::Ssh("connection reset".into()).to_string());
}

#[tokio::test]
async fn test_replace_then_run() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    let template = Script::from(Invocation::Mkdir {
        dirname: "/srv/<app>/<release>".to_string(),
        flags: None,
    });
    let values: HashMap<String, String> = [("app", "shop"), ("release", "42")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let cmd = Session::replace_cmd_args(&template, &values);
    session.run_command(cmd, None).await.unwrap();

    assert_eq!(recorder.commands(), vec!["mkdir -p /srv/shop/42"]);
}

// ============================================================================
// Options
// ============================================================================

#[tokio::test]
async fn test_no_options_sends_none() {
    let recorder = Recorder::ok();
    let session = session(&recorder);

    session.run_command("uptime", None).await.unwrap();
    assert_eq!(recorder.last_options(), None);

    session
        .run_command("uptime", Some(&CommandOptions::new()))
        .await
        .unwrap();
    assert_eq!(recorder.last_options(), None);
}

#[tokio::test]
async fn test_options_merge_call_over_defaults() {
    let recorder = Recorder::ok();
    let defaults = CommandOptions::new()
        .working_dir("/srv/app")
        .env("APP_ENV", "production")
        .env("LANG", "C");
    let session = Session::new(recorder.clone(), defaults);

    let call = CommandOptions::new()
        .env("APP_ENV", "staging")
        .timeout(Duration::from_secs(5));
    session.ls(Some("."), None, Some(&call)).await.unwrap();

    let sent = recorder.last_options().unwrap();
    assert_eq!(sent.working_dir.as_deref(), Some(std::path::Path::new("/srv/app")));
    assert_eq!(sent.env.get("APP_ENV").map(String::as_str), Some("staging"));
    assert_eq!(sent.env.get("LANG").map(String::as_str), Some("C"));
    assert_eq!(sent.timeout_secs, Some(5));

    // defaults are untouched by the call
    assert_eq!(
        session.cmd_opts().env.get("APP_ENV").map(String::as_str),
        Some("production")
    );
}

// ============================================================================
// exists
// ============================================================================

#[tokio::test]
async fn test_exists() {
    let recorder = Recorder::new(|cmd| {
        let code = if cmd.ends_with("/present") { 0 } else { 2 };
        Ok(ExecutionResult::new(code, "", ""))
    });
    let session = session(&recorder);

    assert!(session.exists("/present", None, None).await);
    assert!(!session.exists("/absent", None, None).await);
    assert!(session.exists("/present", Some("d"), None).await);

    assert_eq!(
        recorder.commands(),
        vec!["ls /present", "ls /absent", "ls -d /present"]
    );
}

#[tokio::test]
async fn test_exists_never_errors() {
    let recorder = Recorder::new(|_| Err(TransportError::Timeout(Duration::from_secs(1))));
    let session = session(&recorder);

    assert!(!session.exists("/anything", None, None).await);
    assert!(!session.exists("", None, None).await);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_start_and_finish_events() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(0, "up 3 days", "")));
    let session = session(&recorder);
    let mut events = session.subscribe();

    session.run_command("uptime", None).await.unwrap();

    let start = events.try_recv().unwrap();
    assert_eq!(start.phase(), "start");
    assert_eq!(start.script(), "uptime");

    match events.try_recv().unwrap() {
        CommandEvent::Finish { script, result, .. } => {
            assert_eq!(script, "uptime");
            assert_eq!(result.stdout, "up 3 days");
        }
        other => panic!("expected finish, got {:?}", other),
    }

    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_no_finish_event_on_transport_error() {
    let recorder = Recorder::new(|_| Err(TransportError::Rpc("agent gone".to_string())));
    let session = session(&recorder);
    let mut events = session.subscribe();

    assert!(session.run_command("uptime", None).await.is_err());

    assert_eq!(events.try_recv().unwrap().phase(), "start");
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_builder_events_carry_built_command() {
    let recorder = Recorder::ok();
    let session = Session::new(recorder.clone(), CommandOptions::new().working_dir("/srv"));
    let mut events = session.subscribe();

    session.mkdir("logs", None, None).await.unwrap();

    match events.try_recv().unwrap() {
        CommandEvent::Start { script, options } => {
            assert_eq!(script, "mkdir -p logs");
            assert_eq!(options, Some(CommandOptions::new().working_dir("/srv")));
        }
        other => panic!("expected start, got {:?}", other),
    }
}

// ============================================================================
// Ping
// ============================================================================

#[tokio::test]
async fn test_ping_flags() {
    let recorder = Recorder::ok();
    let session = session(&recorder);
    let host = Host::parse("10.0.0.1").unwrap();

    session.ping(&host, None, None).await.unwrap();
    session.ping(&host, Some(""), None).await.unwrap();
    session.ping(&host, Some("-c 3"), None).await.unwrap();

    assert_eq!(
        recorder.commands(),
        vec!["ping -c 1 -w 1 10.0.0.1", "ping -c 1 -w 1 10.0.0.1", "ping -c 3 10.0.0.1"]
    );
}

#[tokio::test]
async fn test_ping_all_bounded_and_ordered() {
    let recorder = Recorder::with_delay(Duration::from_millis(20), |cmd| {
        let host = cmd.rsplit(' ').next().unwrap_or_default().to_string();
        let code = if host.ends_with(".7") { 1 } else { 0 };
        Ok(ExecutionResult::new(code, host, ""))
    });
    let session = session(&recorder).with_ping_concurrency(3);

    let hosts: Vec<Host> = (1..=12)
        .map(|i| Host::parse(format!("10.0.0.{i}")).unwrap())
        .collect();
    let results = session.ping_all(&hosts, None, None).await;

    assert_eq!(results.len(), 12);
    assert!(recorder.max_in_flight() <= 3);
    assert!(recorder.max_in_flight() >= 1);
    for (host, result) in hosts.iter().zip(&results) {
        let result = result.as_ref().unwrap();
        assert_eq!(result.stdout, host.as_str());
    }
    assert_eq!(results[6].as_ref().unwrap().exit_code, Some(1));
}

#[tokio::test]
async fn test_ping_all_failures_are_per_host() {
    let recorder = Recorder::new(|cmd| {
        if cmd.ends_with("db1") {
            Err(TransportError::Timeout(Duration::from_secs(1)))
        } else {
            Ok(ExecutionResult::new(0, "", ""))
        }
    });
    let session = session(&recorder);
    let hosts = vec![
        Host::parse("web1").unwrap(),
        Host::parse("db1").unwrap(),
        Host::parse("web2").unwrap(),
    ];

    let results = session.ping_all(&hosts, None, None).await;
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(SessionError::Transport(TransportError::Timeout(_)))
    ));
    assert!(results[2].is_ok());
}

#[test]
fn test_ping_from_blocking_context() {
    let recorder = Recorder::ok();
    let session = session(&recorder);
    let host = Host::parse("gateway.local").unwrap();

    let result = tokio_test::block_on(session.ping(&host, None, None));
    tokio_test::assert_ok!(result);
    assert_eq!(recorder.commands(), vec!["ping -c 1 -w 1 gateway.local"]);
}

#[test]
fn test_host_rejects_shell_text() {
    assert!(Host::parse("10.0.0.1; rm -rf /").is_err());
    assert!(Host::parse("").is_err());
    assert!("example.com".parse::<Host>().is_ok());
}

// ============================================================================
// Version probes
// ============================================================================

#[tokio::test]
async fn test_javac_version_from_stderr() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(0, "", "javac 1.8.0_131\n")));
    let session = session(&recorder);

    assert_eq!(session.javac_sem_ver().await.unwrap(), "1.8.0-131");
    assert_eq!(recorder.commands(), vec!["javac -version"]);
}

#[tokio::test]
async fn test_node_and_php_versions() {
    let recorder = Recorder::new(|cmd| {
        let out = match cmd {
            "node -v" => "v20.11.1\n",
            "php -v" => "PHP 8.2.7 (cli) (built: Jun  8 2023)\nCopyright (c) The PHP Group\n",
            _ => "",
        };
        Ok(ExecutionResult::new(0, out, ""))
    });
    let session = session(&recorder);

    assert_eq!(session.node_sem_ver().await.unwrap(), "20.11.1");
    assert_eq!(session.php_sem_ver().await.unwrap(), "8.2.7");
}

#[tokio::test]
async fn test_version_not_found() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(0, "something else", "")));
    let session = session(&recorder);

    let err = session.scalac_sem_ver().await.unwrap_err();
    assert!(matches!(err, SessionError::CommandNotFound(ref cmd) if cmd == "scalac -version"));
    assert_eq!(err.to_string(), "\"scalac -version\" not found");
}

#[tokio::test]
async fn test_version_probe_failed() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(127, "", "sh: iojs: not found")));
    let session = session(&recorder);

    let err = session.iojs_sem_ver().await.unwrap_err();
    assert!(matches!(err, SessionError::ProbeFailed { .. }));
    assert_eq!(err.to_string(), " sh: iojs: not found");
}

#[tokio::test]
async fn test_find_sem_ver_custom_pattern() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(0, "tool\nversion 3.1.4\n", "")));
    let session = session(&recorder);
    let pattern = exec_session::execution::version_pattern(r"^version (\d+\.\d+\.\d+)").unwrap();

    assert_eq!(session.find_sem_ver("tool --version", &pattern).await.unwrap(), "3.1.4");
}

#[tokio::test]
async fn test_find_sem_ver_ignores_case() {
    let recorder = Recorder::new(|_| Ok(ExecutionResult::new(0, "TOOL VERSION 3.1.4\n", "")));
    let session = session(&recorder);
    let pattern: VersionPattern = r"^tool version (\d+\.\d+\.\d+)".parse().unwrap();

    assert_eq!(session.find_sem_ver("tool --version", &pattern).await.unwrap(), "3.1.4");
}

// ============================================================================
// push
// ============================================================================

#[tokio::test]
async fn test_push_uses_transfer_not_transport() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("release.tgz");
    tokio::fs::write(&src, b"archive").await.unwrap();
    let dest = dir.path().join("deployed.tgz");

    let recorder = Recorder::ok();
    let session = session(&recorder).with_transfer(LocalCopyTransfer);
    let meta = TransferMeta::default();

    session
        .push(&meta, &src, &dest.to_string_lossy())
        .await
        .unwrap();

    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"archive");
    assert!(recorder.commands().is_empty());
    assert!(meta.path.is_none());
}

#[tokio::test]
async fn test_push_requires_destination() {
    let recorder = Recorder::ok();
    let session = session(&recorder).with_transfer(LocalCopyTransfer);

    let err = session
        .push(&TransferMeta::default(), std::path::Path::new("/tmp/x"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::MissingArgument("remote_dest")));
}

#[tokio::test]
async fn test_push_transfer_error_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::ok();
    let session = session(&recorder).with_transfer(LocalCopyTransfer);

    let err = session
        .push(
            &TransferMeta::default(),
            &dir.path().join("missing.tgz"),
            &dir.path().join("out.tgz").to_string_lossy(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transfer(_)));
}
