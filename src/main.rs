//! # Linebell — Scheduled LINE Push Notifier
//!
//! Sends one LINE push message per invocation, guarded by a run lock so
//! overlapping triggers (cron, CI schedules) never double-send.
//!
//! Usage:
//!   linebell                          # Scheduled run (same as `linebell run`)
//!   linebell run --message "hi"       # Override the message text
//!   linebell test-send                # Load .env, send to LINE_USER_ID, print raw response
//!   linebell lock-status              # Inspect the run lock
//!   linebell unlock                   # Remove the run lock by hand

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use linebell_channels::LineNotifier;
use linebell_core::Notifier;
use linebell_core::config::{self, LinebellConfig, Profile};
use linebell_scheduler::{ExclusivityGuard, run_once};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "linebell",
    version,
    about = "🔔 Linebell — scheduled LINE push notifier"
)]
struct Cli {
    /// Config file (default: ~/.linebell/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send the scheduled notification under the run lock
    Run(RunArgs),
    /// Send a test message to LINE_USER_ID and print the raw response
    TestSend(TestSendArgs),
    /// Show whether the run lock exists and how old it is
    LockStatus(LockArgs),
    /// Remove the run lock (no error if absent)
    Unlock(LockArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Message text (overrides LINE_MESSAGE)
    #[arg(long)]
    message: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(flatten)]
    lock: LockArgs,
}

#[derive(Args)]
struct TestSendArgs {
    /// dotenv file loaded before resolving LINE_* variables
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Message text (overrides LINE_MESSAGE)
    #[arg(long)]
    message: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Default)]
struct LockArgs {
    /// Lock file path (default: .run.lock)
    #[arg(long)]
    lock_path: Option<String>,

    /// Age in seconds after which a lock is considered abandoned
    #[arg(long)]
    ttl_secs: Option<u64>,
}

impl LockArgs {
    fn apply(&self, config: &mut LinebellConfig) {
        if let Some(path) = &self.lock_path {
            config.lock.path = path.clone();
        }
        if let Some(ttl) = self.ttl_secs {
            config.lock.ttl_secs = ttl;
        }
    }
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).into_owned())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "linebell=debug,linebell_core=debug,linebell_channels=debug,linebell_scheduler=debug"
    } else {
        "linebell=info,linebell_channels=info,linebell_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref().map(expand_path);
    let mut config = LinebellConfig::load(config_path.as_deref())?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => scheduled_run(&mut config, args, config::process_env).await,
        Command::TestSend(args) => {
            let mut stdout = std::io::stdout();
            test_send(&mut config, args, config::process_env, &mut stdout).await
        }
        Command::LockStatus(args) => lock_status(&mut config, &args),
        Command::Unlock(args) => unlock(&mut config, &args),
    }
}

async fn scheduled_run<F>(config: &mut LinebellConfig, args: RunArgs, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    args.lock.apply(config);
    if args.timeout_secs.is_some() {
        config.line.timeout_secs = args.timeout_secs;
    }

    // Resolve before touching the lock: a missing value leaves nothing behind.
    let profile = config::SCHEDULED;
    let request = config.resolve_request(&profile, env, args.message.as_deref())?;
    let notifier = notifier_for(config, &profile)?;
    let guard = ExclusivityGuard::from_config(&config.lock)?;

    run_once(&guard, &notifier, &request).await?;
    Ok(())
}

/// Manual connectivity check: loads the dotenv file, sends once and writes
/// the provider's status and raw body to `out` whatever the outcome.
async fn test_send<F, W>(
    config: &mut LinebellConfig,
    args: TestSendArgs,
    env: F,
    out: &mut W,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let env_file = expand_path(&args.env_file);
    match dotenvy::from_path(&env_file) {
        Ok(()) => tracing::debug!("Loaded {}", env_file.display()),
        Err(e) if e.not_found() => {
            tracing::debug!("No {} found, using process env", env_file.display())
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to load {}", env_file.display())),
    }
    if args.timeout_secs.is_some() {
        config.line.timeout_secs = args.timeout_secs;
    }

    let profile = config::MANUAL_TEST;
    let request = config.resolve_request(&profile, env, args.message.as_deref())?;
    let notifier = notifier_for(config, &profile)?;

    let outcome = notifier.push(&request).await?;
    writeln!(out, "status: {}", outcome.status())?;
    writeln!(out, "{}", outcome.body())?;
    outcome.into_result()?;
    Ok(())
}

fn lock_status(config: &mut LinebellConfig, args: &LockArgs) -> Result<()> {
    args.apply(config);
    let guard = ExclusivityGuard::from_config(&config.lock)?;

    match guard.inspect()? {
        None => println!("🔓 No run lock at {}", guard.path().display()),
        Some(record) => {
            let state = if record.is_stale(guard.ttl()) { "stale" } else { "held" };
            println!("🔒 Run lock at {} ({state})", record.path.display());
            match record.owner_pid {
                Some(pid) => println!("   Owner pid: {pid}"),
                None => println!("   Owner pid: unknown"),
            }
            println!("   Modified:  {}", record.modified.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("   Age:       {}s (ttl {}s)", record.age.as_secs(), guard.ttl().as_secs());
        }
    }
    Ok(())
}

fn unlock(config: &mut LinebellConfig, args: &LockArgs) -> Result<()> {
    args.apply(config);
    let guard = ExclusivityGuard::from_config(&config.lock)?;
    guard.release()?;
    println!("🔓 Run lock {} removed", guard.path().display());
    Ok(())
}

fn notifier_for(config: &LinebellConfig, profile: &Profile) -> Result<LineNotifier> {
    let timeout = config.timeout(profile)?;
    Ok(LineNotifier::from_config(&config.line, timeout)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebell_core::LinebellError;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn run_args(lock_path: &std::path::Path) -> RunArgs {
        RunArgs {
            lock: LockArgs {
                lock_path: Some(lock_path.to_string_lossy().into_owned()),
                ttl_secs: None,
            },
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::parse_from(["linebell"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);

        let cli = Cli::parse_from(["linebell", "run", "--message", "hi", "--ttl-secs", "60"]);
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.message.as_deref(), Some("hi"));
                assert_eq!(args.lock.ttl_secs, Some(60));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_test_send_defaults() {
        let cli = Cli::parse_from(["linebell", "test-send", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Some(Command::TestSend(args)) => assert_eq!(args.env_file, ".env"),
            _ => panic!("expected test-send"),
        }
    }

    #[tokio::test]
    async fn test_missing_recipient_leaves_no_lock_and_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".run.lock");
        let mut config = LinebellConfig::default();
        // Unroutable: any HTTP attempt would surface as a transport error.
        config.line.endpoint = "http://127.0.0.1:9/v2/bot/message/push".into();

        let env = env_of(&[("LINE_CHANNEL_ACCESS_TOKEN", "tok")]);
        let err = scheduled_run(&mut config, run_args(&lock_path), env)
            .await
            .unwrap_err();

        match err.downcast_ref::<LinebellError>() {
            Some(LinebellError::ConfigMissing(key)) => assert_eq!(key, "LINE_TO"),
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_held_lock_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".run.lock");
        std::fs::write(&lock_path, "4242").unwrap();
        let mut config = LinebellConfig::default();
        config.line.endpoint = "http://127.0.0.1:9/v2/bot/message/push".into();

        let env = env_of(&[("LINE_CHANNEL_ACCESS_TOKEN", "tok"), ("LINE_TO", "U1")]);
        let err = scheduled_run(&mut config, run_args(&lock_path), env)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LinebellError>(),
            Some(LinebellError::LockHeld { .. })
        ));
        assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), "4242");
    }

    fn test_send_args(env_file: &std::path::Path) -> TestSendArgs {
        TestSendArgs {
            env_file: env_file.to_string_lossy().into_owned(),
            message: None,
            timeout_secs: Some(2),
        }
    }

    /// Fake provider answering every push with 401 and a JSON error body.
    async fn spawn_rejecting_provider() -> String {
        let app = axum::Router::new().route(
            "/v2/bot/message/push",
            axum::routing::post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    r#"{"message":"invalid token"}"#,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v2/bot/message/push")
    }

    #[tokio::test]
    async fn test_send_without_env_file_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LinebellConfig::default();
        config.line.endpoint = "http://127.0.0.1:9/v2/bot/message/push".into();

        let env = env_of(&[("LINE_CHANNEL_ACCESS_TOKEN", "tok"), ("LINE_USER_ID", "U1")]);
        let args = test_send_args(&dir.path().join("nope.env"));
        let mut out = Vec::new();
        let err = test_send(&mut config, args, env, &mut out)
            .await
            .unwrap_err();

        // Got past config resolution and failed on the wire.
        assert!(matches!(
            err.downcast_ref::<LinebellError>(),
            Some(LinebellError::Transport(_))
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_send_rejected_prints_status_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LinebellConfig::default();
        config.line.endpoint = spawn_rejecting_provider().await;

        let env = env_of(&[("LINE_CHANNEL_ACCESS_TOKEN", "tok"), ("LINE_USER_ID", "U1")]);
        let args = test_send_args(&dir.path().join(".env"));
        let mut out = Vec::new();
        let err = test_send(&mut config, args, env, &mut out)
            .await
            .unwrap_err();

        match err.downcast_ref::<LinebellError>() {
            Some(LinebellError::DispatchRejected { status, body }) => {
                assert_eq!(*status, 401);
                assert_eq!(body, r#"{"message":"invalid token"}"#);
            }
            other => panic!("expected DispatchRejected, got {other:?}"),
        }
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "status: 401\n{\"message\":\"invalid token\"}\n");
    }

    #[tokio::test]
    async fn test_send_missing_user_id_is_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LinebellConfig::default();
        config.line.endpoint = "http://127.0.0.1:9/v2/bot/message/push".into();

        // LINE_TO is for scheduled runs only.
        let env = env_of(&[("LINE_CHANNEL_ACCESS_TOKEN", "tok"), ("LINE_TO", "U1")]);
        let args = test_send_args(&dir.path().join(".env"));
        let mut out = Vec::new();
        let err = test_send(&mut config, args, env, &mut out)
            .await
            .unwrap_err();

        match err.downcast_ref::<LinebellError>() {
            Some(LinebellError::ConfigMissing(key)) => assert_eq!(key, "LINE_USER_ID"),
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".run.lock");
        let args = LockArgs {
            lock_path: Some(lock_path.to_string_lossy().into_owned()),
            ttl_secs: None,
        };
        let mut config = LinebellConfig::default();

        std::fs::write(&lock_path, "1").unwrap();
        unlock(&mut config, &args).unwrap();
        assert!(!lock_path.exists());
        unlock(&mut config, &args).unwrap();
    }
}
