//! exec-session binary entry point.

use std::process::ExitCode;

use exec_session::cli::{self, Runtime, Subcommand};
use exec_session::config::Config;
use exec_session::{logging, CommandSpec, Host, Session, TransferMeta};
use serde_json::json;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'exec-session --help' for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let Some(command) = args.command.clone() else {
        cli::print_help();
        return ExitCode::from(2);
    };

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_filter(config.log_filter()).ok();

    let session = match config.build_session() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(target_kind = config.target.kind.as_str(), "exec-session v{}", env!("CARGO_PKG_VERSION"));

    if matches!(command, Subcommand::Push { .. }) {
        if let Err(e) = config.check_push() {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    tokio::select! {
        outcome = run(&session, command) => match outcome {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            ExitCode::from(130)
        }
    }
}

async fn run(session: &Session, command: Subcommand) -> Result<ExitCode, BoxError> {
    match command {
        Subcommand::Run { script } => {
            let result = session.run_command(script, None).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(status(result.success()))
        }
        Subcommand::Exists { path } => {
            let exists = session.exists(&path, None, None).await;
            println!("{}", exists);
            Ok(status(exists))
        }
        Subcommand::Version { runtime } => {
            let version = match runtime {
                Runtime::Php => session.php_sem_ver().await?,
                Runtime::Javac => session.javac_sem_ver().await?,
                Runtime::Scalac => session.scalac_sem_ver().await?,
                Runtime::Node => session.node_sem_ver().await?,
                Runtime::Iojs => session.iojs_sem_ver().await?,
            };
            println!("{}", version);
            Ok(ExitCode::SUCCESS)
        }
        Subcommand::Ping { hosts } => {
            let hosts = hosts
                .iter()
                .map(|h| h.parse::<Host>())
                .collect::<Result<Vec<_>, _>>()?;
            let results = session.ping_all(&hosts, None, None).await;

            let mut all_up = true;
            let report: Vec<_> = hosts
                .iter()
                .zip(results)
                .map(|(host, result)| match result {
                    Ok(out) => {
                        all_up &= out.success();
                        json!({ "host": host, "up": out.success(), "exit_code": out.exit_code })
                    }
                    Err(e) => {
                        all_up = false;
                        json!({ "host": host, "up": false, "error": e.to_string() })
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(status(all_up))
        }
        Subcommand::Push { local, remote } => {
            session.push(&TransferMeta::default(), &local, &remote).await?;
            info!(local = %local.display(), remote = %remote, "Pushed file");
            Ok(ExitCode::SUCCESS)
        }
        Subcommand::Spec { json } => {
            let spec: CommandSpec = serde_json::from_str(&json)?;
            let result = session.run_spec(&spec, None).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
