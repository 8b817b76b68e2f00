//! # exit-hooks-cases
//!
//! Scripted termination scenarios. Each subcommand registers a few hooks that
//! print what they observe as JSON lines on stdout, then ends the process one
//! particular way. The integration tests run the scenarios and check the
//! printed lines and the exit status.

#![deny(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use exit_hooks::{ExitHook, TerminationDriver, TerminationReason, global, logging};
use exit_hooks_settings::load_settings;
use serde_json::json;
use tracing::info;

/// Scripted termination scenarios for exit-hooks.
#[derive(Parser, Debug)]
#[command(name = "exit-hooks-cases", about = "Scripted termination scenarios")]
struct Cli {
    /// Disable the built-in diagnostics hook.
    #[arg(long)]
    no_diagnostics: bool,

    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug, Clone)]
enum Scenario {
    /// Return from main normally.
    Trivial {
        /// Natural exit status.
        #[arg(long, default_value_t = 0)]
        code: i32,
    },
    /// Exit explicitly, still running awaitable hooks.
    Exit {
        /// Exit status.
        #[arg(long, default_value_t = 99)]
        code: i32,
    },
    /// Exit explicitly with only the final synchronous pass.
    ExitNow {
        /// Exit status.
        #[arg(long, default_value_t = 1)]
        code: i32,
    },
    /// Panic in main.
    Panic,
    /// Panic in a spawned task while main waits. Fatal only with the panic
    /// hook installed.
    SpawnedPanic,
    /// Panic in a spawned task, then handle the join error and return.
    HandledPanic,
    /// Return an error from main.
    UnhandledError,
    /// Print `ready`, then wait for a termination signal.
    WaitForSignal,
    /// Run hooks with a manual reason, then exit.
    Manual {
        /// Exit status.
        #[arg(long, default_value_t = 99)]
        code: i32,
        /// Payload handed to hooks.
        #[arg(long, default_value = "test data")]
        extra: String,
    },
    /// Register two hooks, remove both, register the second again.
    RemoveHook,
    /// A failing hook followed by one that prints.
    ThrowingHook,
}

fn emit(hook: &str, reason: &TerminationReason) {
    println!("{}", json!({ "hook": hook, "reason": reason }));
}

fn print_hook(name: &'static str) -> ExitHook {
    ExitHook::sync(name, move |reason| {
        emit(name, reason);
        Ok(())
    })
}

fn print_async_hook(name: &'static str) -> ExitHook {
    ExitHook::future(name, move |reason| async move {
        tokio::task::yield_now().await;
        emit(name, &reason);
        anyhow::Ok(())
    })
}

fn register(driver: &TerminationDriver, scenario: &Scenario) -> Result<()> {
    match scenario {
        Scenario::RemoveHook => {
            let hook1 = print_hook("1");
            let hook2 = print_hook("2");
            driver.add_exit_hook(hook1.clone())?;
            driver.add_exit_hook(hook2.clone())?;
            let _ = driver.remove_exit_hook(&hook1);
            let _ = driver.remove_exit_hook(&hook2);
            driver.add_exit_hook(hook2)?;
        }
        Scenario::ThrowingHook => {
            driver.add_exit_hook(ExitHook::sync("throws", |_| anyhow::bail!("hook failure")))?;
            driver.add_exit_hook(print_hook("after"))?;
        }
        _ => {
            driver.add_exit_hook(print_async_hook("async"))?;
            driver.add_exit_hook(print_hook("sync"))?;
        }
    }
    Ok(())
}

fn boom() {
    panic!("test error");
}

async fn play(driver: &'static TerminationDriver, scenario: Scenario) -> Result<()> {
    match scenario {
        Scenario::Trivial { code } => driver.set_exit_code(code),
        Scenario::Exit { code } => {
            let _ = driver.exit(code).await;
        }
        Scenario::ExitNow { code } => {
            let _ = driver.exit_now(code);
        }
        Scenario::Panic => boom(),
        Scenario::SpawnedPanic => {
            let _task = tokio::spawn(async { boom() });
            std::future::pending::<()>().await;
        }
        Scenario::HandledPanic => {
            if let Err(error) = tokio::spawn(async { boom() }).await {
                info!(%error, "Spawned task panicked");
            }
        }
        Scenario::UnhandledError => anyhow::bail!("test error"),
        Scenario::WaitForSignal => {
            println!("ready");
            std::future::pending::<()>().await;
        }
        Scenario::Manual { code, extra } => {
            let _ = driver.terminate_with_hooks(code, extra).await;
        }
        Scenario::RemoveHook | Scenario::ThrowingHook => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if cli.no_diagnostics {
        settings.default_diagnostics = false;
    }
    logging::init_subscriber(&settings.log_level);

    let driver = global::init(&settings);
    register(driver, &cli.scenario)?;
    info!(scenario = ?cli.scenario, "Starting scenario");

    let code = driver.run(play(driver, cli.scenario)).await;
    std::process::exit(code)
}
