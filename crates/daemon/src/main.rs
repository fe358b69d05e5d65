// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use vqm_core::CourseConfig;
use vqm_daemon::cli::CliArgs;
use vqm_daemon::{course_config_path, redirect};

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match CliArgs::parse(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &cli.stdin_file {
        if let Err(e) = redirect::redirect_stdin(path) {
            eprintln!("failed to redirect stdin: {e}");
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.stdout_file {
        if let Err(e) = redirect::redirect_stdout(path) {
            eprintln!("failed to redirect stdout: {e}");
            std::process::exit(1);
        }
    }
    if let Some(path) = &cli.stderr_file {
        if let Err(e) = redirect::redirect_stderr(path) {
            eprintln!("failed to redirect stderr: {e}");
            std::process::exit(1);
        }
    }

    // Logging is set up after redirection so its non-blocking writer
    // inherits whatever fd 1 now points at.
    let _log_guard = vqm_daemon::logging::init();

    let config_path = course_config_path(&cli.course_id);
    let config = match CourseConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(course_id = %cli.course_id, path = %config_path.display(), error = %e, "failed to load course config");
            std::process::exit(1);
        }
    };

    if let Err(e) = vqm_daemon::run(config).await {
        tracing::error!(error = %e, "queue manager exited with an error");
        std::process::exit(1);
    }
}
