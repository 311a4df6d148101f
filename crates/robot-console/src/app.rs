#![expect(clippy::print_stderr, reason = "CLI errors are emitted here")]

//! CLI application layer and composition root.

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;
use robot_console_daemon::{
    ConfigError, DaemonConfig, RobotTable, ServerError, bind_listener, build_state, serve,
};
use tracing::{debug, info};

use crate::cli::{Cli, Commands, ServeArgs, TableArgs};
use crate::telemetry;

const PROGRAM_NAME: &str = "robot-console";

/// Exit codes following sysexits.h.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const CONFIG: i32 = 78;
}

#[derive(Debug, Default)]
pub struct Application;

impl Application {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self) -> Result<i32> {
        let exit_code = match self.execute(Cli::parse()) {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => self.handle_error(e),
        };
        Ok(exit_code)
    }

    fn execute(&self, cli: Cli) -> Result<()> {
        let default_level = match (&cli.command, cli.verbose) {
            (_, true) => "debug",
            (Commands::Serve(_), false) => "info",
            _ => "warn",
        };
        let _telemetry = telemetry::init_tracing(default_level);
        debug!(command = ?cli.command, "CLI command parsed");

        match &cli.command {
            Commands::Serve(args) => self.serve(args),
            Commands::Robots { json, table } => self.print_robots(table, *json),
            Commands::Completions { shell } => {
                let mut cmd = Cli::command();
                generate(*shell, &mut cmd, PROGRAM_NAME, &mut io::stdout());
                Ok(())
            }
        }
    }

    fn serve(&self, args: &ServeArgs) -> Result<()> {
        let config = args.apply(DaemonConfig::from_env());
        let state = build_state(&config).context("failed to load robot table")?;
        let (listener, addr) =
            bind_listener(&config).with_context(|| format!("failed to bind {}", config.listen()))?;
        info!(addr = %addr, robots_path = ?config.robots_path(), "Starting robot console");

        let shutdown = Arc::new(AtomicBool::new(false));
        #[cfg(unix)]
        let _signals = robot_console_daemon::signal_handler::SignalHandler::setup(Arc::clone(
            &shutdown,
        ))
        .context("failed to install signal handler")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("robot-console-rt")
            .build()
            .context("failed to build tokio runtime")?;
        runtime
            .block_on(serve(listener, state, shutdown))
            .context("server stopped with an error")?;
        info!("Robot console stopped");
        Ok(())
    }

    fn print_robots(&self, table_args: &TableArgs, json: bool) -> Result<()> {
        let config = table_args.apply(DaemonConfig::from_env());
        let table = config
            .load_robot_table()
            .context("failed to load robot table")?;
        let mut out = io::stdout().lock();
        if json {
            serde_json::to_writer_pretty(&mut out, table.robots())?;
            writeln!(out)?;
        } else {
            write_robot_listing(&mut out, &table)?;
        }
        Ok(())
    }

    fn handle_error(&self, e: anyhow::Error) -> i32 {
        eprintln!("{PROGRAM_NAME}: Error: {e:#}");
        let is_config = |cause: &(dyn std::error::Error + 'static)| {
            cause.downcast_ref::<ConfigError>().is_some()
                || matches!(
                    cause.downcast_ref::<ServerError>(),
                    Some(ServerError::Config(_))
                )
        };
        if e.chain().any(is_config) {
            return exit_codes::CONFIG;
        }
        if e.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<ServerError>(),
                Some(ServerError::InvalidListen { .. })
            )
        }) {
            return exit_codes::USAGE;
        }
        exit_codes::GENERAL_ERROR
    }
}

fn write_robot_listing(out: &mut impl Write, table: &RobotTable) -> io::Result<()> {
    for robot in table.robots() {
        writeln!(out, "{} ({})", robot.id, robot.name)?;
        writeln!(out, "  validate: {}", robot.validation_script.join(" "))?;
        for (index, command) in robot.commands.iter().enumerate() {
            writeln!(
                out,
                "  [{index}] {}: {}",
                command.label,
                command.command_args.join(" ")
            )?;
        }
    }
    Ok(())
}
