//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use robot_console_daemon::DaemonConfig;

const AFTER_HELP: &str = r#"EXAMPLES:
    robot-console serve
    robot-console serve --listen 127.0.0.1:9000 --robots fleet.json
    robot-console robots --json
    robot-console completions bash > /etc/bash_completion.d/robot-console"#;

#[derive(Debug, Parser)]
#[command(name = "robot-console")]
#[command(author, version, propagate_version = true)]
#[command(about = "Run robot commands on a supervised terminal and stream it to a browser")]
#[command(after_help = AFTER_HELP)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP/WebSocket server
    Serve(ServeArgs),

    /// Print the effective robot table
    Robots {
        /// Emit JSON instead of a text listing
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Generate a shell completion script
    Completions {
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct TableArgs {
    /// JSON robot table replacing the built-in fleet
    #[arg(long, value_name = "FILE", env = "ROBOT_CONSOLE_ROBOTS")]
    pub robots: Option<PathBuf>,

    /// Directory holding the built-in fleet's scripts
    #[arg(long, value_name = "DIR", env = "ROBOT_CONSOLE_SCRIPTS_DIR")]
    pub scripts_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Allow binding a non-loopback address
    #[arg(long)]
    pub allow_remote: bool,

    #[command(flatten)]
    pub table: TableArgs,
}

impl TableArgs {
    pub fn apply(&self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(path) = &self.robots {
            config = config.with_robots_path(path.clone());
        }
        if let Some(dir) = &self.scripts_dir {
            config = config.with_scripts_dir(dir.clone());
        }
        config
    }
}

impl ServeArgs {
    pub fn apply(&self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(listen) = &self.listen {
            config = config.with_listen(listen.clone());
        }
        if self.allow_remote {
            config = config.with_allow_remote(true);
        }
        self.table.apply(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from([
            "robot-console",
            "serve",
            "--listen",
            "0.0.0.0:9000",
            "--allow-remote",
            "--scripts-dir",
            "/srv/scripts",
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("Expected Serve command, got {:?}", cli.command);
        };
        let config = args.apply(DaemonConfig::default());
        assert_eq!(config.listen(), "0.0.0.0:9000");
        assert!(config.allow_remote());
        assert_eq!(config.scripts_dir(), &PathBuf::from("/srv/scripts"));
    }

    #[test]
    fn test_robots_json_flag() {
        let cli = Cli::parse_from(["robot-console", "robots", "--json"]);
        let Commands::Robots { json, .. } = cli.command else {
            panic!("Expected Robots command, got {:?}", cli.command);
        };
        assert!(json);
    }

    #[test]
    fn test_completions_shell() {
        let cli = Cli::parse_from(["robot-console", "completions", "zsh"]);
        let Commands::Completions { shell } = cli.command else {
            panic!("Expected Completions command, got {:?}", cli.command);
        };
        assert!(matches!(shell, Shell::Zsh));
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["robot-console", "robots", "-v"]);
        assert!(cli.verbose);
    }
}
