// CommandSettings: parses CLI arguments, with SYNCHROFEED_CONFIG as the
// fallback for the settings file path.

use std::env;

use synchrofeed_common::constants::{variables, DEFAULT_CONFIG_FILE};

/// Prefix of the single-token config form, `-config:<path>`.
const CONFIG_COLON_PREFIX: &str = "-config:";

/// Top-level command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Listen until stopped (default).
    Run,
    /// Load settings, resolve the queue, exit.
    Check,
    Help,
    Version,
}

/// Parsed command settings from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    command: Command,
    config: Option<String>,
    /// Arguments that were not understood.
    unknown: Vec<String>,
}

impl CommandSettings {
    /// Parse from the process command line.
    pub fn parse() -> Self {
        let raw_args: Vec<String> = env::args().skip(1).collect();
        Self::parse_from(&raw_args)
    }

    /// Parse from the given argument list.
    pub fn parse_from(args: &[String]) -> Self {
        let mut command = None;
        let mut config = None;
        let mut unknown = Vec::new();
        let mut help = false;
        let mut version = false;
        let mut i = 0;

        while i < args.len() {
            let arg = args[i].as_str();
            let lower = arg.to_ascii_lowercase();

            if lower.starts_with(CONFIG_COLON_PREFIX) {
                config = Some(arg[CONFIG_COLON_PREFIX.len()..].to_string());
            } else if lower == "--config" || lower == "-config" {
                match args.get(i + 1) {
                    Some(value) => {
                        config = Some(value.clone());
                        i += 1;
                    }
                    None => unknown.push(arg.to_string()),
                }
            } else if let Some(value) = lower.strip_prefix("--config=") {
                config = Some(arg[arg.len() - value.len()..].to_string());
            } else if matches!(lower.as_str(), "--help" | "-h" | "-?" | "help") {
                help = true;
            } else if matches!(lower.as_str(), "--version" | "-v" | "version") {
                version = true;
            } else if command.is_none() && lower == "run" {
                command = Some(Command::Run);
            } else if command.is_none() && lower == "check" {
                command = Some(Command::Check);
            } else {
                unknown.push(arg.to_string());
            }
            i += 1;
        }

        let command = if help {
            Command::Help
        } else if version {
            Command::Version
        } else {
            command.unwrap_or(Command::Run)
        };

        Self {
            command,
            config: config.filter(|c| !c.trim().is_empty()),
            unknown,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn unknown_args(&self) -> &[String] {
        &self.unknown
    }

    /// Settings file argument: CLI, then `SYNCHROFEED_CONFIG`, then `app.json`.
    pub fn config_file(&self) -> String {
        self.config_file_with(|name| env::var(name).ok())
    }

    pub fn config_file_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.config
            .clone()
            .or_else(|| lookup(variables::CONFIG).filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
    }

    /// Usage text for `--help`.
    pub fn usage() -> String {
        format!(
            "Usage: synchrofeed-listener [run|check] [-config:<path> | --config <path>]\n\
             \n\
             Commands:\n\
             \x20 run        Listen for feed events until stopped (default)\n\
             \x20 check      Load settings, resolve the queue and exit\n\
             \n\
             Options:\n\
             \x20 -config:<path>  Settings file (default {DEFAULT_CONFIG_FILE}, env {})\n\
             \x20 --help          Show this text\n\
             \x20 --version       Show the version\n",
            variables::CONFIG
        )
    }
}
