use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::{config::OperatorConfig, generate, get_version};

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case", about, version = get_version())]
pub struct Opts {
    #[command(flatten)]
    pub root: RootOpts,

    #[command(subcommand)]
    pub sub_command: Option<SubCommand>,
}

impl Opts {
    pub fn get_matches() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    pub const fn log_level(&self) -> &'static str {
        // One-shot commands print their result on stdout; keep the log quiet by default.
        let (quiet_level, verbose_level) = match self.sub_command {
            Some(SubCommand::Crd | SubCommand::Generate(_)) => {
                if self.root.verbose == 0 {
                    (self.root.quiet.saturating_add(1), self.root.verbose)
                } else {
                    (self.root.quiet, self.root.verbose - 1)
                }
            }
            None => (self.root.quiet, self.root.verbose),
        };
        match quiet_level {
            0 => match verbose_level {
                0 => "info",
                1 => "debug",
                2..=255 => "trace",
            },
            1 => "warn",
            2 => "error",
            3..=255 => "off",
        }
    }
}

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
pub struct RootOpts {
    #[command(flatten)]
    pub operator: OperatorConfig,

    /// Enable more detailed internal logging. Repeat to increase level. Overridden by `--quiet`.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Reduce detail of internal logging. Repeat to reduce further. Overrides `--verbose`.
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Set the logging format
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Control when ANSI terminal formatting is used.
    ///
    /// By default the operator detects whether `stdout` is a terminal and enables ANSI
    /// formatting if it is.
    #[arg(long, default_value = "auto", env = "LOG_COLOR")]
    pub color: Color,
}

impl RootOpts {
    pub fn use_color(&self) -> bool {
        match self.color {
            Color::Auto => std::io::IsTerminal::is_terminal(&std::io::stdout()),
            Color::Always => true,
            Color::Never => false,
        }
    }

    pub const fn json(&self) -> bool {
        matches!(self.log_format, LogFormat::Json)
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum SubCommand {
    /// Print the custom resource definitions the operator serves, as YAML, then exit.
    Crd,

    /// Render the collector configuration for a forwarder manifest, then exit.
    Generate(generate::Opts),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Auto,
    Always,
    Never,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
