use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chores",
    version,
    about = "chorelog: track recurring chores and see what is overdue",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a chore
    Add(AddArgs),
    /// Overdue banner followed by the chore table
    List {
        /// Include archived chores
        #[arg(long)]
        all: bool,
    },
    /// Show one chore with its completion history
    Info { id: u64 },
    /// Change fields of a chore
    Modify(ModifyArgs),
    /// Hide a chore from the default listing
    Archive { id: u64 },
    /// Bring an archived chore back
    Unarchive { id: u64 },
    /// Permanently remove a chore and its completions
    Delete { id: u64 },
    /// Log that a chore was done
    Done(DoneArgs),
    /// Edit or remove logged completions
    #[command(subcommand)]
    Completion(CompletionCommand),
    /// List overdue chores that have notifications on
    Overdue,
    /// Print chores with status as JSON
    Export {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Expected days between completions
    #[arg(long = "interval")]
    pub interval_days: Option<u32>,

    #[arg(long = "no-notify")]
    pub no_notify: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ModifyArgs {
    pub id: u64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long = "clear-description")]
    pub clear_description: bool,

    #[arg(long = "interval", conflicts_with = "clear_interval")]
    pub interval_days: Option<u32>,

    #[arg(long = "clear-interval")]
    pub clear_interval: bool,

    #[arg(long, value_enum)]
    pub notify: Option<Toggle>,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DoneArgs {
    pub id: u64,

    /// When it was done, e.g. `yesterday`, `-2d`, `7pm`, `2026-01-10T19:00`
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CompletionCommand {
    Edit {
        /// Completion uuid or unique prefix
        reference: String,

        #[arg(long)]
        at: Option<String>,

        #[arg(long, conflicts_with = "clear_note")]
        note: Option<String>,

        #[arg(long = "clear-note")]
        clear_note: bool,
    },
    Delete {
        reference: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Maps a `default.command` config value onto a subcommand.
pub fn default_command(name: &str) -> anyhow::Result<Command> {
    match name.trim() {
        "list" => Ok(Command::List { all: false }),
        "overdue" => Ok(Command::Overdue),
        "export" => Ok(Command::Export { all: false }),
        other => Err(anyhow!(
            "default.command must be list, overdue or export, got: {other}"
        )),
    }
}
