//! Role selection from the process's own arguments.
//!
//! The parent spawns the daemon as `<exe> --<flag>=true <original args…>`.
//! Only the role flag is parsed here; every other argument belongs to the
//! host application and is carried through untouched so the relaunched
//! instance sees the same command line the parent had.

use std::ffi::{OsStr, OsString};

use clap::builder::BoolishValueParser;
use clap::{Arg, ArgAction, Command};
use molt_core::Role;

use crate::error::DaemonError;

/// How this process was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub role: Role,
    /// Arguments after the program name, minus the role flag.
    pub passthrough: Vec<OsString>,
}

impl Invocation {
    /// Parse [`std::env::args_os`].
    pub fn from_env(flag: &str) -> Result<Self, DaemonError> {
        Self::parse(flag, std::env::args_os())
    }

    /// Parse a full argument vector, program name first.
    pub fn parse<I>(flag: &str, args: I) -> Result<Self, DaemonError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let program = args.next().unwrap_or_else(|| OsString::from("updater"));

        let (role_args, passthrough): (Vec<OsString>, Vec<OsString>) =
            args.partition(|arg| is_role_arg(arg, flag));

        let matches = Command::new("updater")
            .disable_help_flag(true)
            .disable_version_flag(true)
            .arg(
                Arg::new("role")
                    .long(flag.to_string())
                    .help("Run as the update daemon")
                    .num_args(0..=1)
                    .require_equals(true)
                    .default_value("false")
                    .default_missing_value("true")
                    .value_parser(BoolishValueParser::new())
                    .action(ArgAction::Set),
            )
            .try_get_matches_from(std::iter::once(program).chain(role_args))?;

        let is_child = matches.get_one::<bool>("role").copied().unwrap_or(false);
        Ok(Self {
            role: Role::from_flag(is_child),
            passthrough,
        })
    }
}

/// The argument the parent prepends when spawning the daemon.
pub fn role_arg(flag: &str) -> OsString {
    OsString::from(format!("--{flag}=true"))
}

fn is_role_arg(arg: &OsStr, flag: &str) -> bool {
    let Some(arg) = arg.to_str() else {
        return false;
    };
    let Some(rest) = arg.strip_prefix("--").and_then(|a| a.strip_prefix(flag)) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('=')
}
