/// Command-line parsing for the daemon binary.
///
/// `-mode <token>` keeps the single-dash spelling existing shortcuts and
/// scripts already use; `--mode` is accepted as well.
use std::path::PathBuf;

use crate::error::CliError;
use crate::mode::Mode;

pub const USAGE: &str = "usage: perfmode-daemon [-mode turbo|performance|silent] [--config <path>]";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LaunchArgs {
    /// Mode to hand to a running instance, or to apply locally after startup.
    pub mode: Option<Mode>,
    /// Overrides the default config file location.
    pub config_path: Option<PathBuf>,
}

/// Parses arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<LaunchArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = LaunchArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg.eq_ignore_ascii_case("-mode") || arg.eq_ignore_ascii_case("--mode") {
            let value = args.next().ok_or(CliError::MissingValue("-mode"))?;
            parsed.mode = Some(value.parse()?);
        } else if arg == "--config" {
            let value = args.next().ok_or(CliError::MissingValue("--config"))?;
            parsed.config_path = Some(PathBuf::from(value));
        } else {
            return Err(CliError::UnknownArgument(arg));
        }
    }
    Ok(parsed)
}
