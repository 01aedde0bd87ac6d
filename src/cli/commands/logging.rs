use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order, so a name maps to its `-v` count.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a count `0..=5` or a level name; both resolve to the `-v` count.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|level: &str| -> Result<u8, String> {
        let level = level.trim();
        if let Ok(count) = level.parse::<u8>() {
            return if count <= 5 {
                Ok(count)
            } else {
                Err(format!("log level must be between 0 and 5, got {count}"))
            };
        }
        LEVEL_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(level))
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("invalid log level: {level}"))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("STAYKEY_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(level: &str) -> Result<u8, clap::Error> {
        Command::new("staykey")
            .arg(
                Arg::new("level")
                    .long("level")
                    .value_parser(validator_log_level()),
            )
            .try_get_matches_from(["staykey", "--level", level])
            .map(|matches| matches.get_one::<u8>("level").copied().unwrap_or_default())
    }

    #[test]
    fn names_and_counts_are_accepted() {
        assert_eq!(parse("ERROR").ok(), Some(0));
        assert_eq!(parse("debug").ok(), Some(3));
        assert_eq!(parse("5").ok(), Some(5));
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(parse("6").is_err());
        assert!(parse("loud").is_err());
    }
}
