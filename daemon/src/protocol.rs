/// Line protocol spoken over the loopback command port.
///
/// One request per connection: `mode:<token>\n`, answered by `OK\n`,
/// `ERROR\n` or `ERROR: <detail>\n`, after which the server closes.
use std::fmt;

use crate::error::ProtocolError;
use crate::mode::Mode;

const MODE_PREFIX: &str = "mode:";

/// Detail sent back for anything that is not a valid mode command.
pub const INVALID_COMMAND: &str = "Invalid command";

/// Builds the request line (without terminator).
pub fn request_line(mode: Mode) -> String {
    format!("{MODE_PREFIX}{}", mode.token())
}

/// Parses one request line. The prefix and token are both case-insensitive;
/// only the line terminator is removed.
pub fn parse_request(line: &str) -> Result<Mode, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    let token = line
        .get(..MODE_PREFIX.len())
        .filter(|p| p.eq_ignore_ascii_case(MODE_PREFIX))
        .map(|_| &line[MODE_PREFIX.len()..])
        .ok_or_else(|| ProtocolError::UnknownCommand(line.to_string()))?;
    token.parse()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error(Option<String>),
}

impl Response {
    pub fn invalid_command() -> Self {
        Response::Error(Some(INVALID_COMMAND.to_string()))
    }

    /// Parses a response line. Anything other than `OK` or an `ERROR` form is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "OK" {
            return Some(Response::Ok);
        }
        let rest = line.strip_prefix("ERROR")?;
        if rest.is_empty() {
            return Some(Response::Error(None));
        }
        rest.strip_prefix(':')
            .map(|detail| Response::Error(Some(detail.trim().to_string())))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::Error(None) => f.write_str("ERROR"),
            Response::Error(Some(detail)) => write!(f, "ERROR: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_mode() {
        assert_eq!(parse_request("mode:turbo\n"), Ok(Mode::Turbo));
        assert_eq!(parse_request("mode:performance\r\n"), Ok(Mode::Balanced));
        assert_eq!(parse_request("mode:silent"), Ok(Mode::Silent));
    }

    #[test]
    fn prefix_and_token_are_case_insensitive() {
        assert_eq!(parse_request("MODE:Turbo"), Ok(Mode::Turbo));
        assert_eq!(parse_request("Mode:SILENT\n"), Ok(Mode::Silent));
    }

    #[test]
    fn rejects_unknown_token() {
        assert_eq!(
            parse_request("mode:bogus"),
            Err(ProtocolError::UnknownMode("bogus".into()))
        );
        assert!(parse_request("mode:").is_err());
    }

    #[test]
    fn whitespace_around_token_is_not_stripped() {
        assert_eq!(
            parse_request("mode: turbo\n"),
            Err(ProtocolError::UnknownMode(" turbo".into()))
        );
        assert!(parse_request("mode:turbo \r\n").is_err());
    }

    #[test]
    fn rejects_other_commands() {
        assert!(matches!(parse_request("status"), Err(ProtocolError::UnknownCommand(_))));
        assert!(matches!(parse_request("mod"), Err(ProtocolError::UnknownCommand(_))));
        assert_eq!(parse_request("\n"), Err(ProtocolError::Empty));
    }

    #[test]
    fn request_line_round_trips() {
        for mode in Mode::ALL {
            assert_eq!(parse_request(&request_line(mode)), Ok(mode));
        }
    }

    #[test]
    fn response_display_forms() {
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(Response::Error(None).to_string(), "ERROR");
        assert_eq!(Response::invalid_command().to_string(), "ERROR: Invalid command");
    }

    #[test]
    fn response_parse_forms() {
        assert_eq!(Response::parse("OK\n"), Some(Response::Ok));
        assert_eq!(Response::parse("ERROR\r\n"), Some(Response::Error(None)));
        assert_eq!(Response::parse("ERROR: Invalid command"), Some(Response::invalid_command()));
        assert_eq!(Response::parse("ok"), None);
        assert_eq!(Response::parse("ERRORS"), None);
        assert_eq!(Response::parse(""), None);
    }
}
