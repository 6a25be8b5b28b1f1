//! Exit-token wire format and the exit listener state machine.
//!
//! A token is ASCII text split on whitespace. Only the first field matters and
//! it must be a base-10 signed integer: `"0\n"` exits 0, `"137 killed\n"`
//! exits 137.

use thiserror::Error;

/// A payload arrived on the exit channel but did not carry a usable code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedExitTokenError {
    #[error("exit token has no fields")]
    Empty,
    #[error("exit token field {field:?} is not a base-10 integer")]
    NotAnInteger { field: String },
}

/// Parse the exit code out of one read from the exit channel.
pub fn parse_exit_token(payload: &[u8]) -> Result<i32, MalformedExitTokenError> {
    let text = String::from_utf8_lossy(payload);
    let field = text
        .split_whitespace()
        .next()
        .ok_or(MalformedExitTokenError::Empty)?;
    field
        .parse::<i32>()
        .map_err(|_| MalformedExitTokenError::NotAnInteger {
            field: field.to_string(),
        })
}

/// Render a token a listener will accept.
pub fn format_exit_token(code: i32, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("{code} {reason}\n"),
        None => format!("{code}\n"),
    }
}

/// Exit listener states.
///
/// `Waiting` until a read yields bytes that parse, `GotToken` once they do,
/// `Done` after the code has been handed to the caller. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Waiting,
    GotToken(i32),
    Done(i32),
}

impl ListenerState {
    /// Feed the bytes returned by one read attempt (empty for "nothing yet").
    ///
    /// A malformed payload returns the error and the caller stays in the
    /// current state.
    pub fn on_read(self, payload: &[u8]) -> Result<Self, MalformedExitTokenError> {
        match self {
            Self::Waiting if payload.is_empty() => Ok(Self::Waiting),
            Self::Waiting => parse_exit_token(payload).map(Self::GotToken),
            other => Ok(other),
        }
    }

    /// Hand the token over, moving `GotToken` to `Done`.
    pub fn complete(self) -> Self {
        match self {
            Self::GotToken(code) => Self::Done(code),
            other => other,
        }
    }

    /// The exit code, once the listener is done.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Self::Done(code) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_field_is_the_exit_code() {
        assert_eq!(parse_exit_token(b"0\n"), Ok(0));
        assert_eq!(parse_exit_token(b"137 killed\n"), Ok(137));
        assert_eq!(parse_exit_token(b"  5\treason-text\n"), Ok(5));
        assert_eq!(parse_exit_token(b"-1\n"), Ok(-1));
    }

    #[test]
    fn malformed_tokens_are_reported() {
        assert_eq!(
            parse_exit_token(b"abc 1\n"),
            Err(MalformedExitTokenError::NotAnInteger {
                field: "abc".to_string()
            })
        );
        assert_eq!(
            parse_exit_token(b" \n\t"),
            Err(MalformedExitTokenError::Empty)
        );
        assert!(parse_exit_token(b"99999999999\n").is_err());
    }

    #[test]
    fn formatted_tokens_parse_back() {
        assert_eq!(format_exit_token(5, Some("reason text")), "5 reason text\n");
        assert_eq!(format_exit_token(0, Some("  ")), "0\n");
        assert_eq!(parse_exit_token(format_exit_token(42, None).as_bytes()), Ok(42));
    }

    #[test]
    fn listener_waits_through_empty_and_malformed_reads() {
        let state = ListenerState::Waiting;
        let state = state.on_read(b"").expect("empty read");
        assert_eq!(state, ListenerState::Waiting);

        assert!(state.on_read(b"nope\n").is_err());

        let state = state.on_read(b"3 done\n").expect("valid token");
        assert_eq!(state, ListenerState::GotToken(3));
        assert_eq!(state.exit_code(), None);

        let state = state.complete();
        assert_eq!(state.exit_code(), Some(3));
    }

    #[test]
    fn done_is_terminal() {
        let done = ListenerState::Done(7);
        assert_eq!(done.on_read(b"9\n"), Ok(done));
        assert_eq!(done.complete(), done);
    }
}
