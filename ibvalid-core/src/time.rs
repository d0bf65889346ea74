use logos::{Lexer, Logos};
use std::time::Duration;
use thiserror::Error;

/// Error returned when a human-readable duration string cannot be parsed.
#[derive(Debug, Error, PartialEq)]
pub enum DurationParseError {
    #[error("unexpected token while parsing `{0}`")]
    UnexpectedToken(String),
    #[error("expecting duration to start with a number, cannot parse `{0}`")]
    ExpectedNumber(String),
    #[error("expecting a unit (ns, us, ms, s, m) after the number in `{0}`")]
    ExpectedUnit(String),
    #[error("invalid number in `{0}`")]
    InvalidNumber(String),
}

/// Parse a duration of the form `"1s 500ms"`, `"2us"`, `"100ns"`.
///
/// Components are summed, so `"1s 2000ms"` is three seconds.
pub(crate) fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let mut lex = Lexer::<'_, Token>::new(s);

    let mut total = Duration::ZERO;
    let mut components = 0usize;

    while let Some(next) = lex.next() {
        let number = next.map_err(|()| DurationParseError::UnexpectedToken(s.to_owned()))?;
        if number != Token::Value {
            return Err(DurationParseError::ExpectedNumber(s.to_owned()));
        }
        let number: u64 = lex
            .slice()
            .parse()
            .map_err(|_| DurationParseError::InvalidNumber(s.to_owned()))?;

        let Some(Ok(unit)) = lex.next() else {
            return Err(DurationParseError::ExpectedUnit(s.to_owned()));
        };
        total += match unit {
            Token::NanoSeconds => Duration::from_nanos(number),
            Token::MicroSeconds => Duration::from_micros(number),
            Token::MilliSeconds => Duration::from_millis(number),
            Token::Seconds => Duration::from_secs(number),
            Token::Minutes => Duration::from_secs(number * 60),
            Token::Value => return Err(DurationParseError::ExpectedUnit(s.to_owned())),
        };
        components += 1;
    }

    if components == 0 {
        return Err(DurationParseError::ExpectedNumber(s.to_owned()));
    }

    Ok(total)
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|µs|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}
