//! Command-line grammar.
//!
//! ```text
//! start_measure channel<N>
//! set_range     channel<N>, range<M>     (", " separator mandatory, M in 0..=3)
//! stop_measure  channel<N>
//! get_status    channel<N>
//! get_result    channel<N>
//! diagnostic    channel<N>
//! ```
//!
//! `N` is a canonical decimal index below the configured channel count.
//! Parsing never touches the channel store; every rejection maps to a fixed
//! `fail` response via [`ParseError::to_response`].

use super::response::Response;
use crate::instrument::{ChannelCommand, Range};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static SET_RANGE_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^channel([0-9]+),\srange([0-3])$").expect("Invalid set_range regex")
});

static CHANNEL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^channel(0|[1-9][0-9]*)$").expect("Invalid channel regex"));

/// Command keyword, the first word of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `start_measure`
    StartMeasure,
    /// `set_range`
    SetRange,
    /// `stop_measure`
    StopMeasure,
    /// `get_status`
    GetStatus,
    /// `get_result`
    GetResult,
    /// `diagnostic`
    Diagnostic,
}

impl Keyword {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::StartMeasure => "start_measure",
            Keyword::SetRange => "set_range",
            Keyword::StopMeasure => "stop_measure",
            Keyword::GetStatus => "get_status",
            Keyword::GetResult => "get_result",
            Keyword::Diagnostic => "diagnostic",
        }
    }
}

impl FromStr for Keyword {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_measure" => Ok(Keyword::StartMeasure),
            "set_range" => Ok(Keyword::SetRange),
            "stop_measure" => Ok(Keyword::StopMeasure),
            "get_status" => Ok(Keyword::GetStatus),
            "get_result" => Ok(Keyword::GetResult),
            "diagnostic" => Ok(Keyword::Diagnostic),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a line was rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// First word is not a known keyword.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Channel argument missing, malformed, out of range, or followed by extra words.
    #[error("invalid channel argument for {keyword}: '{argument}'")]
    InvalidChannel {
        /// Command that was being parsed.
        keyword: Keyword,
        /// Argument text as received.
        argument: String,
    },

    /// `set_range` with nothing after it.
    #[error("set_range without parameters")]
    NoParameters,

    /// `set_range` arguments without the comma separator.
    #[error("set_range arguments missing ', ' separator: '{0}'")]
    MissingSeparator(String),

    /// `set_range` arguments violating the grammar, or naming a channel that
    /// does not exist. Carries the text after the comma.
    #[error("invalid set_range arguments (range token '{range_token}')")]
    InvalidRangeArguments {
        /// Text following the comma, as received.
        range_token: String,
    },
}

impl ParseError {
    /// The `fail` line sent back for this rejection.
    pub fn to_response(&self) -> Response {
        match self {
            ParseError::UnknownCommand(_) => Response::fail_with("unknown command"),
            ParseError::InvalidChannel { .. } => Response::fail(),
            ParseError::NoParameters => Response::fail_with("no parameters"),
            ParseError::MissingSeparator(arguments) => Response::fail_with(arguments.clone()),
            ParseError::InvalidRangeArguments { range_token } if range_token.is_empty() => {
                Response::fail()
            }
            ParseError::InvalidRangeArguments { range_token } => {
                Response::fail_with(range_token.clone())
            }
        }
    }
}

/// A validated command: which channel, and what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Keyword as received.
    pub keyword: Keyword,
    /// Validated channel name, `channel<N>` with `N` below the channel count.
    pub channel: String,
    /// State-machine command to run against the channel.
    pub action: ChannelCommand,
}

impl Command {
    /// Parse and validate one line against a store of `channel_count` channels.
    pub fn parse(line: &str, channel_count: usize) -> Result<Self, ParseError> {
        let line = line.trim();
        let (keyword, arguments) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };
        let keyword: Keyword = keyword.parse()?;

        let action = match keyword {
            Keyword::StartMeasure => ChannelCommand::StartMeasure,
            Keyword::StopMeasure => ChannelCommand::StopMeasure,
            Keyword::GetStatus => ChannelCommand::GetStatus,
            Keyword::GetResult => ChannelCommand::GetResult,
            Keyword::Diagnostic => ChannelCommand::Diagnostic,
            Keyword::SetRange => return Self::parse_set_range(arguments, channel_count),
        };

        let invalid = || ParseError::InvalidChannel {
            keyword,
            argument: arguments.to_string(),
        };
        let mut words = arguments.split_whitespace();
        let channel = match (words.next(), words.next()) {
            (Some(channel), None) => channel,
            _ => return Err(invalid()),
        };
        if !is_valid_channel(channel, channel_count) {
            return Err(invalid());
        }

        Ok(Self {
            keyword,
            channel: channel.to_string(),
            action,
        })
    }

    fn parse_set_range(arguments: &str, channel_count: usize) -> Result<Self, ParseError> {
        if arguments.is_empty() {
            return Err(ParseError::NoParameters);
        }
        let Some((_, after_comma)) = arguments.split_once(',') else {
            return Err(ParseError::MissingSeparator(arguments.to_string()));
        };
        let rejected = || ParseError::InvalidRangeArguments {
            range_token: after_comma.trim_start().to_string(),
        };

        let captures = SET_RANGE_ARGS.captures(arguments).ok_or_else(rejected)?;
        let channel = format!("channel{}", &captures[1]);
        if !is_valid_channel(&channel, channel_count) {
            return Err(rejected());
        }
        let range: Range = format!("range{}", &captures[2])
            .parse()
            .map_err(|_| rejected())?;

        Ok(Self {
            keyword: Keyword::SetRange,
            channel,
            action: ChannelCommand::SetRange(range),
        })
    }
}

/// Whether `token` is `channel<N>` in canonical form with `N < channel_count`.
pub fn is_valid_channel(token: &str, channel_count: usize) -> bool {
    CHANNEL_TOKEN
        .captures(token)
        .and_then(|captures| captures[1].parse::<usize>().ok())
        .is_some_and(|index| index < channel_count)
}
