//! One-line textual responses: `ok[, <detail>]` or `fail[, <detail>]`.

use std::fmt;

/// Terminator appended to every response on the wire.
pub const LINE_TERMINATOR: &str = "\r";

/// Leading status word of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Command accepted.
    Ok,
    /// Command rejected or could not be executed.
    Fail,
}

impl ResponseStatus {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Ok => "ok",
            ResponseStatus::Fail => "fail",
        }
    }
}

/// A single protocol response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status word.
    pub status: ResponseStatus,
    /// Optional detail after `", "`.
    pub detail: Option<String>,
}

impl Response {
    /// Bare `ok`.
    pub fn ok() -> Self {
        Self {
            status: ResponseStatus::Ok,
            detail: None,
        }
    }

    /// `ok, <detail>`.
    pub fn ok_with(detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            detail: Some(detail.into()),
        }
    }

    /// Bare `fail`.
    pub fn fail() -> Self {
        Self {
            status: ResponseStatus::Fail,
            detail: None,
        }
    }

    /// `fail, <detail>`.
    pub fn fail_with(detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fail,
            detail: Some(detail.into()),
        }
    }

    /// `ok`/`fail` chosen by a flag, with the same detail either way.
    pub fn with_outcome(accepted: bool, detail: Option<String>) -> Self {
        let status = if accepted {
            ResponseStatus::Ok
        } else {
            ResponseStatus::Fail
        };
        Self { status, detail }
    }

    /// Whether the status is `ok`.
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Wire form, terminator included.
    pub fn encode(&self) -> String {
        format!("{}{}", self, LINE_TERMINATOR)
    }

    /// Parse a response line (terminator optional).
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (status, detail) = match line.split_once(", ") {
            Some((status, detail)) => (status, Some(detail.to_string())),
            None => (line, None),
        };
        let status = match status {
            "ok" => ResponseStatus::Ok,
            "fail" => ResponseStatus::Fail,
            _ => return None,
        };
        Some(Self { status, detail })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}, {}", self.status.as_str(), detail),
            None => f.write_str(self.status.as_str()),
        }
    }
}
