//! Line protocol: command grammar, responses, and the processor that runs
//! commands against the channel store.

pub mod command;
pub mod processor;
pub mod response;

pub use command::{is_valid_channel, Command, Keyword, ParseError};
pub use processor::CommandProcessor;
pub use response::{Response, ResponseStatus, LINE_TERMINATOR};
