//! Analyzer subprocess client for toolscribe
//!
//! The analyzer is an external subprocess treated as a protocol peer: it
//! consumes tagged JSON input frames on stdin and emits JSON reply lines on
//! stdout. This crate owns spawning, the frame vocabulary, and the parser
//! that turns assistant reply text into typed drafts.

mod frames;
mod parser;
mod process;

pub use frames::{parse_reply_line, InputFrame, Reply, Usage};
pub use parser::{parse_reply_text, ParsedReply};
pub use process::{spawn_stderr_logger, AnalyzerConfig, AnalyzerProcess};
