//! Output accumulation for the interactive CLI session.

mod buffer;

pub use buffer::PatternBuffer;
