//! Turning a line-oriented completion stream into a [`Response`].
//!
//! [`parse_frame`] classifies raw lines, [`StreamAssembler`] folds them.
//! Callers pick between a callback ([`StreamAssembler::consume`]) and a pull
//! stream of [`StreamUpdate`]s ([`StreamAssembler::updates`]); both run the
//! same fold.

mod assembler;
mod frame;

pub use self::assembler::StreamAssembler;
pub use self::frame::{parse_frame, Frame};

use crate::response::{PartialResponse, Response};

/// One item of the pull-based stream view.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// A data frame was folded; carries the frame's deltas and a snapshot
    Partial(PartialResponse),
    /// Final item. Always last when the stream doesn't fail.
    Done(Response),
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("partial-response callback failed: {0}")]
    Callback(#[source] anyhow::Error),
    #[error("service reported an error mid-stream: {0}")]
    Remote(String),
    #[error("stream ended before completion ({} choice(s) received)", .partial.choices.len())]
    PrematureEnd { partial: Box<Response> },
}

impl StreamError {
    /// Best-effort content, when the stream got that far.
    pub fn partial(&self) -> Option<&Response> {
        match self {
            StreamError::PrematureEnd { partial } => Some(partial),
            _ => None,
        }
    }
}
