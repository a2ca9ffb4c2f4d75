use futures::stream::{self, BoxStream, Stream, StreamExt};
use parley_core::StreamEndPolicy;
use tracing::{debug, warn};

use super::frame::{parse_frame, Frame};
use super::{StreamError, StreamUpdate};
use crate::accumulator::ResponseAccumulator;
use crate::response::{PartialResponse, Response, ResponseStatus};
use crate::transport::TransportError;

/// Folds a stream of raw lines into one [`Response`].
///
/// Consumption is strictly sequential: the next line is pulled only after the
/// previous one has been folded and its callback has returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamAssembler {
    policy: StreamEndPolicy,
}

enum Step {
    Skip,
    Partial(PartialResponse),
    Done(Response),
}

/// Fold state shared by the callback and pull views.
struct Fold {
    acc: ResponseAccumulator,
    policy: StreamEndPolicy,
    data_frames: usize,
}

impl Fold {
    fn new(policy: StreamEndPolicy) -> Self {
        Self {
            acc: ResponseAccumulator::new(),
            policy,
            data_frames: 0,
        }
    }

    fn line(&mut self, line: &str) -> Result<Step, StreamError> {
        match parse_frame(line) {
            Frame::Skip => Ok(Step::Skip),
            Frame::Error(message) => Err(StreamError::Remote(message)),
            Frame::Done => {
                debug!(data_frames = self.data_frames, choices = self.acc.choice_count(), "stream complete");
                let acc = std::mem::take(&mut self.acc);
                Ok(Step::Done(acc.finish(ResponseStatus::Complete)))
            }
            Frame::Chunk(chunk) => {
                self.data_frames += 1;
                self.acc.merge_meta(chunk.meta);
                if let Some(usage) = &chunk.usage {
                    self.acc.merge_usage(usage);
                }
                self.acc.apply_all(&chunk.deltas);
                Ok(Step::Partial(PartialResponse {
                    deltas: chunk.deltas,
                    response: self.acc.snapshot(ResponseStatus::Incomplete),
                }))
            }
        }
    }

    /// The source stopped without `[DONE]`.
    fn premature(&mut self, cause: &str) -> Result<Response, StreamError> {
        warn!(
            cause,
            data_frames = self.data_frames,
            choices = self.acc.choice_count(),
            policy = %self.policy,
            "stream ended before [DONE]"
        );
        let partial = std::mem::take(&mut self.acc).finish(ResponseStatus::Incomplete);
        match self.policy {
            StreamEndPolicy::FlagIncomplete => Ok(partial),
            StreamEndPolicy::Error => Err(StreamError::PrematureEnd {
                partial: Box::new(partial),
            }),
        }
    }
}

impl StreamAssembler {
    pub fn new(policy: StreamEndPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> StreamEndPolicy {
        self.policy
    }

    /// Drive `frames` to the end, calling `on_partial` after every data frame.
    ///
    /// A callback error aborts the stream at once and is returned as
    /// [`StreamError::Callback`]. Transport errors and cancellation end the
    /// stream like exhaustion does, per the configured [`StreamEndPolicy`].
    pub async fn consume<S, F>(&self, frames: S, mut on_partial: F) -> Result<Response, StreamError>
    where
        S: Stream<Item = Result<String, TransportError>>,
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        let mut frames = std::pin::pin!(frames);
        let mut fold = Fold::new(self.policy);

        loop {
            let line = match frames.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => return fold.premature(&e.to_string()),
                None => return fold.premature("frame source exhausted"),
            };
            match fold.line(&line)? {
                Step::Skip => {}
                Step::Partial(partial) => on_partial(&partial).map_err(StreamError::Callback)?,
                Step::Done(response) => return Ok(response),
            }
        }
    }

    /// Pull-based view over the same fold.
    ///
    /// Yields one [`StreamUpdate::Partial`] per data frame and then a single
    /// [`StreamUpdate::Done`], or an error as the last item. The stream cannot be
    /// restarted; dropping it drops the frame source.
    pub fn updates<S>(&self, frames: S) -> BoxStream<'static, Result<StreamUpdate, StreamError>>
    where
        S: Stream<Item = Result<String, TransportError>> + Send + 'static,
    {
        let state = Some((Box::pin(frames), Fold::new(self.policy)));

        stream::unfold(state, |state| async move {
            let (mut frames, mut fold) = state?;
            loop {
                let line = match frames.next().await {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        let end = fold.premature(&e.to_string()).map(StreamUpdate::Done);
                        return Some((end, None));
                    }
                    None => {
                        let end = fold.premature("frame source exhausted").map(StreamUpdate::Done);
                        return Some((end, None));
                    }
                };
                match fold.line(&line) {
                    Ok(Step::Skip) => continue,
                    Ok(Step::Partial(partial)) => {
                        return Some((Ok(StreamUpdate::Partial(partial)), Some((frames, fold))));
                    }
                    Ok(Step::Done(response)) => return Some((Ok(StreamUpdate::Done(response)), None)),
                    Err(e) => return Some((Err(e), None)),
                }
            }
        })
        .boxed()
    }
}
