pub mod accumulator;
pub mod client;
pub mod delta;
pub mod message;
pub mod registry;
pub mod request;
pub mod response;
pub mod session;
pub mod stream;
pub mod tool;
pub mod tool_round;
pub mod transport;
mod wire;

pub use accumulator::{ChoiceAccumulator, ResponseAccumulator};
pub use client::{ChatClient, ClientError};
pub use delta::{Delta, ToolCallFragment};
pub use message::{ContentPart, ImageDetail, Message, MessageContent, Role};
pub use registry::{RegistryError, ToolRegistry};
pub use request::{ChatRequest, CompletionOptions, RequestError, ResponseFormat, ToolChoice};
pub use response::{Choice, PartialResponse, Response, ResponseStatus, StopReason, Usage};
pub use session::{ConversationSession, SessionError, SessionState, SessionStep, ToolLoop};
pub use stream::{parse_frame, Frame, StreamAssembler, StreamError, StreamUpdate};
pub use tool::{EchoTool, Tool, ToolCall, ToolDeclaration, ToolError, ToolExecutor};
pub use tool_round::{execute_calls, ToolRound, ToolRoundController, ToolRoundError};
pub use transport::{ChatTransport, FrameSource, TransportError, TransportReply};
pub use wire::StreamChunk;
