pub mod providers;

pub use providers::create_transport;
pub use providers::openai::OpenAiTransport;
