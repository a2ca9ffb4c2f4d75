pub mod openai;

use std::sync::Arc;

use parley_core::ClientConfig;
use parley_runtime::{ChatTransport, TransportError};

/// Create the transport for the configured endpoint.
///
/// Anything that speaks the OpenAI chat-completions protocol works here
/// (OpenAI itself, Azure-style gateways, local servers); point
/// `OPENAI_BASE_URL` at it.
pub fn create_transport(config: &ClientConfig) -> Result<Arc<dyn ChatTransport>, TransportError> {
    Ok(Arc::new(openai::OpenAiTransport::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transport() {
        let config = ClientConfig::default().with_api_key("sk-test");
        let transport = create_transport(&config).unwrap();
        assert_eq!(transport.name(), "openai");
    }

    #[test]
    fn test_create_transport_requires_key() {
        assert!(create_transport(&ClientConfig::default()).is_err());
    }
}
