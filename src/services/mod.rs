pub mod ai_service;
pub mod capture; // Client side of the capture surface
pub mod gateway;
pub mod normalizer;
pub mod openrouter; // OpenRouter vision model
pub mod prompts;
pub mod reconciler;
pub mod validator;

pub use ai_service::AIService;
pub use capture::CaptureClient;
pub use gateway::ModelGateway;
pub use openrouter::OpenRouterService;
