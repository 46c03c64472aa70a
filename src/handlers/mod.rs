pub mod analyze;
pub mod presentation;
pub mod session;

pub use analyze::AnalyzeHandler;
pub use session::SessionGate;
