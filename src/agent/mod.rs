pub mod core;
pub mod executor;

pub use self::core::Agent;
pub use self::executor::{AgentExecutor, DEFAULT_MAX_STEPS};
