pub mod protocol;
pub mod server_spec;
pub mod session;

pub use protocol::{McpTool, ToolOutput};
pub use server_spec::{ServerLaunch, ToolServerSpec};
pub use session::{ToolInvoker, ToolSession};
