mod session;
mod user_agent;
mod wire_log;

pub use session::{SessionHeaderLayer, SessionHeaderService};
pub use user_agent::{UserAgentLayer, UserAgentService};
pub use wire_log::{WireLogLayer, WireLogService};
