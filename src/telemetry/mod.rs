mod dispatch;
mod reauth;

pub use dispatch::DispatchOutcome;
pub use reauth::{ReauthOutcome, ReauthTelemetry};
