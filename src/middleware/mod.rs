pub mod telemetry;

pub use telemetry::{telemetry_middleware, Principal, MAX_CAPTURED_BODY};
