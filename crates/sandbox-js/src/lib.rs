mod capabilities;
mod executor;

pub use executor::{ContextLimits, JsExecutor};
