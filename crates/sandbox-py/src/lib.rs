mod executor;
mod script;
mod seccomp;

pub use executor::PyExecutor;
