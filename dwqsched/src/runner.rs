mod types;
pub use types::{Runner, RunnerHandle, RunnerMessage};

mod impls;
