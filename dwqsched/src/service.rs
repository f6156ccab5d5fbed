mod types;
pub use types::{Builder, Scheduler};

mod impls;
