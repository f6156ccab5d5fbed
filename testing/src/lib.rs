pub mod chrono;

mod utils;
pub use utils::*;
