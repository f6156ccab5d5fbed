pub mod constraint;
pub mod error;
pub mod input;
pub mod platform;
pub mod work;
