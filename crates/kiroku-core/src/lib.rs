pub mod backend;
pub mod calendar;
pub mod error;
pub mod http;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod tags;
pub mod types;
pub mod validate;

pub use error::*;
pub use types::*;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
