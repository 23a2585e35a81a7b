#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

mod authorizers;
#[cfg(feature = "memory-cache")]
mod cache;
mod client;
pub mod error;
mod interceptor;
mod request;
mod token;

pub use authorizers::*;
#[cfg(feature = "memory-cache")]
pub use cache::*;
pub use client::*;
pub use error::{Error, Result};
pub use interceptor::*;
pub use request::*;
pub use token::*;
