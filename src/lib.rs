#[macro_use]
extern crate hex_literal;

pub mod cards;
pub mod device;
pub mod env;

mod errors;
pub use errors::*;

pub mod utils;
