mod types;

pub mod decoder;
pub mod openai;
#[cfg(test)]
pub mod stub;

pub use types::*;
