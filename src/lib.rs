pub mod client;
pub mod context;
pub mod document;
pub mod error;
pub mod goal;
pub mod proof;
pub mod proof_file;
pub mod syntax;
pub mod term;

#[cfg(test)]
mod tests;
