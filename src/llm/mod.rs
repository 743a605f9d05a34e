pub mod inference;
pub mod loader;
pub mod models;
pub mod prompt;
