pub mod matching;
pub mod models;
