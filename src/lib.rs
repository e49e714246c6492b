pub mod classifier;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod log;
pub mod pilot;
pub mod prompt;
pub mod window;
