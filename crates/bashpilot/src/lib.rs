pub mod agent;
pub mod conversation;
pub mod errors;
pub mod harmony;
pub mod models;
pub mod parser;
pub mod prompt_template;
pub mod providers;
pub mod runner;
