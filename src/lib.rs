pub mod cleaner;
pub mod command;
pub mod config;
pub mod embedded;
pub mod run;
pub mod workspace;
