pub mod baseline;
pub mod builder;
pub mod cli;
pub mod cmds;
pub mod coverage;
pub mod fuzz_target;
pub mod logging;
pub mod main_shared;
pub mod parser;
pub mod selector;
pub mod triage;
pub mod types;
