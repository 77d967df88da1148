pub mod affected;
pub mod build;
pub mod check_build;
pub mod covered;
pub mod init;
pub mod print_config;
pub mod run;

pub use affected::execute_affected;
pub use build::execute_build;
pub use check_build::execute_check_build;
pub use covered::execute_covered;
pub use init::execute_init;
pub use print_config::execute_print_config;
pub use run::execute_run;
