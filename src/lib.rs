pub mod core;

// Re-export key items for easy importing in this crate
pub use core::types;

// Re-export key items for easy importing in other crates
pub use core::baseline::{ArchiveTransport, BaselineFetcher};
pub use core::builder::{BuildRequest, ContainerRuntime, DockerRuntime, build_fuzzers};
pub use core::coverage::{CoverageClient, HttpTransport, JsonTransport};
pub use core::fuzz_target::{
    FuzzEngine, FuzzRun, FuzzTarget, LibFuzzerEngine, check_fuzzer_build, list_fuzz_targets,
};
pub use core::main_shared::run_main;
pub use core::parser::parse_fuzzer_output;
pub use core::selector::{AffectedTargetSelector, KeepReason, Selection, keep_affected_fuzzers};
pub use core::triage::{CrashTriageRunner, TriageOptions};
