use std::path::Path;

use log::info;

use crate::core::cli::CheckBuildArgs;
use crate::core::fuzz_target::{check_fuzzer_build, list_fuzz_targets};
use crate::types::AppResult;

pub async fn execute_check_build(args: CheckBuildArgs) -> AppResult<bool> {
    let dir = Path::new(&args.dir);
    if !check_fuzzer_build(dir) {
        return Ok(false);
    }
    for target in list_fuzz_targets(dir)? {
        info!("  {}", target.name);
    }
    Ok(true)
}
