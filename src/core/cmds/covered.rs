use log::{info, warn};

use crate::core::cli::CoveredArgs;
use crate::core::coverage::CoverageClient;
use crate::types::{AppError, AppResult};

pub async fn execute_covered(args: CoveredArgs) -> AppResult<bool> {
    let files = tokio::task::spawn_blocking(move || {
        let client = CoverageClient::from_config();
        let summary = client.get_latest_cov_report_info(&args.project)?;
        client.get_files_covered_by_target(&summary, &args.target, &args.source_root)
    })
    .await
    .map_err(|e| AppError::Custom(format!("Coverage task failed: {e}")))?;

    match files {
        Some(files) => {
            info!("{} covered file(s)", files.len());
            for file in files {
                println!("{file}");
            }
            Ok(true)
        }
        None => {
            warn!("No coverage data available");
            Ok(false)
        }
    }
}
