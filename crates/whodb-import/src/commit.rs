use tracing::info;

use whodb_core::WriteMode;
use whodb_engine::Facade;

use crate::errors::Result;
use crate::model::{AutoGeneratedPolicy, ImportOptions, ImportResult, StagedImport};

/// Write staged rows in one batch, clearing the unit first in overwrite mode.
///
/// A failing row aborts the batch; on transactional backends no staged row
/// is kept. The overwrite clear runs before the batch and is not undone.
pub async fn commit_import(
    facade: &Facade,
    staged: StagedImport,
    options: ImportOptions,
) -> Result<ImportResult> {
    let mut result = ImportResult::default();
    if options.mode == WriteMode::Overwrite {
        result.rows_cleared = facade.clear_unit(&staged.unit).await?;
    }

    let drop_auto = options.auto_generated == AutoGeneratedPolicy::Generate;
    let rows: Vec<_> = staged
        .rows
        .into_iter()
        .map(|mut row| {
            if drop_auto {
                for column in &staged.auto_generated_columns {
                    row.remove(column);
                }
            }
            row
        })
        .collect();
    result.rows_written = facade.add_rows(&staged.unit, rows).await?.len() as u64;

    info!(
        event = "import.commit",
        unit = %staged.unit,
        mode = %options.mode,
        rows = result.rows_written,
        cleared = result.rows_cleared
    );
    Ok(result)
}
