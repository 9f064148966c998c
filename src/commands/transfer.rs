//! CSV import and export handlers.

use crate::app::{App, ImportSummary};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::filter::Criteria;
use crate::{utils, Result};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// The result of an export.
#[derive(Debug, Clone, Serialize)]
pub struct Export {
    pub records: usize,
    pub csv: String,
}

/// Stores every valid row of `text` in one batch.
pub async fn import(app: &mut App, text: &str) -> Result<Out<ImportSummary>> {
    let summary = app.import_csv(text).await?;
    let mut message = format!("Imported {} records", summary.imported());
    if summary.skipped > 0 {
        message.push_str(&format!(
            ", skipped {} rows without a valid date or name",
            summary.skipped
        ));
    }
    if summary.rejected > 0 {
        message.push_str(&format!(", {} rows were refused", summary.rejected));
    }
    Ok(Out::new(message, summary))
}

/// Reads `path` and imports it.
pub async fn import_file(app: &mut App, path: &Path) -> Result<Out<ImportSummary>> {
    let text = utils::read(path).await.pub_result(ErrorType::Io)?;
    debug!("Read {} bytes from {}", text.len(), path.display());
    import(app, &text).await
}

/// Reloads the records and encodes those matching `criteria` as CSV. When `out` is given the CSV
/// is also written there.
pub async fn export(
    app: &mut App,
    criteria: Criteria,
    out: Option<&Path>,
) -> Result<Out<Export>> {
    app.reload().await?;
    app.set_criteria(criteria);
    let export = Export {
        records: app.view().records.len(),
        csv: app.export_csv()?,
    };
    let message = match out {
        Some(path) => {
            utils::write(path, &export.csv)
                .await
                .pub_result(ErrorType::Io)?;
            format!("Exported {} records to {}", export.records, path.display())
        }
        None => format!("Exported {} records", export.records),
    };
    Ok(Out::new(message, export))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn signed_in() -> App {
        let mut app = App::offline();
        app.resume().await.unwrap();
        app
    }

    #[tokio::test]
    async fn test_import_message() {
        let mut app = signed_in().await;
        let csv = "date,name,amount_due\n2024/02/04,甲,300\n2024/02/04,,300\n";
        let out = import(&mut app, csv).await.unwrap();
        assert_eq!(
            out.message(),
            "Imported 1 records, skipped 1 rows without a valid date or name"
        );
    }

    #[tokio::test]
    async fn test_export_then_import_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut app = signed_in().await;
        let criteria = Criteria::new(None, None, Some("費".to_string()));
        let out = export(&mut app, criteria, Some(&path)).await.unwrap();
        assert_eq!(out.structure().unwrap().records, 1);
        assert!(out.message().ends_with("out.csv"));

        let mut other = signed_in().await;
        let out = import_file(&mut other, &path).await.unwrap();
        assert_eq!(out.message(), "Imported 1 records");
        assert_eq!(other.records().len(), 6);
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let mut app = signed_in().await;
        let e = import_file(&mut app, Path::new("/no/such/file.csv"))
            .await
            .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Io);
    }
}
