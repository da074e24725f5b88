//! Schema-validated JSONL export.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use storage::Store;

use crate::schemas;
use crate::stages::ExportStage;

/// Streams articles from storage to a JSONL file, validating each row before
/// writing it. The first invalid article aborts the export; rows already
/// written stay in the file and the caller is responsible for discarding it.
pub struct JsonlExporter {
    store: Arc<Store>,
}

impl JsonlExporter {
    pub fn new(store: Arc<Store>) -> Self {
        JsonlExporter { store }
    }
}

impl ExportStage for JsonlExporter {
    fn export(&self, output_path: &Path) -> anyhow::Result<usize> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let validator = schemas::article_validator()?;
        let mut file = File::create(output_path)?;
        let mut exported = 0usize;

        for article_id in self.store.list_article_ids_for_export()? {
            let article = self.store.get_article(&article_id)?;
            let payload = serde_json::to_value(&article)?;
            if let Err(err) = validator.validate(&payload) {
                anyhow::bail!(
                    "export validation failed for article {}: {err}",
                    article.id
                );
            }
            serde_json::to_writer(&mut file, &payload)?;
            file.write_all(b"\n")?;
            exported += 1;
        }

        tracing::debug!(exported, output = %output_path.display(), "export finished");
        Ok(exported)
    }
}
