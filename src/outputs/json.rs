//! JSON output for news listings.
//!
//! The body mirrors the stored records (`Id`, `Title`, `Summary`, `Link`,
//! `Source`, `CreatedAt`, optional `Image`) wrapped in `Items`, `Count` and,
//! when another page follows, `NextCursor`.

use crate::models::NewsPage;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

/// Pretty-printed JSON of `page`, newline terminated.
pub fn render_page(page: &NewsPage) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(page)?;
    json.push('\n');
    Ok(json)
}

/// Write `page` to `output`, or to stdout when no path is given.
///
/// Parent directories of `output` are created as needed.
#[instrument(level = "info", skip_all, fields(output = ?output, count = page.count))]
pub async fn write_page(page: &NewsPage, output: Option<&str>) -> Result<(), Box<dyn Error>> {
    let json = render_page(page)?;

    let Some(path) = output else {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(json.as_bytes()).await?;
        stdout.flush().await?;
        return Ok(());
    };

    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }

    info!(%path, "Writing JSON");
    fs::write(path, json).await?;
    info!(%path, "Wrote news listing");
    Ok(())
}
