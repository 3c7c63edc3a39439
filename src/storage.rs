use std::io;
use std::path::Path;

/// Makes sure `path` exists as a directory, creating missing parents.
///
/// Returns `true` when the directory had to be created.
pub async fn ensure_dir(path: &Path) -> io::Result<bool> {
    if tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    tokio::fs::create_dir_all(path).await?;
    tracing::info!("Created storage directory {}", path.display());
    Ok(true)
}
