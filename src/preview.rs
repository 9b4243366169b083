//! Item thumbnails cached under a per-item directory.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::http::Transport;
use crate::model::Item;

const PREVIEW_DIR: &str = "stac-dl";
const THUMBNAIL_FILE: &str = "thumbnail.jpg";

/// Where the thumbnail of `item` is stored below `base_dir`.
///
/// The directory is keyed by [`Item::hashed_id`], so the same item found on
/// two APIs does not collide.
#[must_use]
pub fn thumbnail_path(base_dir: &Path, item: &Item) -> PathBuf {
    base_dir
        .join(PREVIEW_DIR)
        .join(item.hashed_id())
        .join(THUMBNAIL_FILE)
}

/// Downloads the thumbnail of `item`, reusing an earlier download.
///
/// `base_dir` is normally [`std::env::temp_dir`].
///
/// # Errors
///
/// Returns [`Error::NoThumbnail`] if the item has no thumbnail asset, or the
/// transport error if the transfer fails.
pub async fn fetch_preview(
    transport: &dyn Transport,
    item: &Item,
    base_dir: &Path,
) -> Result<PathBuf> {
    let thumbnail = item.thumbnail().ok_or_else(|| Error::NoThumbnail {
        item_id: item.id.clone(),
    })?;
    let path = thumbnail_path(base_dir, item);
    let fs = TokioFileSystem::new();

    if fs.file_exists(&path).await {
        log::debug!("Preview of {} already at {}", item.id, path.display());
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        fs.create_dir_all(parent).await?;
    }
    transport.download(thumbnail.href(), &path).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetData, THUMBNAIL_KEY};
    use crate::testing::MockTransport;
    use tempfile::TempDir;

    fn item_with_thumbnail() -> Item {
        let mut item = Item::new("scene");
        item.api_href = "https://api.example.com".to_string();
        item.collection = Some("s2".to_string());
        item.assets.insert(
            THUMBNAIL_KEY.to_string(),
            AssetData::new("https://data.example.com/scene/preview.jpg"),
        );
        item
    }

    #[test]
    fn path_is_keyed_by_hashed_id() {
        let item = item_with_thumbnail();
        let path = thumbnail_path(Path::new("/tmp"), &item);
        assert_eq!(
            path,
            Path::new("/tmp/stac-dl")
                .join(item.hashed_id())
                .join("thumbnail.jpg")
        );
    }

    #[tokio::test]
    async fn downloads_thumbnail_once() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new();
        let item = item_with_thumbnail();

        let path = fetch_preview(&transport, &item, dir.path()).await.unwrap();
        assert!(path.is_file());
        let again = fetch_preview(&transport, &item, dir.path()).await.unwrap();
        assert_eq!(path, again);
        assert_eq!(transport.downloads().len(), 1);
    }

    #[tokio::test]
    async fn item_without_thumbnail() {
        let dir = TempDir::new().unwrap();
        let err = fetch_preview(&MockTransport::new(), &Item::new("bare"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoThumbnail { item_id } if item_id == "bare"));
    }

    #[tokio::test]
    async fn transfer_error_propagates() {
        let dir = TempDir::new().unwrap();
        let transport = MockTransport::new()
            .fail("https://data.example.com/scene/preview.jpg", || Error::Timeout);
        let err = fetch_preview(&transport, &item_with_thumbnail(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
