use std::future::Future;
use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::core::Size;
use crate::foundation::error::{PreviewError, PreviewResult};
use crate::scene::model::{SceneDescription, ScanId};
use crate::transform::fit::decode_rgba;

/// Structural-analysis collaborator: photo bytes in, typed surface regions out.
pub trait Scanner {
    /// Describe the photo in `bytes`.
    fn scan(&self, bytes: &[u8]) -> impl Future<Output = PreviewResult<SceneDescription>>;
}

/// A decoded photo with its sanitized scene, ready for [`open_scan`].
///
/// [`open_scan`]: crate::PreviewSession::open_scan
#[derive(Clone, Debug)]
pub struct LoadedScan {
    pub(crate) id: ScanId,
    pub(crate) photo: Arc<RgbaImage>,
    pub(crate) scene: Arc<SceneDescription>,
}

impl LoadedScan {
    /// Pair an already-decoded photo with its scene. Malformed polygons are dropped.
    pub fn new(id: ScanId, photo: RgbaImage, scene: SceneDescription) -> PreviewResult<Self> {
        Size::new(photo.width(), photo.height())?;
        Ok(Self {
            id,
            photo: Arc::new(photo),
            scene: Arc::new(scene.sanitize()),
        })
    }

    /// Decode `bytes` and ask `scanner` for the scene.
    ///
    /// Undecodable bytes fail before the scanner is called.
    #[tracing::instrument(skip(scanner, bytes), fields(scan = %id, len = bytes.len()))]
    pub async fn from_scanner<S: Scanner>(
        scanner: &S,
        id: ScanId,
        bytes: &[u8],
    ) -> PreviewResult<Self> {
        let photo = decode_rgba(bytes)?;
        let scene = scanner.scan(bytes).await.map_err(|e| match e {
            PreviewError::Collaborator(_) | PreviewError::Timeout(_) => e,
            other => PreviewError::collaborator(format!("scanner: {other}")),
        })?;
        let loaded = Self::new(id, photo, scene)?;
        tracing::info!(elements = loaded.scene.elements.len(), "scan loaded");
        Ok(loaded)
    }

    pub fn id(&self) -> &ScanId {
        &self.id
    }

    pub fn photo(&self) -> &RgbaImage {
        &self.photo
    }

    pub fn scene(&self) -> &SceneDescription {
        &self.scene
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/scan.rs"]
mod tests;
