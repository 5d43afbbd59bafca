use std::future::Future;
use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::core::Size;
use crate::foundation::error::PreviewResult;
use crate::transform::fit::{TransformInfo, reverse};

/// Photorealistic image-synthesis collaborator.
pub trait SynthesisClient {
    /// Produce one image for `request`.
    fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> impl Future<Output = PreviewResult<RgbaImage>>;
}

/// One synthesis call.
#[derive(Clone, Debug)]
pub struct SynthesisRequest {
    /// Photo already fitted to `target`.
    pub image: Arc<RgbaImage>,
    /// Instruction text.
    pub instruction: String,
    /// Canvas size the collaborator should answer with.
    pub target: Size,
}

/// Photo fitted into a synthesis canvas, with what is needed to undo the fit.
#[derive(Clone, Debug)]
pub struct PreparedPhoto {
    /// Letterboxed photo.
    pub adapted: Arc<RgbaImage>,
    /// Fit parameters.
    pub info: TransformInfo,
}

impl PreparedPhoto {
    /// Request for `instruction` against this photo.
    pub fn request(&self, instruction: String) -> SynthesisRequest {
        SynthesisRequest {
            image: Arc::clone(&self.adapted),
            instruction,
            target: self.info.target,
        }
    }
}

/// Send `instruction` for `prepared` and map the answer back onto the original geometry.
pub async fn synthesize_fitted<C: SynthesisClient>(
    client: &C,
    prepared: &PreparedPhoto,
    instruction: String,
) -> PreviewResult<RgbaImage> {
    let result = client.synthesize(prepared.request(instruction)).await?;
    reverse(&result, &prepared.info)
}
