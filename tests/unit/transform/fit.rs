use super::*;

fn supported() -> Vec<Size> {
    crate::foundation::opts::PipelineOpts::default().supported_sizes
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            128,
            255,
        ])
    })
}

#[test]
fn landscape_and_portrait_pick_matching_targets() {
    let sizes = supported();
    let landscape = choose_target(
        Size {
            width: 1920,
            height: 1080,
        },
        &sizes,
    )
    .unwrap();
    assert_eq!(
        landscape,
        Size {
            width: 1536,
            height: 1024
        }
    );
    let portrait = choose_target(
        Size {
            width: 1080,
            height: 1920,
        },
        &sizes,
    )
    .unwrap();
    assert_eq!(
        portrait,
        Size {
            width: 1024,
            height: 1536
        }
    );
    let square = choose_target(
        Size {
            width: 500,
            height: 480,
        },
        &sizes,
    )
    .unwrap();
    assert_eq!(
        square,
        Size {
            width: 1024,
            height: 1024
        }
    );
}

#[test]
fn prepare_centers_without_cropping_and_pads_with_mean() {
    let img = RgbaImage::from_pixel(192, 108, image::Rgba([200, 40, 10, 255]));
    let (out, info) = prepare(&img, &supported()).unwrap();
    assert_eq!(out.dimensions(), (1536, 1024));
    assert_eq!(info.placement.width, 1536);
    assert_eq!(info.placement.height, 864);
    assert_eq!(info.placement.x, 0);
    assert_eq!(info.placement.y, 80);
    assert_eq!(info.pad_rgb, [200, 40, 10]);
    // Padding uses the mean color, so a flat photo produces a flat canvas.
    assert_eq!(out.get_pixel(0, 0).0, [200, 40, 10, 255]);
    assert_eq!(out.get_pixel(700, 500).0, [200, 40, 10, 255]);
}

#[test]
fn prepare_then_reverse_restores_original_dimensions() {
    let img = gradient(192, 108);
    let (adapted, info) = prepare(&img, &supported()).unwrap();
    let back = reverse(&adapted, &info).unwrap();
    assert_eq!(back.dimensions(), img.dimensions());

    let total: u64 = img
        .as_raw()
        .iter()
        .zip(back.as_raw())
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .sum();
    let mean = total as f64 / img.as_raw().len() as f64;
    assert!(mean < 3.0, "mean abs diff {mean}");
}

#[test]
fn reverse_scales_placement_when_result_size_differs() {
    let img = gradient(200, 100);
    let (adapted, info) = prepare(&img, &supported()).unwrap();
    let half = imageops::resize(
        &adapted,
        info.target.width / 2,
        info.target.height / 2,
        FilterType::Triangle,
    );
    let back = reverse(&half, &info).unwrap();
    assert_eq!(back.dimensions(), (200, 100));
}

#[test]
fn undecodable_bytes_are_a_decode_error() {
    let err = prepare_bytes(b"definitely not an image", &supported()).unwrap_err();
    assert!(matches!(err, PreviewError::Decode(_)));
}

#[test]
fn empty_supported_list_is_rejected() {
    let img = gradient(4, 4);
    assert!(matches!(
        prepare(&img, &[]),
        Err(PreviewError::Validation(_))
    ));
}
