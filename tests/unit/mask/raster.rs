use super::*;

fn size(w: u32, h: u32) -> Size {
    Size::new(w, h).unwrap()
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
    Polygon::from_pairs(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
}

#[test]
fn rasterize_is_deterministic() {
    let polys = vec![
        square(0.1, 0.1, 0.6, 0.5),
        Polygon::from_pairs(&[(0.2, 0.9), (0.8, 0.4), (0.9, 0.95)]),
    ];
    let a = rasterize_polygons(&polys, size(64, 48)).unwrap();
    let b = rasterize_polygons(&polys, size(64, 48)).unwrap();
    assert_eq!(a.alpha(), b.alpha());
}

#[test]
fn rasterize_fills_inside_and_leaves_outside() {
    let polys = vec![square(0.25, 0.25, 0.75, 0.75)];
    let m = rasterize_polygons(&polys, size(40, 40)).unwrap();
    let at = |x: usize, y: usize| m.alpha()[y * 40 + x];
    assert_eq!(at(20, 20), 255);
    assert_eq!(at(2, 2), 0);
    assert_eq!(at(38, 38), 0);
    assert!((m.coverage() - 0.25).abs() < 0.03);
}

#[test]
fn rasterize_skips_degenerate_polygons() {
    let polys = vec![Polygon::from_pairs(&[(0.0, 0.0), (1.0, 1.0)])];
    let m = rasterize_polygons(&polys, size(16, 16)).unwrap();
    assert!(m.is_empty());
}

#[test]
fn union_takes_per_pixel_max() {
    let mut a = RasterMask::from_alpha(size(2, 1), vec![10, 200]).unwrap();
    let b = RasterMask::from_alpha(size(2, 1), vec![100, 50]).unwrap();
    a.union_with(&b).unwrap();
    assert_eq!(a.alpha(), &[100, 200]);
    assert!(a.union_with(&RasterMask::empty(size(1, 1))).is_err());
}

#[test]
fn from_alpha_rejects_wrong_length() {
    assert!(RasterMask::from_alpha(size(2, 2), vec![0; 3]).is_err());
}

#[test]
fn from_image_prefers_alpha_when_translucent() {
    let mut img = RgbaImage::from_pixel(2, 1, image::Rgba([0, 0, 0, 255]));
    img.put_pixel(1, 0, image::Rgba([0, 0, 0, 0]));
    let m = RasterMask::from_image(&img).unwrap();
    assert_eq!(m.alpha(), &[255, 0]);
}

#[test]
fn from_image_uses_luminance_when_opaque() {
    let mut img = RgbaImage::from_pixel(2, 1, image::Rgba([255, 255, 255, 255]));
    img.put_pixel(1, 0, image::Rgba([0, 0, 0, 255]));
    let m = RasterMask::from_image(&img).unwrap();
    assert_eq!(m.alpha(), &[255, 0]);
}

#[test]
fn resized_to_keeps_full_coverage() {
    let m = RasterMask::from_alpha(size(4, 4), vec![255; 16]).unwrap();
    let r = m.resized_to(size(8, 2));
    assert_eq!(r.size(), size(8, 2));
    assert!(r.alpha().iter().all(|&a| a == 255));
}

#[test]
fn cleaned_removes_speckle_and_fills_pinholes() {
    let s = size(9, 9);
    let mut speck = vec![0u8; 81];
    speck[4 * 9 + 4] = 255;
    assert!(RasterMask::from_alpha(s, speck).unwrap().cleaned().is_empty());

    let mut hole = vec![255u8; 81];
    hole[4 * 9 + 4] = 0;
    let cleaned = RasterMask::from_alpha(s, hole).unwrap().cleaned();
    assert!(cleaned.alpha().iter().all(|&a| a == 255));
}

#[test]
fn to_rgba_image_carries_alpha() {
    let m = RasterMask::from_alpha(size(2, 1), vec![0, 128]).unwrap();
    let img = m.to_rgba_image();
    assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 0]);
    assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255, 128]);
}

#[test]
fn resolve_overlaps_gives_contested_pixels_to_foreground_types() {
    let s = size(2, 1);
    let mut masks = vec![
        (
            SurfaceType::Walls,
            RasterMask::from_alpha(s, vec![255, 255]).unwrap(),
        ),
        (
            SurfaceType::Windows,
            RasterMask::from_alpha(s, vec![0, 255]).unwrap(),
        ),
    ];
    resolve_overlaps(&mut masks).unwrap();
    assert_eq!(masks[0].1.alpha(), &[255, 0]);
    assert_eq!(masks[1].1.alpha(), &[0, 255]);
}

#[test]
fn stroke_polygons_draws_only_near_the_outline() {
    let polys = vec![square(0.25, 0.25, 0.75, 0.75)];
    let px = stroke_polygons(&polys, size(40, 40), 2.0, [255, 0, 0, 255]).unwrap();
    let alpha = |x: usize, y: usize| px[(y * 40 + x) * 4 + 3];
    assert!(alpha(10, 20) > 0);
    assert_eq!(alpha(20, 20), 0);
    assert_eq!(alpha(1, 1), 0);
}
