use super::*;

#[test]
fn size_rejects_zero_dimensions() {
    assert!(matches!(Size::new(0, 10), Err(PreviewError::Decode(_))));
    assert!(matches!(Size::new(10, 0), Err(PreviewError::Decode(_))));
    let s = Size::new(1920, 1080).unwrap();
    assert!((s.aspect() - 16.0 / 9.0).abs() < 1e-9);
    assert_eq!(s.rgba_len(), 1920 * 1080 * 4);
}

#[test]
fn premultiply_rounds_and_preserves_alpha() {
    let px = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    assert_eq!(px.a, 128);
    assert_eq!(px.r, 128);
    assert_eq!(px.g, 64);
    assert_eq!(px.b, 0);
}

#[test]
fn raster_from_raw_validates_length() {
    assert!(PremulRaster::from_raw(2, 2, vec![0; 15]).is_err());
    let r = PremulRaster::from_raw(2, 2, vec![0; 16]).unwrap();
    assert!(r.is_blank());
}

#[test]
fn straight_roundtrip_keeps_opaque_pixels() {
    let img = image::RgbaImage::from_raw(2, 1, vec![10, 20, 30, 255, 200, 100, 50, 255]).unwrap();
    let premul = PremulRaster::from_straight(&img);
    assert_eq!(premul.pixel(1, 0), [200, 100, 50, 255]);
    assert_eq!(premul.to_straight(), img);
}
