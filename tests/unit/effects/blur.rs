use super::*;

#[test]
fn blur_radius_0_is_identity() {
    let src = vec![1u8, 2, 3, 4, 5, 6];
    let out = blur_alpha(&src, 3, 2, 0, None).unwrap();
    assert_eq!(out, src);
}

#[test]
fn blur_constant_plane_is_identity() {
    let src = vec![200u8; 5 * 4];
    let out = blur_alpha(&src, 5, 4, 3, Some(2.0)).unwrap();
    assert_eq!(out, src);
}

#[test]
fn blur_softens_a_hard_edge() {
    let (w, h) = (8u32, 1u32);
    let src: Vec<u8> = (0..w).map(|x| if x < 4 { 255 } else { 0 }).collect();
    let out = blur_alpha(&src, w, h, 2, Some(1.0)).unwrap();
    assert_eq!(out[0], 255);
    assert_eq!(out[7], 0);
    assert!(out[3] < 255 && out[3] > 128);
    assert!(out[4] > 0 && out[4] < 128);
}

#[test]
fn blur_rejects_mismatched_buffer() {
    assert!(blur_alpha(&[0u8; 5], 2, 2, 1, None).is_err());
}
