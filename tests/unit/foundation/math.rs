use super::*;

#[test]
fn mul_div255_matches_rounded_product() {
    assert_eq!(mul_div255_u8(255, 255), 255);
    assert_eq!(mul_div255_u8(0, 255), 0);
    assert_eq!(mul_div255_u8(128, 255), 128);
    assert_eq!(mul_div255_u8(255, 128), 128);
}

#[test]
fn working_size_caps_longest_side_without_upscaling() {
    let big = Size {
        width: 4000,
        height: 3000,
    };
    assert_eq!(
        working_size(big, 1200),
        Size {
            width: 1200,
            height: 900
        }
    );
    let small = Size {
        width: 800,
        height: 600,
    };
    assert_eq!(working_size(small, 1200), small);
    let sliver = Size {
        width: 10_000,
        height: 1,
    };
    assert_eq!(working_size(sliver, 100).height, 1);
}

#[test]
fn unpremultiply_inverts_premultiply_for_opaque_and_clear() {
    let mut px = vec![10u8, 20, 30, 255, 40, 50, 60, 0];
    premultiply_rgba8_in_place(&mut px);
    assert_eq!(&px[4..8], &[0, 0, 0, 0]);
    unpremultiply_rgba8_in_place(&mut px);
    assert_eq!(&px[0..4], &[10, 20, 30, 255]);
}
