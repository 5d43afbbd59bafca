use std::cell::Cell;
use std::io::Cursor;

use super::*;
use crate::foundation::core::Point;
use crate::scene::model::{
    Confidence, Polygon, SceneCategory, Subcategory, SurfaceElement, SurfaceType,
};

struct FakeScanner {
    reply: Option<SceneDescription>,
    calls: Cell<usize>,
}

impl Scanner for FakeScanner {
    async fn scan(&self, _bytes: &[u8]) -> PreviewResult<SceneDescription> {
        self.calls.set(self.calls.get() + 1);
        self.reply
            .clone()
            .ok_or_else(|| PreviewError::validation("model returned garbage"))
    }
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn scene() -> SceneDescription {
    SceneDescription {
        category: SceneCategory::Interior,
        subcategory: Subcategory::Bathroom,
        confidence: Confidence::Low,
        elements: vec![
            SurfaceElement {
                id: "ok".into(),
                surface_type: SurfaceType::Floor,
                label: String::new(),
                polygon: Polygon::from_pairs(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
            },
            SurfaceElement {
                id: "line".into(),
                surface_type: SurfaceType::Walls,
                label: String::new(),
                polygon: Polygon {
                    points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
                },
            },
        ],
    }
}

#[tokio::test]
async fn undecodable_bytes_never_reach_the_scanner() {
    let scanner = FakeScanner {
        reply: Some(scene()),
        calls: Cell::new(0),
    };
    let err = LoadedScan::from_scanner(&scanner, ScanId::from("s"), b"not an image")
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Decode(_)));
    assert_eq!(scanner.calls.get(), 0);
}

#[tokio::test]
async fn scanner_failures_are_collaborator_errors() {
    let scanner = FakeScanner {
        reply: None,
        calls: Cell::new(0),
    };
    let err = LoadedScan::from_scanner(&scanner, ScanId::from("s"), &png(4, 3))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(scanner.calls.get(), 1);
}

#[tokio::test]
async fn loaded_scene_is_sanitized() {
    let scanner = FakeScanner {
        reply: Some(scene()),
        calls: Cell::new(0),
    };
    let loaded = LoadedScan::from_scanner(&scanner, ScanId::from("s1"), &png(8, 6))
        .await
        .unwrap();
    assert_eq!(loaded.id().as_str(), "s1");
    assert_eq!(loaded.photo().dimensions(), (8, 6));
    let ids: Vec<&str> = loaded.scene().elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
}
