use super::*;

#[test]
fn defaults_match_documented_tuning() {
    let o = PipelineOpts::default();
    assert_eq!(o.working_max_side, 1200);
    assert_eq!(o.debounce(), Duration::from_millis(850));
    assert_eq!(o.supported_sizes.len(), 3);
    assert!(o.large_area_alpha > o.small_area_alpha);
    o.validate().unwrap();
}

#[test]
fn partial_json_keeps_other_defaults() {
    let o: PipelineOpts = serde_json::from_str(r#"{ "debounce_ms": 300 }"#).unwrap();
    assert_eq!(o.debounce_ms, 300);
    assert_eq!(o.working_max_side, 1200);
}

#[test]
fn validate_rejects_out_of_range_alpha() {
    let o = PipelineOpts {
        large_area_alpha: 1.5,
        ..PipelineOpts::default()
    };
    assert!(o.validate().is_err());
    let o = PipelineOpts {
        supported_sizes: vec![],
        ..PipelineOpts::default()
    };
    assert!(o.validate().is_err());
}
