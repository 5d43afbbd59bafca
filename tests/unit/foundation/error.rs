use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        PreviewError::decode("x")
            .to_string()
            .contains("decode error:")
    );
    assert!(
        PreviewError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        PreviewError::collaborator("x")
            .to_string()
            .contains("collaborator error:")
    );
    assert!(PreviewError::timeout("x").to_string().contains("timeout:"));
    assert!(
        PreviewError::not_found("x")
            .to_string()
            .contains("not found:")
    );
    assert!(
        PreviewError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = PreviewError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn only_collaborator_failures_are_transient() {
    assert!(PreviewError::collaborator("down").is_transient());
    assert!(PreviewError::timeout("slow").is_transient());
    assert!(!PreviewError::decode("bad").is_transient());
    assert!(!PreviewError::not_found("gone").is_transient());
}

#[test]
fn serde_json_errors_map_to_serde_variant() {
    let err: PreviewError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, PreviewError::Serde(_)));
}
