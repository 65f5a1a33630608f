/// FBX object names carry their class after a `0x00 0x01` separator.
pub fn name_with_class(name: &str, class: &str) -> String {
    format!("{name}\u{0}\u{1}{class}")
}

/// Rewrites colon-less Mixamo bone names (`mixamorigHips`) to the
/// colonized form (`mixamorig:Hips`) FBX consumers expect. Names that
/// already carry the colon, and non-Mixamo names, pass through.
pub fn normalize_bone_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("mixamorig") {
        if rest.starts_with(|c: char| c.is_ascii_uppercase()) {
            return format!("mixamorig:{rest}");
        }
    }
    name.to_string()
}

/// Editor helper meshes are recognized by name and never exported.
pub(crate) fn is_discard_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    for prefix in ["widget", "handle", "helper", "bonevis"] {
        if lower.starts_with(prefix) {
            return true;
        }
    }
    match lower.strip_prefix("mesh_") {
        Some(rest) => rest.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

/// Replaces every non-alphanumeric character with `_` so the emitted
/// texture filename is filesystem safe. May return an empty string for
/// empty input; the caller substitutes a generated name.
pub(crate) fn sanitize_texture_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[test]
fn test_name_with_class() {
    let n = name_with_class("Cube", "Model");
    assert_eq!(n.as_bytes(), b"Cube\x00\x01Model");
    assert_eq!(n.matches('\u{1}').count(), 1);
}

#[test]
fn test_normalize_bone_name() {
    assert_eq!(normalize_bone_name("mixamorigHips"), "mixamorig:Hips");
    assert_eq!(normalize_bone_name("mixamorigLeftArm"), "mixamorig:LeftArm");
    assert_eq!(normalize_bone_name("mixamorig:Hips"), "mixamorig:Hips");
    assert_eq!(normalize_bone_name("mixamorighips"), "mixamorighips");
    assert_eq!(normalize_bone_name("Spine"), "Spine");
}

#[test]
fn test_is_discard_name() {
    assert!(is_discard_name("mesh_0"));
    assert!(is_discard_name("Mesh_12_extra"));
    assert!(is_discard_name("WidgetRoot"));
    assert!(is_discard_name("bonevis01"));
    assert!(!is_discard_name("mesh_"));
    assert!(!is_discard_name("meshes"));
    assert!(!is_discard_name("Body"));
}

#[test]
fn test_sanitize_texture_name() {
    assert_eq!(sanitize_texture_name("skin diffuse (2).png"), "skin_diffuse__2__png");
    assert_eq!(sanitize_texture_name(""), "");
    assert_eq!(sanitize_texture_name("ok123"), "ok123");
}
