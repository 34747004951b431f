use std::path::Path;

/// Extract a short type name from the full module path.
///
/// Given `"bizreport_pipeline::components::asin_filter::AsinFilter"`,
/// returns `"AsinFilter"`.
pub fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Default period label for an uploaded file: its name without directory
/// and without the final extension.
pub fn label_from_file_name(name: &str) -> String {
    let path = Path::new(name);
    path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| name.trim().to_string())
}
