use url::Url;

/// Last path segment of a URL or storage path, without its extension unless
/// `with_extension` is set. Only the final `.suffix` is stripped.
pub fn parse_file_name(path: &str, with_extension: bool) -> String {
    let raw_path = match Url::parse(path) {
        Ok(url) => url.path().to_string(),
        Err(_) => path.to_string(),
    };

    let segment = raw_path.rsplit('/').next().unwrap_or_default();
    let segment = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    match segment.rsplit_once('.') {
        Some((stem, _)) if !with_extension => stem.to_string(),
        _ => segment,
    }
}

/// Lowercased extension of a file name or URL path, `None` when absent.
pub fn file_extension(path: &str) -> Option<String> {
    let name = parse_file_name(path, true);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}
