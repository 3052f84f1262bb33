use url::Url;

use crate::core::error::SyncResult;

/// Resolve `path` against `base` the way a browser resolves a relative link:
/// a base without trailing slash loses its last segment.
pub fn join_url(base: &str, path: &str) -> SyncResult<String> {
    Ok(Url::parse(base)?.join(path)?.to_string())
}

/// URL of one resource under `base_path` on the CDN. Every path segment is
/// percent-encoded; separators are kept.
pub fn resource_url(cdn: &str, base_path: &str, relative: &str) -> SyncResult<String> {
    let base_path = base_path.trim_end_matches('/');
    let encoded = encode_path(&relative.replace('\\', "/"));
    let path = if base_path.is_empty() {
        encoded
    } else {
        format!("{}/{}", encode_path(base_path), encoded)
    };
    join_url(cdn, &path)
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
