// ─── Launcher Manifests ───
// Remote launcher configuration and resource index documents.

use serde::{Deserialize, Deserializer};

use crate::core::error::{SyncError, SyncResult};

/// Top-level launcher configuration of one server.
#[derive(Debug, Clone, Deserialize)]
pub struct LauncherInfo {
    pub default: GameSection,
    #[serde(default)]
    pub predownload: Option<PredownloadSection>,
}

/// The currently released client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSection {
    #[serde(default)]
    pub cdn_list: Vec<CdnNode>,
    pub config: IndexConfig,
    pub resources_base_path: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub index_file: String,
}

/// Upcoming client advertised ahead of its release.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredownloadSection {
    pub version: String,
    #[serde(default)]
    pub resources_base_path: String,
    #[serde(default)]
    pub config: PredownloadConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredownloadConfig {
    #[serde(default)]
    pub index_file: Option<String>,
    #[serde(default)]
    pub patch_config: Vec<PatchDescriptor>,
}

/// Incremental patch from `version` to the advertised pre-download version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDescriptor {
    /// Base version the deltas apply to.
    pub version: String,
    pub index_file: String,
    pub base_url: String,
}

impl PredownloadConfig {
    /// Patch descriptor whose base version equals `local_version`.
    pub fn patch_for(&self, local_version: &str) -> Option<&PatchDescriptor> {
        self.patch_config.iter().find(|p| p.version == local_version)
    }
}

/// A CDN endpoint candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct CdnNode {
    pub url: String,
    #[serde(rename = "K1", default)]
    pub k1: i64,
    #[serde(rename = "K2", default)]
    pub k2: i64,
    #[serde(rename = "P", default)]
    pub priority: f64,
}

impl CdnNode {
    /// Both eligibility flags must be set.
    pub fn is_eligible(&self) -> bool {
        self.k1 == 1 && self.k2 == 1
    }
}

/// Highest-priority eligible node; the first one wins a tie.
pub fn select_cdn(nodes: &[CdnNode]) -> SyncResult<&CdnNode> {
    let mut best: Option<&CdnNode> = None;
    for node in nodes.iter().filter(|n| n.is_eligible()) {
        match best {
            Some(current) if node.priority <= current.priority => {}
            _ => best = Some(node),
        }
    }
    best.ok_or(SyncError::NoEligibleCdn)
}

/// File list of one client version (full or patch).
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceIndex {
    #[serde(default)]
    pub resource: Vec<ManifestEntry>,
}

/// One file the client is expected to contain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Destination relative to the install root.
    pub dest: String,
    #[serde(default)]
    pub md5: String,
    #[serde(deserialize_with = "size_from_number_or_string")]
    pub size: u64,
    /// Per-entry override of the resource base path.
    #[serde(default)]
    pub from_folder: Option<String>,
}

impl ManifestEntry {
    /// `dest` with forward slashes.
    pub fn relative_path(&self) -> String {
        self.dest.replace('\\', "/")
    }
}

// Some indexes quote sizes as strings.
fn size_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(url: &str, k1: i64, k2: i64, priority: f64) -> CdnNode {
        CdnNode {
            url: url.into(),
            k1,
            k2,
            priority,
        }
    }

    #[test]
    fn picks_highest_priority_eligible_node() {
        let nodes = vec![
            node("https://a/", 1, 1, 10.0),
            node("https://b/", 1, 0, 99.0),
            node("https://c/", 1, 1, 50.0),
            node("https://d/", 0, 1, 80.0),
        ];
        assert_eq!(select_cdn(&nodes).unwrap().url, "https://c/");
    }

    #[test]
    fn tie_keeps_the_first_maximum() {
        let nodes = vec![
            node("https://a/", 1, 1, 50.0),
            node("https://b/", 1, 1, 50.0),
        ];
        assert_eq!(select_cdn(&nodes).unwrap().url, "https://a/");
    }

    #[test]
    fn no_eligible_node_is_an_error() {
        let nodes = vec![node("https://a/", 0, 0, 50.0)];
        assert!(matches!(select_cdn(&nodes), Err(SyncError::NoEligibleCdn)));
        assert!(matches!(select_cdn(&[]), Err(SyncError::NoEligibleCdn)));
    }

    #[test]
    fn deserialize_launcher_info_with_patch_config() {
        let json = r#"{
            "default": {
                "cdnList": [{ "url": "https://cdn/", "K1": 1, "K2": 1, "P": 100 }],
                "config": { "indexFile": "launcher/index.json" },
                "resourcesBasePath": "launcher/res",
                "version": "2.0.0"
            },
            "predownload": {
                "version": "2.1.0",
                "resourcesBasePath": "launcher/res-next",
                "config": {
                    "indexFile": "launcher/next.json",
                    "patchConfig": [
                        { "version": "1.9.0", "indexFile": "p/19.json", "baseUrl": "p/19/" },
                        { "version": "2.0.0", "indexFile": "p/20.json", "baseUrl": "p/20/" }
                    ]
                }
            }
        }"#;
        let info: LauncherInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.default.version, "2.0.0");
        assert!(info.default.cdn_list[0].is_eligible());

        let pre = info.predownload.unwrap();
        assert_eq!(pre.config.patch_for("2.0.0").unwrap().index_file, "p/20.json");
        assert!(pre.config.patch_for("1.0.0").is_none());
    }

    #[test]
    fn sizes_may_be_quoted() {
        let json = r#"{ "resource": [
            { "dest": "Client\\a.pak", "md5": "x", "size": "100" },
            { "dest": "b.bin", "md5": "y", "size": 7, "fromFolder": "other/" }
        ] }"#;
        let index: ResourceIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.resource[0].size, 100);
        assert_eq!(index.resource[0].relative_path(), "Client/a.pak");
        assert_eq!(index.resource[1].from_folder.as_deref(), Some("other/"));
    }
}
