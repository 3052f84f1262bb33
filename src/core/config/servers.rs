// ─── Server Catalog ───
// Launcher endpoints per distribution channel and the override files that
// distinguish the channels inside one install tree.

/// Static description of one server variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: &'static str,
    pub api_url: &'static str,
    pub app_id: &'static str,
}

pub const SERVERS: &[ServerConfig] = &[
    ServerConfig {
        id: "cn",
        api_url: "https://prod-cn-alicdn-gamestarter.kurogame.com/launcher/game/G152/10003_Y8xXrXk65DqFHEDgApn3cpK5lfczpFx5/index.json",
        app_id: "10003",
    },
    ServerConfig {
        id: "global",
        api_url: "https://prod-alicdn-gamestarter.kurogame.com/launcher/game/G153/50004_obOHXFrFanqsaIEOmuKroCcbZkQRBC7c/index.json",
        app_id: "50004",
    },
    ServerConfig {
        id: "bilibili",
        api_url: "https://prod-cn-alicdn-gamestarter.kurogame.com/launcher/game/G152/10004_j5GWFuUFlb8N31Wi2uS3ZAVHcb7ZGN7y/index.json",
        app_id: "10004",
    },
];

/// Files that differ between variants, relative to the install root.
pub const VARIANT_OVERRIDES: &[(&str, &[&str])] = &[
    (
        "cn",
        &[
            "Client/Binaries/Win64/kuro_login.dll",
            "Client/Content/Paks/pakchunk1-Kuro-Win64-Shipping.pak",
        ],
    ),
    (
        "bilibili",
        &[
            "Client/Binaries/Win64/bilibili_sdk.dll",
            "Client/Content/Paks/pakchunk1-Bilibili-Win64-Shipping.pak",
        ],
    ),
    (
        "global",
        &[
            "Client/Binaries/Win64/kuro_login.dll",
            "Client/Content/Paks/pakchunk1-Kuro-Win64-Shipping.pak",
        ],
    ),
];

pub fn server_by_id(id: &str) -> Option<&'static ServerConfig> {
    SERVERS.iter().find(|s| s.id == id)
}

pub fn server_by_app_id(app_id: &str) -> Option<&'static ServerConfig> {
    SERVERS.iter().find(|s| s.app_id == app_id)
}

/// Override set of one variant; empty for ids without overrides.
pub fn override_files(id: &str) -> &'static [&'static str] {
    VARIANT_OVERRIDES
        .iter()
        .find(|(variant, _)| *variant == id)
        .map(|(_, files)| *files)
        .unwrap_or(&[])
}
