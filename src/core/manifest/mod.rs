pub mod links;
pub mod model;
pub mod resolver;

pub use links::{join_url, resource_url};
pub use model::{
    select_cdn, CdnNode, GameSection, LauncherInfo, ManifestEntry, PatchDescriptor,
    PredownloadSection, ResourceIndex,
};
pub use resolver::ManifestResolver;
