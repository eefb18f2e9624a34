mod artifact;
mod manifest;

pub use artifact::{ArtifactStore, FsArtifactStore};
pub use manifest::RunStore;
