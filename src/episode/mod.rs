mod download;
mod filename;

pub use download::{DownloadContext, DownloadOutcome, download_episode};
pub use filename::{Destination, NameContext, destination, expand_tilde, interpolate, name_context};
