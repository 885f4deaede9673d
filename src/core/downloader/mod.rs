mod client;
mod transport;

pub use client::{
    install_atomically, temp_sibling, ArtifactKind, DownloadFailure, DownloadJob, DownloadResult,
    Downloader, Installed,
};
pub use transport::{HttpTransport, Transport};
