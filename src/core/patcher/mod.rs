mod archive;

pub use archive::ArchivePatcher;
