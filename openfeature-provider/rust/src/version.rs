/// Version of this provider, reported in metadata and as the default wrapper version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
