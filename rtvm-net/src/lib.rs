// rtvm-net/src/lib.rs
pub mod catalog;
pub mod http;
pub mod retry;
pub mod validation;

pub use catalog::{
    find_release, latest_stable, parse_catalog, select_artifact, CatalogSource, RemoteCatalog,
};
pub use http::{
    build_http_client, persist_with, store_body, ArtifactFetcher, HttpDownloader,
    PersistOutcome, ProgressSink, RenameFn,
};
pub use retry::with_fallback;
pub use validation::{digest_file, validate_url, verify_checksum, verify_content_type};
