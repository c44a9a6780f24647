#![allow(dead_code)]

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Read a fixture containing hex encoded bytes.
pub fn hex_fixture(name: &str) -> Vec<u8> {
    let text = std::fs::read_to_string(fixture_path(name)).expect("failed to read fixture");
    hex::decode(text.trim()).expect("fixture is not valid hex")
}

/// Log to the test writer, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
