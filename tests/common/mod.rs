#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The two-run gamma simulation shipped with the tests.
pub fn gamma_sample() -> Utf8PathBuf {
    Utf8PathBuf::from(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/data/gamma_sample.simtel.jsonl"
    ))
}

/// A fresh temporary directory and a not yet existing `name` inside it.
pub fn tmp_output(name: &str) -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
    (dir, path)
}

pub fn read_file(path: &Utf8Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
