//! Tests for the project settings store.

use super::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct StoreFixture {
    _tmp: TempDir,
    root: Utf8PathBuf,
    store: FileProjectStore,
}

#[fixture]
fn store_fixture() -> StoreFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    let store = FileProjectStore::new(root.clone());
    StoreFixture {
        _tmp: tmp,
        root,
        store,
    }
}

fn sample_config() -> ProjectConfig {
    ProjectConfig {
        project: Some(String::from("mnist")),
        machine_type: Some(String::from("P4000")),
        container: Some(String::from("tensorflow/tensorflow:latest-gpu")),
        command: Some(String::from("python train.py")),
        last_job_id: Some(String::from("js123")),
        ..ProjectConfig::default()
    }
}

#[rstest]
fn load_without_file_returns_default(store_fixture: StoreFixture) {
    let config = store_fixture
        .store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(config, ProjectConfig::default());
}

#[rstest]
fn save_creates_directory_and_round_trips(store_fixture: StoreFixture) {
    let StoreFixture { root, store, .. } = store_fixture;

    let written = store
        .save(&sample_config())
        .unwrap_or_else(|err| panic!("save: {err}"));

    assert_eq!(written, root.join(".skiff").join("config.toml"));
    let loaded = store.load().unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(loaded, sample_config());
}

#[rstest]
fn save_omits_unset_fields(store_fixture: StoreFixture) {
    let written = store_fixture
        .store
        .save(&sample_config())
        .unwrap_or_else(|err| panic!("save: {err}"));

    let contents = std::fs::read_to_string(&written).unwrap_or_else(|err| panic!("read: {err}"));
    assert!(contents.contains("last_job_id = \"js123\""), "contents: {contents}");
    assert!(!contents.contains("dataset"), "contents: {contents}");
}

#[rstest]
fn load_rejects_malformed_toml(store_fixture: StoreFixture) {
    let dir = store_fixture.root.join(".skiff");
    std::fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(dir.join("config.toml"), "project = [")
        .unwrap_or_else(|err| panic!("write: {err}"));

    let err = store_fixture
        .store
        .load()
        .expect_err("malformed settings should fail");

    assert!(matches!(err, ProjectStoreError::Parse { .. }), "unexpected: {err}");
}

#[rstest]
fn load_treats_empty_file_as_default(store_fixture: StoreFixture) {
    let dir = store_fixture.root.join(".skiff");
    std::fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(dir.join("config.toml"), "\n").unwrap_or_else(|err| panic!("write: {err}"));

    let config = store_fixture
        .store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"));

    assert_eq!(config, ProjectConfig::default());
}
