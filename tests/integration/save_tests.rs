//! Integration tests for saving and loading datasets through a content store

use crate::common::sample_data;
use crate::common::saving::{self, commit_title, csv_dataset, json_dataset};
use datasnap::dataset::{Commit, Meta, Readme, Transform};
use datasnap::progress::NilSink;
use datasnap::resolver::history;
use datasnap::signing::{verify_dataset, Signer};
use datasnap::snapshot::{write_dataset, SaveSwitches};
use datasnap::store::{ContentStore, MemStore};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_first_save_is_created_dataset() {
    let store = MemStore::new();
    let ds = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();

    assert_eq!(commit_title(&ds), "created dataset");
    assert_eq!(ds.commit.as_ref().unwrap().message.as_deref(), Some("created dataset"));
    let st = ds.structure.as_ref().unwrap();
    assert_eq!(st.format, "csv");
    assert_eq!(st.entries, Some(3));
    assert_eq!(st.err_count, Some(0));
    assert!(ds.stats.is_some());
}

#[test]
fn test_body_row_update_is_described() {
    let store = MemStore::new();
    let prev = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();

    let changed = "city,pop\ntoronto,40000000\nnew york,8500000\nchicago,300001\n";
    let next = saving::save_and_load(&store, csv_dataset("cities", changed), Some(&prev)).unwrap();

    assert_eq!(commit_title(&next), "body updated row 2");
    assert_eq!(next.previous_path, prev.path);
    assert_ne!(next.body_path, prev.body_path);
}

#[test]
fn test_meta_added_keeps_body() {
    let store = MemStore::new();
    let prev = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();

    let mut next = csv_dataset("cities", sample_data::cities_csv());
    next.meta = Some(Meta::titled("city populations"));
    let next = saving::save_and_load(&store, next, Some(&prev)).unwrap();

    assert_eq!(commit_title(&next), "meta added");
    assert_eq!(next.body_path, prev.body_path);
}

#[test]
fn test_body_inherited_from_previous() {
    let store = MemStore::new();
    let prev = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();

    let mut next = datasnap::dataset::Dataset::named("cities");
    next.commit = Some(Commit::default());
    next.structure = prev.structure.clone();
    next.meta = Some(Meta::titled("city populations"));
    let next = saving::save_and_load(&store, next, Some(&prev)).unwrap();

    assert_eq!(next.body_path, prev.body_path);
    assert_eq!(next.structure.unwrap().entries, Some(3));
}

#[test]
fn test_user_title_is_kept() {
    let store = MemStore::new();
    let mut ds = csv_dataset("cities", sample_data::cities_csv());
    ds.commit = Some(Commit {
        title: Some("initial import".into()),
        ..Default::default()
    });
    let ds = saving::save_and_load(&store, ds, None).unwrap();

    let commit = ds.commit.unwrap();
    assert_eq!(commit.title.as_deref(), Some("initial import"));
    assert_eq!(commit.message.as_deref(), Some("created dataset"));
}

#[test]
fn test_readme_and_transform_round_trip() {
    let store = MemStore::new();
    let mut ds = json_dataset("fruit", &sample_data::simple_json_data());
    ds.readme = Some(Readme::markdown("# Fruit\n\nprices per kilo\n"));
    ds.transform = Some(Transform {
        syntax: "starlark".into(),
        text: "def transform(ds, ctx):\n  return ds\n".into(),
        ..Default::default()
    });
    let loaded = saving::save_and_load(&store, ds, None).unwrap();

    let readme = loaded.readme.as_ref().unwrap();
    assert_eq!(readme.text, "# Fruit\n\nprices per kilo\n");
    assert!(readme.script_path.is_none());
    let transform = loaded.transform.as_ref().unwrap();
    assert_eq!(transform.text, "def transform(ds, ctx):\n  return ds\n");
    assert_eq!(transform.syntax, "starlark");
}

#[test]
fn test_loaded_readme_does_not_count_as_change() {
    let store = MemStore::new();
    let mut ds = json_dataset("fruit", &sample_data::simple_json_data());
    ds.readme = Some(Readme::markdown("# Fruit"));
    let prev = saving::save_and_load(&store, ds, None).unwrap();

    let mut next = json_dataset("fruit", &sample_data::simple_json_data());
    next.readme = prev.readme.clone();
    let err = saving::save(&store, next, Some(&prev)).unwrap_err();
    assert!(err.is_no_changes(), "{}", err);
}

#[test]
fn test_signature_verifies() {
    let store = MemStore::new();
    let mut ds = csv_dataset("cities", sample_data::cities_csv());
    ds.meta = Some(Meta::titled("cities"));
    let loaded = saving::save_and_load(&store, ds, None).unwrap();

    verify_dataset(&saving::key().public_key_base64(), &loaded).unwrap();

    let stranger = Signer::from_seed([9u8; 32]);
    assert!(verify_dataset(&stranger.public_key_base64(), &loaded).is_err());
}

#[test]
fn test_author_is_signing_key() {
    let store = MemStore::new();
    let ds = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();
    let author = ds.commit.unwrap().author.unwrap();
    assert_eq!(author.id, Some(saving::key().author_id()));
}

#[test]
fn test_history_walks_previous_paths() {
    let store = MemStore::new();
    let v1 = saving::save_and_load(&store, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();

    let mut next = csv_dataset("cities", sample_data::cities_csv());
    next.meta = Some(Meta::titled("cities"));
    let v2 = saving::save_and_load(&store, next, Some(&v1)).unwrap();

    let mut next = csv_dataset("cities", sample_data::cities_csv());
    next.meta = Some(Meta::titled("world cities"));
    let v3 = saving::save_and_load(&store, next, Some(&v2)).unwrap();

    let shared: Arc<dyn ContentStore> = Arc::new(store.clone());
    let log = history(shared.clone(), v3.path.as_deref().unwrap(), None).unwrap();
    let titles: Vec<&str> = log.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["meta updated title", "meta added", "created dataset"]);
    assert_eq!(log[2].path, v1.path.clone().unwrap());

    let limited = history(shared, v3.path.as_deref().unwrap(), Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_pin_switch() {
    let store = MemStore::new();
    let switches = SaveSwitches {
        pin: true,
        ..Default::default()
    };
    let path = saving::save_with(
        &store,
        csv_dataset("cities", sample_data::cities_csv()),
        None,
        switches,
        &saving::options(),
        Arc::new(NilSink),
    )
    .unwrap();
    assert!(store.is_pinned(&path));

    let other = MemStore::new();
    let unpinned = saving::save(&other, csv_dataset("cities", sample_data::cities_csv()), None).unwrap();
    assert!(!other.is_pinned(&unpinned));
}

#[test]
fn test_write_dataset_skips_commit_description() {
    let store = MemStore::new();
    let mut ds = json_dataset("pairs", &json!([[1, 2], [3, 4]]));
    ds.commit = Some(Commit {
        title: Some("imported".into()),
        ..Default::default()
    });
    let path = write_dataset(
        &store,
        ds,
        None,
        &saving::key(),
        SaveSwitches::default(),
        &saving::options(),
        Arc::new(NilSink),
    )
    .unwrap();

    let loaded = saving::load(&store, &path).unwrap();
    assert_eq!(commit_title(&loaded), "imported");
    assert_eq!(loaded.commit.unwrap().message, None);
    assert_eq!(loaded.structure.unwrap().entries, Some(2));
}
