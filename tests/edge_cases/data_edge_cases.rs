//! Edge cases in body data and dataset inputs

use crate::common::sample_data;
use crate::common::saving::{self, commit_title, csv_dataset, json_dataset};
use chrono::{FixedOffset, TimeZone};
use datasnap::config::SaveConfig;
use datasnap::dataset::{BodySource, Commit, Dataset, Structure};
use datasnap::progress::{NilSink, RecordingSink, SaveEvent};
use datasnap::snapshot::{create_dataset, SaveSwitches};
use datasnap::store::MemStore;
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_empty_json_array_body() {
    let ds = saving::save_and_load(&MemStore::new(), json_dataset("empty", &json!([])), None).unwrap();
    let st = ds.structure.as_ref().unwrap();
    assert_eq!(st.entries, Some(0));
    assert_eq!(st.depth, Some(1));
    assert_eq!(commit_title(&ds), "created dataset");
}

#[test]
fn test_object_body_keyed_changes() {
    let store = MemStore::new();
    let prev = saving::save_and_load(&store, json_dataset("kv", &json!({"a": 1, "b": 2})), None).unwrap();
    let next = saving::save_and_load(&store, json_dataset("kv", &json!({"a": 1, "b": 3, "c": 4})), Some(&prev))
        .unwrap();
    assert_eq!(commit_title(&next), "body updated key b and added key c");
}

#[test]
fn test_unicode_body_bytes_are_preserved() {
    let body = "id,name,description\n1,Café,Delicious café ☕\n2,北京,Beijing in Chinese 中文\n3,🚀,Rocket\n";
    let ds = saving::save_and_load(&MemStore::new(), csv_dataset("unicode", body), None).unwrap();

    assert_eq!(ds.structure.as_ref().unwrap().entries, Some(3));
    let stored = ds.body_file.unwrap().read_all().unwrap();
    assert_eq!(stored, body.as_bytes());
}

#[test]
fn test_ndjson_body() {
    let mut ds = Dataset::named("events");
    ds.commit = Some(Commit::default());
    ds.set_body_file(BodySource::from_bytes(
        "body.ndjson",
        b"{\"kind\":\"a\"}\n\n{\"kind\":\"b\",\"n\":[1,2]}\n".to_vec(),
    ));
    let loaded = saving::save_and_load(&MemStore::new(), ds, None).unwrap();
    let st = loaded.structure.unwrap();
    assert_eq!(st.format, "ndjson");
    assert_eq!(st.entries, Some(2));
    assert_eq!(st.depth, Some(3));
}

#[test]
fn test_compressed_body() {
    let raw = sample_data::numeric_csv(20, 3);
    let compressed = zstd::encode_all(raw.as_bytes(), 3).unwrap();
    let mut ds = Dataset::named("packed");
    ds.commit = Some(Commit::default());
    ds.set_body_file(BodySource::from_bytes("body.csv.zst", compressed));

    let loaded = saving::save_and_load(&MemStore::new(), ds, None).unwrap();
    let st = loaded.structure.unwrap();
    assert_eq!(st.format, "csv");
    assert_eq!(st.compression.as_deref(), Some("zst"));
    assert_eq!(st.entries, Some(20));
}

#[test]
fn test_malformed_json_body() {
    let mut ds = Dataset::named("bad");
    ds.commit = Some(Commit::default());
    ds.structure = Some(Structure::new("json"));
    ds.set_body_file(BodySource::from_bytes("body.json", b"[1, 2, {oops}]".to_vec()));

    let err = saving::save(&MemStore::new(), ds, None).unwrap_err();
    assert!(err.to_string().contains("reading row 2"), "{}", err);
}

#[test]
fn test_json_trailing_whitespace_counts_toward_length() {
    let body = format!("[1,2]{}\n", " ".repeat(200));
    let mut ds = Dataset::named("padded");
    ds.commit = Some(Commit::default());
    ds.structure = Some(Structure::new("json"));
    ds.set_body_file(BodySource::from_bytes("body.json", body.clone().into_bytes()));

    let loaded = saving::save_and_load(&MemStore::new(), ds, None).unwrap();
    let st = loaded.structure.as_ref().unwrap();
    assert_eq!(st.length, Some(body.len() as u64));
    assert_eq!(st.entries, Some(2));
    assert_eq!(loaded.body_file.unwrap().read_all().unwrap(), body.as_bytes());
}

#[test]
fn test_json_trailing_garbage_is_rejected() {
    let mut ds = Dataset::named("bad");
    ds.commit = Some(Commit::default());
    ds.structure = Some(Structure::new("json"));
    ds.set_body_file(BodySource::from_bytes("body.json", b"[1,2] this is not json {".to_vec()));

    let store = MemStore::new();
    let err = saving::save(&store, ds, None).unwrap_err();
    assert!(err.to_string().contains("trailing data after top-level value"), "{}", err);
    // only the body bytes reached the store
    assert_eq!(store.addresses().len(), 1);
}

#[test]
fn test_missing_body_everywhere() {
    let mut ds = Dataset::named("nobody");
    ds.commit = Some(Commit::default());
    ds.structure = Some(Structure::new("json"));
    let err = saving::save(&MemStore::new(), ds, None).unwrap_err();
    assert_eq!(err.to_string(), "bodyfile or previous bodyfile needed");
}

#[test]
fn test_missing_key() {
    let err = create_dataset(
        &MemStore::new(),
        csv_dataset("cities", sample_data::cities_csv()),
        None,
        None,
        SaveSwitches::default(),
        &saving::options(),
        Arc::new(NilSink),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "private key is required to create a dataset");
}

#[test]
fn test_missing_commit() {
    let mut ds = csv_dataset("cities", sample_data::cities_csv());
    ds.commit = None;
    let err = saving::save(&MemStore::new(), ds, None).unwrap_err();
    assert_eq!(err.to_string(), "commit is required");
}

#[test]
fn test_local_timestamp_is_saved_as_utc() {
    let offset = FixedOffset::west_opt(8 * 3600).unwrap();
    let ts = offset.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap();
    let mut ds = csv_dataset("cities", sample_data::cities_csv());
    ds.commit = Some(Commit {
        timestamp: Some(ts),
        ..Default::default()
    });

    let loaded = saving::save_and_load(&MemStore::new(), ds, None).unwrap();
    let saved = loaded.commit.unwrap().timestamp.unwrap();
    assert_eq!(saved, ts);
    assert_eq!(saved.offset().local_minus_utc(), 0);
    assert_eq!(saved.to_rfc3339(), "2009-11-11T07:00:00+00:00");
}

#[test]
fn test_many_batches_on_large_body() {
    let body = sample_data::numeric_csv(12_000, 4);
    let sink = Arc::new(RecordingSink::new());
    let path = saving::save_with(
        &MemStore::new(),
        csv_dataset("large", &body),
        None,
        SaveSwitches::default(),
        &saving::options_with(SaveConfig::default()),
        sink.clone(),
    )
    .unwrap();
    assert!(path.starts_with("/mem/"));

    // default batch size of 5000 gives batches of 5000, 5000 and 2000
    assert_eq!(sink.count(SaveEvent::is_progress), 4);
}
