//! Integration tests for the persistent cache.
//!
//! These tests run real batches against an on-disk SQLite store:
//! - The database is created on first use
//! - Results survive closing and reopening the store
//! - Damaged records are recomputed, never surfaced as errors
//! - Maintenance operations keep the store usable

use assert_fs::prelude::*;
use assert_fs::TempDir;
use photolab::core::buffer::{ImageSource, PixelBuffer};
use photolab::core::cache::{CacheStore, EvictionPolicy, SqliteStore};
use photolab::core::invoke::CacheStatus;
use photolab::core::pipeline::{BatchResult, Pipeline};
use photolab::core::transform::TransformRequest;
use predicates::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn gradient(label: &str, seed: u8) -> ImageSource {
    ImageSource::Memory {
        label: label.to_string(),
        buffer: PixelBuffer::from_fn(16, 12, 3, |x, y, px| {
            px.copy_from_slice(&[seed.wrapping_add(x as u8 * 11), y as u8 * 17, 90]);
        })
        .unwrap(),
    }
}

fn run_blur_sharpen(db: &Path, images: &[ImageSource]) -> BatchResult {
    let store = SqliteStore::open(db).unwrap();
    Pipeline::builder()
        .transform("gaussian_blur:kernel_size=3".parse().unwrap())
        .transform(TransformRequest::named("sharpen"))
        .cache(Arc::new(store))
        .workers(2)
        .build()
        .unwrap()
        .run(images)
        .unwrap()
}

#[test]
fn store_is_created_on_first_use() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("nested").child("cache.db");
    db.assert(predicate::path::missing());

    run_blur_sharpen(db.path(), &[gradient("a", 1)]);

    db.assert(predicate::path::is_file());
}

#[test]
fn results_survive_reopening_the_store() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("cache.db");
    let images = vec![gradient("a", 1), gradient("b", 2)];

    let first = run_blur_sharpen(db.path(), &images);
    let second = run_blur_sharpen(db.path(), &images);

    assert_eq!(first.summary.cache_writes, 4);
    assert_eq!(second.summary.cache_hits, 4);
    assert_eq!(second.summary.cache_writes, 0);
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(b.step("gaussian_blur"), Some(CacheStatus::Hit));
        assert_eq!(b.step("sharpen"), Some(CacheStatus::Hit));
        assert_eq!(a.output().unwrap().buffer, b.output().unwrap().buffer);
    }
}

#[test]
fn changed_parameters_do_not_reuse_results() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("cache.db");
    let images = vec![gradient("a", 1)];
    run_blur_sharpen(db.path(), &images);

    let store = SqliteStore::open(db.path()).unwrap();
    let batch = Pipeline::builder()
        .transform("gaussian_blur:kernel_size=5".parse().unwrap())
        .cache(Arc::new(store))
        .build()
        .unwrap()
        .run(&images)
        .unwrap();

    assert_eq!(batch.results[0].step("gaussian_blur"), Some(CacheStatus::Stored));
}

#[test]
fn corrupted_records_are_recomputed() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("cache.db");
    let images = vec![gradient("a", 1)];
    let fresh = run_blur_sharpen(db.path(), &images);

    let raw = rusqlite::Connection::open(db.path()).unwrap();
    raw.execute("UPDATE entries SET payload = x'deadbeef'", []).unwrap();
    drop(raw);

    let again = run_blur_sharpen(db.path(), &images);

    assert!(again.results[0].is_success());
    assert_eq!(again.results[0].step("gaussian_blur"), Some(CacheStatus::Stored));
    assert_eq!(
        fresh.results[0].output().unwrap().buffer,
        again.results[0].output().unwrap().buffer
    );

    // The replacement records are readable again
    let third = run_blur_sharpen(db.path(), &images);
    assert_eq!(third.summary.cache_hits, 2);
}

#[test]
fn deleted_records_are_recomputed() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("cache.db");
    let images = vec![gradient("a", 1)];
    run_blur_sharpen(db.path(), &images);

    SqliteStore::open(db.path()).unwrap().clear().unwrap();
    let again = run_blur_sharpen(db.path(), &images);

    assert_eq!(again.summary.cache_hits, 0);
    assert_eq!(again.summary.cache_writes, 2);
}

#[test]
fn prune_keeps_the_store_usable() {
    let temp = TempDir::new().unwrap();
    let db = temp.child("cache.db");
    let images: Vec<ImageSource> = (0..3).map(|i| gradient(&format!("img{}", i), i * 40)).collect();
    run_blur_sharpen(db.path(), &images);

    let store = SqliteStore::open(db.path()).unwrap();
    assert_eq!(store.stats().unwrap().total_entries, 6);
    assert_eq!(store.prune(&EvictionPolicy::Never).unwrap(), 0);
    let removed = store.prune(&EvictionPolicy::MaxEntries(2)).unwrap();
    assert_eq!(removed, 4);
    drop(store);

    let batch = run_blur_sharpen(db.path(), &images);
    assert_eq!(batch.succeeded(), 3);
    assert_eq!(batch.summary.cache_hits + batch.summary.cache_writes, 6);
}

#[test]
fn outputs_can_be_written_as_png() {
    let temp = TempDir::new().unwrap();
    let out = temp.child("out.png");
    let batch = run_blur_sharpen(temp.child("cache.db").path(), &[gradient("a", 3)]);

    let buffer = &batch.results[0].output().unwrap().buffer;
    buffer.to_dynamic().save(out.path()).unwrap();

    out.assert(predicate::path::is_file());
    let reloaded = ImageSource::from(out.path()).load().unwrap();
    assert_eq!(&reloaded, buffer);
}
