// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use std::{fs, io::Cursor, path::Path, sync::Arc};
use synthsync::{
    BACKGROUND_TAG, BulkDeleter, Error, FRAME_DATA_FILE, IngestionOrchestrator, MemoryStore,
};
use tempfile::TempDir;

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(vec![]);
    image::RgbImage::new(width, height)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

fn write_folder(root: &Path, name: &str, frame: &str, image: Option<&str>) {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join(FRAME_DATA_FILE), frame).unwrap();
    if let Some(image) = image {
        fs::write(folder.join(image), png(320, 240)).unwrap();
    }
}

/// Folder A has two "cup" boxes, folder B has no detections and folder C
/// does not parse.
fn capture_root() -> TempDir {
    let root = TempDir::new().unwrap();
    write_folder(
        root.path(),
        "A",
        r#"{"frame": 0, "captures": [{"filename": "rgb_a.png", "annotations": [{"values": [
            {"labelName": "cup", "origin": [16, 24], "dimension": [64, 48]},
            {"labelName": "cup", "origin": [300, 200], "dimension": [64, 64]}
        ]}]}]}"#,
        Some("rgb_a.png"),
    );
    write_folder(
        root.path(),
        "B",
        r#"{"frame": 1, "captures": [{"filename": "rgb_b.png", "annotations": [{"values": []}]}]}"#,
        Some("rgb_b.png"),
    );
    write_folder(root.path(), "C", "{\"frame\": 2, \"captures\": [", None);
    root
}

#[tokio::test]
async fn test_ingest_capture_root() -> Result<(), Error> {
    let root = capture_root();
    let store = Arc::new(MemoryStore::new());

    let report = IngestionOrchestrator::new(store.clone())
        .run(root.path(), 2, 2)
        .await?;

    assert_eq!(report.folders, 3);
    assert_eq!(report.records, 2);
    assert_eq!(report.uploaded, 2);
    assert!(report.capture_failures.is_empty());
    assert!(report.batch_failures.is_empty());
    assert!(!report.cancelled);

    assert_eq!(report.skipped_folders.len(), 1);
    assert!(report.skipped_folders[0].0.ends_with("C"));
    assert!(matches!(
        report.skipped_folders[0].1,
        Error::MalformedAnnotation(_, _)
    ));

    let tags = store.tags().await;
    let mut names = tags.iter().map(|t| t.name()).collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec![BACKGROUND_TAG, "cup"]);
    assert_eq!(store.calls().create_tag, 2);

    let tag_id = |name: &str| tags.iter().find(|t| t.name() == name).unwrap().id();
    let images = store.images().await;
    assert_eq!(images.len(), 2);

    let a = images.iter().find(|i| i.name == "rgb_a.png").unwrap();
    assert_eq!(a.tag_ids, vec![tag_id("cup")]);
    assert_eq!(a.regions.len(), 2);
    assert_eq!(a.regions[0].left, 0.05);
    assert_eq!(a.regions[0].top, 0.1);
    assert_eq!(a.regions[0].width, 0.2);
    assert_eq!(a.regions[0].height, 0.2);
    // The second box overhangs the image and is clamped to its edges.
    assert!(a.regions[1].left + a.regions[1].width <= 1.0);
    assert!(a.regions[1].top + a.regions[1].height <= 1.0);

    let b = images.iter().find(|i| i.name == "rgb_b.png").unwrap();
    assert_eq!(b.tag_ids, vec![tag_id(BACKGROUND_TAG)]);
    assert!(b.regions.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_existing_background_tag_is_reused() -> Result<(), Error> {
    let root = capture_root();
    let store = Arc::new(MemoryStore::new().with_tags(&[BACKGROUND_TAG]));

    let report = IngestionOrchestrator::new(store.clone())
        .run(root.path(), 10, 1)
        .await?;

    assert_eq!(report.uploaded, 2);
    assert_eq!(store.calls().create_tag, 1);
    assert_eq!(store.tags().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_ingest_then_teardown() -> Result<(), Error> {
    let root = capture_root();
    let store = Arc::new(MemoryStore::new().with_images(230));

    let report = IngestionOrchestrator::new(store.clone())
        .run(root.path(), 1, 3)
        .await?;
    assert_eq!(report.uploaded, 2);
    assert_eq!(store.image_count().await, 232);

    let report = BulkDeleter::new(store.clone()).delete_all().await;
    assert_eq!(report.images_deleted, 232);
    assert_eq!(report.tags_deleted, 2);
    assert!(report.failures.is_empty());
    assert_eq!(store.image_count().await, 0);
    assert!(store.tags().await.is_empty());
    Ok(())
}
