//! Integration tests: run a small synthetic corpus end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use houghscan_io::{
    BatchConfig, BatchOrchestrator, PartitionStatus, read_transport_dir,
    transport::ExportStatus,
};
use houghscan_pipeline::{Artifact, GrayImage, Variant};

/// Bright rectangle on a dark background.
fn rectangle(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let inside = (width / 4..3 * width / 4).contains(&x)
            && (height / 4..3 * height / 4).contains(&y);
        image::Luma([if inside { 210 } else { 25 }])
    })
}

/// Corpus with partitions `alpha` (two images, one corrupt file, one
/// non-image) and `beta` (one image).
fn build_corpus(root: &Path) {
    let alpha = root.join("alpha");
    let beta = root.join("beta");
    fs::create_dir_all(&alpha).unwrap();
    fs::create_dir_all(&beta).unwrap();

    rectangle(96, 64)
        .save_with_format(alpha.join("one.png"), image::ImageFormat::Png)
        .unwrap();
    image::DynamicImage::ImageLuma8(rectangle(64, 96))
        .to_rgb8()
        .save_with_format(alpha.join("Two.JPG"), image::ImageFormat::Jpeg)
        .unwrap();
    fs::write(alpha.join("broken.jpeg"), b"\xFF\xD8 truncated").unwrap();
    fs::write(alpha.join("notes.txt"), "not an image").unwrap();
    rectangle(80, 80)
        .save_with_format(beta.join("three.png"), image::ImageFormat::Png)
        .unwrap();
}

fn config(root: &Path, out: &Path) -> BatchConfig {
    BatchConfig {
        workers: 2,
        ..BatchConfig::new(root, out)
    }
}

#[test]
fn batch_writes_one_artifact_per_partition() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_corpus(root.path());

    let orchestrator = BatchOrchestrator::new(config(root.path(), out.path())).unwrap();
    let report = orchestrator.run().unwrap();

    let statuses: Vec<_> = report
        .partitions
        .iter()
        .map(|p| (p.partition.as_str(), p.status.clone()))
        .collect();
    assert_eq!(
        statuses,
        [
            (
                "alpha",
                PartitionStatus::PartialComplete {
                    images: 2,
                    failed: 1
                }
            ),
            ("beta", PartitionStatus::Complete { images: 1 }),
        ]
    );
    assert!(!report.has_failures());
    assert!(out.path().join("hough_data_alpha.bin").is_file());
    assert!(out.path().join("hough_data_beta.bin").is_file());

    let alpha = orchestrator.store().read("alpha").unwrap();
    let keys: Vec<_> = alpha.images.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Two.JPG", "one.png"]);
    let entry = &alpha.images["one.png"];
    assert_eq!(entry.path, "alpha/one.png");
    let Artifact::Hough(hough) = &entry.artifact else {
        unreachable!("default variant is hough")
    };
    assert_eq!(hough.edges.dimensions(), (24, 16));
    assert_eq!(hough.accumulator.dimensions(), (180, 180));
    assert!(hough.edges.pixels().any(|p| p.0[0] == 255));
}

#[test]
fn rerun_skips_every_partition_and_leaves_artifacts_untouched() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_corpus(root.path());

    BatchOrchestrator::new(config(root.path(), out.path()))
        .unwrap()
        .run()
        .unwrap();
    let artifact_path = out.path().join("hough_data_beta.bin");
    let before = fs::read(&artifact_path).unwrap();

    // A new image in an already-processed partition is not picked up.
    rectangle(32, 32)
        .save_with_format(root.path().join("beta").join("four.png"), image::ImageFormat::Png)
        .unwrap();

    let report = BatchOrchestrator::new(config(root.path(), out.path()))
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.written(), 0);
    assert_eq!(fs::read(&artifact_path).unwrap(), before);
}

#[test]
fn artifacts_are_deterministic_across_worker_counts() {
    let root = tempfile::tempdir().unwrap();
    build_corpus(root.path());

    let single = tempfile::tempdir().unwrap();
    let many = tempfile::tempdir().unwrap();
    for (dir, workers) in [(single.path(), 1), (many.path(), 4)] {
        let config = BatchConfig {
            workers,
            ..BatchConfig::new(root.path(), dir)
        };
        BatchOrchestrator::new(config).unwrap().run().unwrap();
    }
    assert_eq!(
        fs::read(single.path().join("hough_data_alpha.bin")).unwrap(),
        fs::read(many.path().join("hough_data_alpha.bin")).unwrap(),
    );
}

#[test]
fn transport_chunks_follow_processing() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let transport = tempfile::tempdir().unwrap();
    build_corpus(root.path());

    let config = BatchConfig {
        transport_dir: Some(transport.path().to_path_buf()),
        ..config(root.path(), out.path())
    };
    let report = BatchOrchestrator::new(config.clone()).unwrap().run().unwrap();
    assert_eq!(report.exports.len(), 2);
    assert!(
        report
            .exports
            .iter()
            .all(|e| matches!(e.status, ExportStatus::Written { files: 1, .. }))
    );
    assert!(transport.path().join("hough_data_alpha_part1.json").is_file());

    let records = read_transport_dir(transport.path()).unwrap();
    let keys: Vec<_> = records.keys().map(String::as_str).collect();
    assert_eq!(keys, ["alpha/Two.JPG", "alpha/one.png", "beta/three.png"]);
    let sinusoids = records["beta/three.png"].decode("hough_sinusoids").unwrap();
    assert_eq!(sinusoids.dimensions(), (180, 180));
    assert!(sinusoids.pixels().any(|p| p.0[0] > 0));

    let again = BatchOrchestrator::new(config).unwrap().run().unwrap();
    assert!(again.exports.iter().all(|e| e.status == ExportStatus::Skipped));
}

#[test]
fn gradient_variant_uses_its_own_prefix() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    build_corpus(root.path());

    let mut config = config(root.path(), out.path());
    config.extract.variant = Variant::Gradient;
    let orchestrator = BatchOrchestrator::new(config).unwrap();
    orchestrator.run().unwrap();

    assert!(out.path().join("edge_data_beta.bin").is_file());
    assert!(!out.path().join("hough_data_beta.bin").exists());
    let beta = orchestrator.store().read("beta").unwrap();
    let Artifact::Gradient(gradient) = &beta.images["three.png"].artifact else {
        unreachable!("configured for the gradient variant")
    };
    assert_eq!(gradient.magnitude.dimensions(), (40, 40));
    assert_eq!(gradient.hysteresis.dimensions(), (40, 40));
}
