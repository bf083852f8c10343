//! End-to-end runs over temporary source trees.

use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use squish_core::config::Backend;
use squish_core::pipeline::{EncodeRequest, Toolchain};
use squish_core::{
    Codec, Config, FileStatus, Optimizer, PipelineError, PipelineResult, RunEvent, RunManifest,
    RunOptions, RunState, SquishError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        Self { _dir: dir, root }
    }

    fn source(&self) -> PathBuf {
        self.root.join("src")
    }

    fn output(&self) -> PathBuf {
        self.root.join("src/optimized")
    }

    fn temp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.directories.source = self.source();
        config.directories.output = self.output();
        config.directories.backup = self.root.join("src/backup");
        config.directories.temp = self.temp();
        config.codec.backend = Backend::Native;
        config
    }

    fn write_image(&self, relative: &str, width: u32, height: u32, seed: u8) -> PathBuf {
        let path = self.source().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width) as u8,
                (y * 255 / height) as u8,
                seed.wrapping_add((x ^ y) as u8),
            ])
        })
        .save(&path)
        .unwrap();
        path
    }
}

/// Encodes to a fixed-size payload, or fails for inputs whose name contains "bad".
struct StubCodec {
    oversized_for_bad: bool,
}

#[async_trait]
impl Codec for StubCodec {
    fn name(&self) -> &str {
        "stub"
    }

    async fn encode(&self, input: &Path, request: EncodeRequest) -> PipelineResult<Vec<u8>> {
        let is_bad = input
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("bad"));
        if is_bad && !self.oversized_for_bad {
            return Err(PipelineError::Codec {
                path: input.to_path_buf(),
                message: "stub refuses".into(),
            });
        }
        let size = if is_bad { 1_000_000 } else { usize::from(request.quality) };
        let mut bytes = b"RIFF\0\0\0\0WEBP".to_vec();
        bytes.resize(size.max(12), 0);
        Ok(bytes)
    }
}

fn webp_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "webp"))
        .map(|e| e.path().strip_prefix(dir).unwrap().to_path_buf())
        .collect()
}

fn no_intermediates(temp: &Path) -> bool {
    match std::fs::read_dir(temp) {
        Ok(entries) => entries.count() == 0,
        Err(_) => true,
    }
}

#[tokio::test]
async fn oversized_image_is_resized_and_fits_cap() {
    let fx = Fixture::new();
    fx.write_image("photo.jpg", 600, 400, 7);

    let mut config = fx.config();
    config.resize.max_width = 192;
    config.resize.max_height = 108;
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);

    let report = optimizer.run(RunOptions::default()).await.unwrap();
    assert_eq!(optimizer.state(), RunState::Done);

    let stats = &report.statistics;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.optimized, 1);
    assert_eq!(stats.failed, 0);

    let out = fx.output().join("photo.webp");
    let size = std::fs::metadata(&out).unwrap().len();
    assert!(size <= 200 * 1024);
    let decoded = image::open(&out).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (162, 108));

    let entry = &report.manifest.images[0];
    assert_eq!(entry.original.path, "photo.jpg");
    assert_eq!(entry.optimized.path, "photo.webp");
    assert_eq!(entry.optimized.quality, 90);
    assert_eq!(entry.metadata.width, 600);
    assert!(entry.optimized.compression.ends_with('%'));

    assert!(report.manifest_path.exists());
    assert!(report.validation.passed());
    assert!(no_intermediates(&fx.temp()));
}

#[tokio::test]
async fn duplicates_are_recorded_not_encoded() {
    let fx = Fixture::new();
    let a = fx.write_image("a.png", 64, 48, 1);
    std::fs::create_dir_all(fx.source().join("sub")).unwrap();
    std::fs::copy(&a, fx.source().join("sub/b.png")).unwrap();
    fx.write_image("c.png", 64, 48, 99);

    let config = fx.config();
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);
    let options = RunOptions {
        concurrency: Some(1),
        ..Default::default()
    };

    let report = optimizer.run(options).await.unwrap();
    let stats = &report.statistics;
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.optimized, 2);
    assert_eq!(stats.duplicates_found, 1);

    let dup = &report.manifest.duplicates[0];
    assert_eq!(dup.original, PathBuf::from("a.png"));
    assert_eq!(dup.duplicate, PathBuf::from("sub/b.png"));

    let mut produced = webp_files(&fx.output());
    produced.sort();
    assert_eq!(produced, vec![PathBuf::from("a.webp"), PathBuf::from("c.webp")]);
}

#[tokio::test]
async fn one_failing_file_does_not_abort_the_batch() {
    let fx = Fixture::new();
    for (i, name) in ["one.png", "two.png", "bad.png", "three.png"].iter().enumerate() {
        fx.write_image(name, 32, 32, i as u8 * 40);
    }

    let config = fx.config();
    let toolchain = Toolchain::native(&config).with_codec(Arc::new(StubCodec {
        oversized_for_bad: false,
    }));
    let mut optimizer = Optimizer::new(config, toolchain);
    let options = RunOptions {
        concurrency: Some(2),
        ..Default::default()
    };

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let report = optimizer
        .run_with_progress(options, move |event| sink.lock().unwrap().push(event))
        .await
        .unwrap();

    let stats = &report.statistics;
    assert_eq!(stats.processed, 4);
    assert_eq!(stats.optimized, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].starts_with("Failed to process bad.png:"));
    assert!(stats.errors[0].contains("stub refuses"));
    assert_eq!(report.manifest.images.len(), 3);
    assert!(!fx.output().join("bad.webp").exists());

    let events = events.lock().unwrap();
    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::FileFinished {
                name,
                status: FileStatus::Failed,
            } => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec!["bad.png"]);
    assert!(matches!(events.last(), Some(RunEvent::State(RunState::Done))));
}

#[tokio::test]
async fn exhausted_ladder_leaves_no_output() {
    let fx = Fixture::new();
    fx.write_image("bad.png", 32, 32, 3);
    fx.write_image("good.png", 32, 32, 4);

    let mut config = fx.config();
    config.optimization.max_file_size = 10_000;
    let toolchain = Toolchain::native(&config).with_codec(Arc::new(StubCodec {
        oversized_for_bad: true,
    }));
    let mut optimizer = Optimizer::new(config, toolchain);

    let report = optimizer.run(RunOptions::default()).await.unwrap();
    assert_eq!(report.statistics.failed, 1);
    assert!(report.statistics.errors[0].contains("under 10000 bytes"));
    assert_eq!(webp_files(&fx.output()), vec![PathBuf::from("good.webp")]);
}

#[tokio::test]
async fn rerun_with_skip_existing_carries_entries_forward() {
    let fx = Fixture::new();
    fx.write_image("x.png", 40, 30, 10);
    fx.write_image("nested/y.png", 40, 30, 20);

    let config = fx.config();
    let mut optimizer = Optimizer::new(config.clone(), Toolchain::native(&config));
    let first = optimizer.run(RunOptions::default()).await.unwrap();
    assert_eq!(first.statistics.optimized, 2);

    let mut optimizer = Optimizer::new(config.clone(), Toolchain::native(&config));
    let second = optimizer
        .run(RunOptions {
            skip_existing: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.statistics.skipped, 2);
    assert_eq!(second.statistics.optimized, 0);
    assert_eq!(second.manifest.images, first.manifest.images);

    let on_disk = RunManifest::load(&fx.output()).unwrap().unwrap();
    assert_eq!(on_disk.images.len(), 2);
    assert_eq!(on_disk.statistics.skipped, 2);
}

#[tokio::test]
async fn backups_and_thumbnails_mirror_the_source_tree() {
    let fx = Fixture::new();
    fx.write_image("gallery/beach.png", 200, 100, 5);

    let mut config = fx.config();
    config.thumbnail.widths = vec![50, 100];
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);

    let report = optimizer
        .run(RunOptions {
            backup: true,
            thumbnails: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.statistics.optimized, 1);
    assert_eq!(report.statistics.thumbnails_generated, 2);
    assert!(fx.root.join("src/backup/gallery/beach.png").exists());
    assert!(fx.source().join("gallery/beach.png").exists());

    let thumb = fx.output().join("thumbnails/gallery/beach_50w.webp");
    let decoded = image::open(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 25));
    assert!(fx.output().join("thumbnails/gallery/beach_100w.webp").exists());
}

#[tokio::test]
async fn empty_source_still_writes_a_manifest() {
    let fx = Fixture::new();
    let config = fx.config();
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);

    let report = optimizer.run(RunOptions::default()).await.unwrap();
    assert_eq!(report.statistics.processed, 0);
    assert!(report.manifest.images.is_empty());
    assert!(report.manifest_path.exists());
    assert_eq!(report.manifest.statistics.compression_ratio, "0.00%");
}

#[tokio::test]
async fn unwritable_output_fails_the_run() {
    let fx = Fixture::new();
    let blocker = fx.root.join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut config = fx.config();
    config.directories.output = blocker.join("out");
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);

    let err = optimizer.run(RunOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("Cannot use directory"));
    assert_eq!(optimizer.state(), RunState::Failed);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn existing_readonly_output_fails_before_discovery() {
    // sysfs directories exist but refuse new files, even for root
    let readonly = Path::new("/sys/kernel");
    if !readonly.is_dir() {
        return;
    }
    let fx = Fixture::new();
    for name in ["one.png", "two.png", "three.png"] {
        fx.write_image(name, 16, 16, 1);
    }

    let mut config = fx.config();
    config.directories.output = readonly.to_path_buf();
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let err = optimizer
        .run_with_progress(RunOptions::default(), move |event| {
            sink.lock().unwrap().push(event)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SquishError::Setup(_)));
    assert_eq!(optimizer.state(), RunState::Failed);
    let events = events.lock().unwrap();
    assert!(!events.iter().any(|e| matches!(
        e,
        RunEvent::Discovered(_) | RunEvent::FileFinished { .. } | RunEvent::State(RunState::Discovering)
    )));
}

#[tokio::test]
async fn sources_sharing_a_stem_get_distinct_artifacts() {
    let fx = Fixture::new();
    fx.write_image("a.jpg", 64, 48, 11);
    fx.write_image("a.png", 32, 24, 200);
    fx.write_image("b.png", 32, 24, 50);

    let config = fx.config();
    let toolchain = Toolchain::native(&config);
    let mut optimizer = Optimizer::new(config, toolchain);
    let report = optimizer
        .run(RunOptions {
            concurrency: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.statistics.optimized, 3);
    let mut produced = webp_files(&fx.output());
    produced.sort();
    assert_eq!(
        produced,
        vec![
            PathBuf::from("a.jpg.webp"),
            PathBuf::from("a.png.webp"),
            PathBuf::from("b.webp"),
        ]
    );

    // Every entry describes the bytes actually on disk
    for entry in &report.manifest.images {
        let on_disk = std::fs::metadata(entry.optimized_path(&fx.output()))
            .unwrap()
            .len();
        assert_eq!(on_disk, entry.optimized.size, "{}", entry.original.path);
    }
    let decoded = image::open(fx.output().join("a.png.webp")).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 24));
}
