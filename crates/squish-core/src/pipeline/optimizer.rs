//! Run orchestration: discovery, bounded batches, validation, manifest.
//!
//! One run moves through [`RunState`] in order. Files are processed in
//! fixed-size batches; every member of a batch runs concurrently and the
//! next batch starts only after the slowest member finishes. A failing file
//! is recorded and never aborts the run; only setup errors (missing tools,
//! unwritable directories) and the final manifest write are fatal.

use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Backend, Config};
use crate::error::{PipelineError, PipelineResult, Result, SetupError};
use crate::manifest::{ManifestEntry, RunManifest};
use crate::types::{DuplicateRecord, RunStatistics, SourceImage, TARGET_FORMAT};

use super::codec::{Codec, CwebpCodec, NativeWebpCodec};
use super::discovery::FileDiscovery;
use super::encode::QualitySearchEncoder;
use super::hash::{DuplicateRegistry, Hasher};
use super::metadata::MetadataInspector;
use super::resize::{should_resize, Resizer};
use super::thumbnail::ThumbnailGenerator;
use super::tools::check_dependencies;
use super::validate::{OutputValidator, ValidationReport};

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Discovering,
    ProcessingBatches,
    Validating,
    WritingManifest,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::ProcessingBatches => "processing",
            Self::Validating => "validating",
            Self::WritingManifest => "writing manifest",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Copy each original into the backup root before touching it
    pub backup: bool,
    /// Generate responsive width variants
    pub thumbnails: bool,
    /// Override `processing.concurrency`
    pub concurrency: Option<usize>,
    /// Skip files already present in the previous manifest
    pub skip_existing: bool,
}

/// How a single file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Optimized,
    Duplicate,
    Skipped,
    Failed,
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The run entered a new state
    State(RunState),
    /// Discovery finished with this many files
    Discovered(usize),
    /// One file finished
    FileFinished { name: String, status: FileStatus },
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
    pub statistics: RunStatistics,
    pub validation: ValidationReport,
}

/// The codec, probe, and resizer a run uses.
#[derive(Clone)]
pub struct Toolchain {
    pub codec: Arc<dyn Codec>,
    pub inspector: MetadataInspector,
    pub resizer: Resizer,
}

impl Toolchain {
    /// Build the toolchain for the configured backend.
    ///
    /// The external backend verifies every binary can be spawned first.
    pub async fn from_config(config: &Config) -> std::result::Result<Self, SetupError> {
        match config.codec.backend {
            Backend::Native => Ok(Self::native(config)),
            Backend::External => {
                check_dependencies(&config.codec).await?;
                Ok(Self::external(config))
            }
        }
    }

    /// `cwebp`, `identify`, and `convert`.
    pub fn external(config: &Config) -> Self {
        let timeout_ms = config.limits.tool_timeout_ms;
        Self {
            codec: Arc::new(CwebpCodec::new(
                config.codec.cwebp.clone(),
                config.codec.method,
                timeout_ms,
            )),
            inspector: MetadataInspector::Identify {
                binary: config.codec.identify.clone(),
                timeout_ms,
            },
            resizer: Resizer::Convert {
                binary: config.codec.convert.clone(),
                timeout_ms,
            },
        }
    }

    /// In-process libwebp and `image` crate.
    pub fn native(config: &Config) -> Self {
        let timeout_ms = config.limits.tool_timeout_ms;
        Self {
            codec: Arc::new(NativeWebpCodec::new(timeout_ms)),
            inspector: MetadataInspector::Header,
            resizer: Resizer::Native { timeout_ms },
        }
    }

    /// Replace the codec, keeping probe and resizer.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }
}

/// Drives one optimization run over the configured directories.
pub struct Optimizer {
    config: Config,
    toolchain: Toolchain,
    state: RunState,
}

impl Optimizer {
    pub fn new(config: Config, toolchain: Toolchain) -> Self {
        Self {
            config,
            toolchain,
            state: RunState::Idle,
        }
    }

    /// Build an optimizer with the toolchain the config asks for.
    pub async fn from_config(config: Config) -> Result<Self> {
        let toolchain = Toolchain::from_config(&config).await?;
        Ok(Self::new(config, toolchain))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run without progress reporting.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport> {
        self.run_with_progress(options, |_| {}).await
    }

    /// Run, reporting progress through `on_event`.
    pub async fn run_with_progress<F>(&mut self, options: RunOptions, on_event: F) -> Result<RunReport>
    where
        F: Fn(RunEvent) + Send + Sync,
    {
        let result = self.execute(&options, &on_event).await;
        if result.is_err() {
            self.enter(RunState::Failed, &on_event);
        }
        result
    }

    async fn execute<F>(&mut self, options: &RunOptions, on_event: &F) -> Result<RunReport>
    where
        F: Fn(RunEvent) + Send + Sync,
    {
        let start = Instant::now();
        let source_dir = self.config.source_dir();
        let output_dir = self.config.output_dir();
        let backup_dir = self.config.backup_dir();
        let temp_dir = self.config.temp_dir();

        let mut required = vec![output_dir.clone(), temp_dir.clone()];
        if options.backup {
            required.push(backup_dir.clone());
        }
        setup_directories(&required)?;

        self.enter(RunState::Discovering, on_event);

        let discovery = FileDiscovery::new(
            self.config.optimization.source_formats.clone(),
            vec![output_dir.clone(), backup_dir.clone(), temp_dir.clone()],
        );
        let discovered = discovery.discover(&source_dir);
        let mut stats = RunStatistics {
            warnings: discovered.warnings,
            ..Default::default()
        };
        let files = discovered.files;
        tracing::info!(
            "Found {} images ({} bytes) under {:?}",
            files.len(),
            FileDiscovery::total_size(&files),
            source_dir
        );
        on_event(RunEvent::Discovered(files.len()));

        let previous = if options.skip_existing {
            load_previous(&output_dir, &mut stats.warnings)
        } else {
            HashMap::new()
        };

        self.enter(RunState::ProcessingBatches, on_event);
        let processor = FileProcessor {
            encoder: QualitySearchEncoder::new(
                self.toolchain.codec.clone(),
                self.config.optimization.quality_ladder.clone(),
                self.config.optimization.max_file_size,
            ),
            thumbnails: options.thumbnails.then(|| {
                ThumbnailGenerator::new(self.toolchain.codec.clone(), self.config.thumbnail.clone())
            }),
            toolchain: &self.toolchain,
            config: &self.config,
            registry: DuplicateRegistry::new(),
            previous,
            shared_targets: shared_targets(&files),
            backup: options.backup,
            output_dir: &output_dir,
            backup_dir: &backup_dir,
            temp_dir: &temp_dir,
        };

        let concurrency = options
            .concurrency
            .unwrap_or(self.config.processing.concurrency)
            .max(1);
        let mut entries = Vec::new();
        let mut duplicates = Vec::new();

        for (index, batch) in files.chunks(concurrency).enumerate() {
            tracing::debug!("Batch {} ({} files)", index + 1, batch.len());
            let outcomes = join_all(batch.iter().map(|image| processor.process(image))).await;

            for (image, outcome) in batch.iter().zip(outcomes) {
                stats.processed += 1;
                let status = outcome.status();
                match outcome {
                    FileOutcome::Optimized {
                        entry,
                        thumbnails,
                        warnings,
                    } => {
                        stats.optimized += 1;
                        stats.thumbnails_generated += thumbnails;
                        stats.total_size_before += entry.original.size;
                        stats.total_size_after += entry.optimized.size;
                        stats.warnings.extend(warnings);
                        entries.push(entry);
                    }
                    FileOutcome::Duplicate(record) => {
                        stats.duplicates_found += 1;
                        duplicates.push(record);
                    }
                    FileOutcome::Skipped(entry) => {
                        stats.skipped += 1;
                        entries.push(entry);
                    }
                    FileOutcome::Failed { error, warnings } => {
                        stats.failed += 1;
                        stats.warnings.extend(warnings);
                        stats
                            .errors
                            .push(format!("Failed to process {}: {error}", image.name));
                    }
                }
                on_event(RunEvent::FileFinished {
                    name: image.name.clone(),
                    status,
                });
            }
        }
        drop(processor);

        self.enter(RunState::Validating, on_event);
        let validation = OutputValidator::new(
            self.config.optimization.max_file_size,
            &self.config.optimization.source_formats,
        )
        .validate(&output_dir);
        for oversized in &validation.issues.oversized_images {
            stats.warnings.push(format!(
                "Image {} exceeds size limit: {}",
                oversized.path, oversized.size
            ));
        }
        if validation.passed() {
            tracing::info!("All images meet size requirements");
        } else {
            tracing::warn!(
                "{} images still exceed size limit",
                validation.summary.oversized
            );
        }

        self.enter(RunState::WritingManifest, on_event);
        cleanup_temp(&temp_dir);
        stats.elapsed = start.elapsed();

        entries.sort_by(|a, b| a.original.path.cmp(&b.original.path));
        duplicates.sort_by(|a, b| a.duplicate.cmp(&b.duplicate));
        let manifest = RunManifest::new(entries, duplicates, &stats);
        let manifest_path = manifest.write(&output_dir)?;
        tracing::info!("Manifest generated: {:?}", manifest_path);

        self.enter(RunState::Done, on_event);
        Ok(RunReport {
            manifest,
            manifest_path,
            statistics: stats,
            validation,
        })
    }

    fn enter<F: Fn(RunEvent)>(&mut self, state: RunState, on_event: &F) {
        tracing::debug!("Run state: {} -> {}", self.state, state);
        self.state = state;
        on_event(RunEvent::State(state));
    }
}

/// Result of processing one source file.
#[derive(Debug)]
enum FileOutcome {
    Optimized {
        entry: ManifestEntry,
        thumbnails: u64,
        warnings: Vec<String>,
    },
    Duplicate(DuplicateRecord),
    Skipped(ManifestEntry),
    Failed {
        error: PipelineError,
        warnings: Vec<String>,
    },
}

impl FileOutcome {
    fn status(&self) -> FileStatus {
        match self {
            Self::Optimized { .. } => FileStatus::Optimized,
            Self::Duplicate(_) => FileStatus::Duplicate,
            Self::Skipped(_) => FileStatus::Skipped,
            Self::Failed { .. } => FileStatus::Failed,
        }
    }
}

/// Per-run state shared by every file task.
struct FileProcessor<'a> {
    config: &'a Config,
    toolchain: &'a Toolchain,
    encoder: QualitySearchEncoder,
    thumbnails: Option<ThumbnailGenerator>,
    registry: DuplicateRegistry,
    previous: HashMap<String, ManifestEntry>,
    shared_targets: HashSet<PathBuf>,
    backup: bool,
    output_dir: &'a Path,
    backup_dir: &'a Path,
    temp_dir: &'a Path,
}

impl FileProcessor<'_> {
    async fn process(&self, image: &SourceImage) -> FileOutcome {
        let mut warnings = Vec::new();
        match self.process_inner(image, &mut warnings).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!("Failed to process {}: {error}", image.name);
                FileOutcome::Failed { error, warnings }
            }
        }
    }

    async fn process_inner(
        &self,
        image: &SourceImage,
        warnings: &mut Vec<String>,
    ) -> PipelineResult<FileOutcome> {
        let hash = Hasher::hash_file(&image.path).await?;

        if self.config.processing.check_duplicates {
            if let Some(original) = self.registry.check_duplicate(&hash, image).await {
                tracing::info!(
                    "Duplicate found: {} (same as {})",
                    image.relative_path.display(),
                    original.relative_path.display()
                );
                return Ok(FileOutcome::Duplicate(DuplicateRecord {
                    original: original.relative_path,
                    duplicate: image.relative_path.clone(),
                    hash,
                }));
            }
        }

        if let Some(entry) = self.previous.get(&hash) {
            if entry.optimized_path(self.output_dir).exists() {
                tracing::debug!("Skipping {}: already optimized", image.name);
                return Ok(FileOutcome::Skipped(entry.clone()));
            }
        }

        if self.backup {
            self.create_backup(image).await?;
        }

        let (metadata, warning) = self.toolchain.inspector.inspect_or_default(&image.path).await;
        warnings.extend(warning);

        // The intermediate is deleted when this guard drops, after encoding
        let resized = if should_resize(&metadata, self.config.resize) {
            tracing::debug!(
                "Resizing {} from {}x{}",
                image.name,
                metadata.width,
                metadata.height
            );
            Some(
                self.toolchain
                    .resizer
                    .resize(image, self.config.resize, self.temp_dir)
                    .await?,
            )
        } else {
            None
        };
        let encode_input = resized.as_deref().unwrap_or(image.path.as_path());

        let target = self.output_path(image);
        let artifact = self.encoder.encode(encode_input, &target).await?;
        drop(resized);

        tracing::info!(
            "Optimized: {} ({} -> {} bytes, q{})",
            image.name,
            image.size,
            artifact.size,
            artifact.quality
        );

        let mut thumbnails = 0;
        if let Some(generator) = &self.thumbnails {
            let (variants, thumb_warnings) = generator
                .generate(&artifact.path, self.output_dir, &image.name)
                .await;
            tracing::debug!("{} thumbnails for {}", variants.len(), image.name);
            thumbnails = variants.len() as u64;
            warnings.extend(thumb_warnings);
        }

        Ok(FileOutcome::Optimized {
            entry: ManifestEntry::new(image, &artifact, self.output_dir, metadata, hash),
            thumbnails,
            warnings: std::mem::take(warnings),
        })
    }

    fn output_path(&self, image: &SourceImage) -> PathBuf {
        let plain = default_target(&image.relative_path);
        let relative = if self.shared_targets.contains(&plain) {
            keep_extension_target(&image.relative_path)
        } else {
            plain
        };
        self.output_dir.join(relative)
    }

    async fn create_backup(&self, image: &SourceImage) -> PipelineResult<()> {
        let backup_err = |e: std::io::Error| PipelineError::Backup {
            path: image.path.clone(),
            message: e.to_string(),
        };
        let target = self.backup_dir.join(&image.relative_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(backup_err)?;
        }
        tokio::fs::copy(&image.path, &target)
            .await
            .map_err(backup_err)?;
        Ok(())
    }
}

/// `<relative dir>/<stem>.webp`
fn default_target(relative: &Path) -> PathBuf {
    relative.with_extension(TARGET_FORMAT)
}

/// `<relative dir>/<name>.<ext>.webp`, used when stems collide.
fn keep_extension_target(relative: &Path) -> PathBuf {
    let mut name = relative.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TARGET_FORMAT);
    relative.with_file_name(name)
}

/// Default targets claimed by more than one source, e.g. `a.jpg` and `a.png`.
fn shared_targets(files: &[SourceImage]) -> HashSet<PathBuf> {
    let mut counts: HashMap<PathBuf, usize> = HashMap::new();
    for image in files {
        *counts.entry(default_target(&image.relative_path)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(target, _)| target)
        .collect()
}

/// Create each directory and prove it is writable.
fn setup_directories(dirs: &[PathBuf]) -> std::result::Result<(), SetupError> {
    for dir in dirs {
        let directory_err = |e: std::io::Error| SetupError::Directory {
            path: dir.clone(),
            message: e.to_string(),
        };
        std::fs::create_dir_all(dir).map_err(directory_err)?;
        tempfile::tempfile_in(dir).map_err(directory_err)?;
    }
    Ok(())
}

/// Index the previous manifest by hash. A bad manifest is a warning, not an error.
fn load_previous(output_dir: &Path, warnings: &mut Vec<String>) -> HashMap<String, ManifestEntry> {
    match RunManifest::load(output_dir) {
        Ok(Some(manifest)) => {
            tracing::info!(
                "Loaded {} entries from previous manifest",
                manifest.images.len()
            );
            manifest
                .entries_by_hash()
                .into_iter()
                .map(|(hash, entry)| (hash.to_string(), entry.clone()))
                .collect()
        }
        Ok(None) => HashMap::new(),
        Err(e) => {
            let message = format!("Previous manifest unreadable, reprocessing everything: {e}");
            tracing::warn!("{message}");
            warnings.push(message);
            HashMap::new()
        }
    }
}

/// Remove leftover resize intermediates. Errors are ignored.
fn cleanup_temp(temp_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(temp_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let is_intermediate = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("resized_"));
        if is_intermediate && entry.path().is_file() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::debug!("Could not remove {:?}: {e}", entry.path());
            }
        }
    }
}
