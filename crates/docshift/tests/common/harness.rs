//! Test harness for isolated lifecycle tests.
//!
//! Each `TestHarness` owns a temporary storage root, an in-memory database
//! and a `JobManager` wired to a `ScriptedRunner`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docshift::strategy::StrategyRegistry;
use docshift::{
    ArtifactStore, ConversionContext, ConversionJob, Database, JobManager, ToolRunner,
};

use super::runner::{Behavior, ScriptedRunner};

pub const OWNER: &str = "tester";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where test inputs are written before being registered.
    pub input_dir: PathBuf,
    pub storage_root: PathBuf,
    pub db: Database,
    pub runner: Arc<ScriptedRunner>,
    pub manager: Arc<JobManager>,
}

impl TestHarness {
    /// A harness whose tools always succeed with a small PDF.
    pub fn new() -> Self {
        Self::with_runner(ScriptedRunner::always(Behavior::Produce(
            b"%PDF-1.4 scripted".to_vec(),
        )))
    }

    pub fn with_runner(runner: ScriptedRunner) -> Self {
        Self::with_runner_and_lease(runner, Duration::from_secs(600))
    }

    pub fn with_runner_and_lease(runner: ScriptedRunner, lease: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let storage_root = temp_dir.path().join("storage");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let store = ArtifactStore::new(&storage_root);
        store.ensure_layout().expect("Failed to create storage layout");

        let db = Database::open_in_memory().expect("Failed to open database");
        let runner = Arc::new(runner);
        let tool_runner: Arc<dyn ToolRunner> = runner.clone();

        let manager = JobManager::new(ConversionContext {
            db: db.clone(),
            store,
            strategies: StrategyRegistry::new(tool_runner),
            processing_lease: lease,
        });

        Self {
            temp_dir,
            input_dir,
            storage_root,
            db,
            runner,
            manager: Arc::new(manager),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a test input file to the input directory.
    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Write a PNG with an opaque body and a transparent top-left pixel.
    pub fn write_png(&self, filename: &str, width: u32, height: u32) -> PathBuf {
        let path = self.input_dir.join(filename);
        let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([220, 30, 30, 255]));
        img.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        img.save_with_format(&path, image::ImageFormat::Png)
            .expect("Failed to write PNG");
        path
    }

    /// Register `content` as an upload named `filename`.
    pub fn upload(&self, filename: &str, content: &[u8]) -> ConversionJob {
        let path = self.write_input(&format!("src-{}", sanitized(filename)), content);
        self.manager
            .register_upload(&path, filename, OWNER)
            .expect("Failed to register upload")
    }

    /// Register a generated PNG as an upload named `filename`.
    pub fn upload_png(&self, filename: &str, width: u32, height: u32) -> ConversionJob {
        let path = self.write_png(&format!("src-{}", sanitized(filename)), width, height);
        self.manager
            .register_upload(&path, filename, OWNER)
            .expect("Failed to register upload")
    }

    /// Reload a job from the database.
    pub fn job(&self, id: i64) -> ConversionJob {
        self.manager.find(id).expect("Failed to load job")
    }

    /// Absolute path of a job's stored original.
    pub fn original_path(&self, job: &ConversionJob) -> PathBuf {
        self.manager
            .store()
            .original_path(&job.original_path)
            .expect("Invalid original path")
    }

    /// Overwrite columns of a row directly, bypassing the lifecycle.
    pub fn force_update(&self, sql: &str, id: i64) {
        self.db
            .with_conn(|conn| {
                conn.execute(sql, rusqlite::params![id])?;
                Ok(())
            })
            .expect("Failed to update row");
    }
}

fn sanitized(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}
