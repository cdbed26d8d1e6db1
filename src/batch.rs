use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};

use crate::error::MarkerError;
use crate::models::RasterImage;
use crate::pipeline::{Pipeline, PipelineReport};

/// Outcome for one input of a batch
#[derive(Debug)]
pub struct BatchResult {
    pub path: Option<PathBuf>,
    pub result: Result<PipelineReport, MarkerError>,
}

/// Runs one pipeline over many images on a pool of worker threads.
///
/// Runs share the pipeline read-only, so the digit templates are built once.
/// Results come back in input order whatever order workers finish in.
pub struct BatchExecutor<'p> {
    pipeline: &'p Pipeline,
    workers: usize,
}

impl<'p> BatchExecutor<'p> {
    pub fn new(pipeline: &'p Pipeline) -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self { pipeline, workers }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Load and process each file
    pub fn execute(&self, paths: &[PathBuf]) -> Vec<BatchResult> {
        let results = self.run_jobs(paths.len(), |idx| {
            let image = RasterImage::open(&paths[idx])?;
            self.pipeline.run(&image)
        });

        paths
            .iter()
            .zip(results)
            .map(|(path, result)| {
                if let Err(e) = &result {
                    warn!("{}: {}", path.display(), e);
                }
                BatchResult {
                    path: Some(path.clone()),
                    result,
                }
            })
            .collect()
    }

    /// Process images already in memory
    pub fn execute_images(&self, images: &[RasterImage]) -> Vec<BatchResult> {
        self.run_jobs(images.len(), |idx| self.pipeline.run(&images[idx]))
            .into_iter()
            .map(|result| BatchResult { path: None, result })
            .collect()
    }

    fn run_jobs<F>(&self, count: usize, job: F) -> Vec<Result<PipelineReport, MarkerError>>
    where
        F: Fn(usize) -> Result<PipelineReport, MarkerError> + Sync,
    {
        if count == 0 {
            return Vec::new();
        }

        let workers = self.workers.min(count);
        info!("Processing {} images on {} workers", count, workers);

        let next_job = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for worker in 0..workers {
                let sender = sender.clone();
                let next_job = &next_job;
                let job = &job;
                scope.spawn(move || {
                    loop {
                        let idx = next_job.fetch_add(1, Ordering::Relaxed);
                        if idx >= count {
                            break;
                        }
                        debug!("Worker {} took image {}", worker, idx);
                        // Receiver outlives the scope
                        if sender.send((idx, job(idx))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(sender);

        let mut slots: Vec<Option<Result<PipelineReport, MarkerError>>> =
            (0..count).map(|_| None).collect();
        for (idx, result) in receiver {
            slots[idx] = Some(result);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    Err(MarkerError::Processing {
                        stage: "batch",
                        width: 0,
                        height: 0,
                        reason: format!("no result for image {}", idx),
                    })
                })
            })
            .collect()
    }
}
