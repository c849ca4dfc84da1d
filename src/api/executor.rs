// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::Verdict;
use crate::errors::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A unit of verification work
pub type Job = Box<dyn FnOnce() -> Result<Verdict, Error> + Send + 'static>;

/// Completion of a submitted [`Job`]
pub type JobFuture = Pin<Box<dyn Future<Output = Result<Verdict, Error>> + Send + 'static>>;

/// Where verification jobs run.  Implementations must not alter a job's
/// result.
pub trait Executor: Send + Sync + fmt::Debug {
    fn submit(&self, job: Job) -> JobFuture;
}

/// Runs every job on the submitting thread, before `submit` returns
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn submit(&self, job: Job) -> JobFuture {
        Box::pin(std::future::ready(job()))
    }
}

/// Runs jobs on the blocking pool of a private tokio runtime, keeping heavy
/// crypto off the caller's threads
pub struct WorkerPool {
    rt: Option<tokio::runtime::Runtime>,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, Error> {
        let threads = threads.max(1);

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("tee-verifier-worker")
            .build()
            .map_err(|e| Error::Internal(format!("starting worker pool: {e}")))?;

        log::debug!("worker pool started with {threads} thread(s)");

        Ok(Self {
            rt: Some(rt),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish()
    }
}

impl Executor for WorkerPool {
    fn submit(&self, job: Job) -> JobFuture {
        let rt = match self.rt.as_ref() {
            Some(rt) => rt,
            None => {
                return Box::pin(std::future::ready(Err(Error::Internal(
                    "worker pool is shut down".to_string(),
                ))))
            }
        };

        let handle = rt.spawn_blocking(job);

        Box::pin(async move {
            match handle.await {
                Ok(r) => r,
                Err(e) => Err(Error::Internal(format!("verification job failed: {e}"))),
            }
        })
    }
}

impl Drop for WorkerPool {
    // The pool may be torn down from within another runtime, where a blocking
    // shutdown would panic.
    fn drop(&mut self) {
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}
