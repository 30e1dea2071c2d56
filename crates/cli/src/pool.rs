//! Bounded worker pool for transfers
//!
//! A fixed number of workers pull inputs from one shared FIFO queue and run
//! one transfer at a time. Outcomes are gathered in a single list. A failure
//! does not stop the other workers unless fail-fast is enabled, in which case
//! inputs still queued after the first failure are skipped.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use b2_core::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one [`TransferOrchestrator::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    /// Workers started, inputs being enqueued
    Running,
    /// Queue closed, workers finishing what is left
    Draining,
    Done,
}

/// Result of one input
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    Failed(Error),
    /// Not attempted because fail-fast tripped
    Skipped,
}

impl<T> Outcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// One input with its outcome
#[derive(Debug)]
pub struct Report<I, T> {
    pub input: I,
    pub outcome: Outcome<T>,
}

/// Runs transfers on a fixed-size pool of tasks
#[derive(Debug)]
pub struct TransferOrchestrator {
    workers: usize,
    fail_fast: bool,
    state: Arc<Mutex<PoolState>>,
}

impl TransferOrchestrator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            fail_fast: false,
            state: Arc::new(Mutex::new(PoolState::Idle)),
        }
    }

    /// Skip queued inputs once any transfer fails
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> PoolState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PoolState) {
        tracing::trace!(state = ?state, "Transfer pool state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run `transfer` for every input and collect the outcomes
    ///
    /// Reports come back in input order, whatever order the transfers
    /// finished in.
    pub async fn run<I, T, F, Fut>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        transfer: F,
    ) -> Vec<Report<I, T>>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        self.set_state(PoolState::Running);

        let (tx, rx) = flume::bounded::<(usize, I)>(self.workers * 2);
        let results: Arc<Mutex<Vec<(usize, Report<I, T>)>>> = Arc::default();
        let transfer = Arc::new(transfer);
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let rx = rx.clone();
                let results = Arc::clone(&results);
                let transfer = Arc::clone(&transfer);
                let cancel = cancel.clone();
                let fail_fast = self.fail_fast;

                tokio::spawn(async move {
                    while let Ok((index, input)) = rx.recv_async().await {
                        let outcome = if cancel.is_cancelled() {
                            Outcome::Skipped
                        } else {
                            match transfer(input.clone()).await {
                                Ok(value) => Outcome::Done(value),
                                Err(e) => {
                                    tracing::debug!(worker = worker, error = %e, "Transfer failed");
                                    Outcome::Failed(e)
                                }
                            }
                        };
                        if fail_fast && outcome.is_failed() {
                            cancel.cancel();
                        }
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((index, Report { input, outcome }));
                    }
                })
            })
            .collect();
        drop(rx);

        for (index, input) in inputs.into_iter().enumerate() {
            if tx.send_async((index, input)).await.is_err() {
                break;
            }
        }
        drop(tx);
        self.set_state(PoolState::Draining);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Transfer worker panicked");
            }
        }
        self.set_state(PoolState::Done);

        let mut reports = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}
