//! Runs independent async units of work in fixed-size waves separated by a
//! delay, so bulk remote calls stay under backend rate limits.

use futures_util::future::join_all;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default number of units per wave.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default pause between two waves.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Wave size and inter-wave delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_BATCH_DELAY,
        }
    }
}

/// What happened to one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome<T, E> {
    Completed(T),
    Failed(E),
    /// The unit panicked; the payload message is kept.
    Panicked(String),
    /// The unit was never scheduled because cancellation was requested.
    Cancelled,
}

impl<T, E> UnitOutcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, UnitOutcome::Completed(_))
    }
}

/// Outcomes of a batched run, in unit submission order.
#[derive(Debug, Clone)]
pub struct BatchReport<T, E> {
    outcomes: Vec<UnitOutcome<T, E>>,
    wave_sizes: Vec<usize>,
    cancelled: bool,
}

impl<T, E> BatchReport<T, E> {
    /// One outcome per submitted unit, including units never scheduled.
    pub fn outcomes(&self) -> &[UnitOutcome<T, E>] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<UnitOutcome<T, E>> {
        self.outcomes
    }

    /// Number of waves that were actually scheduled.
    pub fn waves(&self) -> usize {
        self.wave_sizes.len()
    }

    pub fn wave_sizes(&self) -> &[usize] {
        &self.wave_sizes
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T, E: std::fmt::Display> BatchReport<T, E> {
    /// Every failed, panicked or cancelled unit as `(index, reason)`.
    ///
    /// Meant for diagnostic logging only; callers report per-item failures
    /// from inside their own units.
    pub fn failures(&self) -> impl Iterator<Item = (usize, String)> + '_ {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| match outcome {
                UnitOutcome::Completed(_) => None,
                UnitOutcome::Failed(e) => Some((i, e.to_string())),
                UnitOutcome::Panicked(message) => Some((i, format!("panicked: {}", message))),
                UnitOutcome::Cancelled => Some((i, "cancelled".to_string())),
            })
    }
}

/// Executes units in waves of at most `batch_size`.
///
/// All units of a wave are polled concurrently within the calling task and
/// every one of them is awaited before the next wave starts. Cancellation is
/// honoured between waves only: in-flight units always finish.
#[derive(Debug, Clone, Default)]
pub struct Batcher {
    settings: BatchSettings,
}

impl Batcher {
    pub fn new(settings: BatchSettings) -> Self {
        Self { settings }
    }

    pub async fn run<I, Fut, T, E>(&self, units: I, cancel: &CancellationToken) -> BatchReport<T, E>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, E>>,
    {
        let batch_size = self.settings.batch_size.max(1);
        let mut units = units.into_iter();
        let mut report = BatchReport {
            outcomes: Vec::new(),
            wave_sizes: Vec::new(),
            cancelled: false,
        };

        loop {
            let chunk: Vec<Fut> = units.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }

            if !report.wave_sizes.is_empty() && !self.settings.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.delay) => {}
                }
            }

            if cancel.is_cancelled() {
                log::info!(
                    "Batch run cancelled after {} wave(s); remaining units were not scheduled",
                    report.wave_sizes.len()
                );
                report.cancelled = true;
                report
                    .outcomes
                    .extend(chunk.into_iter().map(|_| UnitOutcome::Cancelled));
                break;
            }

            let wave = report.wave_sizes.len() + 1;
            let size = chunk.len();
            let span = tracing::info_span!("batch_wave", wave, size);
            let results = join_all(
                chunk
                    .into_iter()
                    .map(|unit| AssertUnwindSafe(unit).catch_unwind()),
            )
            .instrument(span)
            .await;

            report.wave_sizes.push(size);
            report
                .outcomes
                .extend(results.into_iter().map(|result| match result {
                    Ok(Ok(value)) => UnitOutcome::Completed(value),
                    Ok(Err(e)) => UnitOutcome::Failed(e),
                    Err(payload) => UnitOutcome::Panicked(panic_message(payload.as_ref())),
                }));
        }

        if report.cancelled {
            report.outcomes.extend(units.map(|_| UnitOutcome::Cancelled));
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
