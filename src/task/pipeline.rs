//! Multi-stage processing with bounded parallelism per stage.
//!
//! ## Architecture
//!
//! ```text
//!   input ─► feeder ─► [bounded(D0)] ─► stage 0 × D0 ─► [bounded(D1)] ─► stage 1 × D1 ─► .. ─► PipelineOutput
//!            thread                     worker threads                   worker threads          (iterator)
//! ```
//!
//! Each stage owns `degree` worker threads that pull from the previous
//! stage's channel and push into a channel of capacity `degree`. A stage can
//! therefore hold at most `degree` items in flight plus `degree` finished
//! items waiting downstream; once the downstream channel is full its workers
//! block instead of pulling more input.
//!
//! Items are `Result<T, ComputationError>`. A stage that returns an error or
//! panics turns that one item into an `Err`, which later stages pass through
//! without calling their function. Output order is whatever order the last
//! stage finishes in.
//!
//! Stages run on dedicated threads rather than the shared executor: they block
//! on channels, and parking executor threads that way could starve every
//! other component sharing the pool.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::task::Pipeline;
//!
//! let pipeline = Pipeline::create(|x: u64| x + 1, 2)
//!     .next(|x: u64| x * 10, 4)
//!     .next(|x: u64| x.to_string(), 1);
//! assert_eq!(pipeline.stage_count(), 3);
//!
//! let mut out: Vec<String> = pipeline
//!     .process(1..=3)
//!     .unwrap()
//!     .map(|item| item.unwrap())
//!     .collect();
//! out.sort();
//! assert_eq!(out, vec!["20", "30", "40"]);
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, bounded};

use crate::error::{BoxError, ComputationError};
use crate::sync::run_guarded;

/// Item flowing between stages.
pub type Item<T> = Result<T, ComputationError>;

type Link<I, O> = dyn Fn(Receiver<Item<I>>, &mut Vec<JoinHandle<()>>) -> io::Result<Receiver<Item<O>>>
    + Send
    + Sync
    + 'static;

/// Chain of transform stages, each with its own degree of parallelism.
///
/// A `Pipeline` is only a description; every call to
/// [`process`](Pipeline::process) starts a fresh set of worker threads.
pub struct Pipeline<I, O> {
    link: Arc<Link<I, O>>,
    degrees: Vec<usize>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            degrees: self.degrees.clone(),
        }
    }
}

fn spawn_stage<I, O, E, F>(
    index: usize,
    stage: Arc<F>,
    degree: usize,
    input: Receiver<Item<I>>,
    workers: &mut Vec<JoinHandle<()>>,
) -> io::Result<Receiver<Item<O>>>
where
    I: Send + 'static,
    O: Send + 'static,
    E: Into<BoxError>,
    F: Fn(I) -> Result<O, E> + Send + Sync + 'static,
{
    let (tx, rx) = bounded(degree);
    for worker in 0..degree {
        let input = input.clone();
        let tx = tx.clone();
        let stage = Arc::clone(&stage);
        let handle = thread::Builder::new()
            .name(format!("pipeline-stage-{index}-{worker}"))
            .spawn(move || {
                tracing::debug!(stage = index, worker, "pipeline worker started");
                for item in input.iter() {
                    let result = match item {
                        Ok(value) => run_guarded(|| (*stage)(value)),
                        Err(err) => Err(err),
                    };
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                tracing::debug!(stage = index, worker, "pipeline worker stopped");
            })?;
        workers.push(handle);
    }
    Ok(rx)
}

fn join_workers(workers: &mut Vec<JoinHandle<()>>) {
    for handle in workers.drain(..) {
        if handle.join().is_err() {
            tracing::error!("pipeline thread panicked");
        }
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Starts a pipeline with an infallible first stage.
    ///
    /// `degree` is the number of items the stage works on at once; `0` is
    /// treated as `1`.
    pub fn create<F>(stage: F, degree: usize) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::try_create(move |value: I| Ok::<O, BoxError>(stage(value)), degree)
    }

    /// Starts a pipeline with a fallible first stage.
    pub fn try_create<F, E>(stage: F, degree: usize) -> Self
    where
        F: Fn(I) -> Result<O, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let degree = degree.max(1);
        let stage = Arc::new(stage);
        let link: Arc<Link<I, O>> = Arc::new(
            move |input: Receiver<Item<I>>, workers: &mut Vec<JoinHandle<()>>| {
                spawn_stage(0, Arc::clone(&stage), degree, input, workers)
            },
        );
        Self {
            link,
            degrees: vec![degree],
        }
    }

    /// Appends an infallible stage.
    pub fn next<P, F>(self, stage: F, degree: usize) -> Pipeline<I, P>
    where
        P: Send + 'static,
        F: Fn(O) -> P + Send + Sync + 'static,
    {
        self.try_next(move |value: O| Ok::<P, BoxError>(stage(value)), degree)
    }

    /// Appends a fallible stage.
    pub fn try_next<P, F, E>(self, stage: F, degree: usize) -> Pipeline<I, P>
    where
        P: Send + 'static,
        F: Fn(O) -> Result<P, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let degree = degree.max(1);
        let index = self.degrees.len();
        let upstream = self.link;
        let stage = Arc::new(stage);
        let link: Arc<Link<I, P>> = Arc::new(
            move |input: Receiver<Item<I>>, workers: &mut Vec<JoinHandle<()>>| {
                let intermediate = upstream(input, workers)?;
                spawn_stage(index, Arc::clone(&stage), degree, intermediate, workers)
            },
        );
        let mut degrees = self.degrees;
        degrees.push(degree);
        Pipeline { link, degrees }
    }

    /// Number of stages.
    pub fn stage_count(&self) -> usize {
        self.degrees.len()
    }

    /// Degree of parallelism of each stage, first stage first.
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Starts worker threads and feeds `input` through every stage.
    ///
    /// Each call spawns one OS thread per unit of degree in every stage, plus
    /// a feeder thread, so keep degrees near the core count. The threads live
    /// until the returned output is exhausted or dropped.
    ///
    /// Fails only if a thread cannot be spawned. Per-item failures are
    /// reported through the returned iterator.
    pub fn process<T>(&self, input: T) -> io::Result<PipelineOutput<O>>
    where
        T: IntoIterator<Item = I>,
        T::IntoIter: Send + 'static,
    {
        let capacity = self.degrees.first().copied().unwrap_or(1);
        let (feed_tx, feed_rx) = bounded(capacity);
        let mut workers = Vec::with_capacity(self.degrees.iter().sum::<usize>() + 1);

        let output = match (self.link)(feed_rx, &mut workers) {
            Ok(output) => output,
            Err(err) => {
                drop(feed_tx);
                join_workers(&mut workers);
                return Err(err);
            },
        };

        let items = input.into_iter();
        let feeder = thread::Builder::new()
            .name("pipeline-feeder".to_string())
            .spawn(move || {
                for item in items {
                    if feed_tx.send(Ok(item)).is_err() {
                        break;
                    }
                }
            });
        match feeder {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                drop(output);
                join_workers(&mut workers);
                return Err(err);
            },
        }

        tracing::debug!(
            stages = self.degrees.len(),
            threads = workers.len(),
            "pipeline started"
        );
        Ok(PipelineOutput {
            output: Some(output),
            workers,
        })
    }
}

impl<I, O> fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("degrees", &self.degrees)
            .finish()
    }
}

/// Results of one [`Pipeline::process`] run, in completion order.
///
/// Dropping it early stops the workers once they notice the closed channel,
/// and joins them.
pub struct PipelineOutput<O> {
    output: Option<Receiver<Item<O>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<O> PipelineOutput<O> {
    /// Splits the remaining results into successes and failures.
    pub fn partition_results(self) -> (Vec<O>, Vec<ComputationError>) {
        let mut values = Vec::new();
        let mut failures = Vec::new();
        for item in self {
            match item {
                Ok(value) => values.push(value),
                Err(err) => failures.push(err),
            }
        }
        (values, failures)
    }
}

impl<O> Iterator for PipelineOutput<O> {
    type Item = Item<O>;

    fn next(&mut self) -> Option<Self::Item> {
        self.output.as_ref()?.recv().ok()
    }
}

impl<O> Drop for PipelineOutput<O> {
    fn drop(&mut self) {
        self.output.take();
        join_workers(&mut self.workers);
        tracing::debug!("pipeline stopped");
    }
}

impl<O> fmt::Debug for PipelineOutput<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOutput")
            .field("threads", &self.workers.len())
            .field("open", &self.output.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn single_stage_maps_every_item() {
        let pipeline = Pipeline::create(|x: i32| x * x, 3);
        let mut out: Vec<_> = pipeline.process(0..10).unwrap().map(Result::unwrap).collect();
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    }

    #[test]
    fn zero_degree_is_clamped() {
        let pipeline = Pipeline::create(|x: u8| x, 0).next(|x: u8| x, 0);
        assert_eq!(pipeline.degrees(), &[1, 1]);
        assert_eq!(pipeline.process([1, 2, 3]).unwrap().count(), 3);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let pipeline = Pipeline::create(|x: u32| x, 2);
        assert_eq!(pipeline.process(Vec::new()).unwrap().count(), 0);
    }

    #[test]
    fn failures_skip_later_stages() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = later_calls.clone();
        let pipeline = Pipeline::try_create(
            |x: u32| if x % 10 == 0 { Err(format!("bad item {x}")) } else { Ok(x) },
            2,
        )
        .next(
            |x: u32| -> u32 {
                if x == 7 {
                    panic!("seven");
                }
                x
            },
            2,
        )
        .next(
            move |x: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                x
            },
            1,
        );

        let (values, failures) = pipeline.process(1..=30).unwrap().partition_results();
        assert_eq!(values.len(), 26);
        assert_eq!(failures.len(), 4);
        assert_eq!(later_calls.load(Ordering::SeqCst), 26);
        assert!(
            failures
                .iter()
                .any(|err| matches!(err, ComputationError::Panicked(m) if m == "seven"))
        );
    }

    #[test]
    fn stage_parallelism_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let pipeline = Pipeline::create(
            move |x: u32| {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                a.fetch_sub(1, Ordering::SeqCst);
                x
            },
            3,
        );

        let out: HashSet<_> = pipeline.process(0..60).unwrap().map(Result::unwrap).collect();
        assert_eq!(out.len(), 60);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn dropping_output_early_stops_workers() {
        let pipeline = Pipeline::create(|x: u64| x, 2).next(|x: u64| x + 1, 2);
        let mut output = pipeline.process(0..).unwrap();
        for _ in 0..5 {
            assert!(output.next().unwrap().is_ok());
        }
        drop(output);
    }

    #[test]
    fn each_stage_runs_on_its_own_named_threads() {
        let names = Arc::new(parking_lot::Mutex::new(HashSet::new()));
        let (first, second) = (names.clone(), names.clone());
        let record = |names: &parking_lot::Mutex<HashSet<String>>| {
            if let Some(name) = thread::current().name() {
                names.lock().insert(name.to_string());
            }
        };
        let pipeline = Pipeline::create(
            move |x: u32| {
                record(&first);
                x
            },
            2,
        )
        .next(
            move |x: u32| {
                record(&second);
                x
            },
            3,
        );

        let output = pipeline.process(0..200).unwrap();
        assert_eq!(output.count(), 200);

        let names = names.lock();
        assert!(names.len() <= 5);
        assert!(names.iter().all(|n| n.starts_with("pipeline-stage-0-")
            || n.starts_with("pipeline-stage-1-")));
        assert!(names.iter().all(|n| n != "pipeline-stage-0-2"));
    }

    #[test]
    fn pipeline_is_reusable() {
        let pipeline = Pipeline::create(|s: &'static str| s.len(), 1);
        let first: usize = pipeline.process(["a", "bb"]).unwrap().map(Result::unwrap).sum();
        let second: usize = pipeline.process(["ccc"]).unwrap().map(Result::unwrap).sum();
        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }
}
