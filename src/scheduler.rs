use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::{
    compose::{Compositor, CpuCompositor},
    core::{Canvas, JobSerial, PixelFormat},
    error::{FramemixError, FramemixResult},
    job::{FrameCallback, FrameJob, JobContext, SubframePlacement},
};

/// Configuration for [`FrameScheduler::start`].
pub struct SchedulerConfig {
    /// Worker thread count. Defaults to available CPU parallelism when
    /// `None`; must be >= 1 when set.
    pub workers: Option<usize>,
    /// Compositing engine invoked by the workers.
    pub compositor: Arc<dyn Compositor>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            compositor: Arc::new(CpuCompositor::default()),
        }
    }
}

/// Schedules composition jobs over a bounded worker pool and delivers
/// completion callbacks in strict submission order.
///
/// Assembly (`begin` / `add_subframe` / `finish`) is a single-caller surface
/// and never blocks beyond enqueuing. Composition runs in parallel on the
/// workers; a dedicated delivery thread reorders out-of-order completions so
/// that exactly one callback is in flight at a time, in serial order.
pub struct FrameScheduler {
    next_serial: JobSerial,
    open: Option<FrameJob>,
    job_tx: Option<Sender<FrameJob>>,
    workers: Vec<thread::JoinHandle<()>>,
    delivery: Option<thread::JoinHandle<()>>,
    in_flight: Arc<InFlight>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("next_serial", &self.next_serial)
            .field("open", &self.open.is_some())
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl FrameScheduler {
    /// Spawns the worker pool and the delivery thread.
    pub fn start(config: SchedulerConfig) -> FramemixResult<Self> {
        let worker_count = match config.workers {
            Some(0) => {
                return Err(FramemixError::invalid_state(
                    "scheduler worker count must be >= 1 when set",
                ));
            }
            Some(n) => n,
            None => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<FrameJob>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<FrameJob>();
        let in_flight = Arc::new(InFlight::default());

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let compositor = Arc::clone(&config.compositor);
            let handle = thread::Builder::new()
                .name(format!("framemix-worker-{i}"))
                .spawn(move || worker_loop(jobs, done, compositor))
                .map_err(|e| anyhow::Error::new(e).context("spawning worker thread"))?;
            workers.push(handle);
        }
        // The delivery channel disconnects once every worker has exited.
        drop(done_tx);

        let tracker = Arc::clone(&in_flight);
        let delivery = thread::Builder::new()
            .name("framemix-delivery".to_string())
            .spawn(move || delivery_loop(done_rx, tracker))
            .map_err(|e| anyhow::Error::new(e).context("spawning delivery thread"))?;

        debug!(workers = worker_count, "frame scheduler started");
        Ok(Self {
            next_serial: JobSerial(0),
            open: None,
            job_tx: Some(job_tx),
            workers,
            delivery: Some(delivery),
            in_flight,
        })
    }

    /// Opens a new job for assembly and returns its serial.
    ///
    /// Fails with `InvalidState` if a job is already open or the scheduler
    /// has been stopped.
    pub fn begin(
        &mut self,
        canvas: Canvas,
        format: PixelFormat,
        context: JobContext,
    ) -> FramemixResult<JobSerial> {
        if self.job_tx.is_none() {
            return Err(FramemixError::invalid_state("scheduler is stopped"));
        }
        if self.open.is_some() {
            return Err(FramemixError::invalid_state(
                "a job is already open for assembly",
            ));
        }
        let serial = self.next_serial;
        self.next_serial = serial.next();
        self.open = Some(FrameJob::new(serial, canvas, format, context));
        Ok(serial)
    }

    /// Appends a placement to the open job, retaining its image reference
    /// until the job is delivered and freed.
    pub fn add_subframe(&mut self, placement: SubframePlacement) -> FramemixResult<()> {
        let Some(job) = self.open.as_mut() else {
            return Err(FramemixError::invalid_state(
                "no job is open for assembly",
            ));
        };
        job.placements.push(placement);
        Ok(())
    }

    /// Seals the open job and dispatches it to the worker pool.
    pub fn finish(&mut self, callback: FrameCallback) -> FramemixResult<()> {
        let Some(tx) = self.job_tx.as_ref() else {
            return Err(FramemixError::invalid_state("scheduler is stopped"));
        };
        let Some(mut job) = self.open.take() else {
            return Err(FramemixError::invalid_state(
                "no job is open for assembly",
            ));
        };
        job.callback = Some(callback);
        trace!(
            serial = job.serial.0,
            placements = job.placements.len(),
            "sealed frame job"
        );

        // Count the job before dispatch so a worker finishing it immediately
        // cannot race `drain` past it.
        self.in_flight.add();
        if tx.send(job).is_err() {
            self.in_flight.complete();
            return Err(FramemixError::invalid_state("worker pool is shut down"));
        }
        Ok(())
    }

    /// Blocks until every dispatched job has been delivered.
    pub fn drain(&self) {
        self.in_flight.wait_empty();
    }

    /// Stops the scheduler, failing fast if work remains.
    ///
    /// Returns `ShutdownWithPendingWork` and leaves the scheduler running if
    /// a job is still open for assembly or any dispatched job has not been
    /// delivered; call [`drain`](Self::drain) first. Stopping is idempotent.
    pub fn stop(&mut self) -> FramemixResult<()> {
        if self.job_tx.is_none() {
            return Ok(());
        }
        if self.open.is_some() || self.in_flight.current() > 0 {
            return Err(FramemixError::ShutdownWithPendingWork);
        }
        self.shutdown();
        Ok(())
    }

    /// Closes the job channel and joins all threads. Callers must ensure no
    /// job is undelivered.
    fn shutdown(&mut self) {
        self.job_tx = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        if let Some(handle) = self.delivery.take() {
            if handle.join().is_err() {
                warn!("delivery thread panicked during shutdown");
            }
        }
        debug!("frame scheduler stopped");
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if self.job_tx.is_none() {
            return;
        }
        if let Some(job) = self.open.take() {
            warn!(
                serial = job.serial.0,
                "dropping scheduler with a job still open for assembly; its resources are released undelivered"
            );
        }
        self.in_flight.wait_empty();
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<FrameJob>, done: Sender<FrameJob>, compositor: Arc<dyn Compositor>) {
    for mut job in jobs {
        // A panicking engine must not take the worker (and the job's
        // in-flight count) down with it; it surfaces as a per-job error
        // through ordered delivery like any other compositing failure.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            compositor.compose(job.canvas, job.format, &job.placements)
        }))
        .unwrap_or_else(|_| Err(FramemixError::compositing("compositing engine panicked")));
        match &outcome {
            Ok(_) => trace!(serial = job.serial.0, "composed frame"),
            Err(e) => debug!(serial = job.serial.0, error = %e, "frame composition failed"),
        }
        job.outcome = Some(outcome);
        if done.send(job).is_err() {
            break;
        }
    }
}

/// Receives completed jobs in arbitrary order and flushes their callbacks in
/// strict serial order, withholding out-of-order completions until their
/// turn. Runs on a single thread, so no two callbacks ever overlap.
fn delivery_loop(done: Receiver<FrameJob>, in_flight: Arc<InFlight>) {
    let mut next_to_deliver = JobSerial(0);
    let mut finished: BTreeMap<JobSerial, FrameJob> = BTreeMap::new();

    for job in done {
        finished.insert(job.serial, job);
        while let Some(job) = finished.remove(&next_to_deliver) {
            debug!(serial = job.serial.0, "delivering composed frame");
            deliver_one(job);
            next_to_deliver = next_to_deliver.next();
            in_flight.complete();
        }
    }

    // The channel only disconnects after the workers exit, which requires an
    // empty queue; anything still buffered here is delivered in order.
    for (_, job) in std::mem::take(&mut finished) {
        deliver_one(job);
        in_flight.complete();
    }
}

/// Invokes one job's callback, containing a panicking callback so that
/// later jobs still get delivered and `drain` still wakes.
fn deliver_one(job: FrameJob) {
    let serial = job.serial;
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || job.deliver())).is_err() {
        warn!(serial = serial.0, "completion callback panicked");
    }
}

/// Count of dispatched-but-undelivered jobs, with a condvar wakeup for
/// `drain` instead of polling.
#[derive(Default)]
struct InFlight {
    count: Mutex<u64>,
    drained: Condvar,
}

impl InFlight {
    fn add(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
    }

    fn complete(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn current(&self) -> u64 {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_empty(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
