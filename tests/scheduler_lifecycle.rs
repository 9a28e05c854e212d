use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use framemix::{
    Canvas, Compositor, CpuCompositor, FrameBuffer, FrameScheduler, FramemixError,
    FramemixResult, PixelFormat, SchedulerConfig, SubframePlacement,
};

struct FixedDelayCompositor {
    delay: Duration,
    inner: CpuCompositor,
}

impl Compositor for FixedDelayCompositor {
    fn compose(
        &self,
        canvas: Canvas,
        format: PixelFormat,
        placements: &[SubframePlacement],
    ) -> FramemixResult<FrameBuffer> {
        std::thread::sleep(self.delay);
        self.inner.compose(canvas, format, placements)
    }
}

fn delayed_scheduler(workers: usize, delay_ms: u64) -> FrameScheduler {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    FrameScheduler::start(SchedulerConfig {
        workers: Some(workers),
        compositor: Arc::new(FixedDelayCompositor {
            delay: Duration::from_millis(delay_ms),
            inner: CpuCompositor::default(),
        }),
    })
    .unwrap()
}

fn submit_counting_job(scheduler: &mut FrameScheduler, delivered: &Arc<AtomicUsize>) {
    scheduler
        .begin(Canvas::new(4, 4).unwrap(), PixelFormat::Rgba8, Box::new(()))
        .unwrap();
    let count = Arc::clone(delivered);
    scheduler
        .finish(Box::new(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
}

#[test]
fn drain_returns_only_after_every_job_is_delivered() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let mut scheduler = delayed_scheduler(2, 20);

    for _ in 0..6 {
        submit_counting_job(&mut scheduler, &delivered);
    }
    scheduler.drain();
    assert_eq!(delivered.load(Ordering::SeqCst), 6);

    // Draining an idle scheduler returns immediately.
    let start = Instant::now();
    scheduler.drain();
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn independent_jobs_run_in_parallel() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = delayed_scheduler(4, 100);

    let start = Instant::now();
    for i in 0..4u64 {
        scheduler
            .begin(Canvas::new(4, 4).unwrap(), PixelFormat::Rgba8, Box::new(()))
            .unwrap();
        let log = Arc::clone(&delivered);
        scheduler
            .finish(Box::new(move |_, _| log.lock().unwrap().push(i)))
            .unwrap();
    }
    scheduler.drain();
    let elapsed = start.elapsed();

    // Four 100ms jobs on four workers: well under the 400ms serial cost.
    assert!(
        elapsed < Duration::from_millis(300),
        "expected parallel execution, took {elapsed:?}"
    );
    assert_eq!(*delivered.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn stop_with_dispatched_work_fails_fast() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let mut scheduler = delayed_scheduler(1, 150);

    submit_counting_job(&mut scheduler, &delivered);
    let err = scheduler.stop().unwrap_err();
    assert!(matches!(err, FramemixError::ShutdownWithPendingWork));

    // The scheduler keeps running; the job is still delivered.
    scheduler.drain();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    scheduler.stop().unwrap();
}

#[test]
fn dropping_a_scheduler_waits_for_in_flight_work() {
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let mut scheduler = delayed_scheduler(2, 50);
        for _ in 0..3 {
            submit_counting_job(&mut scheduler, &delivered);
        }
        // No drain: Drop must not leak or abandon the dispatched jobs.
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 3);
}

#[test]
fn default_config_uses_cpu_parallelism() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let mut scheduler = FrameScheduler::start(SchedulerConfig::default()).unwrap();
    submit_counting_job(&mut scheduler, &delivered);
    scheduler.drain();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    scheduler.stop().unwrap();
}
