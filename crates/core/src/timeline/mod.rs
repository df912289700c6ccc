use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Pausable monotonic clock.
///
/// Time accumulates only while running. [`PlaybackClock::advance`] adds time
/// directly, which lets headless drivers and tests step it deterministically.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    accumulated: Duration,
    resumed_at: Option<Instant>,
}

impl PlaybackClock {
    /// A clock that is already running.
    pub fn start() -> Self {
        Self {
            accumulated: Duration::ZERO,
            resumed_at: Some(Instant::now()),
        }
    }

    /// A clock that only moves through [`PlaybackClock::advance`] until resumed.
    pub fn paused() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.resumed_at.is_some()
    }

    pub fn pause(&mut self) {
        if let Some(resumed_at) = self.resumed_at.take() {
            self.accumulated += resumed_at.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }

    pub fn advance(&mut self, delta: Duration) {
        self.accumulated += delta;
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .resumed_at
                .map(|resumed_at| resumed_at.elapsed())
                .unwrap_or(Duration::ZERO)
    }
}

/// Passed to every frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub index: u64,
    pub delta: Duration,
}

pub type FrameCallback = Box<dyn FnMut(&FrameTick)>;

/// Stops a registered frame callback from being invoked again.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Source of display-frame callbacks.
pub trait FrameScheduler {
    fn on_frame(&mut self, callback: FrameCallback) -> CancellationHandle;
}

struct Registration {
    handle: CancellationHandle,
    callback: FrameCallback,
}

/// Invokes callbacks only when pumped. Drives tests and offline rendering.
#[derive(Default)]
pub struct ManualScheduler {
    registrations: Vec<Registration>,
    next_index: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one frame on every live callback and returns how many ran.
    pub fn pump(&mut self, delta: Duration) -> usize {
        self.registrations
            .retain(|registration| !registration.handle.is_cancelled());

        let tick = FrameTick {
            index: self.next_index,
            delta,
        };
        self.next_index += 1;

        let mut invoked = 0;
        for registration in &mut self.registrations {
            // A callback earlier in this frame may have cancelled a later one.
            if registration.handle.is_cancelled() {
                continue;
            }
            (registration.callback)(&tick);
            invoked += 1;
        }
        invoked
    }

    pub fn active(&self) -> usize {
        self.registrations
            .iter()
            .filter(|registration| !registration.handle.is_cancelled())
            .count()
    }

    pub fn frames_pumped(&self) -> u64 {
        self.next_index
    }
}

impl FrameScheduler for ManualScheduler {
    fn on_frame(&mut self, callback: FrameCallback) -> CancellationHandle {
        let handle = CancellationHandle::new();
        self.registrations.push(Registration {
            handle: handle.clone(),
            callback,
        });
        handle
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("registrations", &self.registrations.len())
            .field("next_index", &self.next_index)
            .finish()
    }
}

/// Paces frames on the calling thread at a fixed rate.
#[derive(Debug)]
pub struct FixedRateScheduler {
    interval: Duration,
    inner: ManualScheduler,
}

impl FixedRateScheduler {
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            interval: Duration::from_secs(1) / fps,
            inner: ManualScheduler::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs frames until every callback is cancelled or `limit` frames have
    /// been produced. Returns the number of frames produced.
    pub fn run(&mut self, limit: Option<u64>) -> u64 {
        let mut produced = 0;
        let mut last = Instant::now();
        let mut deadline = last + self.interval;

        while self.inner.active() > 0 && limit.map_or(true, |limit| produced < limit) {
            let now = Instant::now();
            if now < deadline {
                thread::sleep(deadline - now);
            }
            let now = Instant::now();
            let delta = now - last;
            last = now;
            // Skip missed slots instead of bursting to catch up.
            deadline = (deadline + self.interval).max(now);

            self.inner.pump(delta);
            produced += 1;
        }
        produced
    }
}

impl FrameScheduler for FixedRateScheduler {
    fn on_frame(&mut self, callback: FrameCallback) -> CancellationHandle {
        self.inner.on_frame(callback)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn paused_clock_moves_only_when_advanced() {
        let mut clock = PlaybackClock::paused();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));

        clock.reset();
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn pause_freezes_running_clock() {
        let mut clock = PlaybackClock::start();
        assert!(clock.is_running());
        clock.pause();
        let frozen = clock.elapsed();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.elapsed(), frozen);

        clock.resume();
        thread::sleep(Duration::from_millis(5));
        assert!(clock.elapsed() > frozen);
    }

    #[test]
    fn manual_scheduler_runs_until_cancelled() {
        let mut scheduler = ManualScheduler::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let handle = scheduler.on_frame(Box::new(move |tick| sink.borrow_mut().push(tick.index)));

        assert_eq!(scheduler.pump(Duration::from_millis(16)), 1);
        assert_eq!(scheduler.pump(Duration::from_millis(16)), 1);
        handle.cancel();
        assert_eq!(scheduler.pump(Duration::from_millis(16)), 0);

        assert_eq!(*seen.borrow(), vec![0, 1]);
        assert_eq!(scheduler.active(), 0);
        assert_eq!(scheduler.frames_pumped(), 3);
    }

    #[test]
    fn fixed_rate_scheduler_honours_limit() {
        let mut scheduler = FixedRateScheduler::new(500);
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        let _handle = scheduler.on_frame(Box::new(move |_| *sink.borrow_mut() += 1));

        assert_eq!(scheduler.run(Some(5)), 5);
        assert_eq!(*count.borrow(), 5);
    }

    #[test]
    fn fixed_rate_scheduler_stops_without_callbacks() {
        let mut scheduler = FixedRateScheduler::new(60);
        assert_eq!(scheduler.run(None), 0);
        assert_eq!(scheduler.interval(), Duration::from_secs(1) / 60);
    }
}
