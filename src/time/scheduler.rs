//! Tick scheduling.
//!
//! The [TickScheduler] advances all registered tick consumers in one place and in registration
//! order. It does not own a thread, so ordering and cancellation stay under the control of the
//! caller, which makes it trivially testable. The [PeriodicTicker] (requires `std`) is the wall
//! clock driver which calls a closure once per period, usually to forward the tick into a
//! scheduler.
use super::cuc::CucTime;
use alloc::boxed::Box;
use alloc::vec::Vec;
use tracing::debug;

pub type TickHandlerId = u16;

/// Consumer of scheduler ticks. Implemented for all matching closures.
pub trait TickHandler<Ctx> {
    fn on_tick(&mut self, ctx: &mut Ctx, now: CucTime);
}

impl<Ctx, F: FnMut(&mut Ctx, CucTime)> TickHandler<Ctx> for F {
    fn on_tick(&mut self, ctx: &mut Ctx, now: CucTime) {
        self(ctx, now)
    }
}

/// Runs registered tick handlers in registration order.
///
/// Handlers are registered by ID. Registering a handler with an ID which is already in use
/// replaces the previous handler while keeping its position in the execution order.
pub struct TickScheduler<Ctx> {
    handlers: Vec<(TickHandlerId, Box<dyn TickHandler<Ctx> + Send>)>,
    tick_count: u64,
}

impl<Ctx> Default for TickScheduler<Ctx> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            tick_count: 0,
        }
    }
}

impl<Ctx> core::fmt::Debug for TickScheduler<Ctx> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TickScheduler")
            .field(
                "handlers",
                &self.handlers.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

impl<Ctx> TickScheduler<Ctx> {
    /// Returns true if a previously registered handler was replaced.
    pub fn register(
        &mut self,
        id: TickHandlerId,
        handler: impl TickHandler<Ctx> + Send + 'static,
    ) -> bool {
        if let Some(entry) = self.handlers.iter_mut().find(|(hid, _)| *hid == id) {
            debug!(id, "replacing tick handler");
            entry.1 = Box::new(handler);
            return true;
        }
        debug!(id, "registering tick handler");
        self.handlers.push((id, Box::new(handler)));
        false
    }

    /// Returns true if a handler with the given ID was removed.
    pub fn unregister(&mut self, id: TickHandlerId) -> bool {
        let len_before = self.handlers.len();
        self.handlers.retain(|(hid, _)| *hid != id);
        self.handlers.len() != len_before
    }

    #[inline]
    pub fn is_registered(&self, id: TickHandlerId) -> bool {
        self.handlers.iter().any(|(hid, _)| *hid == id)
    }

    #[inline]
    pub fn num_handlers(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Run all handlers once.
    pub fn tick(&mut self, ctx: &mut Ctx, now: CucTime) {
        self.tick_count += 1;
        for (_, handler) in self.handlers.iter_mut() {
            handler.on_tick(ctx, now);
        }
    }
}

#[cfg(feature = "std")]
pub use std_mod::*;

#[cfg(feature = "std")]
pub mod std_mod {
    use core::time::Duration;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Instant;
    use tracing::{debug, trace};

    /// Calls a closure once per period on a dedicated thread.
    ///
    /// The deadlines are computed from the period boundaries, so the execution time of the
    /// closure does not accumulate as drift. If the closure overruns one or more periods, the
    /// ticker resynchronizes to the next period boundary instead of firing the missed ticks.
    /// The period can be changed at run-time and takes effect after the current period.
    ///
    /// Stopping is cooperative: [PeriodicTicker::stop] sets a flag which is checked on every tick
    /// and then joins the thread, so it blocks for at most one period.
    #[derive(Debug)]
    pub struct PeriodicTicker {
        stop_flag: Arc<AtomicBool>,
        period_us: Arc<AtomicU64>,
        handle: Option<JoinHandle<()>>,
    }

    impl PeriodicTicker {
        /// The closure receives the number of the current tick, starting at 1.
        pub fn spawn<F: FnMut(u64) + Send + 'static>(
            period: Duration,
            mut on_tick: F,
        ) -> std::io::Result<Self> {
            let stop_flag = Arc::new(AtomicBool::new(false));
            let period_us = Arc::new(AtomicU64::new(period.as_micros().max(1) as u64));
            let thread_stop = stop_flag.clone();
            let thread_period = period_us.clone();
            let handle = std::thread::Builder::new()
                .name("pus-ticker".into())
                .spawn(move || {
                    let mut tick: u64 = 0;
                    let mut next =
                        Instant::now() + Duration::from_micros(thread_period.load(Ordering::Relaxed));
                    while !thread_stop.load(Ordering::Acquire) {
                        let now = Instant::now();
                        if now < next {
                            std::thread::sleep(next - now);
                        }
                        if thread_stop.load(Ordering::Acquire) {
                            break;
                        }
                        tick += 1;
                        on_tick(tick);
                        let period =
                            Duration::from_micros(thread_period.load(Ordering::Relaxed).max(1));
                        next += period;
                        let now = Instant::now();
                        if next <= now {
                            let missed = ((now - next).as_micros() / period.as_micros() + 1) as u32;
                            trace!(missed, "tick handler overran, resynchronizing");
                            next += period * missed;
                        }
                    }
                    debug!(ticks = tick, "ticker thread exit");
                })?;
            Ok(Self {
                stop_flag,
                period_us,
                handle: Some(handle),
            })
        }

        pub fn set_period(&self, period: Duration) {
            self.period_us
                .store(period.as_micros().max(1) as u64, Ordering::Relaxed);
        }

        pub fn period(&self) -> Duration {
            Duration::from_micros(self.period_us.load(Ordering::Relaxed))
        }

        pub fn is_running(&self) -> bool {
            self.handle
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
        }

        /// Signal the thread to stop and wait for it to exit.
        pub fn stop(mut self) {
            self.shutdown();
        }

        fn shutdown(&mut self) {
            self.stop_flag.store(true, Ordering::Release);
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    tracing::error!("ticker thread panicked");
                }
            }
        }
    }

    impl Drop for PeriodicTicker {
        fn drop(&mut self) {
            self.shutdown();
        }
    }
}
