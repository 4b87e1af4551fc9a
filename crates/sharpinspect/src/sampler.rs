//! Periodic process resource sampling (spec §4.6).

use std::sync::Arc;
use std::time::Duration;

use sharpinspect_core::{
    EventBus, Options, PerformanceEntry, PerformanceEntryEvent, SharedClock, Store,
};
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;

type PerformanceStore = Store<PerformanceEntry>;

/// Owns the sampler's background task. Dropping (or calling
/// [`PerformanceSampler::stop`]) signals the task to stop and does not
/// return until it has exited its current tick (spec §5 Cancellation).
pub struct PerformanceSampler {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PerformanceSampler {
    pub fn start(options: Arc<Options>, store: Arc<PerformanceStore>, bus: Arc<EventBus>) -> Self {
        Self::start_with_clock(options, store, bus, sharpinspect_core::system_clock())
    }

    pub fn start_with_clock(
        options: Arc<Options>,
        store: Arc<PerformanceStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = Duration::from_millis(options.performance_sample_interval_ms);
        let pid = Pid::from_u32(std::process::id());

        let handle = tokio::spawn(async move {
            let mut system = System::new_all();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sample = take_sample(&mut system, pid, clock.as_ref());
                        let (_id, entry) = store.append_and_get(|id| PerformanceEntry { id, ..sample.clone() });
                        bus.performance.publish_async(PerformanceEntryEvent(entry));
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PerformanceSampler {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

fn take_sample(system: &mut System, pid: Pid, clock: &dyn sharpinspect_core::Clock) -> PerformanceEntry {
    system.refresh_cpu_usage();
    system.refresh_memory();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);

    let (cpu_usage_percent, working_set_bytes) = match system.process(pid) {
        Some(process) => (process.cpu_usage() as f64, process.memory()),
        None => (0.0, 0),
    };

    PerformanceEntry {
        id: 0,
        timestamp: clock.now_utc(),
        cpu_usage_percent,
        total_memory_bytes: system.total_memory(),
        working_set_bytes,
        // Rust has no tracing GC; generation counters have no counterpart.
        // Kept in the wire schema at 0 rather than dropped (spec §3, DESIGN.md OQ-2).
        gen0_collections: 0,
        gen1_collections: 0,
        gen2_collections: 0,
        thread_count: thread_count(),
        handle_count: open_fd_count(),
    }
}

#[cfg(target_os = "linux")]
fn thread_count() -> u64 {
    read_proc_status_field("Threads:").unwrap_or(1)
}

#[cfg(not(target_os = "linux"))]
fn thread_count() -> u64 {
    1
}

#[cfg(target_os = "linux")]
fn read_proc_status_field(prefix: &str) -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status.lines().find_map(|line| {
        line.strip_prefix(prefix)
            .and_then(|rest| rest.trim().split_whitespace().next())
            .and_then(|n| n.parse().ok())
    })
}

/// Open file descriptor count as the closest Unix analogue of a Windows
/// handle count (DESIGN.md OQ-2).
#[cfg(target_os = "linux")]
fn open_fd_count() -> u64 {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count() as u64)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn open_fd_count() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sharpinspect_core::FixedClock;

    #[tokio::test(flavor = "multi_thread")]
    async fn samples_within_one_tick_and_stops_cleanly() {
        let options = Arc::new(
            Options::build(|o| {
                o.performance_sample_interval_ms(20);
            })
            .unwrap(),
        );
        let store: Arc<PerformanceStore> = Arc::new(Store::new(100));
        let bus = Arc::new(EventBus::new());

        let mut sampler = PerformanceSampler::start(options, store.clone(), bus);
        tokio::time::sleep(Duration::from_millis(80)).await;
        sampler.stop().await;

        assert!(store.count() >= 1);
        assert!(store.last_id() >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn injected_clock_supplies_the_sample_timestamp() {
        let options = Arc::new(
            Options::build(|o| {
                o.performance_sample_interval_ms(20);
            })
            .unwrap(),
        );
        let store: Arc<PerformanceStore> = Arc::new(Store::new(100));
        let bus = Arc::new(EventBus::new());
        let fixed_utc = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let clock: SharedClock = Arc::new(FixedClock { fixed_utc });

        let mut sampler = PerformanceSampler::start_with_clock(options, store.clone(), bus, clock);
        tokio::time::sleep(Duration::from_millis(80)).await;
        sampler.stop().await;

        let entry = store.snapshot().remove(0);
        assert_eq!(entry.timestamp, fixed_utc);
    }
}
