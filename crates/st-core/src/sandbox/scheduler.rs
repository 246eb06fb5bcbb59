use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::entity::{EntityRef, Position};
use crate::schedule::{RegionKey, RepeatingTask, Scheduler, Task, TaskHandle, Topology};
use crate::world::WorldId;

use super::clock::HostClock;
use super::lock;

/// Upper bound on drain rounds within one tick. Work queued past it runs next tick.
const MAX_ROUNDS: usize = 64;

enum TimerWork {
    Once(Task),
    Repeat { period: u64, task: RepeatingTask },
}

struct Timer {
    due: u64,
    handle: TaskHandle,
    work: TimerWork,
}

type Queue = VecDeque<(TaskHandle, Task)>;

#[derive(Default)]
struct Queues {
    timers: Vec<Timer>,
    global: Queue,
    background: Queue,
    regions: BTreeMap<RegionKey, Queue>,
    cancelled: HashSet<TaskHandle>,
}

impl Queues {
    fn is_idle(&self) -> bool {
        self.global.is_empty() && self.background.is_empty() && self.regions.is_empty()
    }

    fn take(&mut self, queue: Queue) -> Vec<Task> {
        queue
            .into_iter()
            .filter(|(handle, _)| !self.cancelled.remove(handle))
            .map(|(_, task)| task)
            .collect()
    }
}

/// Tick-driven scheduler for the sandbox host.
///
/// Nothing runs until [`advance`](Self::advance) is called. Each call moves
/// the shared clock one tick forward, fires due timers, then drains queued
/// work in rounds: global first, then background work inline, then region
/// queues. Under [`Topology::Regionized`] every region drains on its own
/// thread, so entity work genuinely runs off the global context.
pub struct TickScheduler {
    topology: Topology,
    clock: Arc<HostClock>,
    next_handle: AtomicU64,
    queues: Mutex<Queues>,
}

impl TickScheduler {
    /// Create a scheduler that drives `clock`.
    pub fn new(topology: Topology, clock: Arc<HostClock>) -> Self {
        Self {
            topology,
            clock,
            next_handle: AtomicU64::new(1),
            queues: Mutex::new(Queues::default()),
        }
    }

    fn next(&self) -> TaskHandle {
        TaskHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn push_global(&self, task: Task) -> TaskHandle {
        let handle = self.next();
        lock(&self.queues).global.push_back((handle, task));
        handle
    }

    fn push_timer(&self, due: u64, work: TimerWork) -> TaskHandle {
        let handle = self.next();
        lock(&self.queues).timers.push(Timer { due, handle, work });
        handle
    }

    fn push_located(&self, world: &WorldId, position: Position, task: Task) -> TaskHandle {
        match self.topology {
            Topology::Single => self.push_global(task),
            Topology::Regionized { region_size } => {
                let handle = self.next();
                let key = RegionKey::containing(world, position, region_size);
                lock(&self.queues)
                    .regions
                    .entry(key)
                    .or_default()
                    .push_back((handle, task));
                handle
            }
        }
    }

    /// Advance one tick and run everything that became due. Returns the new tick.
    pub fn advance(&self) -> u64 {
        let now = self.clock.advance();
        self.fire_timers(now);
        self.drain();
        now
    }

    /// Advance `ticks` ticks.
    pub fn run_ticks(&self, ticks: u64) {
        for _ in 0..ticks {
            self.advance();
        }
    }

    /// Queued one-shot tasks plus live timers.
    pub fn pending(&self) -> usize {
        let q = lock(&self.queues);
        q.timers.len()
            + q.global.len()
            + q.background.len()
            + q.regions.values().map(VecDeque::len).sum::<usize>()
    }

    fn fire_timers(&self, now: u64) {
        let mut due: Vec<Timer> = {
            let mut q = lock(&self.queues);
            let (due, waiting): (Vec<_>, Vec<_>) =
                std::mem::take(&mut q.timers).into_iter().partition(|t| t.due <= now);
            q.timers = waiting;
            due
        };
        due.sort_by_key(|t| (t.due, t.handle));

        for timer in due {
            if lock(&self.queues).cancelled.remove(&timer.handle) {
                continue;
            }
            match timer.work {
                TimerWork::Once(task) => task(),
                TimerWork::Repeat { period, task } => {
                    task();
                    let mut q = lock(&self.queues);
                    if !q.cancelled.remove(&timer.handle) {
                        q.timers.push(Timer {
                            due: now + period.max(1),
                            handle: timer.handle,
                            work: TimerWork::Repeat { period, task },
                        });
                    }
                }
            }
        }
    }

    fn drain(&self) {
        for _ in 0..MAX_ROUNDS {
            let (global, background, regions) = {
                let mut q = lock(&self.queues);
                if q.is_idle() {
                    return;
                }
                let global = std::mem::take(&mut q.global);
                let background = std::mem::take(&mut q.background);
                let regions = std::mem::take(&mut q.regions);
                let global = q.take(global);
                let background = q.take(background);
                let regions: Vec<Vec<Task>> = regions.into_values().map(|r| q.take(r)).collect();
                (global, background, regions)
            };

            global.into_iter().for_each(|task| task());
            background.into_iter().for_each(|task| task());

            if !regions.is_empty() {
                std::thread::scope(|scope| {
                    for region in regions {
                        scope.spawn(move || region.into_iter().for_each(|task| task()));
                    }
                });
            }
        }
        let deferred = {
            let q = lock(&self.queues);
            q.global.len() + q.background.len() + q.regions.values().map(VecDeque::len).sum::<usize>()
        };
        debug!(tick = self.clock.tick(), deferred, "drain round limit reached, deferring work");
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("topology", &self.topology)
            .field("tick", &self.clock.tick())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler for TickScheduler {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn current_tick(&self) -> u64 {
        self.clock.tick()
    }

    fn run_now(&self, task: Task) -> TaskHandle {
        self.push_global(task)
    }

    fn run_delayed(&self, delay_ticks: u64, task: Task) -> TaskHandle {
        let due = self.clock.tick() + delay_ticks.max(1);
        self.push_timer(due, TimerWork::Once(task))
    }

    fn run_periodic(&self, delay_ticks: u64, period_ticks: u64, task: RepeatingTask) -> TaskHandle {
        let due = self.clock.tick() + delay_ticks.max(1);
        self.push_timer(
            due,
            TimerWork::Repeat {
                period: period_ticks,
                task,
            },
        )
    }

    fn run_async(&self, task: Task) -> TaskHandle {
        let handle = self.next();
        lock(&self.queues).background.push_back((handle, task));
        handle
    }

    fn run_for_entity(&self, entity: &EntityRef, task: Task) -> Option<TaskHandle> {
        if !entity.is_alive() {
            debug!(entity = %entity.id(), "entity retired, task dropped");
            return None;
        }
        Some(self.push_located(&entity.world(), entity.position(), task))
    }

    fn run_at(&self, world: &WorldId, position: Position, task: Task) -> TaskHandle {
        self.push_located(world, position, task)
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut q = lock(&self.queues);
        let before = q.timers.len();
        q.timers.retain(|t| t.handle != handle);
        if q.timers.len() == before {
            // Either queued, or a repeating task currently running.
            q.cancelled.insert(handle);
        }
        trace!(task = handle.0, "task cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::sandbox::{SandboxHost, SurfaceProfile};
    use std::sync::atomic::AtomicUsize;
    use std::thread::ThreadId;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Task
        })
    }

    #[test]
    fn delayed_runs_on_due_tick() {
        let clock = Arc::new(HostClock::default());
        let sched = TickScheduler::new(Topology::Single, Arc::clone(&clock));
        let (count, make) = counter();
        sched.run_delayed(3, make());
        sched.run_ticks(2);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        sched.advance();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn periodic_fires_every_period_until_cancelled() {
        let clock = Arc::new(HostClock::default());
        let sched = TickScheduler::new(Topology::Single, clock);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handle = sched.run_periodic(
            5,
            10,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        sched.run_ticks(25);
        // ticks 5, 15, 25
        assert_eq!(count.load(Ordering::SeqCst), 3);
        sched.cancel(handle);
        sched.run_ticks(30);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancelled_queued_task_never_runs() {
        let sched = TickScheduler::new(Topology::Single, Arc::new(HostClock::default()));
        let (count, make) = counter();
        let handle = sched.run_now(make());
        sched.run_now(make());
        sched.cancel(handle);
        sched.advance();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tasks_queued_during_drain_run_same_tick() {
        let sched = Arc::new(TickScheduler::new(Topology::Single, Arc::new(HostClock::default())));
        let (count, make) = counter();
        let inner = make();
        let s = Arc::clone(&sched);
        sched.run_now(Box::new(move || {
            s.run_async(inner);
        }));
        sched.advance();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    fn chain(sched: Arc<TickScheduler>, left: usize, count: Arc<AtomicUsize>) {
        if left == 0 {
            return;
        }
        let next = Arc::clone(&sched);
        sched.run_now(Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
            chain(next, left - 1, count);
        }));
    }

    #[test]
    fn work_past_round_limit_runs_next_tick() {
        let sched = Arc::new(TickScheduler::new(Topology::Single, Arc::new(HostClock::default())));
        let count = Arc::new(AtomicUsize::new(0));
        chain(Arc::clone(&sched), 100, Arc::clone(&count));

        sched.advance();
        assert_eq!(count.load(Ordering::SeqCst), MAX_ROUNDS);
        assert_eq!(sched.pending(), 1);
        sched.advance();
        assert_eq!(count.load(Ordering::SeqCst), 100);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn retired_entity_task_is_dropped() {
        let host = SandboxHost::with_world(SurfaceProfile::bare(), "world");
        let sched = TickScheduler::new(Topology::Single, host.clock());
        let world = WorldId::new("world");
        let cow = host.spawn(&world, EntityKind::Animal, Position::default());
        let handle: EntityRef = cow.clone();
        host.kill(&world, handle.id());
        let (_, make) = counter();
        assert!(sched.run_for_entity(&handle, make()).is_none());
    }

    #[test]
    fn regionized_entity_work_leaves_global_thread() {
        let host = SandboxHost::with_world(SurfaceProfile::bare(), "world");
        let sched = TickScheduler::new(Topology::Regionized { region_size: 64 }, host.clock());
        let world = WorldId::new("world");
        let seen: Arc<Mutex<Vec<ThreadId>>> = Arc::default();
        for x in [0.0, 100.0, 200.0] {
            let e: EntityRef = host.spawn(&world, EntityKind::Monster, Position::new(x, 64.0, 0.0));
            let seen = Arc::clone(&seen);
            sched.run_for_entity(
                &e,
                Box::new(move || {
                    lock(&seen).push(std::thread::current().id());
                }),
            );
        }
        sched.advance();
        let seen = lock(&seen);
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|id| *id != std::thread::current().id()));
    }
}
