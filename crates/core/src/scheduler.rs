//! Event scheduler for cycle-driven machines.
//!
//! A machine registers one timer per clock domain. Each timer keeps its own
//! signed counter in a shared unit timebase, so domains running at
//! different rates can be compared and sliced together. Peripherals schedule
//! events on a timer; the driver repeatedly asks for the next slice length
//! and runs each domain for that long.
//!
//! Handlers receive `&mut` access to the whole machine (the context type
//! `C`), which reaches the scheduler again through [`Timed`]. A handler may
//! re-arm itself, which is how periodic hardware (scanline counters, serial
//! bit clocks) is modelled.
//!
//! ## Ordering
//!
//! Events on one timer fire in nondecreasing target order. Events with the
//! same target fire in the order they were added. An event added while the
//! domain is running shortens the current run so it still fires on its
//! exact tick.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::logging::{log, LogCategory, LogLevel};

/// Time in scheduler units (the common timebase of every domain).
pub type UnitCycle = i64;

/// Upper bound on a single slice, in units.
pub const MAX_SLICE_LENGTH: UnitCycle = 4096;

/// Handler invoked when an event fires: `(ctx, param, cycles_late)`.
///
/// `cycles_late` is expressed in cycles of the event's domain.
pub type EventFn<C> = fn(&mut C, u64, i64);

/// Domain runner. It must consume the timer's run budget (see
/// [`Scheduler::run_budget`]) through [`Scheduler::consume`].
pub type RunnerFn<C> = fn(&mut C, TimerId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

/// Access to the scheduler owned somewhere inside a machine context.
pub trait Timed: Sized {
    fn scheduler(&mut self) -> &mut Scheduler<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Event {
    target: UnitCycle,
    seq: u64,
    func: FuncHandle,
    param: u64,
}

// BinaryHeap is a max-heap; invert so the earliest (target, seq) pops first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target
            .cmp(&self.target)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Timer<C> {
    name: &'static str,
    units_per_cycle: i64,
    now: UnitCycle,
    /// Units remaining in the slice handed to `process_slice`.
    slice_left: UnitCycle,
    /// End of the current run: the slice end or the next event, whichever is first.
    run_until: UnitCycle,
    events: BinaryHeap<Event>,
    runner: Option<RunnerFn<C>>,
}

struct RegisteredFunc<C> {
    name: &'static str,
    func: EventFn<C>,
}

pub struct Scheduler<C> {
    timers: Vec<Timer<C>>,
    funcs: Vec<RegisteredFunc<C>>,
    next_seq: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            funcs: Vec::new(),
            next_seq: 0,
        }
    }

    /// Register a clock domain. `units_per_cycle` converts one cycle of the
    /// domain into scheduler units.
    pub fn register_timer(
        &mut self,
        name: &'static str,
        units_per_cycle: i64,
        runner: Option<RunnerFn<C>>,
    ) -> TimerId {
        self.timers.push(Timer {
            name,
            units_per_cycle: units_per_cycle.max(1),
            now: 0,
            slice_left: 0,
            run_until: 0,
            events: BinaryHeap::new(),
            runner,
        });
        TimerId(self.timers.len() - 1)
    }

    pub fn register_func(&mut self, name: &'static str, func: EventFn<C>) -> FuncHandle {
        self.funcs.push(RegisteredFunc { name, func });
        FuncHandle(self.funcs.len() - 1)
    }

    pub fn func_name(&self, handle: FuncHandle) -> &'static str {
        self.funcs.get(handle.0).map_or("<unknown>", |f| f.name)
    }

    pub fn timer_name(&self, timer: TimerId) -> &'static str {
        self.timers[timer.0].name
    }

    /// Schedule `func` to fire `delay` units from the timer's current tick.
    /// Negative delays fire on the next check.
    pub fn add_event(
        &mut self,
        func: FuncHandle,
        delay: UnitCycle,
        param: u64,
        timer: TimerId,
    ) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;

        let t = &mut self.timers[timer.0];
        let target = t.now + delay.max(0);
        t.events.push(Event {
            target,
            seq,
            func,
            param,
        });
        if target < t.run_until {
            t.run_until = target;
        }
        EventHandle(seq)
    }

    /// Remove a pending event. Returns false if it already fired.
    pub fn cancel_event(&mut self, timer: TimerId, handle: EventHandle) -> bool {
        let events = &mut self.timers[timer.0].events;
        let before = events.len();
        events.retain(|e| e.seq != handle.0);
        events.len() != before
    }

    pub fn is_pending(&self, timer: TimerId, handle: EventHandle) -> bool {
        self.timers[timer.0].events.iter().any(|e| e.seq == handle.0)
    }

    /// Current tick of a domain, in units.
    pub fn now(&self, timer: TimerId) -> UnitCycle {
        self.timers[timer.0].now
    }

    /// Convert cycles of a domain into scheduler units.
    pub fn convert(&self, timer: TimerId, cycles: i64) -> UnitCycle {
        cycles * self.timers[timer.0].units_per_cycle
    }

    /// Units until the next event on this timer, clamped to `MAX_SLICE_LENGTH`.
    pub fn calc_slice_length(&self, timer: TimerId) -> UnitCycle {
        let t = &self.timers[timer.0];
        t.events
            .peek()
            .map_or(MAX_SLICE_LENGTH, |e| e.target - t.now)
            .clamp(0, MAX_SLICE_LENGTH)
    }

    /// The smallest slice across every domain.
    pub fn min_slice_length(&self) -> UnitCycle {
        (0..self.timers.len())
            .map(|i| self.calc_slice_length(TimerId(i)))
            .min()
            .unwrap_or(MAX_SLICE_LENGTH)
    }

    pub fn timers(&self) -> impl Iterator<Item = TimerId> {
        (0..self.timers.len()).map(TimerId)
    }

    /// Units the runner may still consume before it must yield.
    pub fn run_budget(&self, timer: TimerId) -> UnitCycle {
        let t = &self.timers[timer.0];
        t.run_until - t.now
    }

    /// Advance a domain by `cycles` of its own clock.
    pub fn consume(&mut self, timer: TimerId, cycles: i64) {
        let units = self.convert(timer, cycles);
        self.consume_units(timer, units);
    }

    fn consume_units(&mut self, timer: TimerId, units: UnitCycle) {
        let t = &mut self.timers[timer.0];
        t.now += units;
        t.slice_left -= units;
    }

    fn pop_due(&mut self, timer: TimerId) -> Option<(EventFn<C>, u64, i64)> {
        loop {
            let t = &mut self.timers[timer.0];
            match t.events.peek() {
                Some(e) if e.target <= t.now => {}
                _ => return None,
            }
            let event = t.events.pop()?;
            let late = (t.now - event.target) / t.units_per_cycle;
            match self.funcs.get(event.func.0) {
                Some(registered) => return Some((registered.func, event.param, late)),
                None => log(LogCategory::CPU, LogLevel::Error, || {
                    format!(
                        "Scheduler: dropping event for unknown func {} on {}",
                        event.func.0,
                        self.timer_name(timer)
                    )
                }),
            }
        }
    }

    /// Prepare the next run. Returns the runner and budget, or `None` when
    /// the slice is used up.
    fn begin_run(&mut self, timer: TimerId) -> Option<(Option<RunnerFn<C>>, UnitCycle)> {
        let t = &mut self.timers[timer.0];
        if t.slice_left <= 0 {
            return None;
        }
        let slice_end = t.now + t.slice_left;
        let next = t.events.peek().map_or(slice_end, |e| e.target.min(slice_end));
        t.run_until = next;
        Some((t.runner, next - t.now))
    }
}

/// Run `timer` for `units`, firing every event whose target is reached.
///
/// Events due at the current tick fire before the runner gets control, and
/// again after every run, so a runner never executes past a pending event.
pub fn process_slice<C: Timed>(ctx: &mut C, timer: TimerId, units: UnitCycle) {
    ctx.scheduler().timers[timer.0].slice_left += units;

    loop {
        while let Some((func, param, late)) = ctx.scheduler().pop_due(timer) {
            func(ctx, param, late);
        }

        let Some((runner, budget)) = ctx.scheduler().begin_run(timer) else {
            break;
        };

        match runner {
            Some(run) => {
                let before = ctx.scheduler().now(timer);
                run(ctx, timer);
                // A runner that made no progress would spin forever.
                if ctx.scheduler().now(timer) == before {
                    ctx.scheduler().consume_units(timer, budget.max(1));
                }
            }
            None => ctx.scheduler().consume_units(timer, budget.max(1)),
        }
    }

    let t = &mut ctx.scheduler().timers[timer.0];
    t.run_until = t.now;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Machine {
        sched: Scheduler<Machine>,
        fired: Vec<(u64, i64, UnitCycle)>,
        steps: u64,
        cpu: Option<TimerId>,
        tick_func: Option<FuncHandle>,
    }

    impl Timed for Machine {
        fn scheduler(&mut self) -> &mut Scheduler<Self> {
            &mut self.sched
        }
    }

    fn record(m: &mut Machine, param: u64, late: i64) {
        let now = m.cpu.map_or(0, |t| m.sched.now(t));
        m.fired.push((param, late, now));
    }

    fn periodic(m: &mut Machine, param: u64, late: i64) {
        record(m, param, late);
        if let (Some(func), Some(cpu)) = (m.tick_func, m.cpu) {
            if param < 3 {
                m.sched.add_event(func, 10 - late, param + 1, cpu);
            }
        }
    }

    fn run_cpu(m: &mut Machine, timer: TimerId) {
        while m.sched.run_budget(timer) > 0 {
            m.steps += 1;
            m.sched.consume(timer, 1);
        }
    }

    fn machine() -> (Machine, TimerId, FuncHandle) {
        let mut m = Machine::default();
        let cpu = m.sched.register_timer("cpu", 1, Some(run_cpu));
        let func = m.sched.register_func("record", record);
        m.cpu = Some(cpu);
        (m, cpu, func)
    }

    #[test]
    fn test_events_fire_in_target_order() {
        let (mut m, cpu, func) = machine();
        m.sched.add_event(func, 30, 3, cpu);
        m.sched.add_event(func, 10, 1, cpu);
        m.sched.add_event(func, 20, 2, cpu);

        process_slice(&mut m, cpu, 100);

        let params: Vec<u64> = m.fired.iter().map(|f| f.0).collect();
        assert_eq!(params, vec![1, 2, 3]);
        assert_eq!(m.fired[0].2, 10);
        assert_eq!(m.fired[2].2, 30);
        assert_eq!(m.steps, 100);
        assert_eq!(m.sched.now(cpu), 100);
    }

    #[test]
    fn test_ties_fire_in_insertion_order() {
        let (mut m, cpu, func) = machine();
        for param in [7, 8, 9] {
            m.sched.add_event(func, 5, param, cpu);
        }
        process_slice(&mut m, cpu, 5);
        let params: Vec<u64> = m.fired.iter().map(|f| f.0).collect();
        assert_eq!(params, vec![7, 8, 9]);
    }

    #[test]
    fn test_periodic_rearm() {
        let (mut m, cpu, _) = machine();
        let func = m.sched.register_func("periodic", periodic);
        m.tick_func = Some(func);
        m.sched.add_event(func, 10, 0, cpu);

        process_slice(&mut m, cpu, 100);

        let times: Vec<UnitCycle> = m.fired.iter().map(|f| f.2).collect();
        assert_eq!(times, vec![10, 20, 30, 40]);
        assert!(m.fired.iter().all(|f| f.1 == 0));
    }

    #[test]
    fn test_event_added_mid_run_fires_on_time() {
        fn add_during_run(m: &mut Machine, timer: TimerId) {
            while m.sched.run_budget(timer) > 0 {
                m.steps += 1;
                if m.steps == 3 {
                    let func = m.tick_func.unwrap();
                    m.sched.add_event(func, 4, 42, timer);
                }
                m.sched.consume(timer, 1);
            }
        }

        let mut m = Machine::default();
        let cpu = m.sched.register_timer("cpu", 1, Some(add_during_run));
        let func = m.sched.register_func("record", record);
        m.cpu = Some(cpu);
        m.tick_func = Some(func);

        process_slice(&mut m, cpu, 50);

        // Added at tick 2 (before the third step is consumed), due at tick 6.
        assert_eq!(m.fired, vec![(42, 0, 6)]);
    }

    #[test]
    fn test_unknown_func_is_skipped() {
        let (mut m, cpu, func) = machine();
        m.sched.add_event(FuncHandle(99), 5, 0, cpu);
        m.sched.add_event(func, 5, 1, cpu);
        process_slice(&mut m, cpu, 10);
        assert_eq!(m.fired, vec![(1, 0, 5)]);
    }

    #[test]
    fn test_cancel_event() {
        let (mut m, cpu, func) = machine();
        let keep = m.sched.add_event(func, 5, 1, cpu);
        let drop = m.sched.add_event(func, 6, 2, cpu);
        assert!(m.sched.cancel_event(cpu, drop));
        assert!(!m.sched.cancel_event(cpu, drop));
        assert!(m.sched.is_pending(cpu, keep));

        process_slice(&mut m, cpu, 20);
        assert_eq!(m.fired.len(), 1);
        assert!(!m.sched.is_pending(cpu, keep));
    }

    #[test]
    fn test_slice_length() {
        let (mut m, cpu, func) = machine();
        assert_eq!(m.sched.calc_slice_length(cpu), MAX_SLICE_LENGTH);
        m.sched.add_event(func, 123, 0, cpu);
        assert_eq!(m.sched.calc_slice_length(cpu), 123);
        process_slice(&mut m, cpu, 100);
        assert_eq!(m.sched.calc_slice_length(cpu), 23);
    }

    #[test]
    fn test_domain_conversion_and_lateness() {
        let mut m = Machine::default();
        let slow = m.sched.register_timer("slow", 4, None);
        let func = m.sched.register_func("record", record);
        m.cpu = Some(slow);

        assert_eq!(m.sched.convert(slow, 3), 12);
        // Without a runner the domain advances straight to the next event.
        m.sched.add_event(func, 8, 1, slow);
        process_slice(&mut m, slow, 16);
        assert_eq!(m.fired, vec![(1, 0, 8)]);
        assert_eq!(m.sched.now(slow), 16);
    }

    #[test]
    fn test_min_slice_across_domains() {
        let mut m = Machine::default();
        let a = m.sched.register_timer("a", 1, None);
        let b = m.sched.register_timer("b", 2, None);
        let func = m.sched.register_func("record", record);
        m.sched.add_event(func, 50, 0, a);
        m.sched.add_event(func, 20, 0, b);
        assert_eq!(m.sched.min_slice_length(), 20);
        assert_eq!(m.sched.timers().count(), 2);
        assert_eq!(m.sched.timer_name(b), "b");
        assert_eq!(m.sched.func_name(func), "record");
    }
}
