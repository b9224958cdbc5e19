// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multiplexes one underlying kernel timer across several independent,
//! named deadlines.
//!
//! Pick an `enum` naming your timers and derive `enum_map::Enum` for it,
//! build a `Multitimer<YourEnum>`, and arm/clear individual timers by name.
//! Feed kernel notifications to `handle_notification` (or call `poll_now`
//! from a tight loop that isn't waiting on notifications at all), then drain
//! whichever timers fired with `iter_fired`.
//!
//! Only one `Multitimer` may own a given underlying timer at a time; two
//! instances sharing one will stomp on each other's deadline.

#![cfg_attr(target_os = "none", no_std)]

use enum_map::{EnumArray, EnumMap};

#[cfg(target_os = "none")]
use userlib::{sys_get_timer, sys_set_timer};

#[derive(Copy, Clone, Default)]
pub struct Timer {
    deadline: Option<(u64, Option<Repeat>)>,
    fired_but_not_observed: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Repeat {
    /// Re-arm `period` ticks after the moment the firing is next observed.
    AfterWake(u64),
    /// Re-arm `period` ticks after the deadline that just fired, regardless
    /// of when the firing was actually noticed.
    AfterDeadline(u64),
}

pub struct Multitimer<E: EnumArray<Timer>> {
    notification_bit: u8,
    current_setting: Option<u64>,
    timers: EnumMap<E, Timer>,
}

impl<E: EnumArray<Timer> + Copy> Multitimer<E> {
    pub fn new(notification_bit: u8) -> Self {
        Self {
            notification_bit,
            current_setting: None,
            timers: EnumMap::default(),
        }
    }

    fn arm_system_timer(&mut self, deadline: Option<u64>) {
        sys_set_timer(deadline, 1 << self.notification_bit);
        self.current_setting = deadline;
    }

    /// Arms `which` to fire at `deadline`, replacing any prior setting, with
    /// an optional repeat policy. May issue a syscall if `deadline` is
    /// sooner than every other deadline this multitimer is tracking.
    pub fn set_timer(&mut self, which: E, deadline: u64, repeat: Option<Repeat>) {
        let unseen_fire = self.timers[which].fired_but_not_observed;
        self.timers[which] = Timer {
            deadline: Some((deadline, repeat)),
            fired_but_not_observed: unseen_fire,
        };

        match self.current_setting {
            Some(current) if deadline >= current => (),
            _ => self.arm_system_timer(Some(deadline)),
        }
    }

    pub fn get_timer(&self, which: E) -> Option<(u64, Option<Repeat>)> {
        self.timers[which].deadline
    }

    /// Disables `which`. Returns whether it had been armed.
    pub fn clear_timer(&mut self, which: E) -> bool {
        let prior = self.timers[which].deadline.take();
        if let Some((prior_deadline, _)) = prior {
            if self.current_setting == Some(prior_deadline) {
                let next_earliest = self
                    .timers
                    .values()
                    .filter_map(|t| t.deadline)
                    .map(|(dl, _)| dl)
                    .min();
                self.arm_system_timer(next_earliest);
            }
        }
        prior.is_some()
    }

    /// Consumes a kernel notification word, marking every elapsed timer as
    /// fired (destructively read out later via `iter_fired`) and re-arming
    /// or disabling it per its repeat policy.
    pub fn handle_notification(&mut self, notification: u32) {
        if notification & (1 << self.notification_bit) == 0 {
            return;
        }

        let now = sys_get_timer().now;
        let mut next_earliest = None;

        for timer in self.timers.values_mut() {
            let Some((deadline, repeat)) = timer.deadline else {
                continue;
            };
            if deadline <= now {
                timer.deadline = repeat.map(|kind| {
                    let next = match kind {
                        Repeat::AfterWake(period) => now.saturating_add(period),
                        Repeat::AfterDeadline(period) => {
                            deadline.saturating_add(period)
                        }
                    };
                    (next, Some(kind))
                });
                timer.fired_but_not_observed = true;
            }
            if let Some((still_armed, _)) = timer.deadline {
                next_earliest = Some(match next_earliest {
                    Some(earliest) => still_armed.min(earliest),
                    None => still_armed,
                });
            }
        }

        self.arm_system_timer(next_earliest);
    }

    /// Re-checks every timer against the current time unconditionally,
    /// without waiting for a notification — useful for a cooperative loop
    /// that is polling rather than blocking.
    pub fn poll_now(&mut self) {
        self.handle_notification(1 << self.notification_bit);
    }

    /// Drains the set of timers that fired since the last call. A timer
    /// that fired more than once between calls only appears once here; the
    /// repeat count is not tracked.
    pub fn iter_fired(&mut self) -> impl Iterator<Item = E> + '_ {
        self.timers.iter_mut().filter_map(|(e, timer)| {
            core::mem::replace(&mut timer.fired_but_not_observed, false)
                .then_some(e)
        })
    }
}

#[cfg(not(target_os = "none"))]
mod host_clock {
    use core::cell::Cell;

    thread_local! {
        pub static CURRENT_TIME: Cell<u64> = Cell::new(0);
        pub static TIMER_SETTING: Cell<(Option<u64>, u32)> = Cell::default();
    }

    pub fn sys_set_timer(deadline: Option<u64>, notifications: u32) {
        TIMER_SETTING.with(|s| s.set((deadline, notifications)));
    }

    pub fn sys_get_timer() -> TimerState {
        let now = CURRENT_TIME.with(|t| t.get());
        let (deadline, armed_bits) = TIMER_SETTING.with(|s| s.get());
        TimerState { now, deadline, armed_bits }
    }

    #[allow(dead_code)]
    pub struct TimerState {
        pub now: u64,
        pub deadline: Option<u64>,
        pub armed_bits: u32,
    }
}
#[cfg(not(target_os = "none"))]
use host_clock::*;

#[cfg(test)]
mod tests {
    use super::*;
    use enum_map::Enum;

    fn advance_to(time: u64) {
        CURRENT_TIME.with(|t| t.set(time));
    }

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Enum)]
    enum Timers {
        Tick,
        Retry,
    }

    fn uut(bit: u8) -> Multitimer<Timers> {
        Multitimer {
            notification_bit: bit,
            current_setting: None,
            timers: EnumMap::from_array([Timer::default(); Timers::LENGTH]),
        }
    }

    #[test]
    fn starts_with_nothing_fired() {
        let mut m = uut(0);
        assert!(m.iter_fired().next().is_none());
    }

    #[test]
    fn earlier_deadline_wins_the_system_timer() {
        let mut m = uut(0);
        m.set_timer(Timers::Tick, 1234, None);
        m.set_timer(Timers::Retry, 12, None);
        let s = sys_get_timer();
        assert_eq!(s.deadline, Some(12));
        assert_eq!(s.armed_bits, 1);
    }

    #[test]
    fn clearing_the_active_deadline_falls_back_to_next_earliest() {
        let mut m = uut(0);
        m.set_timer(Timers::Tick, 1234, None);
        m.set_timer(Timers::Retry, 12, None);
        m.clear_timer(Timers::Retry);
        assert_eq!(sys_get_timer().deadline, Some(1234));
    }

    #[test]
    fn clearing_both_disables_the_system_timer() {
        let mut m = uut(0);
        m.set_timer(Timers::Tick, 1234, None);
        m.set_timer(Timers::Retry, 12, None);
        m.clear_timer(Timers::Tick);
        m.clear_timer(Timers::Retry);
        assert_eq!(sys_get_timer().deadline, None);
    }

    #[test]
    fn fires_each_timer_exactly_once_per_elapsed_deadline() {
        advance_to(0);
        let mut m = uut(0);
        m.set_timer(Timers::Tick, 1234, None);
        m.set_timer(Timers::Retry, 12, None);

        m.handle_notification(!0);
        assert_eq!(m.iter_fired().next(), None);

        advance_to(100);
        m.handle_notification(!0);
        assert_eq!(m.iter_fired().collect::<Vec<_>>(), [Timers::Retry]);

        advance_to(10_000);
        m.handle_notification(!0);
        assert_eq!(m.iter_fired().collect::<Vec<_>>(), [Timers::Tick]);

        advance_to(10_000_000);
        m.handle_notification(!0);
        assert_eq!(m.iter_fired().next(), None);
    }

    #[test]
    fn after_deadline_repeat_stays_locked_to_the_original_schedule() {
        advance_to(0);
        let mut m = uut(0);
        m.set_timer(Timers::Tick, 1000, Some(Repeat::AfterDeadline(1000)));

        advance_to(1300);
        m.handle_notification(!0);
        assert_eq!(m.iter_fired().collect::<Vec<_>>(), [Timers::Tick]);
        assert_eq!(
            m.get_timer(Timers::Tick),
            Some((2000, Some(Repeat::AfterDeadline(1000))))
        );
    }

    #[test]
    fn after_wake_repeat_is_relative_to_observation_time() {
        advance_to(0);
        let mut m = uut(0);
        m.set_timer(Timers::Retry, 12, Some(Repeat::AfterWake(2000)));

        advance_to(100);
        m.handle_notification(!0);
        assert_eq!(m.iter_fired().collect::<Vec<_>>(), [Timers::Retry]);
        assert_eq!(
            m.get_timer(Timers::Retry),
            Some((2100, Some(Repeat::AfterWake(2000))))
        );
    }
}
