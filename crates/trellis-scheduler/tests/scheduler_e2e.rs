#![forbid(unsafe_code)]

//! End-to-end tests for the cooperative task scheduler.
//!
//! 1. `ordering` – expiration order across priorities
//! 2. `slicing` – yield policies and continuations
//! 3. `event_loop` – microtasks interleaved with tasks
//! 4. `tracing_spans` – `trellis.task` span emission

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;
use trellis_scheduler::{
    Callback, ManualClock, Priority, Scheduler, SchedulerConfig, SliceOutcome, TaskScheduler,
    YieldPolicy,
};

fn manual(policy: YieldPolicy) -> (Rc<TaskScheduler>, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new());
    let sched = TaskScheduler::with_clock(
        SchedulerConfig::default().with_yield_policy(policy),
        clock.clone(),
    );
    (Rc::new(sched), clock)
}

fn recorder(log: &Rc<RefCell<Vec<u32>>>, tag: u32) -> Callback {
    let log = Rc::clone(log);
    Callback::new(move |_| {
        log.borrow_mut().push(tag);
        None
    })
}

// =========================================================================
// 1. Ordering
// =========================================================================

mod ordering {
    use super::*;

    #[test]
    fn later_urgent_task_overtakes_queued_normal_task() {
        let (sched, clock) = manual(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.schedule_callback(Priority::Normal, recorder(&log, 1));
        clock.advance(Duration::from_millis(100));
        sched.schedule_callback(Priority::UserBlocking, recorder(&log, 2));
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn old_normal_task_beats_fresh_user_blocking_task() {
        let (sched, clock) = manual(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.schedule_callback(Priority::Normal, recorder(&log, 1));
        clock.advance(Duration::from_millis(4_900));
        sched.schedule_callback(Priority::UserBlocking, recorder(&log, 2));
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn idle_runs_last() {
        let (sched, _clock) = manual(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.schedule_callback(Priority::Idle, recorder(&log, 5));
        sched.schedule_callback(Priority::Low, recorder(&log, 4));
        sched.schedule_callback(Priority::Immediate, recorder(&log, 1));
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![1, 4, 5]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn same_instant_tasks_run_sorted_by_priority_then_submission(
            priorities in prop::collection::vec(0usize..5, 1..40)
        ) {
            let (sched, _clock) = manual(YieldPolicy::Never);
            let log = Rc::new(RefCell::new(Vec::new()));
            for (i, p) in priorities.iter().enumerate() {
                let tag = u32::try_from(i).unwrap_or(u32::MAX);
                sched.schedule_callback(Priority::ALL[*p], recorder(&log, tag));
            }
            sched.run_until_idle();

            let mut expected: Vec<(usize, u32)> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| (*p, u32::try_from(i).unwrap_or(u32::MAX)))
                .collect();
            expected.sort();
            let expected: Vec<u32> = expected.into_iter().map(|(_, tag)| tag).collect();
            prop_assert_eq!(log.borrow().clone(), expected);
        }
    }
}

// =========================================================================
// 2. Slicing
// =========================================================================

mod slicing {
    use super::*;

    fn chunked(
        sched: &Rc<TaskScheduler>,
        remaining: Rc<Cell<u32>>,
        done: Rc<Cell<bool>>,
    ) -> Callback {
        let sched = Rc::clone(sched);
        Callback::new(move |_| {
            while remaining.get() > 0 {
                if sched.should_yield() {
                    let next = chunked(&sched, Rc::clone(&remaining), Rc::clone(&done));
                    return Some(next);
                }
                remaining.set(remaining.get() - 1);
            }
            done.set(true);
            None
        })
    }

    #[test]
    fn long_task_is_split_across_slices() {
        let (sched, _clock) = manual(YieldPolicy::EveryNChecks(4));
        let remaining = Rc::new(Cell::new(10));
        let done = Rc::new(Cell::new(false));
        sched.schedule_callback(
            Priority::Normal,
            chunked(&sched, Rc::clone(&remaining), Rc::clone(&done)),
        );

        assert_eq!(sched.run_slice(), SliceOutcome::Yielded);
        assert_eq!(remaining.get(), 6);
        assert_eq!(sched.run_slice(), SliceOutcome::Yielded);
        assert_eq!(remaining.get(), 2);
        assert_eq!(sched.run_slice(), SliceOutcome::Drained);
        assert!(done.get());
        assert_eq!(sched.stats().total_continuations, 2);
    }

    #[test]
    fn urgent_task_runs_between_continuation_parts() {
        let (sched, _clock) = manual(YieldPolicy::EveryNChecks(2));
        let remaining = Rc::new(Cell::new(6));
        let done = Rc::new(Cell::new(false));
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.schedule_callback(
            Priority::Low,
            chunked(&sched, Rc::clone(&remaining), Rc::clone(&done)),
        );

        sched.run_slice();
        sched.schedule_callback(Priority::Immediate, recorder(&log, 9));
        sched.run_slice();
        assert_eq!(*log.borrow(), vec![9]);
        assert!(!done.get());
        sched.run_until_idle();
        assert!(done.get());
    }

    #[test]
    fn second_task_waits_for_next_slice_when_budget_is_spent() {
        let (sched, clock) = manual(YieldPolicy::TimeSlice);
        let log = Rc::new(RefCell::new(Vec::new()));
        let tick = Rc::clone(&clock);
        let first_log = Rc::clone(&log);
        sched.schedule_callback(
            Priority::Normal,
            Callback::new(move |_| {
                tick.advance(Duration::from_millis(10));
                first_log.borrow_mut().push(1);
                None
            }),
        );
        sched.schedule_callback(Priority::Normal, recorder(&log, 2));

        assert_eq!(sched.run_slice(), SliceOutcome::Yielded);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(sched.run_slice(), SliceOutcome::Drained);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(sched.stats().total_yields, 1);
    }
}

// =========================================================================
// 3. Event loop
// =========================================================================

mod event_loop {
    use super::*;

    #[test]
    fn microtask_can_schedule_follow_up_task() {
        let (sched, _clock) = manual(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::clone(&sched);
        let inner_log = Rc::clone(&log);
        sched.queue_microtask(Box::new(move || {
            inner_log.borrow_mut().push(0);
            inner.schedule_callback(Priority::Normal, recorder(&inner_log, 1));
        }));

        let summary = sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1]);
        assert_eq!(summary.microtasks, 1);
        assert_eq!(summary.tasks_run, 1);
        assert!(!summary.exhausted);
        assert!(sched.is_idle());
    }

    #[test]
    fn cancelling_from_microtask_prevents_queued_task() {
        let (sched, _clock) = manual(YieldPolicy::Never);
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim = sched.schedule_callback(Priority::Low, recorder(&log, 2));
        let inner = Rc::clone(&sched);
        let first_log = Rc::clone(&log);
        sched.schedule_callback(
            Priority::Immediate,
            Callback::new(move |_| {
                first_log.borrow_mut().push(1);
                let sched = Rc::clone(&inner);
                let victim = victim.clone();
                inner.queue_microtask(Box::new(move || sched.cancel_callback(&victim)));
                None
            }),
        );
        sched.run_until_idle();
        assert_eq!(*log.borrow(), vec![1]);
    }
}

// =========================================================================
// 4. Tracing spans
// =========================================================================

mod tracing_spans {
    use super::*;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::Registry;
    use tracing_subscriber::Layer;

    // Dispatch requires Send + Sync.
    #[derive(Clone, Default)]
    struct SharedNames(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

    impl<S> Layer<S> for SharedNames
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: Context<'_, S>,
        ) {
            if let Ok(mut names) = self.0.lock() {
                names.push(attrs.metadata().name().to_string());
            }
        }
    }

    #[test]
    fn each_task_runs_inside_task_span() {
        let names = SharedNames::default();
        let subscriber = Registry::default().with(names.clone());

        tracing::subscriber::with_default(subscriber, || {
            let (sched, _clock) = manual(YieldPolicy::Never);
            sched.schedule_callback(Priority::Normal, Callback::new(|_| None));
            sched.schedule_callback(Priority::Low, Callback::new(|_| None));
            sched.run_until_idle();
        });

        let names = names.0.lock().map(|n| n.clone()).unwrap_or_default();
        assert_eq!(
            names.iter().filter(|n| n.as_str() == "trellis.task").count(),
            2
        );
    }
}
