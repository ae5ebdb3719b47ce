//! Property tests for the reconciliation invariants: failed merges leave no
//! trace, replanning conserves hours, effort only grows day by day, longer
//! fixed windows never lose effort, detach is idempotent, worker uniqueness
//! and split conservation.

use std::collections::HashSet;

use chrono::{NaiveDate, Weekday};
use proptest::prelude::*;

use task_allocation::{
    AllocationId, CalculatedValue, CalendarCapacity, EffortDuration, ModifiedAllocation,
    PlannerConfig, ResourceAllocation, ResourcesPerDay, Task, WindowSource, WorkCalendar,
};

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn base_task() -> Task {
    let mut task = Task::new(1, "Cladding", 40, d(2025, 3, 3));
    for (raw, worker) in [(1, "ana"), (2, "bob")] {
        let mut allocation = ResourceAllocation::specific(AllocationId::new(raw), 1, worker);
        allocation.set_assignment(d(2025, 3, 3), worker, EffortDuration::hours(4)).unwrap();
        task.add_resource_allocation(allocation).unwrap();
    }
    task
}

// ─── Arbitrary Strategies ───────────────────────────────────────────────────

/// A new allocation that is valid for task 1 or broken in one specific way.
fn arb_new_allocation() -> impl Strategy<Value = ResourceAllocation> {
    (1u64..6, prop::sample::select(vec![1, 1, 1, 2]), "[a-c]")
        .prop_map(|(raw, owner, worker)| ResourceAllocation::specific(AllocationId::new(raw), owner, worker))
}

/// A modification whose original may or may not exist, and whose data may
/// or may not be a real copy.
fn arb_modification(task: &Task) -> impl Strategy<Value = ModifiedAllocation> + use<> {
    let originals: Vec<ResourceAllocation> = task.resource_allocations().cloned().collect();
    (0usize..3, any::<bool>(), 1u32..9).prop_map(move |(index, real_copy, hours)| {
        let source = originals
            .get(index)
            .cloned()
            .unwrap_or_else(|| ResourceAllocation::specific(AllocationId::new(42), 1, "zed"));
        let mut modification = if real_copy { source.copy() } else { source.clone() };
        let worker = source.resource_ids()[0].clone();
        modification
            .set_assignment(d(2025, 3, 4), worker, EffortDuration::hours(hours))
            .unwrap();
        ModifiedAllocation::new(source.id(), modification)
    })
}

fn arb_window() -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (0i64..10, -3i64..10).prop_map(|(offset, length)| {
        let start = d(2025, 3, 3) + chrono::Duration::days(offset);
        (start, start + chrono::Duration::days(length))
    })
}

fn weekday_capacity() -> CalendarCapacity {
    CalendarCapacity::new(WorkCalendar::default(), EffortDuration::hours(8))
}

// ─── Property Tests ─────────────────────────────────────────────────────────

proptest! {
    /// A merge either commits or leaves the task exactly as it was.
    #[test]
    fn failed_merges_leave_no_partial_state(
        window in arb_window(),
        new_allocations in prop::collection::vec(arb_new_allocation(), 0..3),
        modifications in prop::collection::vec(arb_modification(&base_task()), 0..3),
        remove in prop::collection::vec(prop::sample::select(vec![1u64, 2, 7]), 0..2),
        fixed_duration in any::<bool>(),
    ) {
        let mut task = base_task();
        let before = task.clone();
        let to_remove: Vec<AllocationId> = remove.into_iter().map(AllocationId::new).collect();
        let calculated_value = if fixed_duration {
            CalculatedValue::NumberOfHours
        } else {
            CalculatedValue::EndDate
        };

        let result = task.merge_allocation(
            calculated_value,
            WindowSource::Explicit { start: window.0, end: window.1 },
            new_allocations,
            modifications,
            &to_remove,
        );

        match result {
            Ok(report) => {
                prop_assert_eq!(task.start_date(), window.0);
                prop_assert_eq!(task.end_date(), window.1);
                prop_assert!(task.revision() > before.revision());
                for removed in &report.removed {
                    prop_assert!(!removed.is_attached());
                }
                for allocation in task.resource_allocations() {
                    prop_assert_eq!(allocation.task_id(), Some(1));
                    prop_assert!(allocation.is_associated());
                }
            }
            Err(_) => {
                prop_assert_eq!(&task, &before);
            }
        }
    }

    /// Replanning in end-date mode moves effort around but never changes its total.
    #[test]
    fn replan_conserves_hours(
        hours in 1u32..200,
        shift in 0i64..30,
        load in 0.1f64..=1.0,
    ) {
        let capacity = weekday_capacity();
        let config = PlannerConfig::default();
        let mut task = Task::new(1, "Cladding", hours, d(2025, 3, 3));
        let allocation = ResourceAllocation::specific(AllocationId::new(1), 1, "ana")
            .with_resources_per_day(ResourcesPerDay::new(load).unwrap());
        task.add_resource_allocation(allocation).unwrap();
        task.allocate_work_hours(&capacity, &config).unwrap();
        let assigned = task.assigned_hours();
        prop_assert_eq!(assigned, EffortDuration::hours(hours));

        task.move_to(d(2025, 3, 3) + chrono::Duration::days(shift)).unwrap();
        task.replan(&capacity, &config).unwrap();

        prop_assert_eq!(task.assigned_hours(), assigned);
        prop_assert!(task.end_date() >= task.start_date());
    }

    /// Fixed-hours planning only ever adds effort from one day to the next,
    /// stays flat on closed days and stops exactly at the target.
    #[test]
    fn end_date_growth_is_monotonic(
        hours in 1u32..120,
        offset in 0i64..14,
        closed in prop::collection::vec(0i64..40, 0..6),
        load in 0.1f64..=1.0,
    ) {
        let first = d(2025, 3, 3);
        let holidays: Vec<NaiveDate> = closed.iter().map(|days| first + chrono::Duration::days(*days)).collect();
        let calendar = WorkCalendar::custom(
            [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            holidays,
        )
        .unwrap();
        let capacity = CalendarCapacity::new(calendar.clone(), EffortDuration::hours(8));
        let start = first + chrono::Duration::days(offset);
        let mut task = Task::new(1, "Cladding", hours, start);
        task.add_resource_allocation(
            ResourceAllocation::specific(AllocationId::new(1), 1, "ana")
                .with_resources_per_day(ResourcesPerDay::new(load).unwrap()),
        )
        .unwrap();
        task.add_resource_allocation(ResourceAllocation::generic(
            AllocationId::new(2),
            1,
            ["carpenter"],
            ["bob", "cy"],
        ))
        .unwrap();

        task.allocate_work_hours(&capacity, &PlannerConfig::default()).unwrap();

        let cumulative = task.aggregate().cumulative_hours();
        for pair in cumulative.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
            prop_assert!(pair[0].1 <= pair[1].1);
        }
        for (day, _) in &cumulative {
            prop_assert!(calendar.is_available(*day));
        }
        prop_assert_eq!(cumulative.last().copied(), Some((task.end_date(), EffortDuration::hours(hours))));
        prop_assert!(task.end_date() >= task.start_date());
    }

    /// Extending a fixed-duration window never reduces the assigned hours.
    #[test]
    fn fixed_window_growth_is_monotonic(days in 0u32..40, extra in 1u32..15) {
        let capacity = weekday_capacity();
        let config = PlannerConfig::default();
        let assigned_for = |duration: u32| {
            let mut task = Task::new(1, "Cladding", 0, d(2025, 3, 3));
            task.add_resource_allocation(ResourceAllocation::generic(
                AllocationId::new(1),
                1,
                ["carpenter"],
                ["ana", "bob"],
            ))
            .unwrap();
            task.set_calculated_value(CalculatedValue::NumberOfHours);
            task.set_days_duration(duration).unwrap();
            task.replan(&capacity, &config).unwrap();
            task.assigned_hours()
        };

        prop_assert!(assigned_for(days + extra) >= assigned_for(days));
    }

    /// Detaching twice is observably the same as detaching once.
    #[test]
    fn detach_is_idempotent(owner in 1i32..5, associate in any::<bool>()) {
        let mut allocation = ResourceAllocation::specific(AllocationId::new(1), owner, "ana");
        if associate {
            allocation.associate_assignments_to_resource();
        }
        allocation.detach();
        let once = allocation.clone();
        allocation.detach();
        prop_assert_eq!(allocation, once);
    }

    /// Uniqueness holds exactly when no two specific allocations share a worker.
    #[test]
    fn worker_uniqueness_matches_distinct_workers(
        workers in prop::collection::vec("[a-e]", 0..6),
        pools in 0usize..3,
    ) {
        let mut task = Task::new(1, "Cladding", 40, d(2025, 3, 3));
        let mut next = 0u64;
        for worker in &workers {
            next += 1;
            task.add_resource_allocation(ResourceAllocation::specific(AllocationId::new(next), 1, worker.as_str()))
                .unwrap();
        }
        for _ in 0..pools {
            next += 1;
            task.add_resource_allocation(ResourceAllocation::generic(
                AllocationId::new(next),
                1,
                ["any"],
                ["a", "b"],
            ))
            .unwrap();
        }

        let distinct: HashSet<&String> = workers.iter().collect();
        prop_assert_eq!(task.validate_worker_uniqueness(), distinct.len() == workers.len());
    }

    /// Splitting succeeds exactly when the shares add up to the task's hours.
    #[test]
    fn split_conserves_hours(
        shares in prop::collection::vec(1u32..20, 1..6),
        offset in -2i64..3,
    ) {
        let total: u32 = shares.iter().sum();
        let hours = (i64::from(total) + offset).max(0) as u32;
        let task = Task::new(1, "Cladding", hours, d(2025, 3, 3));
        let mut next = 100;

        let result = task.split(&shares, || {
            next += 1;
            next
        });

        if hours == total {
            let split = result.unwrap();
            prop_assert_eq!(split.children.len(), shares.len());
            prop_assert_eq!(split.total_share(), u64::from(hours));
            let child_shares: Vec<u32> = split.children.iter().filter_map(|c| c.share_of_hours).collect();
            prop_assert_eq!(child_shares, shares);
        } else {
            prop_assert!(result.is_err());
        }
    }
}
