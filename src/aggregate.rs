use crate::effort::EffortDuration;
use crate::resource::ResourceAllocation;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Read-only summary over a set of allocations. Nothing is cached; every
/// query walks the allocations again.
#[derive(Debug, Clone)]
pub struct AllocationAggregate<'a> {
    allocations: Vec<&'a ResourceAllocation>,
}

impl<'a> AllocationAggregate<'a> {
    pub fn new<I>(allocations: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceAllocation>,
    {
        Self {
            allocations: allocations.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Earliest day carrying effort. `None` when no allocation has any.
    pub fn start(&self) -> Option<NaiveDate> {
        self.allocations.iter().filter_map(|a| a.start()).min()
    }

    /// Latest day carrying effort. `None` when no allocation has any.
    pub fn end(&self) -> Option<NaiveDate> {
        self.allocations.iter().filter_map(|a| a.end()).max()
    }

    pub fn total_hours(&self) -> EffortDuration {
        self.allocations.iter().map(|a| a.assigned_hours()).sum()
    }

    pub fn daily_totals(&self) -> BTreeMap<NaiveDate, EffortDuration> {
        let mut totals: BTreeMap<NaiveDate, EffortDuration> = BTreeMap::new();
        for allocation in &self.allocations {
            for (day, effort) in allocation.effort_per_day() {
                *totals.entry(day).or_default() += effort;
            }
        }
        totals
    }

    /// Running total of effort at the end of each day that carries work.
    pub fn cumulative_hours(&self) -> Vec<(NaiveDate, EffortDuration)> {
        let mut running = EffortDuration::ZERO;
        self.daily_totals()
            .into_iter()
            .map(|(day, effort)| {
                running += effort;
                (day, running)
            })
            .collect()
    }
}
