use crate::calendar::day_range;
use crate::capacity::CapacityProvider;
use crate::config::PlannerConfig;
use crate::effort::EffortDuration;
use crate::error::{AllocationError, AllocationResult};
use crate::resource::ResourceAllocation;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Distributes effort over working copies of allocations.
///
/// Days are visited in ascending order and, within a day, allocations in the
/// order given, resources in the order the allocation lists them. Identical
/// inputs therefore always produce identical assignments. A resource never
/// receives more effort on a day than its capacity, even when several
/// allocations share it.
pub struct AllocationPlanner<'a, P: ?Sized> {
    provider: &'a P,
    max_idle_days: u32,
}

impl<'a, P: CapacityProvider + ?Sized> AllocationPlanner<'a, P> {
    pub fn new(provider: &'a P, config: &PlannerConfig) -> Self {
        Self {
            provider,
            max_idle_days: config.max_idle_days,
        }
    }

    pub fn with_max_idle_days(provider: &'a P, max_idle_days: u32) -> Self {
        Self {
            provider,
            max_idle_days,
        }
    }

    /// Fills the fixed window `[start, end]` as far as capacity allows and
    /// returns the total effort assigned. The window itself never changes.
    pub fn allocate_on_task_length(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        allocations: &mut [ResourceAllocation],
    ) -> AllocationResult<EffortDuration> {
        if end < start {
            return Err(AllocationError::InvalidWindow { start, end });
        }
        for allocation in allocations.iter_mut() {
            allocation.clear_assignments();
        }

        let mut total = EffortDuration::ZERO;
        for day in day_range(start, end) {
            total += self.plan_day(allocations, day, None);
        }
        debug!(%start, %end, %total, allocations = allocations.len(), "allocated on task length");
        Ok(total)
    }

    /// Grows the window from `start` one day at a time until `target` effort
    /// is assigned, and returns the last day used. The final day is trimmed
    /// so the assigned total equals `target` exactly.
    pub fn allocate_until(
        &self,
        start: NaiveDate,
        target: EffortDuration,
        allocations: &mut [ResourceAllocation],
    ) -> AllocationResult<NaiveDate> {
        for allocation in allocations.iter_mut() {
            allocation.clear_assignments();
        }
        if target.is_zero() {
            return Ok(start);
        }
        if allocations.iter().all(|a| a.resource_ids().is_empty()) {
            warn!(%start, "no allocation resolves to any resource");
            return Err(AllocationError::NoCapacity { from: start });
        }

        let idle_limit = self.max_idle_days.max(1);
        let mut assigned = EffortDuration::ZERO;
        let mut idle_days = 0;
        let mut day = start;
        loop {
            let today = self.plan_day(allocations, day, Some(target.saturating_sub(assigned)));
            if today.is_zero() {
                idle_days += 1;
                if idle_days >= idle_limit {
                    warn!(%start, %day, idle_days, "capacity exhausted while allocating");
                    return Err(AllocationError::NoCapacity { from: start });
                }
            } else {
                idle_days = 0;
            }
            assigned += today;
            if assigned >= target {
                debug!(%start, end = %day, %target, "allocated until target reached");
                return Ok(day);
            }
            day = day
                .succ_opt()
                .ok_or(AllocationError::NoCapacity { from: start })?;
        }
    }

    fn plan_day(
        &self,
        allocations: &mut [ResourceAllocation],
        day: NaiveDate,
        limit: Option<EffortDuration>,
    ) -> EffortDuration {
        let mut used: HashMap<String, EffortDuration> = HashMap::new();
        let mut today = EffortDuration::ZERO;
        for allocation in allocations.iter_mut() {
            let load = allocation.resources_per_day().amount();
            let resources = allocation.resource_ids().to_vec();
            for resource_id in resources {
                let capacity = self.provider.capacity(&resource_id, day);
                let already = used.get(&resource_id).copied().unwrap_or_default();
                let mut effort = capacity.scale(load).min(capacity.saturating_sub(already));
                if let Some(limit) = limit {
                    effort = effort.min(limit.saturating_sub(today));
                }
                if effort.is_zero() {
                    continue;
                }
                allocation.record(day, resource_id.clone(), effort);
                *used.entry(resource_id).or_default() += effort;
                today += effort;
            }
        }
        today
    }
}
