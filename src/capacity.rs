use crate::calendar::WorkCalendar;
use crate::config::ConfigError;
use crate::effort::EffortDuration;
use crate::task::{Task, TaskId};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io;

/// Daily capacity of a resource. Implementations must be pure lookups; the
/// planner asks again on every replan.
pub trait CapacityProvider {
    fn capacity(&self, resource_id: &str, day: NaiveDate) -> EffortDuration;
}

impl<F> CapacityProvider for F
where
    F: Fn(&str, NaiveDate) -> EffortDuration,
{
    fn capacity(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        self(resource_id, day)
    }
}

/// Capacity from a work calendar: a fixed number of hours on working days
/// (optionally per resource) and nothing on holidays or rest days.
#[derive(Debug, Clone)]
pub struct CalendarCapacity {
    calendar: WorkCalendar,
    default_daily: EffortDuration,
    per_resource: HashMap<String, EffortDuration>,
}

impl CalendarCapacity {
    pub fn new(calendar: WorkCalendar, default_daily: EffortDuration) -> Self {
        Self {
            calendar,
            default_daily,
            per_resource: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>, daily: EffortDuration) -> Self {
        self.per_resource.insert(resource_id.into(), daily);
        self
    }

    pub fn calendar(&self) -> &WorkCalendar {
        &self.calendar
    }
}

impl CapacityProvider for CalendarCapacity {
    fn capacity(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        if !self.calendar.is_available(day) {
            return EffortDuration::ZERO;
        }
        self.per_resource
            .get(resource_id)
            .copied()
            .unwrap_or(self.default_daily)
    }
}

#[derive(Deserialize)]
struct CapacityRecord {
    resource_id: String,
    day: NaiveDate,
    hours: f64,
}

/// Explicit per resource/day capacities. Unlisted pairs have no capacity.
#[derive(Debug, Clone, Default)]
pub struct CapacityTable {
    rows: HashMap<(String, NaiveDate), EffortDuration>,
}

impl CapacityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource_id: impl Into<String>, day: NaiveDate, effort: EffortDuration) {
        self.rows.insert((resource_id.into(), day), effort);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads `resource_id,day,hours` rows with a header line.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, ConfigError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut table = Self::new();
        for record in rdr.deserialize::<CapacityRecord>() {
            let record = record?;
            let effort = EffortDuration::from_hours_f64(record.hours).ok_or_else(|| {
                ConfigError::InvalidHours {
                    resource_id: record.resource_id.clone(),
                    hours: record.hours,
                }
            })?;
            table.insert(record.resource_id, record.day, effort);
        }
        Ok(table)
    }
}

impl CapacityProvider for CapacityTable {
    fn capacity(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        self.rows
            .get(&(resource_id.to_string(), day))
            .copied()
            .unwrap_or_default()
    }
}

/// Effort already committed to each resource per day by associated
/// allocations, broken down by task.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    load: HashMap<String, BTreeMap<NaiveDate, BTreeMap<TaskId, EffortDuration>>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut ledger = Self::new();
        for task in tasks {
            ledger.record_task(task);
        }
        ledger
    }

    /// Adds the usage of every associated allocation of `task`. Detached or
    /// never-associated allocations contribute nothing.
    pub fn record_task(&mut self, task: &Task) {
        for allocation in task.resource_allocations() {
            if !allocation.is_associated() {
                continue;
            }
            for assignment in allocation.assignments() {
                *self
                    .load
                    .entry(assignment.resource_id.to_string())
                    .or_default()
                    .entry(assignment.day)
                    .or_default()
                    .entry(task.id)
                    .or_default() += assignment.effort;
            }
        }
    }

    pub fn load(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        self.per_task(resource_id, day)
            .map(|per_task| per_task.values().sum())
            .unwrap_or_default()
    }

    pub fn load_excluding(&self, resource_id: &str, day: NaiveDate, task: TaskId) -> EffortDuration {
        self.per_task(resource_id, day)
            .map(|per_task| {
                per_task
                    .iter()
                    .filter(|(id, _)| **id != task)
                    .map(|(_, effort)| *effort)
                    .sum()
            })
            .unwrap_or_default()
    }

    /// Resource/day pairs whose recorded load exceeds what `provider` offers.
    pub fn overloaded<P>(&self, provider: &P) -> Vec<(String, NaiveDate)>
    where
        P: CapacityProvider + ?Sized,
    {
        let mut result = Vec::new();
        for (resource_id, days) in &self.load {
            for (day, per_task) in days {
                let load: EffortDuration = per_task.values().sum();
                if load > provider.capacity(resource_id, *day) {
                    result.push((resource_id.clone(), *day));
                }
            }
        }
        result.sort();
        result
    }

    fn per_task(&self, resource_id: &str, day: NaiveDate) -> Option<&BTreeMap<TaskId, EffortDuration>> {
        self.load.get(resource_id).and_then(|days| days.get(&day))
    }
}

/// Capacity left for `task` once the load other tasks recorded in the
/// ledger is taken out.
pub struct LedgerCapacity<'a, P: ?Sized> {
    base: &'a P,
    ledger: &'a ResourceLedger,
    task: TaskId,
}

impl<'a, P: CapacityProvider + ?Sized> LedgerCapacity<'a, P> {
    pub fn new(base: &'a P, ledger: &'a ResourceLedger, task: TaskId) -> Self {
        Self { base, ledger, task }
    }
}

impl<P: CapacityProvider + ?Sized> CapacityProvider for LedgerCapacity<'_, P> {
    fn capacity(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        self.base
            .capacity(resource_id, day)
            .saturating_sub(self.ledger.load_excluding(resource_id, day, self.task))
    }
}
