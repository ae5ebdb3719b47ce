pub mod aggregate;
pub mod calendar;
pub mod capacity;
pub mod config;
pub mod effort;
pub mod error;
pub mod graph;
pub mod plan;
pub mod planner;
pub mod reconcile;
pub mod resource;
pub mod split;
pub mod task;
pub mod timesheet;

pub use aggregate::AllocationAggregate;
pub use calendar::{WorkCalendar, WorkCalendarConfig};
pub use capacity::{CalendarCapacity, CapacityProvider, CapacityTable, LedgerCapacity, ResourceLedger};
pub use config::{ConfigError, PlannerConfig};
pub use effort::EffortDuration;
pub use error::{AllocationError, AllocationResult};
pub use plan::Plan;
pub use planner::AllocationPlanner;
pub use reconcile::{MergePhase, MergeReport, ModifiedAllocation, ValidatedMerge, WindowSource};
pub use resource::{AllocationId, AllocationKind, ResourceAllocation, ResourcesPerDay};
pub use split::{Split, TaskGroup};
pub use task::{CalculatedValue, Task, TaskId};
pub use timesheet::{TimesheetError, timesheet_frame, write_timesheet_csv};
