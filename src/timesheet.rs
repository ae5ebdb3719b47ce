use crate::resource::AllocationId;
use crate::task::Task;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use polars::prelude::PlSmallStr;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimesheetError {
    #[error("timesheet frame error: {0}")]
    Frame(#[from] PolarsError),
    #[error("timesheet csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("timesheet io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of a timesheet: effort of one resource on one day for one allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimesheetRow {
    pub allocation_id: AllocationId,
    pub resource_id: String,
    pub day: NaiveDate,
    pub hours: f64,
}

/// Rows ordered by day, then by the task's allocation order.
pub fn timesheet_rows(task: &Task) -> Vec<TimesheetRow> {
    let mut rows: Vec<TimesheetRow> = task
        .resource_allocations()
        .flat_map(|allocation| {
            allocation.assignments().map(move |assignment| TimesheetRow {
                allocation_id: allocation.id(),
                resource_id: assignment.resource_id.to_string(),
                day: assignment.day,
                hours: assignment.effort.as_hours_f64(),
            })
        })
        .collect();
    rows.sort_by_key(|row| row.day);
    rows
}

pub fn timesheet_frame(task: &Task) -> PolarsResult<DataFrame> {
    let rows = timesheet_rows(task);

    let ids: Vec<u64> = rows.iter().map(|row| row.allocation_id.get()).collect();
    let resources: Vec<&str> = rows.iter().map(|row| row.resource_id.as_str()).collect();
    let days: Vec<i32> = rows.iter().map(|row| date_to_i32(row.day)).collect();
    let hours: Vec<f64> = rows.iter().map(|row| row.hours).collect();

    DataFrame::new(vec![
        Series::new(PlSmallStr::from_static("allocation_id"), ids).into_column(),
        Series::new(PlSmallStr::from_static("resource_id"), resources).into_column(),
        Series::new(PlSmallStr::from_static("day"), days)
            .cast(&DataType::Date)?
            .into_column(),
        Series::new(PlSmallStr::from_static("hours"), hours).into_column(),
    ])
}

pub fn write_timesheet_csv<W: Write>(task: &Task, writer: W) -> Result<(), TimesheetError> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in timesheet_rows(task) {
        writer.serialize(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Days since the Unix epoch, the physical value of a polars `Date`.
fn date_to_i32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_FROM_CE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effort::EffortDuration;
    use crate::resource::ResourceAllocation;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_task() -> Task {
        let mut task = Task::new(1, "Wiring", 12, d(2025, 3, 3));
        let mut ana = ResourceAllocation::specific(AllocationId::new(1), 1, "ana");
        ana.set_assignment(d(2025, 3, 4), "ana", EffortDuration::hours(4)).unwrap();
        ana.set_assignment(d(2025, 3, 3), "ana", EffortDuration::minutes(90)).unwrap();
        let mut bob = ResourceAllocation::specific(AllocationId::new(2), 1, "bob");
        bob.set_assignment(d(2025, 3, 3), "bob", EffortDuration::hours(6)).unwrap();
        task.add_resource_allocation(ana).unwrap();
        task.add_resource_allocation(bob).unwrap();
        task
    }

    #[test]
    fn frame_rows_follow_day_then_allocation_order() {
        let frame = timesheet_frame(&sample_task()).unwrap();
        assert_eq!(frame.height(), 3);

        let ids: Vec<Option<u64>> = frame.column("allocation_id").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(1)]);

        let hours: f64 = frame.column("hours").unwrap().f64().unwrap().sum().unwrap();
        assert!((hours - 11.5).abs() < 1e-9);
        assert_eq!(frame.column("day").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn days_count_from_the_unix_epoch() {
        assert_eq!(date_to_i32(d(1970, 1, 1)), 0);
        assert_eq!(date_to_i32(d(1969, 12, 31)), -1);
        assert_eq!(date_to_i32(d(2025, 3, 3)), 20_150);

        let frame = timesheet_frame(&sample_task()).unwrap();
        let days: Vec<Option<i32>> = frame
            .column("day")
            .unwrap()
            .cast(&DataType::Int32)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(days, vec![Some(20_150), Some(20_150), Some(20_151)]);
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let mut out = Vec::new();
        write_timesheet_csv(&sample_task(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "allocation_id,resource_id,day,hours");
        assert_eq!(lines[1], "1,ana,2025-03-03,1.5");
        assert_eq!(lines.len(), 4);
    }
}
