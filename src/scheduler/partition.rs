// ABOUTME: Splits an inclusive spreadsheet row range into fixed-size batches
// ABOUTME: Each batch becomes one job small enough to finish inside a single remote call

use serde::{Deserialize, Serialize};

use super::job::{JobDescriptor, JobId};
use crate::error::{Result, RunnerError};

/// Inclusive range of spreadsheet rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRange {
    pub start_row: u32,
    pub end_row: u32,
}

impl RowRange {
    pub fn new(start_row: u32, end_row: u32) -> Self {
        Self { start_row, end_row }
    }

    /// Number of rows covered; 0 when the range is inverted.
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        (self.end_row - self.start_row).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.end_row < self.start_row
    }
}

/// Partition `[row_start, row_end]` into contiguous batches of `batch_size` rows.
///
/// The last batch may be shorter. Descriptors carry ids `0..n-1` in row order.
pub fn partition_rows(
    row_start: u32,
    row_end: u32,
    batch_size: u32,
) -> Result<Vec<JobDescriptor<RowRange>>> {
    if batch_size < 1 {
        return Err(RunnerError::Validation(
            "batch size must be at least 1".to_string(),
        ));
    }
    if row_end < row_start {
        return Err(RunnerError::Validation(format!(
            "end row {} is before start row {}",
            row_end, row_start
        )));
    }

    let total = u64::from(row_end - row_start) + 1;
    let count = total.div_ceil(u64::from(batch_size));
    let mut descriptors = Vec::with_capacity(count as usize);

    let mut start = row_start;
    for index in 0..count {
        let end = start.saturating_add(batch_size - 1).min(row_end);
        descriptors.push(JobDescriptor::with_id(
            JobId(index),
            RowRange::new(start, end),
        ));
        if end == row_end {
            break;
        }
        start = end + 1;
    }

    Ok(descriptors)
}
