pub mod check;
pub mod compose;
pub mod plan;

use sidebyside_compose::{ClipDuration, ClipOffset, OutputKind, Pair};

use crate::JobArgs;

/// Validated job parameters parsed from the command line.
pub struct JobParams {
    pub offsets: Pair<ClipOffset>,
    pub durations: Pair<ClipDuration>,
    pub kind: OutputKind,
}

impl JobArgs {
    pub fn params(&self) -> anyhow::Result<JobParams> {
        let duration = |secs: Option<f64>| match secs {
            Some(secs) => ClipDuration::new(secs),
            None => Ok(ClipDuration::default()),
        };
        Ok(JobParams {
            offsets: Pair::new(
                ClipOffset::new(self.before_start)?,
                ClipOffset::new(self.after_start)?,
            ),
            durations: Pair::new(duration(self.before_duration)?, duration(self.after_duration)?),
            kind: self.format.parse()?,
        })
    }
}
