// Comparative analysis of two execution units
//
// Two targets naming the same unit are run one after the other under the
// same sampler settings. Each compared metric gets an absolute and relative
// delta plus a verdict; a relative change within the noise threshold counts
// as unchanged.
//
// - `delta`: per-metric arithmetic and verdicts
// - `report`: the `ComparisonReport` built from one or more runs per side

mod delta;
mod report;

pub use delta::{MetricDelta, Verdict};
pub use report::{ComparisonOutcome, ComparisonReport};

#[cfg(test)]
mod tests;
