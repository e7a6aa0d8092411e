//! CSV export of sample series
//!
//! One row per sample, in time order, for plotting collaborators.

use crate::metrics::{MetricSample, SampleSeries};

/// CSV row for one sample of one target
#[derive(Debug, Clone)]
pub struct CsvSample {
    pub target: String,
    pub sample: MetricSample,
}

/// CSV output formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    rows: Vec<CsvSample>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every sample of a series under the given target label
    pub fn add_series(&mut self, target: &str, series: &SampleSeries) {
        self.rows.extend(series.samples().iter().map(|sample| CsvSample {
            target: target.to_string(),
            sample: *sample,
        }));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn header() -> &'static str {
        "target,elapsed_secs,memory_bytes,cpu_percent,io_ops,network_calls"
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_row(row: &CsvSample) -> String {
        let s = &row.sample;
        format!(
            "{},{:.6},{},{:.2},{},{}",
            Self::escape_field(&row.target),
            s.elapsed_secs,
            s.memory_bytes,
            s.cpu_percent,
            s.io_ops,
            s.network_calls
        )
    }

    /// Generate the complete CSV document
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(Self::header());
        output.push('\n');
        for row in &self.rows {
            output.push_str(&Self::format_row(row));
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_follow_series_order() {
        let mut series = SampleSeries::new();
        series.push(MetricSample {
            elapsed_secs: 0.0,
            memory_bytes: 1024,
            cpu_percent: 0.0,
            io_ops: 1,
            network_calls: 0,
        });
        series.push(MetricSample {
            elapsed_secs: 0.05,
            memory_bytes: 2048,
            cpu_percent: 99.5,
            io_ops: 4,
            network_calls: 1,
        });

        let mut csv = CsvOutput::new();
        csv.add_series("test_a.py", &series);
        assert_eq!(csv.len(), 2);

        let text = csv.to_csv();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "target,elapsed_secs,memory_bytes,cpu_percent,io_ops,network_calls"
        );
        assert_eq!(lines[1], "test_a.py,0.000000,1024,0.00,1,0");
        assert_eq!(lines[2], "test_a.py,0.050000,2048,99.50,4,1");
    }

    #[test]
    fn test_csv_escape_field() {
        assert_eq!(CsvOutput::escape_field("simple"), "simple");
        assert_eq!(CsvOutput::escape_field("a,b.py"), "\"a,b.py\"");
        assert_eq!(CsvOutput::escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_empty_csv_has_header_only() {
        let csv = CsvOutput::new();
        assert!(csv.is_empty());
        assert_eq!(csv.to_csv().lines().count(), 1);
    }
}
