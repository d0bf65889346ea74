//! Rendering of the gathered matrix and its verdicts.
//!
//! Formatting only: every decision was made by the validator, the
//! reporter just draws it and maps it to a process exit code.

use crate::{
    matrix::GlobalMatrix,
    rank::Rank,
    sample::MetricKind,
    stats::Summary,
    threshold::{Outcome, Verdict},
};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Output flavour, selected by the external configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Aligned, human-readable table.
    #[default]
    Table,
    /// One pretty-printed JSON document.
    Json,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => bail!("unknown report format `{s}` (expected table or json)"),
        }
    }
}

/// One row of the report: a matrix entry joined with its verdict, if a
/// threshold covered it.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub source: Rank,
    pub destination: Rank,
    pub metric: MetricKind,
    pub summary: Summary,
    pub target: Option<f64>,
    pub outcome: Option<Outcome>,
}

/// The outcome of a whole validation pass on the coordinating rank.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub matrix: GlobalMatrix,
    pub verdicts: Vec<Verdict>,
}

impl RunReport {
    pub fn new(matrix: GlobalMatrix, verdicts: Vec<Verdict>) -> Self {
        Self { matrix, verdicts }
    }

    /// Matrix entries joined with their verdicts, in pair order.
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.matrix
            .iter()
            .map(|(pair, metric, summary)| {
                let verdict = self
                    .verdicts
                    .iter()
                    .find(|v| v.pair == pair && v.metric == metric);
                ReportEntry {
                    source: pair.source,
                    destination: pair.destination,
                    metric,
                    summary: *summary,
                    target: verdict.map(|v| v.target),
                    outcome: verdict.map(|v| v.outcome),
                }
            })
            .collect()
    }

    /// The worst verdict of the run; `Pass` when nothing was judged.
    pub fn overall(&self) -> Outcome {
        self.verdicts
            .iter()
            .map(|v| v.outcome)
            .max()
            .unwrap_or(Outcome::Pass)
    }

    /// Verdicts inside the tolerance band, for the caller to warn about.
    pub fn degraded(&self) -> impl Iterator<Item = &Verdict> {
        self.verdicts
            .iter()
            .filter(|v| v.outcome == Outcome::Degraded)
    }

    /// Process exit status: `0` when no pair failed (degraded-only runs
    /// pass), non-zero otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.verdicts.iter().any(|v| v.outcome == Outcome::Fail) {
            1
        } else {
            0
        }
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Table => self.render_table(),
            ReportFormat::Json => self.render_json(),
        }
    }

    fn render_table(&self) -> String {
        const HEADER: [&str; 8] =
            ["pair", "metric", "min", "mean", "max", "pctl", "fails", "verdict"];

        let rows: Vec<[String; 8]> = self
            .entries()
            .iter()
            .map(|entry| {
                let value = |v: f64| format_value(entry.metric, v);
                let (min, mean, max, pctl) = match entry.summary.stats {
                    Some(stats) => (
                        value(stats.min),
                        value(stats.mean),
                        value(stats.max),
                        value(stats.percentile),
                    ),
                    None => {
                        let dash = || "-".to_owned();
                        (dash(), "unreachable".to_owned(), dash(), dash())
                    }
                };
                [
                    format!("{}->{}", entry.source, entry.destination),
                    entry.metric.to_string(),
                    min,
                    mean,
                    max,
                    pctl,
                    entry.summary.failures.to_string(),
                    entry
                        .outcome
                        .map_or_else(|| "-".to_owned(), |o| o.to_string()),
                ]
            })
            .collect();

        let mut widths: [usize; 8] = HEADER.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        for (i, (title, width)) in HEADER.iter().zip(widths).enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{title:width$}"));
        }
        out.push('\n');
        for row in &rows {
            for (i, (cell, width)) in row.iter().zip(widths).enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                out.push_str(&format!("{cell:width$}"));
            }
            out.push('\n');
        }

        let failed = self
            .verdicts
            .iter()
            .filter(|v| v.outcome == Outcome::Fail)
            .count();
        let degraded = self.degraded().count();
        out.push_str(&format!(
            "overall: {} ({} entries, {failed} failed, {degraded} degraded)\n",
            self.overall(),
            self.matrix.len(),
        ));
        out
    }

    fn render_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonReport {
            overall: Outcome,
            failed: usize,
            degraded: usize,
            entries: Vec<ReportEntry>,
        }

        let report = JsonReport {
            overall: self.overall(),
            failed: self
                .verdicts
                .iter()
                .filter(|v| v.outcome == Outcome::Fail)
                .count(),
            degraded: self.degraded().count(),
            entries: self.entries(),
        };
        serde_json::to_string_pretty(&report).expect("report serialization cannot fail")
    }
}

/// Human units per metric: fractional µs/ms for latency, B/s multiples
/// for bandwidth.
fn format_value(metric: MetricKind, value: f64) -> String {
    match metric {
        MetricKind::Latency => {
            if value >= 1_000.0 {
                format!("{:.2}ms", value / 1_000.0)
            } else {
                format!("{value:.2}us")
            }
        }
        MetricKind::Bandwidth => {
            const K: f64 = 1_024.0;
            const M: f64 = 1_024.0 * 1_024.0;
            const G: f64 = 1_024.0 * 1_024.0 * 1_024.0;
            if value >= G {
                format!("{:.2}GB/s", value / G)
            } else if value >= M {
                format!("{:.2}MB/s", value / M)
            } else if value >= K {
                format!("{:.2}KB/s", value / K)
            } else {
                format!("{value:.0}B/s")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        matrix::RankReport,
        pair::Pair,
        stats::{PairSummary, SampleStats},
        threshold::{Threshold, validate},
    };

    fn sample_report(means: &[Option<f64>]) -> RunReport {
        let summaries: Vec<PairSummary> = means
            .iter()
            .enumerate()
            .map(|(i, mean)| PairSummary {
                pair: Pair::new(Rank::ZERO, Rank::new(i as u32 + 1)),
                metric: MetricKind::Bandwidth,
                summary: Summary {
                    stats: mean.map(|m| SampleStats {
                        min: m,
                        mean: m,
                        max: m,
                        percentile: m,
                        std_dev: 0.0,
                    }),
                    samples: u32::from(mean.is_some()),
                    failures: u32::from(mean.is_none()),
                },
            })
            .collect();
        let expected: Vec<_> = summaries.iter().map(|s| (s.pair, s.metric)).collect();
        let frames = vec![RankReport::new(Rank::ZERO, summaries).encode().unwrap()];
        let matrix = GlobalMatrix::merge(expected, &frames).unwrap();
        let verdicts = validate(
            &matrix,
            &[Threshold::absolute(MetricKind::Bandwidth, 1_000.0, 0.0)],
            false,
        );
        RunReport::new(matrix, verdicts)
    }

    #[test]
    fn exit_code_zero_when_all_pass() {
        let report = sample_report(&[Some(2_000.0), Some(1_000.0)]);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.overall(), Outcome::Pass);
    }

    #[test]
    fn exit_code_nonzero_on_any_fail() {
        let report = sample_report(&[Some(2_000.0), None]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.overall(), Outcome::Fail);
    }

    #[test]
    fn table_contains_every_pair_and_the_overall_line() {
        let report = sample_report(&[Some(2_000.0), None]);
        let table = report.render(ReportFormat::Table);

        assert!(table.contains("0->1"));
        assert!(table.contains("0->2"));
        assert!(table.contains("unreachable"));
        assert!(table.contains("overall: FAIL"));
    }

    #[test]
    fn json_parses_back() {
        let report = sample_report(&[Some(2_000.0)]);
        let json = report.render(ReportFormat::Json);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["overall"], "PASS");
        assert_eq!(value["entries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn format_values() {
        assert_eq!(format_value(MetricKind::Latency, 12.345), "12.35us");
        assert_eq!(format_value(MetricKind::Latency, 1_500.0), "1.50ms");
        assert_eq!(
            format_value(MetricKind::Bandwidth, 2.5 * 1_024.0 * 1_024.0 * 1_024.0),
            "2.50GB/s"
        );
        assert_eq!(format_value(MetricKind::Bandwidth, 512.0), "512B/s");
    }

    #[test]
    fn parse_format() {
        assert_eq!("table".parse::<ReportFormat>().unwrap(), ReportFormat::Table);
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
