//! Conformance test runner
//!
//! Executes YAML scenarios through a [`SuiteContext`] and generates reports.
//! Supports multiple output formats: JSON, JUnit XML, and human-readable.

use super::*;
use crate::error::TckError;
use crate::suite::SuiteContext;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// Conformance test runner
pub struct ConformanceRunner {
    /// Loaded specifications
    specs: Vec<ConformanceSpec>,
}

impl ConformanceRunner {
    /// Create a new runner with given specs
    pub fn new(specs: Vec<ConformanceSpec>) -> Self {
        Self { specs }
    }

    /// Load specs from a directory
    pub fn load_from_dir(path: &Path) -> Result<Self> {
        let specs = spec::load_specs_from_dir(path)?;
        Ok(Self::new(specs))
    }

    /// Get the number of loaded specs
    pub fn spec_count(&self) -> usize {
        self.specs.len()
    }

    /// Loaded specs, in load order
    pub fn specs(&self) -> &[ConformanceSpec] {
        &self.specs
    }

    /// Keep only specs whose name contains `pattern`
    pub fn filter_name(mut self, pattern: &str) -> Self {
        self.specs.retain(|s| s.spec.name.contains(pattern));
        self
    }

    /// Run all conformance tests, one at a time
    pub async fn run_all(&self, ctx: &SuiteContext) -> TestReport {
        self.run_concurrent(ctx, 1).await
    }

    /// Run all conformance tests with up to `concurrency` in flight.
    ///
    /// Each scenario owns its fixtures, so scenarios never share accounts.
    /// Results are reported in load order.
    pub async fn run_concurrent(&self, ctx: &SuiteContext, concurrency: usize) -> TestReport {
        self.run_selected(ctx, self.specs.iter().collect(), concurrency)
            .await
    }

    /// Run tests for a specific category
    pub async fn run_category(&self, ctx: &SuiteContext, category: Category) -> TestReport {
        let selected = self
            .specs
            .iter()
            .filter(|s| s.spec.category == category)
            .collect();
        self.run_selected(ctx, selected, 1).await
    }

    async fn run_selected(
        &self,
        ctx: &SuiteContext,
        selected: Vec<&ConformanceSpec>,
        concurrency: usize,
    ) -> TestReport {
        let start = Instant::now();
        let mut report = TestReport::new();

        let results: Vec<_> = stream::iter(selected)
            .map(|spec| async move { (spec, run_spec(ctx, spec).await) })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        for (spec, result) in results {
            report.add_result(&spec.spec.name, &spec.spec.category, result);
        }

        report.duration = start.elapsed();
        report
    }
}

/// Run a single spec in its own fixture scope
async fn run_spec(ctx: &SuiteContext, spec: &ConformanceSpec) -> TestResult {
    if let Some(reason) = &spec.skip {
        log::info!("Skipping spec {}: {}", spec.spec.name, reason);
        return TestResult {
            status: TestStatus::Skip,
            duration: Duration::ZERO,
            error: Some(reason.clone()),
        };
    }

    let start = Instant::now();
    let result = ctx
        .run_test(&spec.spec.name, |fixtures| execute_spec(ctx, fixtures, spec))
        .await;

    TestResult {
        status: match &result {
            Ok(_) => TestStatus::Pass,
            Err(e) => TestStatus::from_error(e),
        },
        duration: start.elapsed(),
        error: result.err().map(|e| e.to_string()),
    }
}

/// Test execution result
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test status
    pub status: TestStatus,
    /// Execution duration
    pub duration: Duration,
    /// Error message if failed, or the skip reason
    pub error: Option<String>,
}

/// Test status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    /// Test passed
    Pass,
    /// Outcome or converged state differed from the declaration
    Fail,
    /// Test skipped
    Skip,
    /// Test exceeded its time limit
    Timeout,
    /// Setup or harness failure before anything could be asserted
    Error,
}

impl TestStatus {
    /// Classify a failed test.
    pub fn from_error(error: &TckError) -> Self {
        match error {
            TckError::UnexpectedOutcome { .. } | TckError::ConvergenceTimeout { .. } => Self::Fail,
            TckError::Timeout(_) => Self::Timeout,
            _ => Self::Error,
        }
    }
}

/// Test report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Total tests run
    pub total: usize,
    /// Tests passed
    pub passed: usize,
    /// Tests failed
    pub failed: usize,
    /// Tests that timed out or could not be set up
    pub errors: usize,
    /// Tests skipped
    pub skipped: usize,
    /// Total duration
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Individual results
    pub results: Vec<TestResultEntry>,
}

/// Individual test result entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResultEntry {
    /// Test name
    pub name: String,
    /// Category
    pub category: String,
    /// Status
    pub status: TestStatus,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Error message if failed
    pub error: Option<String>,
}

impl TestReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            errors: 0,
            skipped: 0,
            duration: Duration::ZERO,
            results: Vec::new(),
        }
    }

    /// Add a test result
    pub fn add_result(&mut self, name: &str, category: &Category, result: TestResult) {
        self.total += 1;
        match result.status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Timeout | TestStatus::Error => self.errors += 1,
        }

        self.results.push(TestResultEntry {
            name: name.to_string(),
            category: category_name(category),
            status: result.status,
            duration_ms: result.duration.as_millis() as u64,
            error: result.error,
        });
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check if all tests passed
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// Convert to JUnit XML format
    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"Ledger TCK Conformance\" tests=\"{}\" failures=\"{}\" \
             errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">\n",
            self.total,
            self.failed,
            self.errors,
            self.skipped,
            self.duration.as_secs_f64()
        ));

        for result in &self.results {
            xml.push_str(&format!(
                "  <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\"",
                escape_xml(&result.category),
                escape_xml(&result.name),
                result.duration_ms as f64 / 1000.0
            ));

            let detail = result.error.as_deref().map(escape_xml).unwrap_or_default();
            match result.status {
                TestStatus::Pass => {
                    xml.push_str(" />\n");
                }
                TestStatus::Fail => {
                    xml.push_str(">\n");
                    xml.push_str(&format!(
                        "    <failure message=\"Test failed\">{}</failure>\n",
                        detail
                    ));
                    xml.push_str("  </testcase>\n");
                }
                TestStatus::Timeout | TestStatus::Error => {
                    let kind = if result.status == TestStatus::Timeout {
                        "timeout"
                    } else {
                        "error"
                    };
                    xml.push_str(">\n");
                    xml.push_str(&format!(
                        "    <error type=\"{}\" message=\"Test errored\">{}</error>\n",
                        kind, detail
                    ));
                    xml.push_str("  </testcase>\n");
                }
                TestStatus::Skip => {
                    xml.push_str(">\n");
                    xml.push_str(&format!("    <skipped message=\"{}\" />\n", detail));
                    xml.push_str("  </testcase>\n");
                }
            }
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    /// Get results by category
    pub fn by_category(&self) -> HashMap<String, Vec<&TestResultEntry>> {
        let mut map: HashMap<String, Vec<&TestResultEntry>> = HashMap::new();
        for result in &self.results {
            map.entry(result.category.clone()).or_default().push(result);
        }
        map
    }

    /// Human-readable summary, grouped by category
    pub fn summary(&self) -> String {
        let mut out = String::from("\n=== Ledger TCK Conformance Report ===\n\n");

        let groups = self.by_category();
        let mut categories: Vec<_> = groups.keys().collect();
        categories.sort();
        for category in categories {
            let entries = &groups[category];
            let passed = entries
                .iter()
                .filter(|r| r.status == TestStatus::Pass)
                .count();
            out.push_str(&format!("  {:<20} {}/{}\n", category, passed, entries.len()));
        }

        out.push_str(&format!(
            "\n{} scenarios in {:.2}s: {} passed, {} failed, {} errors, {} skipped\n",
            self.total,
            self.duration.as_secs_f64(),
            self.passed,
            self.failed,
            self.errors,
            self.skipped
        ));

        let broken: Vec<_> = self
            .results
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    TestStatus::Fail | TestStatus::Timeout | TestStatus::Error
                )
            })
            .collect();
        if !broken.is_empty() {
            out.push('\n');
            for result in broken {
                out.push_str(&format!("  {:?} {}\n", result.status, result.name));
                if let Some(error) = &result.error {
                    out.push_str(&format!("      {}\n", error));
                }
            }
        }

        out.push_str(if self.all_passed() { "\nPASS\n" } else { "\nFAIL\n" });
        out
    }

    /// Print human-readable summary
    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }
}

fn category_name(category: &Category) -> String {
    serde_json::to_value(category)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", category))
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

impl Default for TestReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
