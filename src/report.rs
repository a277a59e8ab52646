//! Report rendering
//!
//! Two outputs: a plain-text summary for terminals and the full
//! [`AnalysisReport`] as pretty JSON for tooling.

use std::io::{self, Write};

use crate::analysis::AnalysisReport;
use crate::diagnostics::{self, Finding, Severity};

/// LCOM4 above which a struct counts as low cohesion in the summary
const HIGH_LCOM4: usize = 2;
/// Cyclomatic complexity above which a function counts as complex
const HIGH_COMPLEXITY: usize = 15;
/// Instability above which a package counts as unstable
const HIGH_INSTABILITY: f64 = 0.7;

/// Write the full report as pretty-printed JSON
pub fn write_json<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)
}

/// Headline counts shown at the top of the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryCounts {
    pub packages: usize,
    pub structs: usize,
    pub functions: usize,
    pub high_lcom4: usize,
    pub high_complexity: usize,
    pub high_instability: usize,
}

impl SummaryCounts {
    pub fn from_report(report: &AnalysisReport) -> Self {
        let structs = report.packages.iter().flat_map(|p| &p.structs);
        let functions = report.packages.iter().flat_map(|p| &p.functions);

        Self {
            packages: report.packages.len(),
            structs: report.struct_count(),
            functions: report.function_count(),
            high_lcom4: structs.filter(|s| s.lcom4() > HIGH_LCOM4).count(),
            high_complexity: functions.filter(|f| f.complexity > HIGH_COMPLEXITY).count(),
            high_instability: report
                .packages
                .iter()
                .filter(|p| p.instability > HIGH_INSTABILITY)
                .count(),
        }
    }
}

/// Write a human-readable summary
pub fn write_summary<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    let counts = SummaryCounts::from_report(report);
    let severity = diagnostics::count_by_severity(&report.findings);

    writeln!(writer, "Code Health Analysis: {}", report.module_path)?;
    writeln!(writer, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Packages: {} | Structs: {} | Functions: {} | Lines: {}",
        counts.packages, counts.structs, counts.functions, report.total_loc
    )?;
    writeln!(writer)?;

    writeln!(writer, "Metrics:")?;
    writeln!(
        writer,
        "  Low cohesion structs (LCOM4 > {}):     {}",
        HIGH_LCOM4, counts.high_lcom4
    )?;
    writeln!(
        writer,
        "  Complex functions (complexity > {}):  {}",
        HIGH_COMPLEXITY, counts.high_complexity
    )?;
    writeln!(
        writer,
        "  Unstable packages (instability > {}): {}",
        HIGH_INSTABILITY, counts.high_instability
    )?;
    writeln!(writer)?;

    writeln!(
        writer,
        "Findings: {} critical, {} warning",
        severity.critical, severity.warning
    )?;

    if !report.skipped_dirs.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Skipped directories ({}):", report.skipped_dirs.len())?;
        for dir in &report.skipped_dirs {
            writeln!(writer, "  - {}: {}", dir.path, dir.reason)?;
        }
    }

    if !report.dependency_cycles.is_empty() {
        writeln!(writer)?;
        writeln!(
            writer,
            "Import cycles ({}), dependency depth is under-counted along them:",
            report.dependency_cycles.len()
        )?;
        for cycle in &report.dependency_cycles {
            let mut members = cycle.clone();
            if let Some(first) = cycle.first() {
                members.push(first.clone());
            }
            writeln!(writer, "  - {}", members.join(" → "))?;
        }
    }

    if report.findings.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "✅ No findings.")?;
        return Ok(());
    }

    writeln!(writer)?;
    writeln!(writer, "Details:")?;
    for finding in &report.findings {
        write_finding(finding, writer)?;
    }

    Ok(())
}

fn write_finding<W: Write>(finding: &Finding, writer: &mut W) -> io::Result<()> {
    let marker = match finding.severity {
        Severity::Critical => "🔴",
        Severity::Warning => "🟡",
    };

    writeln!(writer)?;
    writeln!(
        writer,
        "{} [{}] {}: {}",
        marker, finding.severity, finding.kind, finding.target_name
    )?;
    writeln!(writer, "   {}", finding.message)?;
    writeln!(writer, "   {}", finding.kind.description())?;
    if !finding.evidence.is_empty() {
        let evidence: Vec<String> = finding
            .evidence
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        writeln!(writer, "   Evidence: {}", evidence.join(", "))?;
    }
    writeln!(writer, "   See: {}", finding.related_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_facts;
    use crate::config::CompiledConfig;
    use crate::facts::{
        DecisionPoints, FieldUsage, FunctionFacts, MethodFacts, PackageFacts, ProjectFacts,
        SkippedDir, StructFacts,
    };

    fn report() -> AnalysisReport {
        let mut facts = ProjectFacts::new("example.com/app");

        let mut pkg = PackageFacts::new("billing", "billing");
        // Three disconnected methods: LCOM4 = 3
        let invoice = StructFacts::new("Invoice", "billing/invoice.rs")
            .with_fields(["total", "pdf"])
            .with_method(MethodFacts::new("Invoice.sum", false).with_field("total", FieldUsage::Read))
            .with_method(MethodFacts::new("Invoice.render", false).with_field("pdf", FieldUsage::Write))
            .with_method(MethodFacts::new("Invoice.ping", false));
        pkg.structs.push(invoice);

        let mut tangled = FunctionFacts::new("reconcile", "billing/reconcile.rs");
        tangled.decision_points = DecisionPoints {
            if_statements: 20,
            ..DecisionPoints::default()
        };
        pkg.functions.push(tangled);
        pkg.functions.push(FunctionFacts::new("simple", "billing/reconcile.rs"));
        facts.packages.push(pkg);
        facts.skipped_dirs.push(SkippedDir {
            path: "legacy".into(),
            reason: "Failed to parse legacy/old.rs: expected `;`".into(),
        });

        analyze_facts(&facts, &CompiledConfig::defaults(), None).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let counts = SummaryCounts::from_report(&report());
        assert_eq!(counts.packages, 1);
        assert_eq!(counts.structs, 1);
        assert_eq!(counts.functions, 2);
        assert_eq!(counts.high_lcom4, 1);
        assert_eq!(counts.high_complexity, 1);
        assert_eq!(counts.high_instability, 0);
    }

    #[test]
    fn test_summary_lists_findings_and_skips() {
        let mut out = Vec::new();
        write_summary(&report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Code Health Analysis: example.com/app"));
        assert!(text.contains("Findings: 0 critical, 1 warning"));
        assert!(text.contains("legacy: Failed to parse legacy/old.rs"));
        assert!(text.contains("[Warning] Overly Complex Function: billing.reconcile"));
        assert!(text.contains("complexity=21"));
    }

    #[test]
    fn test_summary_without_findings() {
        let facts = ProjectFacts::new("example.com/empty");
        let report = analyze_facts(&facts, &CompiledConfig::defaults(), None).unwrap();

        let mut out = Vec::new();
        write_summary(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No findings."));
        assert!(!text.contains("Skipped directories"));
    }

    #[test]
    fn test_json_is_parseable() {
        let mut out = Vec::new();
        write_json(&report(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["module_path"], "example.com/app");
        assert_eq!(value["packages"][0]["structs"][0]["lcom4_score"], 3);
        assert_eq!(value["findings"][0]["kind"], "complex_function");
        assert_eq!(value["findings"][0]["severity"], "Warning");
    }
}
