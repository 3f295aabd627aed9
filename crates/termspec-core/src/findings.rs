//! Structured non-fatal diagnostics accumulated during a build.
//!
//! Per spec section 7, non-fatal errors (unknown external specs, unreachable
//! remotes, malformed tags, unresolved references, dangling definitions,
//! nested tref/xref) are never propagated as [`crate::Error`]. Instead every
//! component that can produce one appends a [`Finding`] to a [`FindingSink`]
//! that is threaded explicitly through the pipeline -- see spec.md section 9's
//! instruction to avoid process-wide singletons. The sink is serialized at the
//! end of a build as `console-messages.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The severity of a recorded finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Purely informational; no remediation implied.
    Info,
    /// Something an author likely wants to fix, but the build proceeds unaffected.
    Warning,
    /// A stronger signal than `Warning` (e.g. nested tref transclusion) that still
    /// does not abort the build.
    Error,
}

/// The kind of non-fatal finding, matching spec.md section 7's enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A `[[xref:...]]`/`[[tref:...]]` named an external spec not declared in the manifest.
    UnknownExternalSpec,
    /// The remote specification could not be reached at all.
    RemoteUnreachable,
    /// The remote specification responded, but with a 404-equivalent.
    RemoteNotFound,
    /// The remote host rate-limited the request.
    RateLimited,
    /// The remote specification was reachable but did not define the requested term.
    TermNotFoundInRemote,
    /// A `[[...]]` tag did not parse.
    TagMalformed,
    /// An `xref` tag supplied more than one alias.
    XrefWithMultipleAliases,
    /// A `ref`/`iref` term has no corresponding rendered anchor.
    UnresolvedRef,
    /// A `def`'s term/aliases are never targeted by any reference.
    DanglingDefinition,
    /// A `tref` transcluded a term whose remote `<dt>` was itself `term-external`.
    NestedTref,
    /// An `xref` referenced a term whose remote `<dt>` was itself `term-external`.
    NestedXref,
}

impl FindingKind {
    /// The severity mandated by spec.md section 7 for this kind of finding.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::NestedTref => Severity::Error,
            Self::UnknownExternalSpec
            | Self::RemoteUnreachable
            | Self::RemoteNotFound
            | Self::RateLimited
            | Self::TermNotFoundInRemote
            | Self::TagMalformed
            | Self::XrefWithMultipleAliases
            | Self::UnresolvedRef
            | Self::DanglingDefinition
            | Self::NestedXref => Severity::Warning,
        }
    }
}

/// A single recorded diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// When the finding was recorded, ISO 8601. Supplied by the caller (see module docs)
    /// rather than read from the system clock inside library code, so pipeline runs stay
    /// reproducible in tests.
    pub timestamp: String,
    /// What kind of finding this is.
    #[serde(rename = "type")]
    pub kind: FindingKind,
    /// Severity, normally `kind.default_severity()` but left explicit so callers can
    /// escalate (e.g. treat warnings as errors in CI).
    pub severity: Severity,
    /// A short label identifying which pipeline stage produced this (e.g. `"collector"`,
    /// `"remote_fetcher"`, `"validator"`).
    pub operation: String,
    /// Free-form human-readable detail, including a remediation hint where applicable.
    pub message: String,
    /// Source files implicated by this finding, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_files: Vec<String>,
    /// Arbitrary extra structured data (e.g. the offending term).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

/// Accumulates [`Finding`]s over the course of a build.
///
/// This is the explicit replacement for the mutable-global console message
/// collector described in spec.md section 9: every component that can record
/// a finding takes `&mut FindingSink` rather than reaching for shared state.
#[derive(Debug, Default, Clone)]
pub struct FindingSink {
    findings: Vec<Finding>,
}

impl FindingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finding, also emitting it through `tracing` at the appropriate level.
    pub fn record(&mut self, finding: Finding) {
        match finding.severity {
            Severity::Info => tracing::info!(operation = %finding.operation, "{}", finding.message),
            Severity::Warning => tracing::warn!(operation = %finding.operation, "{}", finding.message),
            Severity::Error => tracing::error!(operation = %finding.operation, "{}", finding.message),
        }
        self.findings.push(finding);
    }

    /// All findings recorded so far, in recording order.
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Builds the `console-messages.json` document described in spec.md section 6.
    #[must_use]
    pub fn to_snapshot(&self, generated_at: &str) -> ConsoleMessagesSnapshot {
        let mut messages_by_type: HashMap<String, usize> = HashMap::new();
        let mut operations: Vec<String> = Vec::new();
        for finding in &self.findings {
            *messages_by_type
                .entry(format!("{:?}", finding.kind))
                .or_insert(0) += 1;
            if !operations.contains(&finding.operation) {
                operations.push(finding.operation.clone());
            }
        }
        ConsoleMessagesSnapshot {
            metadata: ConsoleMessagesMetadata {
                generated_at: generated_at.to_string(),
                total_messages: self.findings.len(),
                operations,
                messages_by_type,
            },
            messages: self.findings.clone(),
        }
    }
}

/// The `console-messages.json` document shape (spec.md section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessagesSnapshot {
    /// Aggregate metadata about the recorded messages.
    pub metadata: ConsoleMessagesMetadata,
    /// The raw findings, in recording order.
    pub messages: Vec<Finding>,
}

/// Metadata accompanying a [`ConsoleMessagesSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessagesMetadata {
    /// When this snapshot was produced, ISO 8601.
    pub generated_at: String,
    /// Total number of messages in this snapshot.
    pub total_messages: usize,
    /// Distinct operation labels that contributed messages.
    pub operations: Vec<String>,
    /// Count of messages per [`FindingKind`] (debug-formatted).
    pub messages_by_type: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(kind: FindingKind, op: &str) -> Finding {
        Finding {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            severity: kind.default_severity(),
            kind,
            operation: op.to_string(),
            message: "test message".to_string(),
            source_files: vec![],
            additional_data: None,
        }
    }

    #[test]
    fn nested_tref_is_error_nested_xref_is_warning() {
        assert_eq!(FindingKind::NestedTref.default_severity(), Severity::Error);
        assert_eq!(FindingKind::NestedXref.default_severity(), Severity::Warning);
    }

    #[test]
    fn snapshot_aggregates_operations_and_counts() {
        let mut sink = FindingSink::new();
        sink.record(finding(FindingKind::UnresolvedRef, "validator"));
        sink.record(finding(FindingKind::UnresolvedRef, "validator"));
        sink.record(finding(FindingKind::DanglingDefinition, "validator"));

        let snapshot = sink.to_snapshot("2026-01-01T00:00:00Z");
        assert_eq!(snapshot.metadata.total_messages, 3);
        assert_eq!(snapshot.metadata.operations, vec!["validator".to_string()]);
        assert_eq!(snapshot.messages.len(), 3);
    }
}
