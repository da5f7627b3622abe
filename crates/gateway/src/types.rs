//! Request and reply shapes for the analysis and audit registry services.

use {
    canispect_common::Principal,
    serde::{Deserialize, Serialize},
};

use crate::wire::{self, AuditStatus, Severity};

/// Analysis duration recorded when submitting an audit. Analysis results do
/// not carry a measured duration.
pub const SUBMITTED_ANALYSIS_DURATION_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WasmAnalysisRequest {
    pub wasm_bytes: Vec<u8>,
    #[serde(with = "wire::opt")]
    pub canister_id: Option<Principal>,
    #[serde(with = "wire::opt")]
    pub metadata: Option<AnalysisMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    #[serde(with = "wire::opt")]
    pub name: Option<String>,
    #[serde(with = "wire::opt")]
    pub description: Option<String>,
    #[serde(with = "wire::opt")]
    pub version: Option<String>,
}

impl AnalysisMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.version.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAnalysisResult {
    pub wasm_hash: String,
    pub static_analysis: StaticAnalysisResult,
    pub ai_analysis: AiAnalysisResult,
    pub overall_severity: Severity,
    pub recommendations: Vec<String>,
    /// Nanoseconds since the epoch.
    #[serde(with = "wire::nat")]
    pub analysis_timestamp: u64,
}

impl SecurityAnalysisResult {
    pub fn analysis_timestamp_ms(&self) -> u64 {
        wire::nanos_to_millis(self.analysis_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAnalysisResult {
    pub tools_used: Vec<String>,
    pub vulnerabilities_found: Vec<StaticFinding>,
    pub metrics: CodeMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFinding {
    pub tool: String,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    #[serde(with = "wire::opt")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMetrics {
    pub file_size_bytes: u32,
    pub estimated_lines_of_code: u32,
    pub function_count: u32,
    pub complexity_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysisResult {
    pub summary: String,
    pub identified_patterns: Vec<String>,
    pub security_concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence_score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub tools_used: Vec<String>,
    #[serde(with = "wire::nat")]
    pub analysis_duration_ms: u64,
    #[serde(with = "wire::opt")]
    pub lines_of_code: Option<u32>,
    pub file_size_bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    #[serde(with = "wire::opt")]
    pub canister_id: Option<Principal>,
    pub wasm_bytes: Vec<u8>,
    #[serde(with = "wire::opt")]
    pub metadata: Option<AuditMetadata>,
}

impl AuditRequest {
    /// Submission for an already analyzed module. The bytes are not resent;
    /// the registry keys the record by the analysis hash.
    pub fn from_analysis(result: &SecurityAnalysisResult, canister_id: Option<Principal>) -> Self {
        let metrics = &result.static_analysis.metrics;
        Self {
            canister_id,
            wasm_bytes: Vec::new(),
            metadata: Some(AuditMetadata {
                tools_used: result.static_analysis.tools_used.clone(),
                analysis_duration_ms: SUBMITTED_ANALYSIS_DURATION_MS,
                lines_of_code: Some(metrics.estimated_lines_of_code),
                file_size_bytes: metrics.file_size_bytes,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub id: String,
    pub severity: Severity,
    #[serde(with = "wire::tag")]
    pub category: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    #[serde(with = "wire::opt")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(with = "wire::opt")]
    pub canister_id: Option<Principal>,
    pub wasm_hash: String,
    #[serde(with = "wire::nat")]
    pub audit_timestamp: u64,
    pub auditor: Principal,
    pub severity: Severity,
    pub findings: Vec<SecurityFinding>,
    pub ai_summary: String,
    pub status: AuditStatus,
    pub metadata: AuditMetadata,
}

impl AuditRecord {
    pub fn audit_timestamp_ms(&self) -> u64 {
        wire::nanos_to_millis(self.audit_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub id: String,
    #[serde(with = "wire::opt")]
    pub canister_id: Option<Principal>,
    pub wasm_hash: String,
    #[serde(with = "wire::nat")]
    pub audit_timestamp: u64,
    pub auditor: Principal,
    pub severity: Severity,
    pub findings_count: u32,
    pub status: AuditStatus,
}

impl AuditSummary {
    pub fn audit_timestamp_ms(&self) -> u64 {
        wire::nanos_to_millis(self.audit_timestamp)
    }
}

/// Registry-wide counters, sent as `(total, completed, critical, high)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StatisticsTuple", into = "StatisticsTuple")]
pub struct AuditStatistics {
    pub total: u64,
    pub completed: u64,
    pub critical: u64,
    pub high: u64,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct StatisticsTuple(
    #[serde(with = "wire::nat")] u64,
    #[serde(with = "wire::nat")] u64,
    #[serde(with = "wire::nat")] u64,
    #[serde(with = "wire::nat")] u64,
);

impl From<StatisticsTuple> for AuditStatistics {
    fn from(StatisticsTuple(total, completed, critical, high): StatisticsTuple) -> Self {
        Self {
            total,
            completed,
            critical,
            high,
        }
    }
}

impl From<AuditStatistics> for StatisticsTuple {
    fn from(s: AuditStatistics) -> Self {
        Self(s.total, s.completed, s.critical, s.high)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn analysis_reply() -> serde_json::Value {
        json!({
            "wasm_hash": "ab12",
            "static_analysis": {
                "tools_used": ["owi", "seewasm"],
                "vulnerabilities_found": [{
                    "tool": "owi",
                    "severity": {"Medium": null},
                    "category": "memory",
                    "message": "unchecked load",
                    "location": []
                }],
                "metrics": {
                    "file_size_bytes": 10,
                    "estimated_lines_of_code": 3,
                    "function_count": 1,
                    "complexity_score": 2
                }
            },
            "ai_analysis": {
                "summary": "small module",
                "identified_patterns": [],
                "security_concerns": [],
                "recommendations": ["add tests"],
                "confidence_score": 0.5
            },
            "overall_severity": {"Low": null},
            "recommendations": ["review access control"],
            "analysis_timestamp": 1_700_000_000_000_000_000u64
        })
    }

    #[test]
    fn decodes_analysis_result() {
        let result: SecurityAnalysisResult = serde_json::from_value(analysis_reply()).unwrap();
        assert_eq!(result.overall_severity, Severity::Low);
        assert_eq!(result.static_analysis.vulnerabilities_found[0].severity, Severity::Medium);
        assert_eq!(result.static_analysis.vulnerabilities_found[0].location, None);
        assert_eq!(result.analysis_timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn empty_request_marshals_optionals_as_empty_sequences() {
        let req = WasmAnalysisRequest {
            wasm_bytes: vec![0, 97, 115, 109, 1, 0, 0, 0, 0, 0],
            canister_id: None,
            metadata: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "wasm_bytes": [0, 97, 115, 109, 1, 0, 0, 0, 0, 0],
                "canister_id": [],
                "metadata": []
            })
        );
    }

    #[test]
    fn audit_request_from_analysis() {
        let result: SecurityAnalysisResult = serde_json::from_value(analysis_reply()).unwrap();
        let canister = Principal::from_text("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap();
        let req = AuditRequest::from_analysis(&result, Some(canister));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "canister_id": ["ryjl3-tyaaa-aaaaa-aaaba-cai"],
                "wasm_bytes": [],
                "metadata": [{
                    "tools_used": ["owi", "seewasm"],
                    "analysis_duration_ms": "1000",
                    "lines_of_code": [3],
                    "file_size_bytes": 10
                }]
            })
        );
    }

    #[test]
    fn decodes_summary_with_string_timestamp() {
        let summary: AuditSummary = serde_json::from_value(json!({
            "id": "audit_1",
            "canister_id": ["ryjl3-tyaaa-aaaaa-aaaba-cai"],
            "wasm_hash": "ab12",
            "audit_timestamp": "1700000000123456789",
            "auditor": "2vxsx-fae",
            "severity": "CRITICAL",
            "findings_count": 2,
            "status": {"RequiresReview": null}
        }))
        .unwrap();
        assert_eq!(summary.severity, Severity::Critical);
        assert_eq!(summary.status, AuditStatus::RequiresReview);
        assert_eq!(summary.audit_timestamp_ms(), 1_700_000_000_123);
        assert!(summary.auditor.is_anonymous());
    }

    #[test]
    fn statistics_from_tuple() {
        let stats: AuditStatistics = serde_json::from_value(json!([5, "3", 1, 0])).unwrap();
        assert_eq!(stats, AuditStatistics {
            total: 5,
            completed: 3,
            critical: 1,
            high: 0,
        });
        assert!(serde_json::from_value::<AuditStatistics>(json!([5, 3, 1])).is_err());
    }
}
