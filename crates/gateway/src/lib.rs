//! Typed client for the analysis and audit registry services, plus the wire
//! conventions their replies follow.

pub mod client;
pub mod types;
pub mod wire;

pub use {
    client::GatewayClient,
    types::{
        AiAnalysisResult, AnalysisMetadata, AuditMetadata, AuditRecord, AuditRequest,
        AuditStatistics, AuditSummary, CodeMetrics, SecurityAnalysisResult, SecurityFinding,
        StaticAnalysisResult, StaticFinding, WasmAnalysisRequest,
    },
    wire::{AuditStatus, Severity},
};
