use std::path::PathBuf;

use {
    anyhow::{Context as _, Result},
    canispect_common::Principal,
    canispect_gateway::{
        AnalysisMetadata, AuditRecord, AuditSummary, SecurityAnalysisResult, WasmAnalysisRequest,
        wire,
    },
    chrono::{DateTime, SecondsFormat},
    clap::{Args, Subcommand},
    serde::Serialize,
};

use crate::Context;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to the .wasm module.
    wasm: PathBuf,
    /// Canister the module is deployed to.
    #[arg(long)]
    canister_id: Option<Principal>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    version: Option<String>,
    /// Record the result in the audit registry (requires login).
    #[arg(long, default_value_t = false)]
    submit: bool,
}

#[derive(Subcommand)]
pub enum AuditAction {
    /// Audits recorded for a canister.
    History {
        #[arg(long)]
        canister_id: Option<Principal>,
    },
    /// One audit record.
    Get { id: String },
    /// Audits you submitted.
    Mine,
    /// Registry-wide counters.
    Stats,
}

pub async fn handle_audit(ctx: &Context, action: AuditAction) -> Result<()> {
    let gateway = ctx.gateway()?;
    match action {
        AuditAction::History { canister_id } => {
            if canister_id.is_none() && !ctx.json {
                println!("Pass --canister-id to list audits; the registry has no recent-audits listing.");
            }
            let audits = gateway.get_audit_history(canister_id.as_ref()).await?;
            print_summaries(ctx, &audits)
        },
        AuditAction::Get { id } => match gateway.get_audit_record(&id).await? {
            Some(record) => print_record(ctx, &record),
            None => anyhow::bail!("no audit record with id {id}"),
        },
        AuditAction::Mine => {
            if !ctx.session.state().is_authenticated() && !ctx.json {
                println!("Not logged in; run `canispect auth login` to see your audits.");
            }
            let audits = gateway.get_my_audits().await?;
            print_summaries(ctx, &audits)
        },
        AuditAction::Stats => {
            let stats = gateway.get_audit_statistics().await?;
            if ctx.json {
                return print_json(&stats);
            }
            println!("total:     {}", stats.total);
            println!("completed: {}", stats.completed);
            println!("critical:  {}", stats.critical);
            println!("high:      {}", stats.high);
            Ok(())
        },
    }
}

pub async fn analyze(ctx: &Context, args: AnalyzeArgs) -> Result<()> {
    let wasm_bytes = tokio::fs::read(&args.wasm)
        .await
        .with_context(|| format!("failed to read {}", args.wasm.display()))?;
    let metadata = AnalysisMetadata {
        name: args.name,
        description: args.description,
        version: args.version,
    };
    let request = WasmAnalysisRequest {
        wasm_bytes,
        canister_id: args.canister_id.clone(),
        metadata: (!metadata.is_empty()).then_some(metadata),
    };

    let gateway = ctx.gateway()?;
    let result = gateway.analyze_wasm(&request).await?;
    let audit_id = if args.submit {
        Some(gateway.submit_audit_record(&result, args.canister_id).await?)
    } else {
        None
    };

    if ctx.json {
        return print_json(&serde_json::json!({ "analysis": result, "audit_id": audit_id }));
    }
    print_analysis(&result);
    if let Some(id) = audit_id {
        println!("\nSubmitted audit {id}");
    }
    Ok(())
}

pub async fn recommend(ctx: &Context, description: &str) -> Result<()> {
    let text = ctx.gateway()?.security_recommendations(description).await?;
    if ctx.json {
        return print_json(&text);
    }
    println!("{text}");
    Ok(())
}

/// RFC 3339 rendering of a nanosecond timestamp, at millisecond precision.
pub fn format_nanos(nanos: u64) -> String {
    let millis = wire::nanos_to_millis(nanos);
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || format!("{millis}ms"),
            |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_analysis(result: &SecurityAnalysisResult) {
    let metrics = &result.static_analysis.metrics;
    println!("hash:      {}", result.wasm_hash);
    println!("severity:  {}", result.overall_severity);
    println!(
        "analyzed:  {} ({} ms)",
        format_nanos(result.analysis_timestamp),
        result.analysis_timestamp_ms()
    );
    println!(
        "size:      {} bytes, ~{} lines, {} functions, complexity {}",
        metrics.file_size_bytes,
        metrics.estimated_lines_of_code,
        metrics.function_count,
        metrics.complexity_score
    );
    println!("tools:     {}", result.static_analysis.tools_used.join(", "));

    if !result.static_analysis.vulnerabilities_found.is_empty() {
        println!("\nFindings:");
        for f in &result.static_analysis.vulnerabilities_found {
            let location = f.location.as_deref().unwrap_or("-");
            println!(
                "  [{}] {} ({}, {location}): {}",
                f.severity, f.category, f.tool, f.message
            );
        }
    }

    println!("\nSummary: {}", result.ai_analysis.summary);
    for concern in &result.ai_analysis.security_concerns {
        println!("  concern: {concern}");
    }
    if !result.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &result.recommendations {
            println!("  - {r}");
        }
    }
}

fn summary_line(s: &AuditSummary) -> String {
    let canister = s
        .canister_id
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    format!(
        "{}  {}  {:<8}  {:<15}  {} findings  canister {canister}",
        s.id,
        format_nanos(s.audit_timestamp),
        s.severity,
        s.status,
        s.findings_count
    )
}

fn print_summaries(ctx: &Context, audits: &[AuditSummary]) -> Result<()> {
    if ctx.json {
        return print_json(audits);
    }
    if audits.is_empty() {
        println!("No audits.");
    }
    for s in audits {
        println!("{}", summary_line(s));
    }
    Ok(())
}

fn print_record(ctx: &Context, record: &AuditRecord) -> Result<()> {
    if ctx.json {
        return print_json(record);
    }
    println!("id:        {}", record.id);
    println!("auditor:   {}", record.auditor);
    if let Some(canister) = &record.canister_id {
        println!("canister:  {canister}");
    }
    println!("hash:      {}", record.wasm_hash);
    println!("recorded:  {}", format_nanos(record.audit_timestamp));
    println!("severity:  {}", record.severity);
    println!("status:    {}", record.status);
    println!("tools:     {}", record.metadata.tools_used.join(", "));
    println!("summary:   {}", record.ai_summary);
    for f in &record.findings {
        println!("\n  [{}] {} ({})", f.severity, f.title, f.category);
        println!("  {}", f.description);
        println!("  fix: {}", f.recommendation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use canispect_gateway::{AuditStatus, Severity};

    use super::*;

    #[test]
    fn nanos_render_at_millisecond_precision() {
        assert_eq!(format_nanos(1_700_000_000_000_000_000), "2023-11-14T22:13:20.000Z");
        assert_eq!(format_nanos(1_700_000_000_123_456_789), "2023-11-14T22:13:20.123Z");
        assert_eq!(format_nanos(0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn summary_line_shows_missing_canister() {
        let s = AuditSummary {
            id: "audit_1".into(),
            canister_id: None,
            wasm_hash: "9f2c".into(),
            audit_timestamp: 1_700_000_000_000_000_000,
            auditor: Principal::anonymous(),
            severity: Severity::High,
            findings_count: 2,
            status: AuditStatus::Completed,
        };
        let line = summary_line(&s);
        assert!(line.starts_with("audit_1  2023-11-14T22:13:20.000Z  high"));
        assert!(line.contains("completed"));
        assert!(line.ends_with("canister -"));
    }
}
