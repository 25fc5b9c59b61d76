use async_trait::async_trait;
use serde_json::Value;

use crate::models::diagnostic::{Diagnostic, DiagnosticTarget};
use crate::models::job::{FieldDelta, JobInput, JobKind, JobResult, ListMember, ListRescanResult, MemberChange};
use crate::models::scan::{ScanPhase, ScanProgress};
use crate::services::diagnostic::DiagnosticError;
use crate::services::fetcher::FetchError;
use crate::services::handlers::{JobContext, JobError, JobHandler};

/// Re-diagnoses every member of a prospect list, one at a time, and records
/// what changed against each member's previous diagnostic.
pub struct ListRescanHandler;

fn text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn revenue_upside(v: &Value) -> String {
    text(v.pointer("/brief/executive_diagnosis/modeled_revenue_upside"))
}

/// Field-level differences between two diagnostic payloads. Missing values
/// compare as empty.
pub fn change_summary(previous: &Value, current: &Value) -> Vec<FieldDelta> {
    let fields = [
        ("constraint", text(previous.get("constraint")), text(current.get("constraint"))),
        (
            "primary_leverage",
            text(previous.get("primary_leverage")),
            text(current.get("primary_leverage")),
        ),
        (
            "opportunity_profile",
            text(previous.get("opportunity_profile")),
            text(current.get("opportunity_profile")),
        ),
        ("modeled_revenue_upside", revenue_upside(previous), revenue_upside(current)),
    ];

    fields
        .into_iter()
        .filter(|(_, before, after)| before != after)
        .map(|(field, before, after)| FieldDelta {
            field: field.to_string(),
            before: Some(before).filter(|s| !s.is_empty()),
            after: Some(after).filter(|s| !s.is_empty()),
        })
        .collect()
}

/// Member name, city and state, falling back to the previous payload.
fn member_target(member: &ListMember) -> Option<DiagnosticTarget> {
    let prev = &member.previous;
    let pick = |own: Option<&str>, key: &str| {
        own.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| Some(text(prev.get(key)).trim().to_string()).filter(|s| !s.is_empty()))
    };

    let business_name = pick(Some(member.business_name.as_str()), "business_name")?;
    let city = pick(Some(member.city.as_str()), "city")?;
    Some(DiagnosticTarget {
        place_id: member.place_id.clone().filter(|p| !p.trim().is_empty()),
        business_name,
        city,
        state: pick(member.state.as_deref(), "state"),
        website: None,
        services: Vec::new(),
    })
}

#[async_trait]
impl JobHandler for ListRescanHandler {
    async fn run(&self, ctx: &JobContext) -> Result<JobResult, JobError> {
        let JobInput::ListRescan(input) = &ctx.job.input else {
            return Err(JobError::wrong_input(JobKind::ListRescan, &ctx.job));
        };
        let sink = ctx.progress.as_ref();

        let mut progress = ScanProgress::phase(ScanPhase::Diagnostics);
        progress.total_candidates = input.members.len() as u32;
        progress.changed = Some(0);
        sink.report(&progress).await?;

        tracing::info!(
            job_id = %ctx.job.id,
            scan_id = %input.scan_id,
            list_id = input.list_id,
            members = input.members.len(),
            "Starting list rescan"
        );

        let mut members = Vec::new();
        let mut changed = 0u32;
        for member in &input.members {
            ctx.pipeline.check_cancelled()?;

            match member_target(member) {
                None => {
                    progress.failed += 1;
                    tracing::warn!(list_id = input.list_id, "List member has no name or city, skipping");
                }
                Some(target) => match ctx.pipeline.diagnostics.build(&target).await {
                    Ok(diagnostic) => {
                        let change = member_change(member, &target, diagnostic);
                        if change.changed {
                            changed += 1;
                        }
                        progress.accepted += 1;
                        members.push(change);
                    }
                    Err(DiagnosticError::Fetch(FetchError::Cancelled)) => return Err(JobError::Cancelled),
                    Err(e) => {
                        progress.failed += 1;
                        tracing::warn!(
                            list_id = input.list_id,
                            business = %target.business_name,
                            error = %e,
                            "List member rescan failed"
                        );
                    }
                },
            }

            progress.processed += 1;
            progress.changed = Some(changed);
            sink.report(&progress).await?;
        }

        progress.phase = ScanPhase::Completed;

        tracing::info!(
            job_id = %ctx.job.id,
            rescanned = progress.accepted,
            failed = progress.failed,
            changed,
            "List rescan complete"
        );

        Ok(JobResult::ListRescan(ListRescanResult {
            scan_id: input.scan_id,
            summary: progress.clone(),
            rescanned: progress.accepted,
            failed: progress.failed,
            changed,
            members,
        }))
    }
}

fn member_change(member: &ListMember, target: &DiagnosticTarget, diagnostic: Diagnostic) -> MemberChange {
    let current = serde_json::to_value(&diagnostic).unwrap_or(Value::Null);
    let deltas = change_summary(&member.previous, &current);
    MemberChange {
        business_name: diagnostic.business_name.clone(),
        place_id: diagnostic.place_id.clone().or_else(|| target.place_id.clone()),
        previous_diagnostic_id: member.diagnostic_id,
        changed: !deltas.is_empty(),
        deltas,
        diagnostic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_summary_reports_changed_fields() {
        let previous = json!({
            "constraint": "reputation",
            "primary_leverage": "review_generation",
            "opportunity_profile": "moderate",
            "brief": {"executive_diagnosis": {"modeled_revenue_upside": "moderate"}}
        });
        let current = json!({
            "constraint": "conversion",
            "primary_leverage": "review_generation",
            "opportunity_profile": "moderate",
            "brief": {"executive_diagnosis": {"modeled_revenue_upside": "high_leverage"}}
        });

        let deltas = change_summary(&previous, &current);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].field, "constraint");
        assert_eq!(deltas[0].before.as_deref(), Some("reputation"));
        assert_eq!(deltas[0].after.as_deref(), Some("conversion"));
        assert_eq!(deltas[1].field, "modeled_revenue_upside");
    }

    #[test]
    fn test_change_summary_missing_previous() {
        let deltas = change_summary(&Value::Null, &json!({"constraint": "trust"}));
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].before, None);
        assert_eq!(deltas[0].after.as_deref(), Some("trust"));
        assert!(change_summary(&json!({}), &json!({})).is_empty());
    }

    #[test]
    fn test_member_target_falls_back_to_previous() {
        let member = ListMember {
            diagnostic_id: Some(7),
            place_id: None,
            business_name: "  ".to_string(),
            city: "Austin".to_string(),
            state: None,
            previous: json!({"business_name": "Acme Dental", "state": "TX"}),
        };
        let target = member_target(&member).unwrap();
        assert_eq!(target.business_name, "Acme Dental");
        assert_eq!(target.city, "Austin");
        assert_eq!(target.state.as_deref(), Some("TX"));

        let nameless = ListMember {
            business_name: String::new(),
            previous: Value::Null,
            ..member
        };
        assert!(member_target(&nameless).is_none());
    }
}
