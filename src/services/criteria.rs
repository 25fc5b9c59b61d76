use regex::Regex;
use std::sync::OnceLock;

use crate::models::candidate::Candidate;
use crate::models::criteria::{Criterion, SearchIntent};
use crate::models::diagnostic::Diagnostic;

/// Services recognized after "missing" / "no" in a query.
const SERVICE_TOKENS: &[&str] = &[
    "implants",
    "invisalign",
    "orthodontics",
    "veneers",
    "emergency",
    "cosmetic",
    "sedation",
    "crowns",
];

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 25;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("query is required")]
    EmptyQuery,

    #[error("could not parse a city from the query; try 'Find 10 dentists in San Jose CA'")]
    MissingCity,
}

fn limit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:find|top)\s+(\d{1,3})\b").expect("valid regex"))
}

fn place_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bin\s+(.+?)(?:\s+(?:that|with|who)\b|$)").expect("valid regex"))
}

fn trailing_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s+([A-Za-z]{2})$").expect("valid regex"))
}

fn missing_page_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bmissing\s+([a-z ]+?)\s+page\b").expect("valid regex"))
}

fn word_pair(prefix: &str, service: &str, text: &str) -> bool {
    Regex::new(&format!(r"\b{}\s+{}\b", prefix, regex::escape(service)))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Parse a prospect query such as
/// "Find 8 dentists in Austin TX with no website missing implants".
pub fn parse_intent(query: &str) -> Result<SearchIntent, IntentError> {
    let q = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if q.is_empty() {
        return Err(IntentError::EmptyQuery);
    }
    let ql = q.to_lowercase();

    let limit = limit_re()
        .captures(&ql)
        .and_then(|c| c[1].parse::<u32>().ok())
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let vertical = if ql.contains("orthodontist") {
        "orthodontist"
    } else {
        "dentist"
    };

    let (city, state) = parse_place(&q).ok_or(IntentError::MissingCity)?;

    let mut criteria = Vec::new();
    if ["below review average", "below review avg", "low review", "review gap"]
        .iter()
        .any(|p| ql.contains(p))
    {
        criteria.push(Criterion::BelowReviewAvg);
    }

    if ql.contains("has website") {
        criteria.push(Criterion::HasWebsite);
    } else if ql.contains("no website") || ql.contains("without website") {
        criteria.push(Criterion::NoWebsite);
    }

    if ql.contains("high leverage") || ql.contains("high-leverage") {
        criteria.push(Criterion::HighLeverageProxy);
    }

    let named_service = SERVICE_TOKENS
        .iter()
        .find(|svc| word_pair("missing", svc, &ql) || word_pair("no", svc, &ql))
        .map(|svc| svc.to_string())
        .or_else(|| {
            missing_page_re()
                .captures(&ql)
                .map(|c| c[1].trim().to_string())
        });
    if let Some(service) = named_service {
        criteria.push(Criterion::MissingServicePageLight { service });
    }

    let requires_lightweight = criteria.iter().any(Criterion::needs_lightweight_check);

    Ok(SearchIntent {
        query: q,
        city,
        state,
        vertical: vertical.to_string(),
        limit,
        criteria,
        requires_lightweight,
    })
}

fn parse_place(q: &str) -> Option<(String, Option<String>)> {
    let caps = place_re().captures(q)?;
    let raw = caps[1].trim_matches(|c: char| c == ' ' || c == '.');

    let (city, state) = if raw.contains(',') {
        let mut parts = raw.split(',').map(str::trim).filter(|p| !p.is_empty());
        let city = parts.next().map(str::to_string);
        let state = parts.next().map(str::to_string);
        (city, state)
    } else if let Some(c) = trailing_state_re().captures(raw) {
        (Some(c[1].trim().to_string()), Some(c[2].to_uppercase()))
    } else {
        (Some(raw.to_string()), None)
    };

    city.filter(|c| !c.is_empty()).map(|c| (c, state))
}

/// Whether a scored candidate passes every criterion answerable from its
/// own signals. Lightweight criteria are left to the homepage check.
pub fn matches_basic(criteria: &[Criterion], candidate: &Candidate) -> bool {
    criteria.iter().all(|c| match c {
        Criterion::BelowReviewAvg => candidate.below_review_avg,
        Criterion::HasWebsite => candidate.has_website,
        Criterion::NoWebsite => !candidate.has_website,
        Criterion::HighLeverageProxy => leverage_points(candidate) >= 2,
        Criterion::MissingServicePageLight { .. } => true,
    })
}

/// Re-check every criterion against a full diagnostic of the candidate.
pub fn matches_verified(criteria: &[Criterion], candidate: &Candidate, diagnostic: &Diagnostic) -> bool {
    let s = &diagnostic.signals;
    criteria.iter().all(|c| match c {
        Criterion::BelowReviewAvg => candidate.below_review_avg,
        Criterion::HasWebsite => s.has_website,
        Criterion::NoWebsite => !s.has_website,
        Criterion::HighLeverageProxy => {
            [candidate.below_review_avg, !s.has_schema, !s.has_contact_form, !s.has_website]
                .iter()
                .filter(|hit| **hit)
                .count()
                >= 2
        }
        Criterion::MissingServicePageLight { service } => {
            let service = service.trim().to_lowercase();
            s.has_website && s.missing_services.iter().any(|m| *m == service)
        }
    })
}

/// Services whose pages a verified check must look for.
pub fn services_to_verify(criteria: &[Criterion]) -> Vec<String> {
    criteria
        .iter()
        .filter_map(|c| match c {
            Criterion::MissingServicePageLight { service } => Some(service.trim().to_lowercase()),
            _ => None,
        })
        .collect()
}

fn leverage_points(c: &Candidate) -> u32 {
    [
        c.below_review_avg,
        !c.has_schema,
        !c.has_contact_form,
        !c.has_website,
    ]
    .iter()
    .filter(|hit| **hit)
    .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_query() {
        let intent = parse_intent(
            "Find 8 dentists in Austin TX with no website and below review average",
        )
        .unwrap();
        assert_eq!(intent.limit, 8);
        assert_eq!(intent.vertical, "dentist");
        assert_eq!(intent.city, "Austin");
        assert_eq!(intent.state.as_deref(), Some("TX"));
        assert_eq!(
            intent.criteria,
            vec![Criterion::BelowReviewAvg, Criterion::NoWebsite]
        );
        assert!(!intent.requires_lightweight);
    }

    #[test]
    fn test_parse_comma_place_and_service() {
        let intent =
            parse_intent("top 40 orthodontists in San Jose, CA that are missing invisalign").unwrap();
        assert_eq!(intent.limit, 25);
        assert_eq!(intent.vertical, "orthodontist");
        assert_eq!(intent.city, "San Jose");
        assert_eq!(intent.state.as_deref(), Some("CA"));
        assert_eq!(
            intent.criteria,
            vec![Criterion::MissingServicePageLight {
                service: "invisalign".to_string()
            }]
        );
        assert!(intent.requires_lightweight);
    }

    #[test]
    fn test_parse_missing_page_phrase() {
        let intent = parse_intent("dentists in Denver with missing sleep apnea page").unwrap();
        assert_eq!(intent.limit, 10);
        assert_eq!(intent.city, "Denver");
        assert_eq!(intent.state, None);
        assert_eq!(
            intent.criteria,
            vec![Criterion::MissingServicePageLight {
                service: "sleep apnea".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_requires_city() {
        assert_eq!(parse_intent("find 5 dentists"), Err(IntentError::MissingCity));
        assert_eq!(parse_intent("   "), Err(IntentError::EmptyQuery));
    }

    #[test]
    fn test_high_leverage_needs_two_points() {
        let mut c: Candidate = serde_json::from_value(serde_json::json!({
            "place_id": "p", "business_name": "B", "city": "Austin", "state": null,
            "website": "https://b.example", "phone": null, "email": null, "rating": null,
            "user_ratings_total": 3, "has_website": true, "ssl": true,
            "has_contact_form": true, "has_phone": true, "has_viewport": true,
            "has_schema": false, "below_review_avg": false, "below_rating_avg": false,
            "rank_key": 0.0
        }))
        .unwrap();
        assert!(!matches_basic(&[Criterion::HighLeverageProxy], &c));

        c.below_review_avg = true;
        assert!(matches_basic(&[Criterion::HighLeverageProxy], &c));
        assert!(matches_basic(
            &[Criterion::HasWebsite, Criterion::BelowReviewAvg],
            &c
        ));
        assert!(!matches_basic(&[Criterion::NoWebsite], &c));
    }
}
