/// Lead scoring
///
/// Additive point system. Each factor contributes at most once:
/// 1. Audit score at or above the threshold
/// 2. Estimated employee count within the configured range
/// 3. Email present
/// 4. Website served over https
/// 5. Website on a well-known domain suffix
///
/// The total is capped at 100.
use crate::models::Lead;
use crate::scoring_config::ScoringConfig;

/// Highest score a lead can receive.
pub const MAX_SCORE: u32 = 100;

const SECURE_SCHEME: &str = "https://";
const WELL_KNOWN_DOMAINS: [&str; 3] = [".com", ".org", ".net"];

/// Placeholder employee estimate until real enrichment data is wired in:
/// ten employees per character of the company name, at least one.
/// Returns `None` when the lead has no company value.
pub fn estimate_employees(company: Option<&str>) -> Option<u64> {
    company.map(|name| (name.chars().count() as u64 * 10).max(1))
}

/// Score a lead. `audit_score` comes from the audit subsystem; callers pass 0
/// until that integration exists.
pub fn score(lead: &Lead, audit_score: f64, config: &ScoringConfig) -> u32 {
    let mut total = 0.0;

    if audit_score >= config.audit_score_threshold {
        total += config.audit_score_points;
    }

    if let Some(employees) = estimate_employees(lead.company.as_deref()) {
        let employees = employees as f64;
        if config.employee_count_min <= employees && employees <= config.employee_count_max {
            total += config.employee_count_points;
        }
    }

    if lead.email.as_deref().is_some_and(|email| !email.is_empty()) {
        total += config.email_exists_points;
    }

    let website = lead.website.as_deref().unwrap_or("");
    if website.starts_with(SECURE_SCHEME) {
        total += config.website_ssl_points;
    }

    // Substring anywhere in the URL, not only the TLD position
    let website = website.to_lowercase();
    if WELL_KNOWN_DOMAINS
        .iter()
        .any(|domain| website.contains(domain))
    {
        total += config.company_size_bonus;
    }

    // NaN saturates to 0 on the cast
    total.clamp(0.0, MAX_SCORE as f64) as u32
}
