use std::cmp::Ordering;

use crate::enrichment::{score_enrichment, Enrichment};
use crate::referer::score_referer;
use crate::user_agent::{classify_agent, AgentClass};
use crate::{DetectedProfile, DeviceSignals, ProfileType};

pub const USER_AGENT_WEIGHT: f64 = 0.3;
pub const REFERER_WEIGHT: f64 = 0.2;
pub const ENRICHMENT_WEIGHT: f64 = 0.5;

/// Confidence reported when a recruiting tool is recognised outright.
pub const RECRUITING_TOOL_CONFIDENCE: u8 = 80;

/// One weighted signal that fired.
#[derive(Debug, Clone)]
struct Signal {
    source: String,
    contribution: f64,
    profile: Option<ProfileType>,
}

/// Sub-score and candidate profile for each User-Agent class.
fn agent_score(class: AgentClass) -> (u8, Option<ProfileType>, &'static str) {
    match class {
        AgentClass::RecruitingTool => (100, Some(ProfileType::Recruiter), "recruiting_tool"),
        AgentClass::ProfessionalNetwork => (100, Some(ProfileType::Recruiter), "professional_network"),
        AgentClass::DeveloperTool => (70, Some(ProfileType::Developer), "developer_tool"),
        AgentClass::GenericBot => (30, None, "bot"),
        AgentClass::Browser => (20, None, "browser"),
        AgentClass::Unknown => (10, None, "unknown_agent"),
        AgentClass::Empty => (0, None, "empty"),
    }
}

/// Combine the three sub-scores (each 0..=100) into a confidence in 0..=100.
pub fn weighted_confidence(user_agent: u8, referer: u8, enrichment: u8) -> u8 {
    let raw = f64::from(user_agent) * USER_AGENT_WEIGHT
        + f64::from(referer) * REFERER_WEIGHT
        + f64::from(enrichment) * ENRICHMENT_WEIGHT;
    raw.round().clamp(0.0, 100.0) as u8
}

/// Classify a visitor from device, referer and enrichment signals.
///
/// Pure over its inputs. A recognised recruiting tool short-circuits to a
/// fixed-confidence recruiter result. Otherwise the enrichment candidate
/// wins the profile type whenever it fires, and the remaining signals are
/// ranked by weighted contribution.
pub fn classify(
    device: &DeviceSignals,
    referer: Option<&str>,
    enrichment: Option<&Enrichment>,
) -> DetectedProfile {
    let agent_class = classify_agent(&device.user_agent);

    if agent_class == AgentClass::RecruitingTool {
        return DetectedProfile {
            profile_type: ProfileType::Recruiter,
            confidence: RECRUITING_TOOL_CONFIDENCE,
            sources: vec!["user_agent:recruiting_tool".to_string()],
            device: device.summary.clone(),
        };
    }

    let mut signals: Vec<Signal> = Vec::with_capacity(3);

    let (ua_score, ua_profile, ua_label) = agent_score(agent_class);
    if ua_score > 0 {
        signals.push(Signal {
            source: format!("user_agent:{}", ua_label),
            contribution: f64::from(ua_score) * USER_AGENT_WEIGHT,
            profile: ua_profile,
        });
    }

    let referer_match = referer.and_then(score_referer);
    let referer_score = referer_match.map_or(0, |m| m.score);
    if let Some(m) = referer_match {
        signals.push(Signal {
            source: format!("referer:{}", m.label),
            contribution: f64::from(m.score) * REFERER_WEIGHT,
            profile: Some(m.profile),
        });
    }

    let enrichment_match = enrichment.and_then(score_enrichment);
    let enrichment_score = enrichment_match.map_or(0, |m| m.score);
    if let Some(m) = enrichment_match {
        signals.push(Signal {
            source: format!("ip_enrichment:{}", m.label),
            contribution: f64::from(m.score) * ENRICHMENT_WEIGHT,
            profile: Some(m.profile),
        });
    }

    if signals.is_empty() {
        return DetectedProfile::other(device.summary.clone());
    }

    // Stable: equal contributions keep user agent, referer, enrichment order.
    signals.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(Ordering::Equal)
    });

    let profile_type = enrichment_match
        .map(|m| m.profile)
        .or_else(|| signals.iter().find_map(|s| s.profile))
        .unwrap_or(ProfileType::Other);

    DetectedProfile {
        profile_type,
        confidence: weighted_confidence(ua_score, referer_score, enrichment_score),
        sources: signals.into_iter().map(|s| s.source).collect(),
        device: device.summary.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_agent::{DeviceSummary, HeuristicUaParser, UserAgentParser};

    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn device(ua: &str) -> DeviceSignals {
        DeviceSignals {
            user_agent: ua.to_string(),
            summary: HeuristicUaParser.parse(ua),
        }
    }

    #[test]
    fn test_recruiting_tool_short_circuits() {
        let enrichment = Enrichment::from_pairs([("job_title", "Backend Engineer")]);
        let profile = classify(
            &device("Lever-Sourcing/3.0 (+https://lever.co)"),
            Some("https://github.com/x"),
            Some(&enrichment),
        );
        assert_eq!(profile.profile_type, ProfileType::Recruiter);
        assert_eq!(profile.confidence, 80);
        assert_eq!(profile.sources, vec!["user_agent:recruiting_tool"]);
    }

    #[test]
    fn test_no_signal_is_other_zero() {
        let profile = classify(&device(""), None, None);
        assert_eq!(profile.profile_type, ProfileType::Other);
        assert_eq!(profile.confidence, 0);
        assert!(profile.sources.is_empty());
        assert_eq!(profile.device, DeviceSummary::unknown());
    }

    #[test]
    fn test_browser_alone_has_no_profile() {
        let profile = classify(&device(CHROME), None, None);
        assert_eq!(profile.profile_type, ProfileType::Other);
        assert_eq!(profile.confidence, 6);
        assert_eq!(profile.sources, vec!["user_agent:browser"]);
    }

    #[test]
    fn test_enrichment_wins_profile_type() {
        let enrichment = Enrichment::from_pairs([("job_title", "CTO")]);
        let profile = classify(
            &device(CHROME),
            Some("https://www.linkedin.com/jobs/view/1"),
            Some(&enrichment),
        );
        // 20*0.3 + 100*0.2 + 100*0.5 = 76
        assert_eq!(profile.profile_type, ProfileType::Cto);
        assert_eq!(profile.confidence, 76);
        assert_eq!(profile.sources[0], "ip_enrichment:job_title");
    }

    #[test]
    fn test_strongest_signal_picks_type_without_enrichment() {
        let profile = classify(&device("curl/8.4.0"), Some("https://www.linkedin.com/jobs/"), None);
        // curl contributes 21, the LinkedIn jobs referer 20.
        assert_eq!(profile.profile_type, ProfileType::Developer);
        assert_eq!(profile.confidence, 41);
        assert_eq!(
            profile.sources,
            vec!["user_agent:developer_tool", "referer:linkedin_hiring"]
        );
    }

    #[test]
    fn test_recruiter_referer_and_enrichment_reach_bypass_level() {
        let enrichment = Enrichment::from_pairs([("company_type", "Recruiting agency")]);
        let profile = classify(
            &device(CHROME),
            Some("https://linkedin.com/talent/search"),
            Some(&enrichment),
        );
        // 6 + 20 + 45 = 71
        assert_eq!(profile.profile_type, ProfileType::Recruiter);
        assert_eq!(profile.confidence, 71);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(weighted_confidence(0, 0, 0), 0);
        assert_eq!(weighted_confidence(100, 100, 100), 100);
        assert_eq!(weighted_confidence(255, 255, 255), 100);
        for ua in (0..=255u8).step_by(17) {
            for referer in (0..=255u8).step_by(17) {
                for ip in (0..=255u8).step_by(17) {
                    assert!(weighted_confidence(ua, referer, ip) <= 100);
                }
            }
        }
    }
}
