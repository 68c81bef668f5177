use crate::ProfileType;

/// Outcome of matching a Referer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefererMatch {
    /// Sub-score in 0..=100.
    pub score: u8,
    pub profile: ProfileType,
    pub label: &'static str,
}

const LINKEDIN_HOSTS: &[&str] = &["linkedin.com", "lnkd.in"];

/// LinkedIn paths used by recruiters and hiring managers.
const LINKEDIN_HIRING_PATHS: &[&str] = &["/jobs", "/recruiter", "/talent", "/hiring"];

const JOB_BOARDS: &[&str] = &[
    "indeed.",
    "glassdoor.",
    "welcometothejungle.",
    "wellfound.com",
    "angel.co",
    "monster.",
    "hellowork.",
    "otta.com",
];

const CODE_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Split a referer URL into a lowercase host (without `www.`) and a path.
fn split_url(referer: &str) -> Option<(String, String)> {
    let trimmed = referer.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    let (authority, path) = match without_scheme.find(&['/', '?', '#'][..]) {
        Some(idx) => without_scheme.split_at(idx),
        None => (without_scheme, "/"),
    };

    // Drop credentials and port.
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host).to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() {
        return None;
    }
    Some((host, path.to_lowercase()))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Score a Referer header.
///
/// LinkedIn hiring paths outrank other LinkedIn pages; job boards score a
/// fixed mid value; code hosting suggests a developer.
pub fn score_referer(referer: &str) -> Option<RefererMatch> {
    let (host, path) = split_url(referer)?;

    if LINKEDIN_HOSTS.iter().any(|d| host_matches(&host, d)) {
        let hiring = LINKEDIN_HIRING_PATHS.iter().any(|p| path.starts_with(p))
            || host.starts_with("talent.");
        return Some(if hiring {
            RefererMatch {
                score: 100,
                profile: ProfileType::Recruiter,
                label: "linkedin_hiring",
            }
        } else {
            RefererMatch {
                score: 60,
                profile: ProfileType::Recruiter,
                label: "linkedin",
            }
        });
    }

    if JOB_BOARDS.iter().any(|board| host.contains(board))
        || (host_matches(&host, "stackoverflow.com") && path.starts_with("/jobs"))
    {
        return Some(RefererMatch {
            score: 70,
            profile: ProfileType::Recruiter,
            label: "job_board",
        });
    }

    if CODE_HOSTS.iter().any(|d| host_matches(&host, d)) {
        return Some(RefererMatch {
            score: 60,
            profile: ProfileType::Developer,
            label: "code_hosting",
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linkedin_hiring_paths() {
        let m = score_referer("https://www.linkedin.com/jobs/view/12345").unwrap();
        assert_eq!(m.score, 100);
        assert_eq!(m.profile, ProfileType::Recruiter);

        let m = score_referer("https://www.linkedin.com/talent/hire/123/discover").unwrap();
        assert_eq!(m.score, 100);
    }

    #[test]
    fn test_linkedin_generic_page() {
        let m = score_referer("https://linkedin.com/in/someone").unwrap();
        assert_eq!(m.score, 60);
        assert_eq!(m.label, "linkedin");
    }

    #[test]
    fn test_job_board() {
        let m = score_referer("https://fr.indeed.com/viewjob?jk=abc").unwrap();
        assert_eq!(m.score, 70);
        assert_eq!(m.profile, ProfileType::Recruiter);
    }

    #[test]
    fn test_code_hosting() {
        let m = score_referer("https://github.com/someone/repo").unwrap();
        assert_eq!(m.profile, ProfileType::Developer);
        assert_eq!(m.score, 60);
    }

    #[test]
    fn test_lookalike_host_does_not_match() {
        assert!(score_referer("https://notgithub.com/x").is_none());
        assert!(score_referer("https://github.com.evil.io/x").is_none());
    }

    #[test]
    fn test_unknown_and_empty() {
        assert!(score_referer("https://example.com/").is_none());
        assert!(score_referer("").is_none());
    }

    #[test]
    fn test_split_url_handles_port_and_query() {
        let (host, path) = split_url("http://www.GitHub.com:443?tab=repos").unwrap();
        assert_eq!(host, "github.com");
        assert_eq!(path, "?tab=repos");
    }
}
