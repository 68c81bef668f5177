use serde::{Deserialize, Serialize};

/// Signature class of a User-Agent string, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentClass {
    /// Applicant-tracking or sourcing tool crawling the site.
    RecruitingTool,
    /// Professional network app or link-preview bot (LinkedIn).
    ProfessionalNetwork,
    /// Command-line HTTP clients, API tools, editors.
    DeveloperTool,
    /// Any other crawler or automation.
    GenericBot,
    /// A regular browser.
    Browser,
    /// Non-empty, but nothing recognisable.
    Unknown,
    Empty,
}

/// Known recruiting-tool User-Agent substrings.
const RECRUITING_TOOLS: &[&str] = &[
    "greenhouse",
    "lever.co",
    "leverbot",
    "workable",
    "smartrecruiters",
    "teamtailor",
    "recruitee",
    "hireez",
    "seekout",
    "ashbyhq",
    "jobvite",
    "icims",
    "linkedin recruiter",
];

/// Professional network User-Agent substrings.
const PROFESSIONAL_NETWORK: &[&str] = &["linkedinbot", "linkedinapp", "linkedin"];

/// Developer tool User-Agent substrings.
const DEVELOPER_TOOLS: &[&str] = &[
    "curl/",
    "wget",
    "postman",
    "insomnia",
    "httpie",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "node-fetch",
    "axios",
    "okhttp",
    "vscode",
    "github-desktop",
    "java/",
];

/// Generic automation indicators.
const BOT_PATTERNS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "headless",
    "phantom",
    "selenium",
    "slurp",
];

/// Classify a User-Agent string against the signature tables.
pub fn classify_agent(ua: &str) -> AgentClass {
    if ua.trim().is_empty() {
        return AgentClass::Empty;
    }

    let ua_lower = ua.to_lowercase();

    if RECRUITING_TOOLS.iter().any(|p| ua_lower.contains(p)) {
        return AgentClass::RecruitingTool;
    }
    if PROFESSIONAL_NETWORK.iter().any(|p| ua_lower.contains(p)) {
        return AgentClass::ProfessionalNetwork;
    }
    if DEVELOPER_TOOLS.iter().any(|p| ua_lower.contains(p)) {
        return AgentClass::DeveloperTool;
    }
    if BOT_PATTERNS.iter().any(|p| ua_lower.contains(p)) {
        return AgentClass::GenericBot;
    }

    let looks_like_browser = ua_lower.contains("mozilla")
        && (ua_lower.contains("chrome")
            || ua_lower.contains("firefox")
            || ua_lower.contains("safari")
            || ua_lower.contains("edg"));

    if looks_like_browser {
        AgentClass::Browser
    } else {
        AgentClass::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    Bot,
    Unknown,
}

/// Coarse description of the client device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub browser: String,
    pub os: String,
    pub device_class: DeviceClass,
    pub is_bot: bool,
}

impl DeviceSummary {
    pub fn unknown() -> Self {
        Self {
            browser: "unknown".to_string(),
            os: "unknown".to_string(),
            device_class: DeviceClass::Unknown,
            is_bot: false,
        }
    }
}

/// Turns a raw User-Agent header into a [`DeviceSummary`].
pub trait UserAgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> DeviceSummary;
}

/// Substring-based parser. Good enough for profiling; not a full UA database.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicUaParser;

impl UserAgentParser for HeuristicUaParser {
    fn parse(&self, user_agent: &str) -> DeviceSummary {
        if user_agent.trim().is_empty() {
            return DeviceSummary::unknown();
        }

        let is_bot = !matches!(
            classify_agent(user_agent),
            AgentClass::Browser | AgentClass::Unknown | AgentClass::Empty
        );
        let ua_lower = user_agent.to_lowercase();

        let device_class = if is_bot {
            DeviceClass::Bot
        } else if ua_lower.contains("ipad") || ua_lower.contains("tablet") {
            DeviceClass::Tablet
        } else if ua_lower.contains("mobile")
            || ua_lower.contains("iphone")
            || ua_lower.contains("android")
        {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };

        DeviceSummary {
            browser: browser_family(&ua_lower).to_string(),
            os: os_family(&ua_lower).to_string(),
            device_class,
            is_bot,
        }
    }
}

fn browser_family(ua_lower: &str) -> &'static str {
    if ua_lower.contains("edg") {
        "Edge"
    } else if ua_lower.contains("opr/") || ua_lower.contains("opera") {
        "Opera"
    } else if ua_lower.contains("chrome") && !ua_lower.contains("chromium") {
        "Chrome"
    } else if ua_lower.contains("chromium") {
        "Chromium"
    } else if ua_lower.contains("firefox") {
        "Firefox"
    } else if ua_lower.contains("safari") {
        "Safari"
    } else if ua_lower.contains("curl") {
        "curl"
    } else if ua_lower.contains("python") {
        "python"
    } else if ua_lower.contains("postman") {
        "Postman"
    } else if ua_lower.contains("bot") || ua_lower.contains("crawler") || ua_lower.contains("spider") {
        "bot-generic"
    } else {
        "other"
    }
}

fn os_family(ua_lower: &str) -> &'static str {
    if ua_lower.contains("windows") {
        "Windows"
    } else if ua_lower.contains("iphone") || ua_lower.contains("ipad") {
        "iOS"
    } else if ua_lower.contains("mac os") || ua_lower.contains("macintosh") {
        "macOS"
    } else if ua_lower.contains("android") {
        "Android"
    } else if ua_lower.contains("cros") {
        "ChromeOS"
    } else if ua_lower.contains("linux") {
        "Linux"
    } else {
        "other"
    }
}
