/// Shared-store key layout.
///
/// All components build their keys through a `KeySpace` so that a single
/// optional prefix can namespace several deployments on one store.
#[derive(Debug, Clone, Default)]
pub struct KeySpace {
    prefix: Option<String>,
}

impl KeySpace {
    pub fn new(prefix: Option<String>) -> Self {
        let prefix = prefix.filter(|p| !p.is_empty());
        Self { prefix }
    }

    fn key(&self, raw: String) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, raw),
            None => raw,
        }
    }

    pub fn visitor_count(&self, session: &str) -> String {
        self.key(format!("visitor:{}:count", session))
    }

    pub fn visitor_profile(&self, session: &str) -> String {
        self.key(format!("visitor:{}:profile", session))
    }

    pub fn profile_cache(&self, session: &str) -> String {
        self.key(format!("profile:cache:{}", session))
    }

    pub fn access_bypass(&self, session: &str) -> String {
        self.key(format!("access:bypass:{}", session))
    }

    pub fn ai_daily(&self, session: &str) -> String {
        self.key(format!("ratelimit:ai:{}:daily", session))
    }

    pub fn ai_cooldown(&self, session: &str) -> String {
        self.key(format!("ratelimit:ai:{}:cooldown", session))
    }

    pub fn window(&self, class: &str, identifier: &str) -> String {
        self.key(format!("ratelimit:{}:{}", class, identifier))
    }

    pub fn violations(&self, class: &str, identifier: &str) -> String {
        self.key(format!("ratelimit:{}:violations:{}", class, identifier))
    }

    pub fn ban(&self, class: &str, identifier: &str) -> String {
        self.key(format!("ratelimit:{}:ban:{}", class, identifier))
    }

    pub fn queue(&self, name: &str) -> String {
        self.key(name.to_string())
    }

    pub fn letter_job(&self, job_id: &str) -> String {
        self.key(format!("job:letter:{}", job_id))
    }
}
