use std::time::Duration;

/// Limits applied to one scope (a single client, or the global aggregate),
/// per spec §6.3's "rate limiting: per-client and global" section.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRules {
    pub requests_per_second: u64,
    pub requests_per_second_burst: u64,
    pub requests_per_minute: u64,
    pub queries_per_minute: u64,
    pub queries_per_minute_burst: u64,
    pub queries_per_hour: u64,
    pub max_concurrent_requests: u32,
}

impl Default for RateLimitRules {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            requests_per_second_burst: 5,
            requests_per_minute: 300,
            queries_per_minute: 60,
            queries_per_minute_burst: 10,
            queries_per_hour: 2000,
            max_concurrent_requests: 20,
        }
    }
}

impl RateLimitRules {
    pub fn builder() -> RateLimitRulesBuilder {
        RateLimitRulesBuilder::default()
    }
}

#[derive(Default)]
pub struct RateLimitRulesBuilder {
    rules: RateLimitRulesOpt,
}

#[derive(Default)]
struct RateLimitRulesOpt {
    requests_per_second: Option<u64>,
    requests_per_second_burst: Option<u64>,
    requests_per_minute: Option<u64>,
    queries_per_minute: Option<u64>,
    queries_per_minute_burst: Option<u64>,
    queries_per_hour: Option<u64>,
    max_concurrent_requests: Option<u32>,
}

macro_rules! rules_setter {
    ($field:ident, $ty:ty) => {
        pub fn $field(mut self, value: $ty) -> Self {
            self.rules.$field = Some(value);
            self
        }
    };
}

impl RateLimitRulesBuilder {
    rules_setter!(requests_per_second, u64);
    rules_setter!(requests_per_second_burst, u64);
    rules_setter!(requests_per_minute, u64);
    rules_setter!(queries_per_minute, u64);
    rules_setter!(queries_per_minute_burst, u64);
    rules_setter!(queries_per_hour, u64);
    rules_setter!(max_concurrent_requests, u32);

    pub fn build(self) -> RateLimitRules {
        let default = RateLimitRules::default();
        RateLimitRules {
            requests_per_second: self.rules.requests_per_second.unwrap_or(default.requests_per_second),
            requests_per_second_burst: self
                .rules
                .requests_per_second_burst
                .unwrap_or(default.requests_per_second_burst),
            requests_per_minute: self.rules.requests_per_minute.unwrap_or(default.requests_per_minute),
            queries_per_minute: self.rules.queries_per_minute.unwrap_or(default.queries_per_minute),
            queries_per_minute_burst: self
                .rules
                .queries_per_minute_burst
                .unwrap_or(default.queries_per_minute_burst),
            queries_per_hour: self.rules.queries_per_hour.unwrap_or(default.queries_per_hour),
            max_concurrent_requests: self
                .rules
                .max_concurrent_requests
                .unwrap_or(default.max_concurrent_requests),
        }
    }
}

pub(crate) const ONE_SECOND: Duration = Duration::from_secs(1);
pub(crate) const ONE_MINUTE: Duration = Duration::from_secs(60);
pub(crate) const ONE_HOUR: Duration = Duration::from_secs(3600);
