/// Validator policy (spec §4.14 / §6.3 security options).
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub readonly_mode: bool,
    /// Promotes medium risk to blocked when enabled.
    pub strict_validation: bool,
    pub max_query_length: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            readonly_mode: true,
            strict_validation: false,
            max_query_length: 100_000,
        }
    }
}

impl ValidatorConfig {
    pub fn builder() -> ValidatorConfigBuilder {
        ValidatorConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct ValidatorConfigBuilder {
    config: ValidatorConfig,
}

impl ValidatorConfigBuilder {
    pub fn readonly_mode(mut self, enabled: bool) -> Self {
        self.config.readonly_mode = enabled;
        self
    }

    pub fn strict_validation(mut self, enabled: bool) -> Self {
        self.config.strict_validation = enabled;
        self
    }

    pub fn max_query_length(mut self, length: usize) -> Self {
        self.config.max_query_length = length;
        self
    }

    pub fn build(self) -> ValidatorConfig {
        self.config
    }
}
