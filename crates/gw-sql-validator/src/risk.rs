/// Maximum classified risk for a statement (spec §4.14).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Coarse statement shape, derived from the first meaningful token (spec
/// §4.14's token analyzer / the original implementation's `QueryType`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Show,
    Describe,
    Explain,
    With,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Grant,
    Revoke,
    Execute,
    Call,
    #[default]
    Unknown,
}

impl QueryType {
    /// Read-only verbs per the glossary's definition of read-only mode:
    /// `{SELECT, SHOW, DESCRIBE, EXPLAIN, WITH}`.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Select | Self::Show | Self::Describe | Self::Explain | Self::With)
    }
}
