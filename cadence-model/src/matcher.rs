/// Selects keys by their group name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupMatcher {
    Any,
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
}

impl GroupMatcher {
    pub fn any_group() -> Self {
        GroupMatcher::Any
    }

    pub fn group_equals(group: impl Into<String>) -> Self {
        GroupMatcher::Equals(group.into())
    }

    pub fn group_starts_with(prefix: impl Into<String>) -> Self {
        GroupMatcher::StartsWith(prefix.into())
    }

    pub fn is_match(&self, group: &str) -> bool {
        match self {
            GroupMatcher::Any => true,
            GroupMatcher::Equals(value) => group == value,
            GroupMatcher::StartsWith(value) => group.starts_with(value.as_str()),
            GroupMatcher::EndsWith(value) => group.ends_with(value.as_str()),
            GroupMatcher::Contains(value) => group.contains(value.as_str()),
        }
    }
}
