use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque token identifying a registered highlight.
///
/// Reordering or removal of other highlights never invalidates a token.
/// Out-of-range viewer calls return the empty token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HighlightId(String);

impl HighlightId {
    pub(crate) fn generate(prefix: &str) -> Self {
        Self(unique_id(prefix))
    }

    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HighlightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns `<prefix>-<timestamp>-<random>` where the timestamp is unix
/// milliseconds and the random component is a hashed process counter, so ids
/// stay unique within a process even when generated in the same millisecond.
pub(crate) fn unique_id(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = DefaultHasher::new();
    counter.hash(&mut hasher);
    now.subsec_nanos().hash(&mut hasher);
    let random = hasher.finish() % 1_000_000_000;

    format!("{prefix}-{}-{random}", now.as_millis())
}

#[cfg(test)]
mod tests {
    use super::{HighlightId, unique_id};

    #[test]
    fn unique_id_matches_prefix_timestamp_random_pattern() {
        let id = unique_id("hl");
        let parts: Vec<&str> = id.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "hl");
        assert!(parts[1].parse::<u128>().is_ok());
        assert!(parts[2].parse::<u64>().is_ok());
    }

    #[test]
    fn unique_id_never_collides_within_a_burst() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(unique_id("hl")));
        }
    }

    #[test]
    fn none_token_is_empty_and_distinct_from_generated() {
        let none = HighlightId::none();
        assert!(none.is_none());
        assert_eq!(none.as_str(), "");

        let generated = HighlightId::generate("hl");
        assert!(!generated.is_none());
        assert_ne!(none, generated);
    }
}
