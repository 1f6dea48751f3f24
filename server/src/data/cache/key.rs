//! Type-safe cache key builder with versioning

use crate::core::constants::CACHE_KEY_VERSION;

/// Type-safe cache key builder
///
/// All keys are prefixed with a version (e.g., "v1:") to allow
/// invalidating all cached data on schema changes.
pub struct CacheKey;

impl CacheKey {
    // =========================================================================
    // Projects
    // =========================================================================

    /// Cache key for project by ID
    pub fn project(id: &str) -> String {
        format!("{}:project:{}", CACHE_KEY_VERSION, id)
    }

    // =========================================================================
    // API Keys
    // =========================================================================

    /// Cache key for API key by hash (for validation lookups)
    pub fn api_key_by_hash(hash: &str) -> String {
        format!("{}:apikey:{}", CACHE_KEY_VERSION, hash)
    }

    /// Cache key for negative API key lookup by hash (not found)
    pub fn api_key_negative(hash: &str) -> String {
        format!("{}:apikey:neg:{}", CACHE_KEY_VERSION, hash)
    }

    // =========================================================================
    // Fingerprint Rules
    // =========================================================================

    /// Cache key for a project's enabled fingerprint rules
    pub fn fingerprint_rules(project_id: &str) -> String {
        format!("{}:fprules:{}", CACHE_KEY_VERSION, project_id)
    }

    // =========================================================================
    // Stats / list views (invalidated after event persistence)
    // =========================================================================

    /// Cache key for a project's dashboard stats
    pub fn stats(project_id: &str) -> String {
        format!("{}:stats:{}", CACHE_KEY_VERSION, project_id)
    }

    /// Glob pattern covering every stats/list view of a project
    pub fn stats_pattern(project_id: &str) -> String {
        format!("{}:stats:{}*", CACHE_KEY_VERSION, project_id)
    }

    /// Glob pattern covering a project's issue list views
    pub fn issue_list_pattern(project_id: &str) -> String {
        format!("{}:issues:{}:*", CACHE_KEY_VERSION, project_id)
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Cache key for the per-second admission counter of a project
    ///
    /// Note: counter keys are NOT versioned (counter semantics don't change)
    pub fn admission_counter(project_id: &str, second: i64) -> String {
        format!("adm:{}:{}", project_id, second)
    }

    /// Cache key for the short-window admission dedup of an occurrence
    pub fn admission_dedup(project_id: &str, digest: &str) -> String {
        format!("dedup:evt:{}:{}", project_id, digest)
    }

    // =========================================================================
    // Rate Limiting
    // =========================================================================

    /// Cache key for fixed-window rate limit counter
    pub fn rate_limit(bucket: &str, identifier: &str) -> String {
        format!("rl:{}:{}", bucket, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_key() {
        assert_eq!(CacheKey::project("p1"), "v1:project:p1");
    }

    #[test]
    fn test_api_key_keys() {
        assert_eq!(CacheKey::api_key_by_hash("abc123"), "v1:apikey:abc123");
        assert_eq!(CacheKey::api_key_negative("abc123"), "v1:apikey:neg:abc123");
    }

    #[test]
    fn test_fingerprint_rules_key() {
        assert_eq!(CacheKey::fingerprint_rules("p1"), "v1:fprules:p1");
    }

    #[test]
    fn test_admission_keys_not_versioned() {
        assert_eq!(CacheKey::admission_counter("p1", 1700000000), "adm:p1:1700000000");
        assert_eq!(CacheKey::admission_dedup("p1", "d1"), "dedup:evt:p1:d1");
        assert_eq!(CacheKey::rate_limit("api", "10.0.0.1"), "rl:api:10.0.0.1");
    }

    #[test]
    fn test_stats_pattern_covers_stats_key() {
        let key = CacheKey::stats("p1");
        let pattern_prefix = CacheKey::stats_pattern("p1");
        assert!(key.starts_with(pattern_prefix.trim_end_matches('*')));
    }
}
