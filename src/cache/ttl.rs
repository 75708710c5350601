//! Aggregate per-fragment cache lifetimes into one page-level decision.
//!
//! One fragment reporting [`FragmentTtl::Now`] makes the whole page
//! uncacheable: its output is request specific and cannot share a cache
//! entry with the rest of the page. Otherwise the page lives as long as its
//! shortest-lived fragment, bounded by the default content lifetime and the
//! global ceiling.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::domain::entities::ContentFragment;
use crate::domain::types::FragmentTtl;

/// Default lifetime of rendered content in seconds.
pub const DEFAULT_CONTENT_TTL: u64 = 60;
/// Global lifetime ceiling in seconds (one year).
pub const MAX_TTL_CEILING: u64 = 31_536_000;

/// Optional hook that may contribute one more candidate lifetime.
pub type TtlExtension = Arc<dyn Fn(&[u64]) -> Option<u64> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub default_ttl: u64,
    pub max_ttl: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_CONTENT_TTL,
            max_ttl: MAX_TTL_CEILING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDecision {
    pub cacheable: bool,
    pub ttl: u64,
    pub vary_on: BTreeSet<String>,
}

impl CacheDecision {
    fn uncacheable() -> Self {
        Self {
            cacheable: false,
            ttl: 0,
            vary_on: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct TtlPolicy {
    config: TtlConfig,
    extension: Option<TtlExtension>,
}

impl fmt::Debug for TtlPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlPolicy")
            .field("config", &self.config)
            .field("extension", &self.extension.is_some())
            .finish()
    }
}

impl TtlPolicy {
    pub fn new(config: TtlConfig) -> Self {
        Self {
            config,
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: TtlExtension) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn config(&self) -> TtlConfig {
        self.config
    }

    pub fn decide(&self, fragments: &[ContentFragment]) -> CacheDecision {
        decide_with(
            fragments,
            self.config.default_ttl,
            self.config.max_ttl,
            self.extension.as_deref(),
        )
    }
}

/// Compute a cache decision from explicit bounds and an optional hook.
pub fn decide_with(
    fragments: &[ContentFragment],
    floor_default: u64,
    ceiling_max: u64,
    extension: Option<&(dyn Fn(&[u64]) -> Option<u64> + Send + Sync)>,
) -> CacheDecision {
    if fragments.iter().any(|fragment| fragment.ttl.is_now()) {
        return CacheDecision::uncacheable();
    }

    let mut candidates: Vec<u64> = fragments
        .iter()
        .filter_map(|fragment| match fragment.ttl {
            FragmentTtl::Seconds(seconds) => Some(seconds),
            FragmentTtl::Now | FragmentTtl::Unbounded => None,
        })
        .collect();
    candidates.push(floor_default);
    candidates.push(ceiling_max);
    if let Some(extra) = extension.and_then(|hook| hook(&candidates)) {
        candidates.push(extra);
    }

    let ttl = candidates.iter().copied().min().unwrap_or(0);
    if ttl == 0 {
        return CacheDecision::uncacheable();
    }

    let vary_on = fragments
        .iter()
        .flat_map(|fragment| fragment.vary_on.iter().cloned())
        .collect();

    CacheDecision {
        cacheable: true,
        ttl,
        vary_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(ttl: FragmentTtl) -> ContentFragment {
        ContentFragment::new("content", "<p></p>", ttl)
    }

    #[test]
    fn minimum_lifetime_wins() {
        let decision = decide_with(
            &[
                fragment(FragmentTtl::Seconds(30)),
                fragment(FragmentTtl::Seconds(120)),
            ],
            60,
            MAX_TTL_CEILING,
            None,
        );
        assert!(decision.cacheable);
        assert_eq!(decision.ttl, 30);
    }

    #[test]
    fn one_uncacheable_fragment_dominates() {
        let decision = decide_with(
            &[fragment(FragmentTtl::Seconds(30)), fragment(FragmentTtl::Now)],
            60,
            MAX_TTL_CEILING,
            None,
        );
        assert!(!decision.cacheable);
        assert!(decision.vary_on.is_empty());
    }

    #[test]
    fn empty_page_uses_the_bounds() {
        let decision = decide_with(&[], 60, 45, None);
        assert!(decision.cacheable);
        assert_eq!(decision.ttl, 45);

        let decision = TtlPolicy::default().decide(&[]);
        assert_eq!(decision.ttl, DEFAULT_CONTENT_TTL);
    }

    #[test]
    fn unbounded_fragments_do_not_contribute() {
        let decision = decide_with(&[fragment(FragmentTtl::Unbounded)], 600, 900, None);
        assert_eq!(decision.ttl, 600);
    }

    #[test]
    fn zero_lifetime_is_not_cacheable() {
        let decision = decide_with(&[fragment(FragmentTtl::Seconds(0))], 60, 120, None);
        assert!(!decision.cacheable);
        let decision = decide_with(&[], 0, 120, None);
        assert!(!decision.cacheable);
    }

    #[test]
    fn extension_hook_can_clamp() {
        let policy = TtlPolicy::new(TtlConfig::default())
            .with_extension(Arc::new(|candidates: &[u64]| {
                assert!(candidates.contains(&MAX_TTL_CEILING));
                Some(5)
            }));
        let decision = policy.decide(&[fragment(FragmentTtl::Seconds(30))]);
        assert_eq!(decision.ttl, 5);

        let abstaining = TtlPolicy::new(TtlConfig::default()).with_extension(Arc::new(|_: &[u64]| None));
        assert_eq!(abstaining.decide(&[fragment(FragmentTtl::Seconds(30))]).ttl, 30);
    }

    #[test]
    fn vary_headers_are_merged() {
        let decision = decide_with(
            &[
                fragment(FragmentTtl::Seconds(30)).with_vary_on(["Cookie"]),
                fragment(FragmentTtl::Unbounded).with_vary_on(["Accept-Language", "Cookie"]),
            ],
            60,
            MAX_TTL_CEILING,
            None,
        );
        let vary: Vec<_> = decision.vary_on.into_iter().collect();
        assert_eq!(vary, vec!["Accept-Language", "Cookie"]);
    }
}
