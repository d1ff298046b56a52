//! Size-label resolution
//!
//! Maps a symbolic size label to concrete limits and guarantees. For every
//! tier except the smallest, the guarantee is the limit divided by the
//! configured oversubscription ratio, rounded down to an integer unit. The
//! smallest tier is special: its guarantees come straight from the config
//! defaults, since the bottom tier is not meant to scale with the ratio.

use crate::config::Config;
use crate::{Error, Result};

/// A resolved compute tier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeClass {
    /// The size label this class was resolved from
    pub label: String,
    /// CPU limit in whole cores
    pub cpu_limit: u64,
    /// Memory limit in MiB
    pub mem_limit: u64,
    /// CPU guarantee in whole cores (may floor to zero)
    pub cpu_guarantee: u64,
    /// Memory guarantee in MiB
    pub mem_guarantee: u64,
}

/// Pure lookup-plus-arithmetic resolver over the configured size table
#[derive(Clone, Debug)]
pub struct SizeResolver {
    sizes: std::collections::BTreeMap<String, crate::config::SizeLimits>,
    default_size: String,
    size_ratio: u64,
    cpu_guarantee: u64,
    mem_guarantee: u64,
}

impl SizeResolver {
    /// Build a resolver from validated configuration
    pub fn new(config: &Config) -> Self {
        Self {
            sizes: config.sizes.clone(),
            default_size: config.default_size.clone(),
            size_ratio: config.size_ratio,
            cpu_guarantee: config.cpu_guarantee,
            mem_guarantee: config.mem_guarantee,
        }
    }

    /// Resolve a size label to a [`SizeClass`]
    pub fn resolve(&self, label: &str) -> Result<SizeClass> {
        let limits = self.sizes.get(label).ok_or_else(|| {
            Error::invalid(format!(
                "'size' must be one of {:?}",
                self.sizes.keys().collect::<Vec<_>>()
            ))
        })?;

        let (cpu_guarantee, mem_guarantee) = if label == self.default_size {
            (self.cpu_guarantee, self.mem_guarantee)
        } else {
            (limits.cpu / self.size_ratio, limits.mem / self.size_ratio)
        };

        Ok(SizeClass {
            label: label.to_string(),
            cpu_limit: limits.cpu,
            mem_limit: limits.mem,
            cpu_guarantee,
            mem_guarantee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimits;

    fn resolver() -> SizeResolver {
        let mut config = Config::default();
        config.sizes.insert("small".to_string(), SizeLimits { cpu: 2, mem: 4096 });
        config.cpu_guarantee = 1;
        config.mem_guarantee = 512;
        SizeResolver::new(&config)
    }

    #[test]
    fn smallest_tier_takes_guarantees_from_config() {
        let size = resolver().resolve("tiny").unwrap();
        assert_eq!(size.cpu_guarantee, 1);
        assert_eq!(size.mem_guarantee, 512);
        // Limits still come from the table, not the defaults
        assert_eq!(size.cpu_limit, 1);
        assert_eq!(size.mem_limit, 1536);
    }

    #[test]
    fn other_tiers_divide_by_ratio_and_floor() {
        let size = resolver().resolve("small").unwrap();
        assert_eq!(size.cpu_limit, 2);
        assert_eq!(size.mem_limit, 4096);
        // floor(2 / 4) = 0, floor(4096 / 4) = 1024
        assert_eq!(size.cpu_guarantee, 0);
        assert_eq!(size.mem_guarantee, 1024);
    }

    #[test]
    fn guarantee_never_exceeds_limit() {
        let resolver = resolver();
        for label in ["tiny", "small", "medium", "large"] {
            let size = resolver.resolve(label).unwrap();
            assert!(size.cpu_guarantee <= size.cpu_limit, "{label}: cpu");
            assert!(size.mem_guarantee <= size.mem_limit, "{label}: mem");
        }
    }

    #[test]
    fn unknown_label_is_invalid_request() {
        let err = resolver().resolve("colossal").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
