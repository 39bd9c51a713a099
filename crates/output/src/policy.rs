//! Surface mapping policy and its lazy, cached resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::service::AccelService;

/// Requested mapping between decoder frame identities and surfaces.
///
/// Numeric forms follow the classic `dm=0|1|2` option: `0` indirect, `1`
/// direct, `2` autodetect.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// The caller's frame identity selects the surface 1:1.
    Direct,
    /// The pool recycles surfaces through its free-queue.
    Indirect,
    /// Direct unless the service retains surfaces after presentation.
    #[default]
    Auto,
}

impl MappingPolicy {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Indirect),
            1 => Some(Self::Direct),
            2 => Some(Self::Auto),
            _ => None,
        }
    }
}

impl FromStr for MappingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "1" => Ok(Self::Direct),
            "indirect" | "0" => Ok(Self::Indirect),
            "auto" | "2" => Ok(Self::Auto),
            other => Err(format!("unknown mapping policy '{other}' (expected 0|1|2 or a name)")),
        }
    }
}

/// Mapping actually in effect for a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mapping {
    Direct,
    Indirect,
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Indirect => f.write_str("indirect"),
        }
    }
}

/// Resolves a [`MappingPolicy`] at most once per stream.
///
/// The first call to [`resolve`](Self::resolve) decides, later calls return
/// the cached answer without touching the service. [`invalidate`](Self::invalidate)
/// is called when the stream is torn down so the next stream decides afresh.
#[derive(Debug, Default)]
pub struct PolicyResolver {
    policy: MappingPolicy,
    cached: Option<Mapping>,
}

impl PolicyResolver {
    pub fn new(policy: MappingPolicy) -> Self {
        Self {
            policy,
            cached: None,
        }
    }

    pub fn policy(&self) -> MappingPolicy {
        self.policy
    }

    pub fn cached(&self) -> Option<Mapping> {
        self.cached
    }

    /// Change the requested policy. Drops any cached decision.
    pub fn set_policy(&mut self, policy: MappingPolicy) {
        self.policy = policy;
        self.cached = None;
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn resolve<S: AccelService + ?Sized>(&mut self, service: &mut S) -> Mapping {
        if let Some(mapping) = self.cached {
            return mapping;
        }

        let mapping = match self.policy {
            MappingPolicy::Direct => Mapping::Direct,
            MappingPolicy::Indirect => Mapping::Indirect,
            MappingPolicy::Auto => Self::detect(service),
        };

        if mapping == Mapping::Direct {
            info!("Using 1:1 surface mapping");
        } else {
            info!("Using free-queue surface recycling");
        }

        self.cached = Some(mapping);
        mapping
    }

    // A service that keeps displaying from the surface itself (no copy) would
    // see it overwritten by the next decode, so recycling must wait for the
    // output ring to release it.
    fn detect<S: AccelService + ?Sized>(service: &mut S) -> Mapping {
        match service.query_retention_attribute() {
            Ok(true) => Mapping::Indirect,
            Ok(false) => Mapping::Direct,
            Err(err) => {
                warn!(
                    status = err.status,
                    error = %err,
                    "Direct surface attribute unavailable, falling back to 1:1 mapping"
                );
                Mapping::Direct
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedService;

    #[test]
    fn explicit_policies_skip_the_query() {
        let mut service = SimulatedService::new().with_retention(Some(true));

        let mut direct = PolicyResolver::new(MappingPolicy::Direct);
        assert_eq!(direct.resolve(&mut service), Mapping::Direct);

        let mut indirect = PolicyResolver::new(MappingPolicy::Indirect);
        assert_eq!(indirect.resolve(&mut service), Mapping::Indirect);

        assert_eq!(service.retention_queries(), 0);
    }

    #[test]
    fn auto_follows_retention_attribute() {
        let mut retains = SimulatedService::new().with_retention(Some(true));
        assert_eq!(
            PolicyResolver::new(MappingPolicy::Auto).resolve(&mut retains),
            Mapping::Indirect
        );

        let mut copies = SimulatedService::new().with_retention(Some(false));
        assert_eq!(
            PolicyResolver::new(MappingPolicy::Auto).resolve(&mut copies),
            Mapping::Direct
        );
    }

    #[test]
    fn auto_falls_back_to_direct_when_query_fails() {
        let mut service = SimulatedService::new().with_retention(None);
        let mut resolver = PolicyResolver::new(MappingPolicy::Auto);
        assert_eq!(resolver.resolve(&mut service), Mapping::Direct);
    }

    #[test]
    fn resolution_is_cached_until_invalidated() {
        let mut service = SimulatedService::new().with_retention(Some(true));
        let mut resolver = PolicyResolver::new(MappingPolicy::Auto);

        assert_eq!(resolver.resolve(&mut service), Mapping::Indirect);
        service.set_retention(Some(false));
        assert_eq!(resolver.resolve(&mut service), Mapping::Indirect);
        assert_eq!(service.retention_queries(), 1);

        resolver.invalidate();
        assert_eq!(resolver.resolve(&mut service), Mapping::Direct);
        assert_eq!(service.retention_queries(), 2);
    }

    #[test]
    fn parses_levels_and_names() {
        assert_eq!(MappingPolicy::from_level(0), Some(MappingPolicy::Indirect));
        assert_eq!(MappingPolicy::from_level(3), None);
        assert_eq!("1".parse::<MappingPolicy>(), Ok(MappingPolicy::Direct));
        assert_eq!("Auto".parse::<MappingPolicy>(), Ok(MappingPolicy::Auto));
        assert!("sometimes".parse::<MappingPolicy>().is_err());
    }
}
