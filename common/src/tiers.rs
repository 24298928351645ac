// Billing tier catalog
//
// Tier privileges are plain configuration injected into the policy service.
// The catalog ships with built-in free/starter/pro tiers and can be
// overridden wholesale from Settings. Negative limits mean unlimited.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_TIER: &str = "free";

/// Privileges attached to one billing tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier {
    pub name: String,
    pub max_subscriptions: i64,
    pub max_emails_per_day: i64,
}

impl Tier {
    pub fn unlimited_subscriptions(&self) -> bool {
        self.max_subscriptions < 0
    }

    pub fn unlimited_emails(&self) -> bool {
        self.max_emails_per_day < 0
    }
}

/// Lookup table from tier key to privileges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCatalog {
    tiers: HashMap<String, Tier>,
}

impl TierCatalog {
    pub fn new(tiers: HashMap<String, Tier>) -> Self {
        Self { tiers }
    }

    /// Built-in catalog matching the shipped pricing page
    pub fn builtin() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            "free".to_string(),
            Tier {
                name: "Free".to_string(),
                max_subscriptions: 2,
                max_emails_per_day: 10,
            },
        );
        tiers.insert(
            "starter".to_string(),
            Tier {
                name: "Starter".to_string(),
                max_subscriptions: 10,
                max_emails_per_day: 100,
            },
        );
        tiers.insert(
            "pro".to_string(),
            Tier {
                name: "Pro".to_string(),
                max_subscriptions: 50,
                max_emails_per_day: 1000,
            },
        );
        Self { tiers }
    }

    /// Resolve a tier key; unknown keys fall back to the free tier.
    pub fn get(&self, key: &str) -> &Tier {
        self.tiers
            .get(key)
            .or_else(|| self.tiers.get(DEFAULT_TIER))
            .expect("tier catalog must contain the default tier")
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tiers.keys()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = TierCatalog::builtin();
        assert_eq!(catalog.get("free").max_subscriptions, 2);
        assert_eq!(catalog.get("starter").max_emails_per_day, 100);
        assert_eq!(catalog.get("pro").max_subscriptions, 50);
    }

    #[test]
    fn test_unknown_tier_falls_back_to_free() {
        let catalog = TierCatalog::builtin();
        assert_eq!(catalog.get("enterprise"), catalog.get("free"));
    }

    #[test]
    fn test_negative_limits_are_unlimited() {
        let tier = Tier {
            name: "Internal".to_string(),
            max_subscriptions: -1,
            max_emails_per_day: -1,
        };
        assert!(tier.unlimited_subscriptions());
        assert!(tier.unlimited_emails());
        assert!(!TierCatalog::builtin().get("pro").unlimited_emails());
    }
}
