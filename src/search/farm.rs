//! Build-farm selection for search results and job listings

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Sentinel selecting every farm
pub const ALL_FARMS: &str = "all farms";
/// Sentinel selecting artifacts with no farm attribution
pub const UNKNOWN_FARM: &str = "unknown";

/// The `buildFarm` request parameter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FarmSelector {
    #[default]
    AllFarms,
    Unknown,
    Named(String),
}

impl FarmSelector {
    /// Absent and empty values both select every farm.
    pub fn parse(value: &str) -> Self {
        match value {
            "" | ALL_FARMS => FarmSelector::AllFarms,
            UNKNOWN_FARM => FarmSelector::Unknown,
            other => FarmSelector::Named(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FarmSelector::AllFarms => ALL_FARMS,
            FarmSelector::Unknown => UNKNOWN_FARM,
            FarmSelector::Named(name) => name,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FarmSelector::AllFarms)
    }

    /// Whether an entry attributed to `farm` is retained. Empty and absent
    /// attributions are the same thing.
    pub fn admits(&self, farm: Option<&str>) -> bool {
        let farm = farm.unwrap_or("");
        match self {
            FarmSelector::AllFarms => true,
            FarmSelector::Unknown => farm.is_empty(),
            FarmSelector::Named(name) => farm == name,
        }
    }
}

impl fmt::Display for FarmSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FarmSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Maps a result URI to the farm that produced it
pub trait FarmLookup: Send + Sync {
    fn farm_for(&self, uri: &str) -> Option<String>;
}

/// Lookup backed by a fixed table
#[derive(Debug, Clone, Default)]
pub struct StaticFarmLookup {
    farms: HashMap<String, String>,
}

impl StaticFarmLookup {
    pub fn new(farms: HashMap<String, String>) -> Self {
        Self { farms }
    }
}

impl FromIterator<(String, String)> for StaticFarmLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            farms: iter.into_iter().collect(),
        }
    }
}

impl FarmLookup for StaticFarmLookup {
    fn farm_for(&self, uri: &str) -> Option<String> {
        self.farms.get(uri).filter(|f| !f.is_empty()).cloned()
    }
}

/// Retain the entries of `items` whose farm is admitted by `selector`.
///
/// `farm_of` yields the attribution for an item; the same rule serves both
/// URL-keyed search results and job listings.
pub fn retain_by_farm<T, F>(items: &mut Vec<T>, selector: &FarmSelector, farm_of: F)
where
    F: Fn(&T) -> Option<String>,
{
    if selector.is_all() {
        return;
    }
    items.retain(|item| selector.admits(farm_of(item).as_deref()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributed() -> Vec<(&'static str, &'static str)> {
        vec![("a", ""), ("b", "build01"), ("c", "build02")]
    }

    fn filtered(selector: &FarmSelector) -> Vec<&'static str> {
        let mut items = attributed();
        retain_by_farm(&mut items, selector, |(_, farm)| Some(farm.to_string()));
        items.into_iter().map(|(name, _)| name).collect()
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(FarmSelector::parse(""), FarmSelector::AllFarms);
        assert_eq!(FarmSelector::parse("all farms"), FarmSelector::AllFarms);
        assert_eq!(FarmSelector::parse("unknown"), FarmSelector::Unknown);
        assert_eq!(
            FarmSelector::parse("build01"),
            FarmSelector::Named("build01".to_string())
        );
        assert_eq!(FarmSelector::Named("build01".into()).to_string(), "build01");
    }

    #[test]
    fn test_unknown_keeps_only_unattributed() {
        assert_eq!(filtered(&FarmSelector::Unknown), vec!["a"]);
    }

    #[test]
    fn test_named_keeps_only_that_farm() {
        assert_eq!(filtered(&FarmSelector::Named("build01".into())), vec!["b"]);
    }

    #[test]
    fn test_all_farms_keeps_everything() {
        assert_eq!(filtered(&FarmSelector::AllFarms), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_absent_attribution_counts_as_unknown() {
        assert!(FarmSelector::Unknown.admits(None));
        assert!(!FarmSelector::Named("build01".into()).admits(None));
    }

    #[test]
    fn test_static_lookup_treats_empty_as_absent() {
        let lookup: StaticFarmLookup = vec![
            ("https://x/1".to_string(), "build01".to_string()),
            ("https://x/2".to_string(), String::new()),
        ]
        .into_iter()
        .collect();
        assert_eq!(lookup.farm_for("https://x/1").as_deref(), Some("build01"));
        assert_eq!(lookup.farm_for("https://x/2"), None);
        assert_eq!(lookup.farm_for("https://x/3"), None);
    }
}
