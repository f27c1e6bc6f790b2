use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Timestamp format used for `last_query_time` in the persisted catalog.
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised when populating the catalog
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Region {0} has no region code")]
    EmptyCode(String),

    #[error("Region {name} already exists in group {existing_group}")]
    DuplicateRegion {
        name: String,
        existing_group: String,
    },

    #[error("Region {0} not found in catalog")]
    UnknownRegion(String),
}

/// A named, coded place-search scope (a city) with its query status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,

    #[serde(rename = "adcode")]
    pub code: String,

    /// Owning group; implied by the catalog layout on disk.
    #[serde(skip)]
    pub parent_group: String,

    #[serde(default)]
    pub queried: bool,

    #[serde(default, with = "query_time")]
    pub last_query_time: Option<NaiveDateTime>,

    #[serde(default)]
    pub query_count: u32,
}

impl Region {
    pub fn new(name: impl Into<String>, code: impl Into<String>, parent_group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            parent_group: parent_group.into(),
            queried: false,
            last_query_time: None,
            query_count: 0,
        }
    }

    /// Record a completed query at `now`.
    pub fn mark_queried(&mut self, now: NaiveDateTime) {
        self.queried = true;
        self.last_query_time = Some(now);
        self.query_count += 1;
    }

    /// Restore the never-queried status.
    pub fn reset(&mut self) {
        self.queried = false;
        self.last_query_time = None;
        self.query_count = 0;
    }
}

/// A parent grouping (province) and its cities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionGroup {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "adcode", default)]
    pub code: String,

    #[serde(default)]
    pub cities: IndexMap<String, Region>,
}

/// Province → cities mapping with per-city query status.
///
/// Region names are unique across the whole catalog, not just within their group,
/// so lookups by name never need the group. The catalog is owned by the caller and
/// handed to the orchestrator as a shared handle; it is written only by the worker
/// while a run is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "provinces", default)]
    groups: IndexMap<String, RegionGroup>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild derived fields after deserialization.
    ///
    /// The on-disk layout keys regions by group and by name, so `parent_group` and
    /// empty `name` fields are filled in from the map keys.
    pub fn rehydrate(&mut self) {
        for (group_name, group) in self.groups.iter_mut() {
            if group.name.is_empty() {
                group.name = group_name.clone();
            }
            for (region_name, region) in group.cities.iter_mut() {
                region.parent_group = group_name.clone();
                if region.name.is_empty() {
                    region.name = region_name.clone();
                }
            }
        }
    }

    /// Invariant violations in a catalog that did not come through [`insert_region`](Self::insert_region).
    ///
    /// Reports regions without a code and names already used by an earlier region
    /// (lookups by name resolve to that earlier one).
    pub fn violations(&self) -> Vec<CatalogError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let mut found = Vec::new();

        for region in self.regions() {
            if region.code.trim().is_empty() {
                found.push(CatalogError::EmptyCode(region.name.clone()));
            }
            match seen.get(region.name.as_str()) {
                Some(existing_group) => found.push(CatalogError::DuplicateRegion {
                    name: region.name.clone(),
                    existing_group: existing_group.to_string(),
                }),
                None => {
                    seen.insert(&region.name, &region.parent_group);
                }
            }
        }
        found
    }

    /// Add a group (or update its code) without touching its regions.
    pub fn add_group(&mut self, name: &str, code: &str) {
        let group = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| RegionGroup {
                name: name.to_string(),
                ..RegionGroup::default()
            });
        if !code.is_empty() {
            group.code = code.to_string();
        }
    }

    /// Insert a region, enforcing a non-empty code and catalog-wide name uniqueness.
    pub fn insert_region(&mut self, group: &str, name: &str, code: &str) -> Result<(), CatalogError> {
        if code.trim().is_empty() {
            return Err(CatalogError::EmptyCode(name.to_string()));
        }
        if let Some(existing) = self.get(name) {
            return Err(CatalogError::DuplicateRegion {
                name: name.to_string(),
                existing_group: existing.parent_group.clone(),
            });
        }

        // Group code follows the administrative convention: first two digits + "0000"
        let derived_group_code = if code.len() >= 2 && code.chars().all(|c| c.is_ascii_digit()) {
            format!("{}0000", &code[..2])
        } else {
            String::new()
        };

        let entry = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| RegionGroup {
                name: group.to_string(),
                code: derived_group_code,
                cities: IndexMap::new(),
            });
        entry
            .cities
            .insert(name.to_string(), Region::new(name, code, group));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.groups.values().find_map(|g| g.cities.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.groups.values_mut().find_map(|g| g.cities.get_mut(name))
    }

    /// Resolve a region name to its provider code.
    pub fn resolve_code(&self, name: &str) -> Option<&str> {
        self.get(name)
            .map(|r| r.code.as_str())
            .filter(|code| !code.is_empty())
    }

    /// Name of the group a region belongs to.
    pub fn group_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|r| r.parent_group.as_str())
    }

    /// Name of the group holding a region with the given code.
    pub fn group_for_code(&self, code: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, g)| g.cities.values().any(|r| r.code == code))
            .map(|(name, _)| name.as_str())
    }

    /// Mark a region queried at `now`, returning its new query count.
    pub fn mark_queried(&mut self, name: &str, now: NaiveDateTime) -> Result<u32, CatalogError> {
        let region = self
            .get_mut(name)
            .ok_or_else(|| CatalogError::UnknownRegion(name.to_string()))?;
        region.mark_queried(now);
        Ok(region.query_count)
    }

    pub fn reset(&mut self, name: &str) -> Result<(), CatalogError> {
        let region = self
            .get_mut(name)
            .ok_or_else(|| CatalogError::UnknownRegion(name.to_string()))?;
        region.reset();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for region in self.groups.values_mut().flat_map(|g| g.cities.values_mut()) {
            region.reset();
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &RegionGroup> {
        self.groups.values()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.groups.values().flat_map(|g| g.cities.values())
    }

    pub fn regions_in_group(&self, group: &str) -> Vec<&Region> {
        self.groups
            .get(group)
            .map(|g| g.cities.values().collect())
            .unwrap_or_default()
    }

    pub fn all_region_names(&self) -> Vec<String> {
        self.regions().map(|r| r.name.clone()).collect()
    }

    pub fn queried_names(&self) -> Vec<String> {
        self.regions()
            .filter(|r| r.queried)
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn unqueried_names(&self) -> Vec<String> {
        self.regions()
            .filter(|r| !r.queried)
            .map(|r| r.name.clone())
            .collect()
    }

    /// First region (in catalog order) that has not been queried yet.
    pub fn next_unqueried(&self) -> Option<&str> {
        self.regions().find(|r| !r.queried).map(|r| r.name.as_str())
    }

    pub fn total_regions(&self) -> usize {
        self.groups.values().map(|g| g.cities.len()).sum()
    }

    pub fn queried_count(&self) -> usize {
        self.regions().filter(|r| r.queried).count()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_regions() == 0
    }
}

mod query_time {
    use super::QUERY_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(QUERY_TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => NaiveDateTime::parse_from_str(&s, QUERY_TIME_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
