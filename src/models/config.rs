use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// User configuration from MapSearch Settings.yaml
///
/// Contains the search settings and the export field selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Search_Settings", default)]
    pub search_settings: SearchSettings,

    #[serde(rename = "Field_Settings", default)]
    pub field_settings: FieldSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// API keys separated by whitespace, used in order
    #[serde(rename = "API Keys", default)]
    pub api_keys: String,

    #[serde(rename = "Keywords", default)]
    pub keywords: String,

    #[serde(rename = "All Regions", default)]
    pub all_regions: bool,

    #[serde(rename = "Realtime Export", default = "default_realtime_export")]
    pub realtime_export: bool,

    #[serde(rename = "Realtime Export Path", default = "default_export_path")]
    pub realtime_export_path: String,

    #[serde(rename = "Auto Collect", default)]
    pub auto_collect: bool,

    #[serde(rename = "Auto Collect Times", default = "default_auto_collect_times")]
    pub auto_collect_times: String,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_keys: String::new(),
            keywords: String::new(),
            all_regions: false,
            realtime_export: default_realtime_export(),
            realtime_export_path: default_export_path(),
            auto_collect: false,
            auto_collect_times: default_auto_collect_times(),
            debug_mode: false,
        }
    }
}

impl SearchSettings {
    /// API keys in the order they will be tried.
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

fn default_realtime_export() -> bool {
    true
}

fn default_export_path() -> String {
    "poi_export.csv".to_string()
}

fn default_auto_collect_times() -> String {
    "6:00 18:00 24:00".to_string()
}

/// A provider field and whether it is exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub included: bool,
}

/// Ordered display-name → provider field mapping.
///
/// Order determines CSV column order; only included fields are exported or
/// displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSelection(IndexMap<String, FieldSpec>);

impl FieldSelection {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Build a selection where every listed field is included.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut selection = Self::new();
        for (display, key) in pairs {
            selection.insert(display, key, true);
        }
        selection
    }

    pub fn insert(&mut self, display: &str, key: &str, included: bool) {
        self.0.insert(
            display.to_string(),
            FieldSpec {
                key: key.to_string(),
                included,
            },
        );
    }

    pub fn set_included(&mut self, display: &str, included: bool) -> bool {
        match self.0.get_mut(display) {
            Some(spec) => {
                spec.included = included;
                true
            }
            None => false,
        }
    }

    /// Included fields as `(display name, provider key)` in selection order.
    pub fn selected(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter(|(_, spec)| spec.included)
            .map(|(display, spec)| (display.as_str(), spec.key.as_str()))
            .collect()
    }

    pub fn headers(&self) -> Vec<&str> {
        self.selected().into_iter().map(|(display, _)| display).collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.selected().into_iter().map(|(_, key)| key).collect()
    }

    pub fn has_selection(&self) -> bool {
        self.0.values().any(|spec| spec.included)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        let mut fields = Self::new();
        fields.insert("ID", "id", false);
        fields.insert("Name", "name", true);
        fields.insert("Type", "type", false);
        fields.insert("Type Code", "typecode", false);
        fields.insert("Address", "address", true);
        fields.insert("Location", "location", false);
        fields.insert("Phone", "tel", true);
        fields.insert("Website", "website", false);
        fields.insert("Email", "email", false);
        fields.insert("Province", "pname", true);
        fields.insert("City", "cityname", true);
        fields.insert("District", "adname", true);
        fields.insert("Entrance Location", "entr_location", false);
        fields.insert("Exit Location", "exit_location", false);
        fields
    }
}
