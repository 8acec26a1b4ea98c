//! ---
//! sfb_section: "02-telemetry-normalization"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Telemetry validation, identity resolution and coercion."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use std::collections::HashMap;

use sfb_common::{canonical_device_identity, AppConfig};

use crate::record::FactoryId;

/// Factory a device reports for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryRef {
    /// Registry identifier.
    pub id: FactoryId,
    /// Configuration key of the factory.
    pub slug: String,
}

/// Static device identity to factory map.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    devices: HashMap<String, FactoryRef>,
}

impl IdentityMap {
    /// Build the map from validated configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let entries = config.factories.iter().flat_map(|(slug, factory)| {
            factory.devices.iter().map(move |device| {
                (
                    device.as_str(),
                    FactoryRef {
                        id: FactoryId(factory.id),
                        slug: slug.clone(),
                    },
                )
            })
        });
        Self::from_entries(entries)
    }

    /// Build the map from raw `(device, factory)` pairs. Later entries win.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, FactoryRef)>,
    {
        let devices = entries
            .into_iter()
            .map(|(device, factory)| (canonical_device_identity(device), factory))
            .collect();
        Self { devices }
    }

    /// Resolve a raw identity, tolerant of case and separator style.
    pub fn resolve(&self, raw: &str) -> Option<&FactoryRef> {
        self.devices.get(&canonical_device_identity(raw))
    }

    /// Number of mapped devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is mapped.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_regardless_of_separator_and_case() {
        let map = IdentityMap::from_entries([(
            "00:1A:2B:3C:4D:5E",
            FactoryRef {
                id: FactoryId(1),
                slug: "factory_1".into(),
            },
        )]);
        assert_eq!(map.resolve("00-1a-2b-3c-4d-5e").map(|f| f.id), Some(FactoryId(1)));
        assert_eq!(map.resolve(" 00:1A:2B:3C:4D:5E ").map(|f| f.id), Some(FactoryId(1)));
        assert!(map.resolve("00:1a:2b:3c:4d:5f").is_none());
    }
}
