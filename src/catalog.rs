//! Boundary to the parts catalog.
//!
//! Recognition only emits marker ids; names and prices belong to whatever
//! catalog the caller plugs in.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MarkerError;
use crate::models::PartMarker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Resolves marker ids to catalog entries
pub trait PartsCatalog {
    /// `None` means the id is unknown to the catalog
    fn lookup(&self, id: &str) -> Option<&PartRecord>;
}

/// Catalog held in memory, typically loaded from a JSON array of records
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    records: HashMap<String, PartRecord>,
}

impl InMemoryCatalog {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PartRecord>,
    {
        Self {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, MarkerError> {
        let records: Vec<PartRecord> =
            serde_json::from_str(text).map_err(|e| MarkerError::Catalog(e.to_string()))?;
        Ok(Self::from_records(records))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MarkerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PartsCatalog for InMemoryCatalog {
    fn lookup(&self, id: &str) -> Option<&PartRecord> {
        self.records.get(id)
    }
}

/// Pair each marker with its catalog entry, if any
pub fn resolve<'a, C: PartsCatalog + ?Sized>(
    catalog: &'a C,
    markers: &'a [PartMarker],
) -> Vec<(&'a PartMarker, Option<&'a PartRecord>)> {
    markers.iter().map(|m| (m, catalog.lookup(&m.id))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, CoordinateSource};

    #[test]
    fn json_catalog_resolves_known_ids() {
        let catalog = InMemoryCatalog::from_json(
            r#"[{"id": "16", "name": "Cylinder block", "price": 1250.0},
                {"id": "24", "name": "Thermostat"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);

        let markers = vec![
            PartMarker {
                id: "24".into(),
                bbox: BoundingBox::new(0, 0, 10, 10),
                confidence: 0.9,
                source: CoordinateSource::Measured,
            },
            PartMarker {
                id: "99".into(),
                bbox: BoundingBox::new(0, 0, 10, 10),
                confidence: 0.9,
                source: CoordinateSource::Measured,
            },
        ];
        let resolved = resolve(&catalog, &markers);
        assert_eq!(resolved[0].1.map(|r| r.name.as_str()), Some("Thermostat"));
        assert_eq!(resolved[0].1.and_then(|r| r.price), None);
        assert!(resolved[1].1.is_none());
    }

    #[test]
    fn malformed_json_is_a_catalog_error() {
        assert!(matches!(
            InMemoryCatalog::from_json("{not json"),
            Err(MarkerError::Catalog(_))
        ));
    }
}
