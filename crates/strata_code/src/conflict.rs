//! Detection of unit names duplicated across artifact-set layers.
//!
//! Pure functions, recomputed on demand: no caching, no locking. The only
//! external touch is the fallback existence probe, which the caller
//! supplies as a closure over whatever base scope it designates.

use crate::artifact::ArtifactSet;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps every unit name to the layers that contain it, in layer order.
pub fn all_unit_names_map(
    layers: &[Arc<ArtifactSet>],
) -> BTreeMap<String, Vec<Arc<ArtifactSet>>> {
    let mut origins: BTreeMap<String, Vec<Arc<ArtifactSet>>> = BTreeMap::new();
    for layer in layers {
        for name in layer.all_unit_names() {
            origins
                .entry(name.to_string())
                .or_default()
                .push(Arc::clone(layer));
        }
    }
    origins
}

/// Maps each unit name that occurs in more than one layer to those layers.
pub fn duplicate_unit_names_map(
    layers: &[Arc<ArtifactSet>],
) -> BTreeMap<String, Vec<Arc<ArtifactSet>>> {
    all_unit_names_map(layers)
        .into_iter()
        .filter(|(_, origins)| origins.len() > 1)
        .collect()
}

/// Maps each unit name that also resolves through the fallback scope to the
/// layers containing it.
///
/// The probe is a name-to-existence check against the designated fallback;
/// every name in the layers is probed.
pub fn unit_names_in_fallback_map(
    layers: &[Arc<ArtifactSet>],
    probe: &dyn Fn(&str) -> bool,
) -> BTreeMap<String, Vec<Arc<ArtifactSet>>> {
    all_unit_names_map(layers)
        .into_iter()
        .filter(|(name, _)| probe(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;

    fn layer(sources_name: &str, unit_names: &[&str]) -> Arc<ArtifactSet> {
        let mut builder = ArtifactSet::builder(sources_name, 0);
        for name in unit_names {
            builder = builder.artifact(Artifact::new(*name, b"p".as_slice()));
        }
        Arc::new(builder.build())
    }

    #[test]
    fn all_names_keep_layer_order() {
        let layers = vec![layer("l1", &["Twice", "Only1"]), layer("l2", &["Twice"])];
        let map = all_unit_names_map(&layers);
        assert_eq!(map.len(), 2);
        let twice = &map["Twice"];
        assert_eq!(twice.len(), 2);
        assert_eq!(twice[0].sources_name(), "l1");
        assert_eq!(twice[1].sources_name(), "l2");
    }

    #[test]
    fn duplicates_only_multi_layer_names() {
        let layers = vec![layer("l1", &["Twice", "Only1"]), layer("l2", &["Twice"])];
        let map = duplicate_unit_names_map(&layers);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Twice"));
        assert!(!map.contains_key("Only1"));
    }

    #[test]
    fn no_duplicates_yields_empty_map() {
        let layers = vec![layer("l1", &["A"]), layer("l2", &["B"])];
        assert!(duplicate_unit_names_map(&layers).is_empty());
    }

    #[test]
    fn fallback_probe_filters_names() {
        let layers = vec![layer("l1", &["File", "Fresh"])];
        let map = unit_names_in_fallback_map(&layers, &|name| name == "File");
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("File"));
    }

    #[test]
    fn empty_layers_empty_maps() {
        let layers: Vec<Arc<ArtifactSet>> = Vec::new();
        assert!(all_unit_names_map(&layers).is_empty());
        assert!(duplicate_unit_names_map(&layers).is_empty());
        assert!(unit_names_in_fallback_map(&layers, &|_| true).is_empty());
    }
}
