//! Structural type model and addressable paths through it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Entity,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    /// Primitive name (`Edm.String`, ...) or the name of a structured type.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub navigation: bool,
}

impl Property {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            collection: false,
            navigation: false,
        }
    }

    pub fn navigation(name: &str, type_name: &str, collection: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            collection,
            navigation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredType {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl StructuredType {
    pub fn entity(name: &str, properties: Vec<Property>) -> Self {
        Self {
            name: name.to_string(),
            kind: TypeKind::Entity,
            base_type: None,
            properties,
        }
    }

    pub fn complex(name: &str, properties: Vec<Property>) -> Self {
        Self {
            name: name.to_string(),
            kind: TypeKind::Complex,
            base_type: None,
            properties,
        }
    }

    pub fn derived_from(mut self, base: &str) -> Self {
        self.base_type = Some(base.to_string());
        self
    }
}

/// Entity set or singleton exposed at the root of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationSource {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub singleton: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub types: Vec<StructuredType>,
    #[serde(default)]
    pub navigation_sources: Vec<NavigationSource>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, ty: StructuredType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn with_entity_set(mut self, name: &str, entity_type: &str) -> Self {
        self.navigation_sources.push(NavigationSource {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            singleton: false,
        });
        self
    }

    pub fn with_singleton(mut self, name: &str, entity_type: &str) -> Self {
        self.navigation_sources.push(NavigationSource {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            singleton: true,
        });
        self
    }

    pub fn find_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn find_navigation_source(&self, name: &str) -> Option<&NavigationSource> {
        self.navigation_sources.iter().find(|s| s.name == name)
    }

    /// Looks a property up on `ty`, then along its base-type chain.
    pub fn find_property<'a>(&'a self, ty: &'a StructuredType, name: &str) -> Option<&'a Property> {
        let mut current = Some(ty);
        // bounded by the number of types so a cyclic base chain cannot loop
        for _ in 0..=self.types.len() {
            let t = current?;
            if let Some(p) = t.properties.iter().find(|p| p.name == name) {
                return Some(p);
            }
            current = t.base_type.as_deref().and_then(|b| self.find_type(b));
        }
        None
    }

    /// The structured type a property yields, or `None` for primitives.
    pub fn property_type(&self, property: &Property) -> Option<&StructuredType> {
        self.find_type(&property.type_name)
    }
}

/// One step of an addressable route through the model.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    NavigationSource(String),
    Key(String),
    Property(String),
    Navigation(String),
    TypeCast(String),
    Count,
    Value,
}

/// A parsed resource path, bound to the model it addresses.
#[derive(Debug, Clone)]
pub struct Path {
    pub model: Arc<Model>,
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(model: Arc<Model>, segments: Vec<PathSegment>) -> Self {
        Self { model, segments }
    }

    /// Splits a resource path such as `Products(1)/Supplier/$count` into
    /// segments. Names are not checked against the model here.
    pub fn parse(model: Arc<Model>, text: &str) -> Self {
        let mut segments = Vec::new();
        let mut first = true;
        for raw in text.trim_matches('/').split('/').filter(|s| !s.is_empty()) {
            let (name, key) = match (raw.find('('), raw.ends_with(')')) {
                (Some(open), true) => (&raw[..open], Some(&raw[open + 1..raw.len() - 1])),
                _ => (raw, None),
            };
            let segment = match name {
                "$count" => PathSegment::Count,
                "$value" => PathSegment::Value,
                n if first => PathSegment::NavigationSource(n.to_string()),
                n if n.contains('.') => PathSegment::TypeCast(n.to_string()),
                n => PathSegment::Property(n.to_string()),
            };
            segments.push(segment);
            if let Some(k) = key {
                segments.push(PathSegment::Key(k.to_string()));
            }
            first = false;
        }
        Self { model, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_keys_casts_and_system_segments() {
        let path = Path::parse(Arc::new(Model::new()), "/Products(1)/NS.Special/Supplier/$count");
        assert_eq!(
            path.segments,
            vec![
                PathSegment::NavigationSource("Products".into()),
                PathSegment::Key("1".into()),
                PathSegment::TypeCast("NS.Special".into()),
                PathSegment::Property("Supplier".into()),
                PathSegment::Count,
            ]
        );
    }

    #[test]
    fn inherited_properties_are_found() {
        let model = Model::new()
            .with_type(StructuredType::entity("Base", vec![Property::new("Id", "Edm.Int32")]))
            .with_type(StructuredType::entity("Derived", vec![]).derived_from("Base"));
        let derived = model.find_type("Derived").unwrap();
        assert_eq!(model.find_property(derived, "Id").map(|p| p.name.as_str()), Some("Id"));
        assert!(model.find_property(derived, "Missing").is_none());
    }
}
