use crate::model::{Path, PathSegment, Property, StructuredType};
use tracing::trace;

/// Target of a resource path: the selected property, the structured type
/// owning it and the name used to refer to the target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathContext {
    pub property: Option<Property>,
    pub structured_type: Option<StructuredType>,
    pub name: Option<String>,
}

impl PathContext {
    pub fn is_resolved(&self) -> bool {
        self.name.is_some()
    }
}

/// Walks `path` against its model. Paths that don't fit the model resolve
/// to an empty context rather than an error.
pub fn resolve(path: &Path) -> PathContext {
    match walk(path) {
        Some(ctx) => ctx,
        None => {
            trace!(segments = path.segments.len(), "path does not resolve against the model");
            PathContext::default()
        }
    }
}

fn walk(path: &Path) -> Option<PathContext> {
    let model = &path.model;
    let mut current: Option<&StructuredType> = None;
    let mut out = PathContext::default();
    let mut base_name: Option<String> = None;

    for segment in &path.segments {
        match segment {
            PathSegment::NavigationSource(name) => {
                if current.is_some() {
                    return None;
                }
                let source = model.find_navigation_source(name)?;
                let ty = model.find_type(&source.entity_type)?;
                current = Some(ty);
                out.property = None;
                out.structured_type = Some(ty.clone());
                base_name = Some(source.name.clone());
                out.name = base_name.clone();
            }
            PathSegment::Property(name) | PathSegment::Navigation(name) => {
                let owner = current?;
                let property = model.find_property(owner, name)?;
                if matches!(segment, PathSegment::Navigation(_)) && !property.navigation {
                    return None;
                }
                out.property = Some(property.clone());
                out.structured_type = Some(owner.clone());
                base_name = Some(property.name.clone());
                out.name = base_name.clone();
                // primitives end the structural walk; a further property fails above
                current = None;
                if let Some(next) = model.property_type(property) {
                    current = Some(next);
                }
            }
            PathSegment::TypeCast(name) => {
                let ty = model.find_type(name)?;
                current = Some(ty);
                out.structured_type = Some(ty.clone());
                out.name = base_name.as_ref().map(|b| format!("{b}/{name}"));
            }
            PathSegment::Key(_) | PathSegment::Count | PathSegment::Value => {}
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, Property, StructuredType};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn model() -> Arc<Model> {
        Arc::new(
            Model::new()
                .with_type(StructuredType::entity(
                    "NS.Product",
                    vec![
                        Property::new("Name", "Edm.String"),
                        Property::new("Category", "Edm.String"),
                        Property::new("Address", "NS.Address"),
                        Property::navigation("Supplier", "NS.Supplier", false),
                    ],
                ))
                .with_type(StructuredType::entity("NS.SpecialProduct", vec![]).derived_from("NS.Product"))
                .with_type(StructuredType::complex("NS.Address", vec![Property::new("City", "Edm.String")]))
                .with_type(StructuredType::entity("NS.Supplier", vec![Property::new("Name", "Edm.String")]))
                .with_entity_set("Products", "NS.Product"),
        )
    }

    fn resolve_text(text: &str) -> PathContext {
        resolve(&Path::parse(model(), text))
    }

    #[test]
    fn empty_path_is_unresolved() {
        assert_eq!(resolve_text(""), PathContext::default());
    }

    #[test]
    fn entity_set_resolves_to_its_type() {
        let ctx = resolve_text("Products");
        assert_eq!(ctx.name.as_deref(), Some("Products"));
        assert!(ctx.property.is_none());
        assert_eq!(ctx.structured_type.unwrap().name, "NS.Product");
    }

    #[test]
    fn property_after_key_selects_property_and_owner() {
        let ctx = resolve_text("Products(1)/Address/City");
        assert_eq!(ctx.name.as_deref(), Some("City"));
        assert_eq!(ctx.property.unwrap().name, "City");
        assert_eq!(ctx.structured_type.unwrap().name, "NS.Address");
    }

    #[test]
    fn navigation_then_count_keeps_navigation_target() {
        let ctx = resolve_text("Products(1)/Supplier/$count");
        assert_eq!(ctx.name.as_deref(), Some("Supplier"));
        assert_eq!(ctx.structured_type.unwrap().name, "NS.Product");
    }

    #[test]
    fn type_cast_suffixes_the_name() {
        let ctx = resolve_text("Products/NS.SpecialProduct");
        assert_eq!(ctx.name.as_deref(), Some("Products/NS.SpecialProduct"));
        assert_eq!(ctx.structured_type.unwrap().name, "NS.SpecialProduct");
    }

    #[test]
    fn inconsistent_paths_degrade_to_absent() {
        assert!(!resolve_text("Orders").is_resolved());
        assert!(!resolve_text("Products(1)/Missing").is_resolved());
        assert!(!resolve_text("Products(1)/Name/Length").is_resolved());
        assert!(!resolve_text("Products/NS.Unknown").is_resolved());
    }
}
