//! Result maps and discriminators.

use crate::result_mapping::ResultMapping;
use resultmap_core::error::{Error, Result};
use resultmap_core::TargetType;
use std::collections::HashSet;

/// Picks a more specific result map from the value of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    mapping: ResultMapping,
    cases: Vec<(String, String)>,
}

impl Discriminator {
    /// Discriminate on `column`, compared in its textual form.
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            mapping: ResultMapping::column(column.clone(), column),
            cases: Vec::new(),
        }
    }

    /// Discriminate on a fully specified mapping (type, converter).
    pub fn with_mapping(mapping: ResultMapping) -> Self {
        Self {
            mapping,
            cases: Vec::new(),
        }
    }

    /// Rows whose column reads `value` use the result map `result_map_id`.
    pub fn case(mut self, value: impl Into<String>, result_map_id: impl Into<String>) -> Self {
        self.cases.push((value.into(), result_map_id.into()));
        self
    }

    pub fn mapping(&self) -> &ResultMapping {
        &self.mapping
    }

    pub fn cases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cases.iter().map(|(v, id)| (v.as_str(), id.as_str()))
    }

    /// Result map id for a stringified column value.
    pub fn map_id_for(&self, value: &str) -> Option<&str> {
        self.cases
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, id)| id.as_str())
    }

    fn validate(&self, owner: &str) -> Result<()> {
        if self.mapping.column_name().is_none() {
            return Err(Error::config(format!(
                "discriminator of result map '{}' names no column",
                owner
            )));
        }
        let mut seen = HashSet::new();
        for (value, _) in &self.cases {
            if !seen.insert(value.as_str()) {
                return Err(Error::config(format!(
                    "duplicate discriminator target '{}' in result map '{}'",
                    value, owner
                )));
            }
        }
        Ok(())
    }
}

/// How rows of one shape become objects of one type.
///
/// Immutable once built; the derived id, constructor and property mapping
/// lists and the upper-cased mapped column set are computed once here.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMap {
    id: String,
    ty: TargetType,
    mappings: Vec<ResultMapping>,
    id_mappings: Vec<ResultMapping>,
    constructor_mappings: Vec<ResultMapping>,
    property_mappings: Vec<ResultMapping>,
    mapped_columns: HashSet<String>,
    mapped_properties: HashSet<String>,
    discriminator: Option<Discriminator>,
    has_nested_result_maps: bool,
    has_nested_queries: bool,
    auto_mapping: Option<bool>,
}

impl ResultMap {
    pub fn builder(id: impl Into<String>, ty: TargetType) -> ResultMapBuilder {
        ResultMapBuilder {
            id: id.into(),
            ty,
            mappings: Vec::new(),
            discriminator: None,
            auto_mapping: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ty(&self) -> &TargetType {
        &self.ty
    }

    pub fn mappings(&self) -> &[ResultMapping] {
        &self.mappings
    }

    /// Mappings forming the row identity: the id-flagged ones, or all of
    /// them when none is flagged.
    pub fn id_mappings(&self) -> &[ResultMapping] {
        &self.id_mappings
    }

    pub fn constructor_mappings(&self) -> &[ResultMapping] {
        &self.constructor_mappings
    }

    pub fn property_mappings(&self) -> &[ResultMapping] {
        &self.property_mappings
    }

    /// Upper-cased names of every column some mapping reads.
    pub fn mapped_columns(&self) -> &HashSet<String> {
        &self.mapped_columns
    }

    pub fn mapped_properties(&self) -> &HashSet<String> {
        &self.mapped_properties
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn has_nested_result_maps(&self) -> bool {
        self.has_nested_result_maps
    }

    pub fn has_nested_queries(&self) -> bool {
        self.has_nested_queries
    }

    /// Per-map automapping override; `None` defers to the settings.
    pub fn auto_mapping(&self) -> Option<bool> {
        self.auto_mapping
    }

    pub(crate) fn mark_nested_result_maps(&mut self) {
        self.has_nested_result_maps = true;
    }
}

/// Builder for [`ResultMap`].
#[derive(Debug, Clone)]
pub struct ResultMapBuilder {
    id: String,
    ty: TargetType,
    mappings: Vec<ResultMapping>,
    discriminator: Option<Discriminator>,
    auto_mapping: Option<bool>,
}

impl ResultMapBuilder {
    pub fn mapping(mut self, mapping: ResultMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn mappings(mut self, mappings: impl IntoIterator<Item = ResultMapping>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    /// Force automapping on or off for this map.
    pub fn auto_mapping(mut self, enabled: bool) -> Self {
        self.auto_mapping = Some(enabled);
        self
    }

    /// Validate the mappings and compute the derived data.
    pub fn build(self) -> Result<ResultMap> {
        if self.id.is_empty() {
            return Err(Error::config("result map id must not be empty"));
        }
        let mut id_mappings = Vec::new();
        let mut constructor_mappings = Vec::new();
        let mut property_mappings = Vec::new();
        let mut mapped_columns = HashSet::new();
        let mut mapped_properties = HashSet::new();
        let mut has_nested_result_maps = false;
        let mut has_nested_queries = false;

        for mapping in &self.mappings {
            mapping.validate().map_err(|msg| {
                Error::config(format!("result map '{}': {}", self.id, msg))
            })?;
            has_nested_queries |= mapping.nested_query_id().is_some();
            has_nested_result_maps |=
                mapping.nested_result_map_id().is_some() && mapping.result_set_name().is_none();

            if let Some(column) = mapping.column_name() {
                mapped_columns.insert(column.to_uppercase());
            } else if mapping.is_composite() {
                for composite in mapping.composites() {
                    if let Some(column) = composite.column_name() {
                        mapped_columns.insert(column.to_uppercase());
                    }
                }
            }
            if let Some(property) = mapping.property() {
                mapped_properties.insert(property.to_string());
            }
            if mapping.is_constructor() {
                constructor_mappings.push(mapping.clone());
            } else {
                property_mappings.push(mapping.clone());
            }
            if mapping.is_id() {
                id_mappings.push(mapping.clone());
            }
        }
        if id_mappings.is_empty() {
            id_mappings.clone_from(&self.mappings);
        }
        if let Some(discriminator) = &self.discriminator {
            discriminator.validate(&self.id)?;
        }

        Ok(ResultMap {
            id: self.id,
            ty: self.ty,
            mappings: self.mappings,
            id_mappings,
            constructor_mappings,
            property_mappings,
            mapped_columns,
            mapped_properties,
            discriminator: self.discriminator,
            has_nested_result_maps,
            has_nested_queries,
            auto_mapping: self.auto_mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> ResultMap {
        ResultMap::builder("Parent", TargetType::named("Parent"))
            .mapping(ResultMapping::id("id", "pid"))
            .mapping(ResultMapping::column("name", "pname"))
            .mapping(ResultMapping::collection("children", "Child").column_prefix("c_"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_derived_sets() {
        let map = parent();
        assert_eq!(map.id_mappings().len(), 1);
        assert_eq!(map.property_mappings().len(), 3);
        assert!(map.mapped_columns().contains("PID"));
        assert!(map.mapped_columns().contains("PNAME"));
        assert!(map.mapped_properties().contains("children"));
        assert!(map.has_nested_result_maps());
        assert!(!map.has_nested_queries());
    }

    #[test]
    fn test_all_mappings_are_ids_without_flags() {
        let map = ResultMap::builder("Tag", TargetType::named("Tag"))
            .mapping(ResultMapping::column("a", "a"))
            .mapping(ResultMapping::column("b", "b"))
            .build()
            .unwrap();
        assert_eq!(map.id_mappings().len(), 2);
    }

    #[test]
    fn test_constructor_mappings_split() {
        let map = ResultMap::builder("Point", TargetType::named("Point"))
            .mapping(ResultMapping::arg("x"))
            .mapping(ResultMapping::arg("y"))
            .mapping(ResultMapping::column("label", "label"))
            .build()
            .unwrap();
        assert_eq!(map.constructor_mappings().len(), 2);
        assert_eq!(map.property_mappings().len(), 1);
    }

    #[test]
    fn test_composite_columns_are_mapped() {
        let map = ResultMap::builder("Post", TargetType::named("Post"))
            .mapping(ResultMapping::composite_query(
                "author",
                "selectAuthor",
                [("id", "author_id"), ("kind", "author_kind")],
            ))
            .build()
            .unwrap();
        assert!(map.mapped_columns().contains("AUTHOR_ID"));
        assert!(map.mapped_columns().contains("AUTHOR_KIND"));
        assert!(map.has_nested_queries());
    }

    #[test]
    fn test_duplicate_discriminator_target_rejected() {
        let err = ResultMap::builder("Vehicle", TargetType::named("Vehicle"))
            .mapping(ResultMapping::id("id", "id"))
            .discriminator(Discriminator::new("kind").case("1", "Car").case("1", "Truck"))
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_result_set_mapping_is_not_a_join() {
        let map = ResultMap::builder("Blog", TargetType::named("Blog"))
            .mapping(ResultMapping::id("id", "id"))
            .mapping(
                ResultMapping::collection("posts", "Post")
                    .on_column("id")
                    .result_set("posts")
                    .foreign_column("blog_id"),
            )
            .build()
            .unwrap();
        assert!(!map.has_nested_result_maps());
    }

    #[test]
    fn test_empty_id_and_bad_mappings_rejected() {
        let err = ResultMap::builder("", TargetType::Map).build().unwrap_err();
        assert!(err.is_config_error());

        let err = ResultMap::builder("Bad", TargetType::Map)
            .mapping(ResultMapping::column("x", "x").result_set("s"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("result map 'Bad'"));
    }
}
