//! Mapped statements.

use resultmap_core::TargetType;

/// The mapping side of one executable statement.
///
/// The statement names the result maps applied to its physical result sets
/// in order, and the names of auxiliary result sets that feed
/// `result_set`-linked mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedStatement {
    id: String,
    result_maps: Vec<String>,
    result_ordered: bool,
    result_sets: Vec<String>,
    parameter_type: Option<TargetType>,
}

impl MappedStatement {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result_maps: Vec::new(),
            result_ordered: false,
            result_sets: Vec::new(),
            parameter_type: None,
        }
    }

    /// Append a result map applied to the next physical result set.
    pub fn result_map(mut self, id: impl Into<String>) -> Self {
        self.result_maps.push(id.into());
        self
    }

    /// Rows arrive grouped by parent identity, so a parent is complete as
    /// soon as its key changes.
    pub fn ordered(mut self) -> Self {
        self.result_ordered = true;
        self
    }

    /// Names of the statement's result sets, in the order they arrive.
    pub fn result_sets<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.result_sets = names.into_iter().map(Into::into).collect();
        self
    }

    /// Type the parameter of this statement is converted to when it runs as
    /// a nested sub-query.
    pub fn parameter_type(mut self, ty: TargetType) -> Self {
        self.parameter_type = Some(ty);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn result_map_ids(&self) -> &[String] {
        &self.result_maps
    }

    pub fn is_result_ordered(&self) -> bool {
        self.result_ordered
    }

    pub fn result_set_names(&self) -> &[String] {
        &self.result_sets
    }

    pub fn declared_parameter_type(&self) -> Option<&TargetType> {
        self.parameter_type.as_ref()
    }
}
