//! Discriminator resolution.

use crate::automap::read_mapping_column;
use crate::column_set::{prepend_prefix, ResultSetWrapper};
use crate::handler::ResultSetHandler;
use resultmap_core::error::{Error, Result};
use resultmap_core::Value;
use resultmap_mapping::{Discriminator, ResultMap};
use std::collections::HashSet;
use std::sync::Arc;

impl ResultSetHandler<'_> {
    /// Follow discriminators from `result_map` to the most specific map for
    /// the current row.
    ///
    /// Stops at an unregistered case target, at a map whose discriminator is
    /// the one just applied, and at a map already visited on this row.
    pub(crate) fn resolve_discriminated_result_map(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        column_prefix: Option<&str>,
    ) -> Result<Arc<ResultMap>> {
        let mut past_discriminators = HashSet::new();
        let mut current = Arc::clone(result_map);
        loop {
            let Some(discriminator) = current.discriminator() else {
                break;
            };
            let value = self.discriminator_value(rsw, discriminator, column_prefix)?;
            let Some(map_id) = discriminator
                .map_id_for(&value.to_display_string())
                .map(str::to_string)
            else {
                break;
            };
            if !self.config.has_result_map(&map_id) {
                tracing::debug!(
                    result_map = current.id(),
                    target = %map_id,
                    "discriminator case names an unknown result map"
                );
                break;
            }
            let next = self.config.result_map(&map_id)?;
            let previous = std::mem::replace(&mut current, next);
            if current.discriminator() == previous.discriminator() || !past_discriminators.insert(map_id) {
                tracing::debug!(
                    result_map = current.id(),
                    "discriminator chain revisits a result map, stopping"
                );
                break;
            }
        }
        Ok(current)
    }

    fn discriminator_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        discriminator: &Discriminator,
        column_prefix: Option<&str>,
    ) -> Result<Value> {
        let mapping = discriminator.mapping();
        let column = mapping
            .column_name()
            .ok_or_else(|| Error::config("discriminator names no column"))?;
        let column = prepend_prefix(column, column_prefix);
        read_mapping_column(rsw, &self.config, mapping, &column, None)
    }
}
