//! Flat result maps: one row, one object.

use crate::column_set::ResultSetWrapper;
use crate::context::{DeliveryState, RowBounds};
use crate::handler::{ResultSetHandler, RowTarget};
use resultmap_core::error::Result;
use resultmap_core::Slot;
use resultmap_mapping::ResultMap;
use std::sync::Arc;

impl ResultSetHandler<'_> {
    pub(crate) fn handle_row_values_for_simple_result_map(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        target: &mut RowTarget<'_>,
        row_bounds: RowBounds,
    ) -> Result<()> {
        let mut state = DeliveryState::default();
        Self::skip_rows(rsw, row_bounds)?;
        while state.should_process_more_rows(row_bounds) && !rsw.is_closed() && rsw.advance()? {
            let discriminated = self.resolve_discriminated_result_map(rsw, result_map, None)?;
            let row_value = self.get_row_value(rsw, &discriminated, None)?;
            self.store_object(rsw, target, &mut state, &row_value)?;
        }
        tracing::trace!(rows = state.count, result_map = result_map.id(), "simple result map done");
        Ok(())
    }

    /// Build the object of the current row.
    ///
    /// Returns a null slot when the row produced nothing and empty instances
    /// are not requested.
    pub(crate) fn get_row_value(
        &mut self,
        rsw: &mut ResultSetWrapper<'_>,
        result_map: &Arc<ResultMap>,
        column_prefix: Option<&str>,
    ) -> Result<Slot> {
        let row_value = self.create_result_object(rsw, result_map, column_prefix)?;
        let Some(id) = row_value.as_object() else {
            return Ok(row_value);
        };
        if self.has_converter_for_result_object(rsw, result_map.ty()) {
            return Ok(row_value);
        }

        let mut found_values = self.use_constructor_mappings;
        if self.config.should_auto_map(result_map, false) {
            found_values = self.apply_automatic_mappings(rsw, result_map, id, column_prefix)? || found_values;
        }
        found_values = self.apply_property_mappings(rsw, result_map, id, column_prefix)? || found_values;

        if found_values || self.config.settings().return_instance_for_empty_row {
            Ok(row_value)
        } else {
            Ok(Slot::null())
        }
    }
}
