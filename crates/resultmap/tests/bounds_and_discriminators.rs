use resultmap::prelude::*;
use std::sync::Arc;

fn numbers(n: i64) -> MemoryCursor {
    MemoryCursor::new(["id"], (0..n).map(|i| vec![Value::BigInt(i)]).collect())
}

fn config() -> Arc<Configuration> {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Number", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .build()
                .expect("number map"),
        )
        .expect("register number");
    config
        .add_result_map(
            ResultMap::builder("Group", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::collection("members", "Number").column_prefix("m_"))
                .build()
                .expect("group map"),
        )
        .expect("register group");
    Arc::new(config)
}

fn materialize_ids(cursor: &mut MemoryCursor, map_id: &str, bounds: RowBounds) -> Result<Vec<i64>> {
    let config = config();
    let statement = Arc::new(MappedStatement::new("numbers").result_map(map_id));
    let mut handler = ResultSetHandler::new(Arc::clone(&config), statement);
    let map = config.result_map(map_id)?;
    let mut sink = DefaultResultHandler::new();
    handler.materialize(cursor, &map, bounds, &mut sink)?;
    sink.results()
        .iter()
        .map(|slot| handler.graph().deserialize::<serde_json::Value>(slot))
        .map(|json| json.map(|j| j["id"].as_i64().unwrap_or(-1)))
        .collect()
}

#[test]
fn test_row_bounds_on_forward_only_cursor() {
    let ids = materialize_ids(&mut numbers(30), "Number", RowBounds::new(5, 10)).expect("materialize");
    assert_eq!(ids, (5..15).collect::<Vec<_>>());
}

#[test]
fn test_row_bounds_on_scrollable_cursor() {
    let mut cursor = numbers(30).scrollable();
    let ids = materialize_ids(&mut cursor, "Number", RowBounds::new(5, 10)).expect("materialize");
    assert_eq!(ids, (5..15).collect::<Vec<_>>());
}

#[test]
fn test_row_bounds_past_the_end() {
    let ids = materialize_ids(&mut numbers(7), "Number", RowBounds::new(5, 10)).expect("materialize");
    assert_eq!(ids, vec![5, 6]);
}

#[test]
fn test_row_bounds_rejected_for_nested_maps() {
    let err = materialize_ids(&mut numbers(30), "Group", RowBounds::new(5, 10)).unwrap_err();
    assert!(err.is_config_error());
}

#[test]
fn test_cursor_is_closed_after_materialize() {
    let mut cursor = numbers(3);
    materialize_ids(&mut cursor, "Number", RowBounds::default()).expect("materialize");
    assert!(resultmap::ResultCursor::is_closed(&cursor));

    let mut cursor = numbers(3);
    materialize_ids(&mut cursor, "Group", RowBounds::new(1, 1)).unwrap_err();
    assert!(resultmap::ResultCursor::is_closed(&cursor));
}

/// Records the running count and stops after `stop_after` objects.
struct CountingSink {
    seen: Vec<usize>,
    stop_after: usize,
}

impl ResultHandler for CountingSink {
    fn handle_result(&mut self, context: &ResultContext<'_>) -> SinkControl {
        self.seen.push(context.result_count());
        if context.result_count() == self.stop_after {
            SinkControl::Stop
        } else {
            SinkControl::Continue
        }
    }
}

#[test]
fn test_sink_can_stop_early() {
    let config = config();
    let statement = Arc::new(MappedStatement::new("numbers").result_map("Number"));
    let mut handler = ResultSetHandler::new(Arc::clone(&config), statement);
    let map = config.result_map("Number").expect("map");
    let mut sink = CountingSink { seen: Vec::new(), stop_after: 3 };
    handler
        .materialize(&mut numbers(10), &map, RowBounds::default(), &mut sink)
        .expect("materialize");
    assert_eq!(sink.seen, vec![1, 2, 3]);
}

#[test]
fn test_custom_sink_rejected_for_unordered_nested_maps() {
    let config = config();
    let statement = Arc::new(MappedStatement::new("groups").result_map("Group"));
    let mut handler = ResultSetHandler::new(Arc::clone(&config), statement);
    let map = config.result_map("Group").expect("map");
    let mut sink = CountingSink { seen: Vec::new(), stop_after: 0 };
    let err = handler
        .materialize(&mut numbers(3), &map, RowBounds::default(), &mut sink)
        .unwrap_err();
    assert!(err.is_config_error());
    assert!(sink.seen.is_empty());
}

fn vehicle_config() -> Arc<Configuration> {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Vehicle", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("kind", "kind"))
                .discriminator(Discriminator::new("kind").case("car", "Car").case("truck", "Truck"))
                .auto_mapping(false)
                .build()
                .expect("vehicle map"),
        )
        .expect("register vehicle");
    config
        .add_result_map(
            ResultMap::builder("Car", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("kind", "kind"))
                .mapping(ResultMapping::column("doors", "doors"))
                .auto_mapping(false)
                .build()
                .expect("car map"),
        )
        .expect("register car");
    config
        .add_statement(MappedStatement::new("selectVehicles").result_map("Vehicle"))
        .expect("register statement");
    Arc::new(config)
}

#[test]
fn test_discriminator_picks_map_per_row() {
    let config = vehicle_config();
    let mut rows = MemoryStatement::new([MemoryCursor::new(
        ["id", "kind", "doors"],
        vec![
            vec![Value::BigInt(1), Value::Text("car".into()), Value::Int(4)],
            // No map is registered for "truck" and nothing at all for "boat"
            vec![Value::BigInt(2), Value::Text("truck".into()), Value::Int(2)],
            vec![Value::BigInt(3), Value::Text("boat".into()), Value::Null],
        ],
    )]);
    let result = handle_statement(&config, "selectVehicles", &mut rows).expect("materialize");
    assert_eq!(
        result.to_json(),
        serde_json::json!([
            {"id": 1, "kind": "car", "doors": 4},
            {"id": 2, "kind": "truck"},
            {"id": 3, "kind": "boat"}
        ])
    );
}
