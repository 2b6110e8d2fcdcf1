use resultmap::prelude::*;
use resultmap::ObjectId;
use std::sync::Arc;

fn parent_child_config() -> Arc<Configuration> {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Parent", TargetType::Map)
                .mapping(ResultMapping::id("id", "pid"))
                .mapping(ResultMapping::column("name", "pname"))
                .mapping(ResultMapping::collection("children", "Child").not_null_columns(["cid"]))
                .build()
                .expect("parent map"),
        )
        .expect("register parent");
    config
        .add_result_map(
            ResultMap::builder("Child", TargetType::Map)
                .mapping(ResultMapping::id("id", "cid"))
                .build()
                .expect("child map"),
        )
        .expect("register child");
    config
        .add_statement(MappedStatement::new("selectParents").result_map("Parent"))
        .expect("register statement");
    config
        .add_statement(
            MappedStatement::new("selectParentsOrdered")
                .result_map("Parent")
                .ordered(),
        )
        .expect("register ordered statement");
    Arc::new(config)
}

fn parent_child_rows() -> MemoryStatement {
    MemoryStatement::new([MemoryCursor::new(
        ["pid", "pname", "cid"],
        vec![
            vec![Value::BigInt(1), Value::Text("A".into()), Value::BigInt(10)],
            vec![Value::BigInt(1), Value::Text("A".into()), Value::BigInt(11)],
            vec![Value::BigInt(2), Value::Text("B".into()), Value::Null],
        ],
    )])
}

fn expected_parents() -> serde_json::Value {
    serde_json::json!([
        {"id": 1, "name": "A", "children": [{"id": 10}, {"id": 11}]},
        {"id": 2, "name": "B", "children": []}
    ])
}

#[test]
fn test_parents_group_their_children() {
    let config = parent_child_config();
    let result = handle_statement(&config, "selectParents", &mut parent_child_rows()).expect("materialize");
    assert_eq!(result.to_json(), expected_parents());
    assert_eq!(result.first().len(), 2);
}

#[test]
fn test_ordered_results_match_unordered() {
    let config = parent_child_config();
    let result =
        handle_statement(&config, "selectParentsOrdered", &mut parent_child_rows()).expect("materialize");
    assert_eq!(result.to_json(), expected_parents());
}

#[test]
fn test_materializing_twice_is_structurally_equal() {
    let config = parent_child_config();
    let first = handle_statement(&config, "selectParents", &mut parent_child_rows()).expect("first run");
    let second = handle_statement(&config, "selectParents", &mut parent_child_rows()).expect("second run");
    assert_eq!(first.to_json(), second.to_json());
}

#[test]
fn test_identical_values_give_equal_keys() {
    let build = || {
        let mut key = CacheKey::new();
        key.update("Parent").unwrap();
        key.update("pid").unwrap();
        key.update(Value::BigInt(1)).unwrap();
        key
    };
    let first = build();
    let second = build();
    assert_eq!(first, second);
    assert!(!first.is_null());
    assert_ne!(first, CacheKey::NULL);
}

#[test]
fn test_deserialize_into_types() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Child {
        id: i64,
    }
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Parent {
        id: i64,
        name: String,
        children: Vec<Child>,
    }

    let config = parent_child_config();
    let result = handle_statement(&config, "selectParents", &mut parent_child_rows()).expect("materialize");
    let parents: Vec<Parent> = result.deserialize().expect("deserialize");
    assert_eq!(parents[0].children, vec![Child { id: 10 }, Child { id: 11 }]);
    assert_eq!(parents[1].name, "B");
    assert!(parents[1].children.is_empty());
}

fn blog_config() -> Arc<Configuration> {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Blog", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("title", "title"))
                .mapping(ResultMapping::collection("posts", "Post").column_prefix("post_"))
                .build()
                .expect("blog map"),
        )
        .expect("register blog");
    // Each post points back at the blog it belongs to
    config
        .add_result_map(
            ResultMap::builder("Post", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("subject", "subject"))
                .mapping(ResultMapping::association("blog", "Blog"))
                .build()
                .expect("post map"),
        )
        .expect("register post");
    config
        .add_statement(MappedStatement::new("selectBlog").result_map("Blog"))
        .expect("register statement");
    Arc::new(config)
}

#[test]
fn test_self_reference_links_the_ancestor() {
    let config = blog_config();
    let mut rows = MemoryStatement::new([MemoryCursor::new(
        ["id", "title", "post_id", "post_subject"],
        vec![
            vec![Value::BigInt(1), Value::Text("blog".into()), Value::BigInt(100), Value::Text("hello".into())],
            vec![Value::BigInt(1), Value::Text("blog".into()), Value::BigInt(101), Value::Text("again".into())],
        ],
    )]);
    let result = handle_statement(&config, "selectBlog", &mut rows).expect("materialize");
    let graph = result.graph();
    let blog: ObjectId = result.first()[0].as_object().expect("blog object");

    let posts = graph.get(blog).get("posts").and_then(Slot::as_object).expect("posts");
    let elements = graph.get(posts).elements();
    assert_eq!(elements.len(), 2);
    for post in elements {
        let post = post.as_object().expect("post object");
        assert_eq!(graph.get(post).get("blog"), Some(&Slot::Object(blog)));
    }

    // The back edge renders as null
    assert_eq!(
        result.to_json(),
        serde_json::json!([{
            "id": 1,
            "title": "blog",
            "posts": [
                {"id": 100, "subject": "hello", "blog": null},
                {"id": 101, "subject": "again", "blog": null}
            ]
        }])
    );
}

#[test]
fn test_memo_is_cleared_between_result_sets() {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Parent", TargetType::Map)
                .mapping(ResultMapping::id("id", "pid"))
                .mapping(ResultMapping::collection("children", "Child"))
                .build()
                .expect("parent map"),
        )
        .expect("register parent");
    config
        .add_result_map(
            ResultMap::builder("Child", TargetType::Map)
                .mapping(ResultMapping::id("id", "cid"))
                .build()
                .expect("child map"),
        )
        .expect("register child");
    config
        .add_statement(
            MappedStatement::new("twice")
                .result_map("Parent")
                .result_map("Parent"),
        )
        .expect("register statement");
    let config = Arc::new(config);

    let cursor = || {
        MemoryCursor::new(
            ["pid", "cid"],
            vec![vec![Value::BigInt(1), Value::BigInt(10)]],
        )
    };
    let mut rows = MemoryStatement::new([cursor(), cursor()]);
    let result = handle_statement(&config, "twice", &mut rows).expect("materialize");
    assert_eq!(result.results().len(), 2);
    // Same identity in a later result set is a new object
    assert_ne!(result.results()[0][0], result.results()[1][0]);
    assert_eq!(
        result.graph().to_json(&result.results()[1][0]),
        serde_json::json!({"id": 1, "children": [{"id": 10}]})
    );
}
