use resultmap::prelude::*;
use resultmap::StatementResults;
use std::sync::Arc;

fn blog_config(settings: Settings) -> Arc<Configuration> {
    let mut config = Configuration::new(settings);
    config
        .add_result_map(
            ResultMap::builder("Blog", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("title", "title"))
                .mapping(ResultMapping::nested_query("author", "author_id", "selectAuthor"))
                .build()
                .expect("blog map"),
        )
        .expect("register blog");
    config
        .add_result_map(
            ResultMap::builder("Author", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("name", "name"))
                .build()
                .expect("author map"),
        )
        .expect("register author");
    config
        .add_statement(MappedStatement::new("selectBlogs").result_map("Blog"))
        .expect("register blogs");
    config
        .add_statement(MappedStatement::new("selectAuthor").result_map("Author"))
        .expect("register author statement");
    Arc::new(config)
}

fn rows(statement: &MappedStatement, parameter: Option<&QueryParameter>) -> Result<Box<dyn StatementResults>> {
    let cursor = match statement.id() {
        "selectBlogs" => MemoryCursor::new(
            ["id", "title", "author_id"],
            vec![
                vec![Value::BigInt(1), Value::Text("rust".into()), Value::BigInt(7)],
                vec![Value::BigInt(2), Value::Text("sql".into()), Value::BigInt(8)],
            ],
        ),
        "selectAuthor" => {
            let Some(QueryParameter::Value(id)) = parameter else {
                return Err(Error::Custom("author id expected".to_string()));
            };
            let name = if *id == Value::BigInt(7) { "ann" } else { "bob" };
            MemoryCursor::new(["id", "name"], vec![vec![id.clone(), Value::Text(name.into())]])
        }
        other => return Err(Error::Custom(format!("unknown statement {}", other))),
    };
    Ok(Box::new(MemoryStatement::new([cursor])))
}

#[test]
fn test_eager_nested_queries_fill_every_parent() {
    let mut executor = InMemoryExecutor::new(blog_config(Settings::new()), rows);
    let result = executor.select("selectBlogs", None).expect("select");
    assert_eq!(
        result.to_json(),
        serde_json::json!([
            {"id": 1, "title": "rust", "author": {"id": 7, "name": "ann"}},
            {"id": 2, "title": "sql", "author": {"id": 8, "name": "bob"}}
        ])
    );
    assert_eq!(executor.executions(), 3);
}

#[test]
fn test_lazy_property_loads_on_first_read() {
    let mut executor = InMemoryExecutor::new(blog_config(Settings::new().lazy_loading(true)), rows);
    let mut result = executor.select("selectBlogs", None).expect("select");
    assert_eq!(executor.executions(), 1);

    let second = result.first()[1].as_object().expect("blog");
    let policy = executor.configuration().lazy_load_policy();

    // Reading another property leaves the author pending
    result
        .graph_mut()
        .resolve_property(second, "title", &policy, &mut executor)
        .expect("title");
    assert_eq!(executor.executions(), 1);

    let author = result
        .graph_mut()
        .resolve_property(second, "author", &policy, &mut executor)
        .expect("author")
        .expect("author present");
    assert_eq!(result.graph().to_json(&author), serde_json::json!({"id": 8, "name": "bob"}));
    assert_eq!(executor.executions(), 2);

    // Already loaded
    result
        .graph_mut()
        .resolve_property(second, "author", &policy, &mut executor)
        .expect("author again");
    assert_eq!(executor.executions(), 2);
}

#[test]
fn test_aggressive_lazy_loading_loads_everything_on_any_read() {
    let settings = Settings::new().lazy_loading(true).aggressive_lazy_loading(true);
    let mut executor = InMemoryExecutor::new(blog_config(settings), rows);
    let mut result = executor.select("selectBlogs", None).expect("select");
    let first = result.first()[0].as_object().expect("blog");
    let policy = executor.configuration().lazy_load_policy();

    result
        .graph_mut()
        .resolve_property(first, "title", &policy, &mut executor)
        .expect("title");
    assert_eq!(executor.executions(), 2);
    assert!(!result.graph().get(first).get("author").expect("author").is_pending());
}

#[test]
fn test_pending_properties_render_as_null() {
    let mut executor = InMemoryExecutor::new(blog_config(Settings::new().lazy_loading(true)), rows);
    let result = executor.select("selectBlogs", None).expect("select");
    assert_eq!(result.to_json()[0]["author"], serde_json::Value::Null);
}

#[test]
fn test_cursor_runs_nested_queries_per_object() {
    let mut executor = InMemoryExecutor::new(blog_config(Settings::new()), rows);
    let names: Vec<String> = {
        let mut cursor = executor
            .select_cursor("selectBlogs", None, RowBounds::default())
            .expect("cursor");
        let mut names = Vec::new();
        while let Some(blog) = cursor.fetch_next().expect("fetch") {
            let json = cursor.to_json(&blog);
            names.push(json["author"]["name"].as_str().unwrap_or_default().to_string());
        }
        assert!(cursor.is_consumed());
        names
    };
    assert_eq!(names, vec!["ann", "bob"]);
    assert!(executor.executions() >= 3);
}

fn multiple_result_sets_config() -> Arc<Configuration> {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Blog", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("title", "title"))
                .mapping(
                    ResultMapping::association("author", "Author")
                        .result_set("authors")
                        .on_column("author_id")
                        .foreign_column("id"),
                )
                .mapping(
                    ResultMapping::collection("posts", "Post")
                        .result_set("posts")
                        .on_column("id")
                        .foreign_column("blog_id"),
                )
                .build()
                .expect("blog map"),
        )
        .expect("register blog");
    config
        .add_result_map(
            ResultMap::builder("Author", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("name", "name"))
                .build()
                .expect("author map"),
        )
        .expect("register author");
    config
        .add_result_map(
            ResultMap::builder("Post", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(ResultMapping::column("subject", "subject"))
                .auto_mapping(false)
                .build()
                .expect("post map"),
        )
        .expect("register post");
    config
        .add_statement(
            MappedStatement::new("selectBlogsWithEverything")
                .result_map("Blog")
                .result_sets(["blogs", "authors", "posts"]),
        )
        .expect("register statement");
    Arc::new(config)
}

#[test]
fn test_auxiliary_result_sets_link_into_parents() {
    let config = multiple_result_sets_config();
    let mut results = MemoryStatement::new([
        MemoryCursor::new(
            ["id", "title", "author_id"],
            vec![
                vec![Value::BigInt(1), Value::Text("rust".into()), Value::BigInt(7)],
                vec![Value::BigInt(2), Value::Text("sql".into()), Value::BigInt(7)],
            ],
        ),
        MemoryCursor::new(["id", "name"], vec![vec![Value::BigInt(7), Value::Text("ann".into())]]),
        MemoryCursor::new(
            ["id", "blog_id", "subject"],
            vec![
                vec![Value::BigInt(100), Value::BigInt(1), Value::Text("ownership".into())],
                vec![Value::BigInt(101), Value::BigInt(2), Value::Text("joins".into())],
                vec![Value::BigInt(102), Value::BigInt(1), Value::Text("lifetimes".into())],
            ],
        ),
    ]);
    let result = handle_statement(&config, "selectBlogsWithEverything", &mut results).expect("materialize");
    assert_eq!(result.results().len(), 1);
    assert_eq!(
        result.to_json(),
        serde_json::json!([
            {
                "id": 1,
                "title": "rust",
                "author": {"id": 7, "name": "ann"},
                "posts": [
                    {"id": 100, "subject": "ownership"},
                    {"id": 102, "subject": "lifetimes"}
                ]
            },
            {
                "id": 2,
                "title": "sql",
                "author": {"id": 7, "name": "ann"},
                "posts": [{"id": 101, "subject": "joins"}]
            }
        ])
    );
}

#[test]
fn test_two_properties_on_one_result_set_are_rejected() {
    let mut config = Configuration::default();
    config
        .add_result_map(
            ResultMap::builder("Blog", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .mapping(
                    ResultMapping::association("author", "Author")
                        .result_set("people")
                        .on_column("author_id")
                        .foreign_column("id"),
                )
                .mapping(
                    ResultMapping::association("editor", "Author")
                        .result_set("people")
                        .on_column("editor_id")
                        .foreign_column("id"),
                )
                .build()
                .expect("blog map"),
        )
        .expect("register blog");
    config
        .add_result_map(
            ResultMap::builder("Author", TargetType::Map)
                .mapping(ResultMapping::id("id", "id"))
                .build()
                .expect("author map"),
        )
        .expect("register author");
    config
        .add_statement(
            MappedStatement::new("selectBlogAndPeople")
                .result_map("Blog")
                .result_sets(["blogs", "people"]),
        )
        .expect("register statement");
    let config = Arc::new(config);

    let mut results = MemoryStatement::new([
        MemoryCursor::new(
            ["id", "author_id", "editor_id"],
            vec![vec![Value::BigInt(1), Value::BigInt(7), Value::BigInt(8)]],
        ),
        MemoryCursor::new(["id"], vec![vec![Value::BigInt(7)], vec![Value::BigInt(8)]]),
    ]);
    let err = handle_statement(&config, "selectBlogAndPeople", &mut results).unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains("people"));
}
