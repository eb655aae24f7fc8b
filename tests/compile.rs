//! End-to-end compilation of SQL text through the public API.

use std::io::Write;
use std::sync::Arc;

use querycore::binder::{Binder, CompileFacts, CompilerContext, DependencyKind, Numbering};
use querycore::catalog::{InMemoryCatalog, TableBuilder, ViewDescriptor};
use querycore::planner::{CompileOptions, PlanError, QueryPlanner};
use querycore::sql::Parser;
use querycore::tree::{DataType, OrderByTarget, ResultSetNode, Statement, TypeId, ValueNode};

fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog
        .add_table(
            TableBuilder::new("T")
                .column("A", DataType::integer())
                .required_column("X", DataType::integer())
                .column("NAME", DataType::varchar(20))
                .index("T_X", &["X"], true)
                .row_count(500)
                .build()
                .unwrap(),
        )
        .unwrap();
    catalog
        .add_view(ViewDescriptor::new("TV", "SELECT x, name FROM t WHERE a > 0"))
        .unwrap();
    catalog
}

fn planner() -> QueryPlanner {
    QueryPlanner::new(Arc::new(catalog()))
}

fn node_names(node: &ResultSetNode) -> Vec<&'static str> {
    let mut names = Vec::new();
    node.walk_result_sets(&mut |n| names.push(n.node_name()));
    names
}

#[test]
fn test_comparison_binds_to_boolean_with_operand_order() {
    let catalog = catalog();
    let mut statement = Parser::parse("SELECT a FROM t WHERE 1 = a").unwrap();
    let mut facts = CompileFacts::new();
    let mut numbering = Numbering::new();
    Binder::new(&catalog, &CompilerContext::default(), &mut facts, &mut numbering)
        .bind(&mut statement)
        .unwrap();

    let ResultSetNode::Select(select) = statement.query() else { panic!("expected a select") };
    let predicate = select.predicates.iter().next().unwrap();
    let ValueNode::Binary(comparison) = &predicate.expr else { panic!("expected a comparison") };
    assert!(matches!(comparison.left.as_ref(), ValueNode::Constant(_)));
    assert!(matches!(comparison.right.as_ref(), ValueNode::Column(_)));
    let data_type = predicate.expr.data_type().unwrap();
    assert_eq!(data_type.type_id, TypeId::Boolean);
    // A is nullable, so the comparison is too.
    assert!(data_type.nullable);

    let mut statement = Parser::parse("SELECT a FROM t WHERE 1 = x").unwrap();
    let mut facts = CompileFacts::new();
    let mut numbering = Numbering::new();
    Binder::new(&catalog, &CompilerContext::default(), &mut facts, &mut numbering)
        .bind(&mut statement)
        .unwrap();
    let ResultSetNode::Select(select) = statement.query() else { panic!("expected a select") };
    assert!(!select.predicates.iter().next().unwrap().expr.data_type().unwrap().nullable);
}

#[test]
fn test_derived_table_is_flattened() {
    let plan = planner().compile("SELECT * FROM (SELECT x FROM t) s").unwrap();
    let query = plan.statement.query();

    assert!(!node_names(query).contains(&"Subquery"));
    let column = query.result_columns().get(0).unwrap();
    assert_eq!(column.expression.to_string(), "T.X");
}

#[test]
fn test_values_sorted_by_position() {
    let plan = planner().compile("VALUES (1, 2, 3), (4, 5, 6) ORDER BY 2").unwrap();
    let ResultSetNode::OrderBy(sort) = plan.statement.query() else { panic!("expected a sort") };
    let key = &sort.order_by.columns[0];

    assert!(matches!(key.target, OrderByTarget::Position(2)));
    assert_eq!(key.result_column, Some(1));
    assert!(matches!(sort.child.as_ref(), ResultSetNode::Values(_)));
}

#[test]
fn test_index_order_needs_no_sort() {
    let plan = planner().compile("SELECT x, name FROM t ORDER BY x").unwrap();
    assert!(!node_names(plan.statement.query()).contains(&"OrderBy"));
    assert!(plan.dependencies.iter().any(|d| d.kind == DependencyKind::Index && d.name == "T_X"));

    let plan = planner().compile("SELECT x, name FROM t ORDER BY name").unwrap();
    assert!(node_names(plan.statement.query()).contains(&"OrderBy"));
}

#[test]
fn test_view_dependency_and_privileges() {
    let plan = planner().compile("SELECT name FROM tv").unwrap();

    let privileges: Vec<String> = plan.privileges.iter().map(|p| p.to_string()).collect();
    assert_eq!(privileges, vec!["SELECT ON APP.TV"]);
    let dependencies: Vec<String> = plan.dependencies.iter().map(|d| d.to_string()).collect();
    assert!(dependencies.contains(&"view APP.TV".to_string()));
    assert!(dependencies.contains(&"table APP.T".to_string()));
}

#[test]
fn test_dml_statements_compile() {
    let planner = planner();

    let plan = planner.compile("INSERT INTO t (a, x) VALUES (1, 2)").unwrap();
    assert!(matches!(plan.statement, Statement::Insert(_)));

    let plan = planner.compile("UPDATE t SET name = 'n' WHERE x = 3").unwrap();
    assert!(matches!(plan.statement, Statement::Update(_)));
    assert!(plan.dependencies.iter().any(|d| d.kind == DependencyKind::Index));

    let plan = planner.compile("DELETE FROM t WHERE a > 10").unwrap();
    assert!(matches!(plan.statement, Statement::Delete(_)));
}

#[test]
fn test_current_schema_resolves_unqualified_names() {
    let catalog = InMemoryCatalog::new();
    catalog
        .add_table(
            TableBuilder::new("ORDERS")
                .schema("SALES")
                .column("ID", DataType::integer())
                .build()
                .unwrap(),
        )
        .unwrap();
    let catalog = Arc::new(catalog);

    let default = QueryPlanner::new(catalog.clone());
    assert!(matches!(default.compile("SELECT id FROM orders"), Err(PlanError::Bind(_))));
    assert!(default.compile("SELECT id FROM sales.orders").is_ok());

    let sales = QueryPlanner::with_options(catalog, CompileOptions::new().current_schema("sales"));
    assert!(sales.compile("SELECT id FROM orders").is_ok());
}

#[test]
fn test_catalog_loaded_from_file() {
    let document = r#"{
        "tables": [
            {
                "name": "EMP",
                "columns": [
                    {"name": "ID", "type": "INTEGER", "nullable": false},
                    {"name": "NAME", "type": "VARCHAR(30)"}
                ],
                "indexes": [{"name": "EMP_PK", "columns": ["ID"], "unique": true}],
                "statistics": {"row_count": 40}
            }
        ]
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(document.as_bytes()).unwrap();

    let catalog = InMemoryCatalog::load(file.path()).unwrap();
    let plan = QueryPlanner::new(Arc::new(catalog)).compile("SELECT name FROM emp").unwrap();
    assert_eq!(plan.estimated_rows(), 40.0);
    assert!(plan.warnings.is_empty());
}

#[test]
fn test_errors_abort_compilation() {
    let planner = planner();
    assert!(matches!(planner.compile("SELECT nope FROM t"), Err(PlanError::Bind(_))));
    assert!(matches!(planner.compile("SELEC a FROM t"), Err(PlanError::Parse(_))));
    assert!(matches!(planner.compile("SELECT a FROM t WHERE a + 1"), Err(PlanError::Bind(_))));
}
