//! Query planner - the compilation pipeline.
//!
//! Runs parse, bind, optimize and finalize over one statement and collects
//! the facts the caller needs next to the tree.

use std::fmt;
use std::sync::Arc;

use super::error::PlanResult;
use super::finalize::finalize;
use crate::binder::{Binder, CompileFacts, CompileWarning, CompilerContext, Dependency, Numbering, RequiredPrivilege};
use crate::catalog::{Catalog, DEFAULT_SCHEMA};
use crate::optimizer::{CostEstimate, LogTrace, Optimizer, OptimizerConfig, OptimizerTrace};
use crate::sql::Parser;
use crate::tree::{CollationKind, Statement};

/// Settings for compiling statements.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub current_schema: String,
    pub default_collation: CollationKind,
    pub check_privileges: bool,
    pub optimizer: OptimizerConfig,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            current_schema: DEFAULT_SCHEMA.to_string(),
            default_collation: CollationKind::UcsBasic,
            check_privileges: true,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_schema(mut self, schema: impl Into<String>) -> Self {
        self.current_schema = schema.into().to_ascii_uppercase();
        self
    }

    pub fn default_collation(mut self, collation: CollationKind) -> Self {
        self.default_collation = collation;
        self
    }

    pub fn check_privileges(mut self, value: bool) -> Self {
        self.check_privileges = value;
        self
    }

    pub fn optimizer(mut self, config: OptimizerConfig) -> Self {
        self.optimizer = config;
        self
    }

    /// Binder context for one compilation.
    pub fn context(&self) -> CompilerContext {
        let context = CompilerContext::new()
            .with_schema(self.current_schema.clone())
            .with_default_collation(self.default_collation);
        if self.check_privileges {
            context
        } else {
            context.without_privilege_checks()
        }
    }
}

/// The query planner.
///
/// Holds no per-statement state; one planner can compile statements from
/// several threads at once.
#[derive(Clone)]
pub struct QueryPlanner {
    catalog: Arc<dyn Catalog>,
    options: CompileOptions,
    trace: Arc<dyn OptimizerTrace>,
}

impl QueryPlanner {
    /// Create a planner with default options over `catalog`.
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::with_options(catalog, CompileOptions::default())
    }

    pub fn with_options(catalog: Arc<dyn Catalog>, options: CompileOptions) -> Self {
        Self {
            catalog,
            options,
            trace: Arc::new(LogTrace),
        }
    }

    /// Send optimizer trace events to `trace`.
    pub fn with_trace(mut self, trace: Arc<dyn OptimizerTrace>) -> Self {
        self.trace = trace;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile one SQL statement.
    pub fn compile(&self, sql: &str) -> PlanResult<QueryPlan> {
        let statement = Parser::parse(sql)?;
        self.compile_statement(statement)
    }

    /// Compile an already parsed statement.
    pub fn compile_statement(&self, mut statement: Statement) -> PlanResult<QueryPlan> {
        let context = self.options.context();
        let mut facts = CompileFacts::new();
        let mut numbering = Numbering::new();

        Binder::new(self.catalog.as_ref(), &context, &mut facts, &mut numbering).bind(&mut statement)?;
        Optimizer::new(self.catalog.as_ref(), &self.options.optimizer, self.trace.as_ref()).optimize(
            &mut statement,
            &mut numbering,
            &mut facts,
        )?;
        finalize(&mut statement, &mut numbering)?;

        let warnings = facts.take_warnings();
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        log::debug!("compiled {} statement with {} tables", statement.kind(), numbering.table_count());

        Ok(QueryPlan {
            cost: statement.query().cost(),
            privileges: facts.privileges(),
            dependencies: facts.dependencies(),
            warnings,
            statement,
        })
    }

    /// Explain a statement.
    pub fn explain(&self, sql: &str) -> PlanResult<String> {
        Ok(self.compile(sql)?.explain())
    }
}

/// A compiled statement: the bound, optimized tree plus the facts gathered
/// while compiling it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub statement: Statement,
    pub privileges: Vec<RequiredPrivilege>,
    pub dependencies: Vec<Dependency>,
    pub warnings: Vec<CompileWarning>,
    pub cost: Option<CostEstimate>,
}

impl QueryPlan {
    /// Get the estimated cost.
    pub fn estimated_cost(&self) -> f64 {
        self.cost.map(|c| c.cost).unwrap_or_default()
    }

    /// Get the estimated row count.
    pub fn estimated_rows(&self) -> f64 {
        self.cost.map(|c| c.row_count).unwrap_or_default()
    }

    /// Plan tree followed by cost, privileges, dependencies and warnings.
    pub fn explain(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)?;
        if let Some(cost) = &self.cost {
            writeln!(f, "Estimate: {}", cost)?;
        }
        if !self.privileges.is_empty() {
            writeln!(f, "Required privileges:")?;
            for privilege in &self.privileges {
                writeln!(f, "  {}", privilege)?;
            }
        }
        if !self.dependencies.is_empty() {
            writeln!(f, "Dependencies:")?;
            for dependency in &self.dependencies {
                writeln!(f, "  {}", dependency)?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {}", warning)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{BindError, DependencyKind, PrivilegeKind};
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::planner::PlanError;
    use crate::tree::{DataType, ResultSetNode};

    fn setup() -> QueryPlanner {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_table(
                TableBuilder::new("USERS")
                    .required_column("ID", DataType::integer())
                    .column("NAME", DataType::varchar(40))
                    .column("AGE", DataType::integer())
                    .index("USERS_PK", &["ID"], true)
                    .row_count(1000)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add_table(
                TableBuilder::new("EVENTS")
                    .column("USER_ID", DataType::integer())
                    .column("KIND", DataType::varchar(10))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        QueryPlanner::new(Arc::new(catalog))
    }

    #[test]
    fn test_plan_simple_select() {
        let planner = setup();
        let plan = planner.compile("SELECT * FROM users").unwrap();

        assert!(plan.estimated_cost() > 0.0);
        assert_eq!(plan.estimated_rows(), 1000.0);
        assert_eq!(plan.statement.query().result_columns().len(), 3);
    }

    #[test]
    fn test_plan_select_with_where() {
        let planner = setup();
        let plan = planner.compile("SELECT name FROM users WHERE age > 21").unwrap();

        assert!(plan.estimated_rows() < 1000.0);
    }

    #[test]
    fn test_plan_select_with_order() {
        let planner = setup();
        let plan = planner.compile("SELECT name FROM users ORDER BY age DESC").unwrap();

        assert!(matches!(plan.statement.query(), ResultSetNode::ProjectRestrict(_)));
        assert!(plan.explain().contains("Sort: [#2 DESC]"));
    }

    #[test]
    fn test_privileges_and_dependencies() {
        let planner = setup();
        let plan = planner.compile("SELECT name FROM users WHERE id = 7").unwrap();

        assert!(plan.privileges.iter().any(|p| p.kind == PrivilegeKind::Select && p.object == "USERS"));
        assert!(plan.dependencies.iter().any(|d| d.kind == DependencyKind::Table && d.name == "USERS"));
        assert!(plan.dependencies.iter().any(|d| d.kind == DependencyKind::Index && d.name == "USERS_PK"));

        let unchecked = QueryPlanner::with_options(planner.catalog.clone(), CompileOptions::new().check_privileges(false));
        assert!(unchecked.compile("SELECT name FROM users").unwrap().privileges.is_empty());
    }

    #[test]
    fn test_missing_statistics_is_a_warning() {
        let planner = setup();
        let plan = planner.compile("SELECT kind FROM events").unwrap();

        assert!(plan
            .warnings
            .iter()
            .any(|w| matches!(w, CompileWarning::StatisticsUnavailable { .. })));
        assert!(plan.explain().contains("Warnings:"));
    }

    #[test]
    fn test_explain() {
        let planner = setup();
        let explanation = planner
            .explain("SELECT name FROM users WHERE age > 21 ORDER BY name FETCH FIRST 5 ROWS ONLY")
            .unwrap();

        assert!(explanation.starts_with("Cursor"));
        assert!(explanation.contains("RowCount"));
        assert!(explanation.contains("Estimate:"));
    }

    #[test]
    fn test_table_not_found() {
        let planner = setup();
        let result = planner.compile("SELECT * FROM nonexistent");

        assert!(matches!(result, Err(PlanError::Bind(BindError::TableNotFound { .. }))));
    }

    #[test]
    fn test_parse_error() {
        let planner = setup();
        assert!(matches!(planner.compile("SELEC 1"), Err(PlanError::Parse(_))));
    }
}
