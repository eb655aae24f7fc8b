//! Statement binder.
//!
//! Resolves names against the catalog and the enclosing scopes, types every
//! expression, normalizes WHERE/ON/HAVING and records privilege and
//! dependency facts. The finished tree is handed to the flattener.

use std::sync::Arc;

use super::context::{CompilerContext, Numbering};
use super::error::{BindError, BindResult};
use super::facts::{CompileFacts, CompileWarning, DependencyKind, PrivilegeKind};
use super::flatten;
use super::normalize::normalize;
use super::resolve::{position_of, splice_cast, TypeResolver};
use super::scope::{Scope, ScopeColumn, ScopeTable};
use crate::catalog::{Catalog, TableDescriptor};
use crate::sql::Parser;
use crate::tree::{
    fold_value, BaseTableNode, ColumnReference, ColumnSource, Constant, CursorNode, DataType, DeleteNode,
    FromSubquery, InsertNode, JoinKind, JoinNode, Literal, OrderByList, OrderByTarget, Position, ResultColumn,
    ResultColumnList, ResultSetNode, SelectItem, SelectNode, SetOperatorNode, Statement, TableMap, TableName,
    TypeId, UpdateNode, ValueNode, ValueRewriter, ValuesNode, VirtualColumn, Visit,
};

/// Clause an expression is bound in; decides where aggregates may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    SelectList,
    Where,
    On,
    GroupBy,
    Having,
    OrderBy,
    Values,
    RowCount,
}

impl Clause {
    fn name(self) -> &'static str {
        match self {
            Clause::SelectList => "the select list",
            Clause::Where => "WHERE",
            Clause::On => "ON",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Values => "VALUES",
            Clause::RowCount => "OFFSET/FETCH",
        }
    }

    fn allows_aggregates(self) -> bool {
        matches!(self, Clause::SelectList | Clause::Having | Clause::OrderBy)
    }
}

/// A FROM list name resolved against the catalog.
enum TableReference {
    Table(String, Arc<TableDescriptor>),
    View(FromSubquery),
}

fn take_value(slot: &mut ValueNode) -> ValueNode {
    std::mem::replace(slot, ValueNode::literal(Literal::Null))
}

/// Give an untyped marker the target type, or cast a value of another type id.
fn coerce_to(mut value: ValueNode, target: &DataType) -> ValueNode {
    if value.assign_type(target) {
        return value;
    }
    match value.data_type() {
        Some(t) if t.type_id != target.type_id => splice_cast(value, target),
        _ => value,
    }
}

pub struct Binder<'a> {
    catalog: &'a dyn Catalog,
    context: CompilerContext,
    facts: &'a mut CompileFacts,
    numbering: &'a mut Numbering,
    /// Target of the UPDATE or DELETE being bound; reading it needs no SELECT.
    dml_target: Option<(String, String)>,
}

impl<'a> Binder<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        context: &CompilerContext,
        facts: &'a mut CompileFacts,
        numbering: &'a mut Numbering,
    ) -> Self {
        Self {
            catalog,
            context: context.clone(),
            facts,
            numbering,
            dml_target: None,
        }
    }

    /// Bind `statement` in place, then flatten it.
    pub fn bind(mut self, statement: &mut Statement) -> BindResult<()> {
        log::debug!("binding {} statement", statement.kind());
        match statement {
            Statement::Cursor(cursor) => self.bind_cursor(cursor)?,
            Statement::Insert(insert) => self.bind_insert(insert)?,
            Statement::Update(update) => self.bind_update(update)?,
            Statement::Delete(delete) => self.bind_delete(delete)?,
        }
        check_typed(statement)?;
        flatten::flatten_statement(statement, &mut *self.numbering)?;
        log::debug!("bound statement uses {} table numbers", self.numbering.table_count());
        Ok(())
    }

    fn require(&mut self, kind: PrivilegeKind, schema: &str, object: &str, column: Option<&str>) {
        if self.context.check_privileges {
            self.facts.require(kind, schema, object, column);
        }
    }

    fn bind_cursor(&mut self, cursor: &mut CursorNode) -> BindResult<()> {
        self.bind_query(&mut cursor.query, None, 0, cursor.order_by.as_mut())?;
        let scope = Scope::new(None, 0);
        if let Some(offset) = cursor.offset.take() {
            cursor.offset = Some(self.bind_row_count(offset, &scope, "OFFSET")?);
        }
        if let Some(fetch) = cursor.fetch.take() {
            cursor.fetch = Some(self.bind_row_count(fetch, &scope, "FETCH")?);
        }
        Ok(())
    }

    fn bind_row_count(&mut self, value: ValueNode, scope: &Scope<'_>, clause: &str) -> BindResult<ValueNode> {
        let mut value = self.bind_expr(value, scope, Clause::RowCount)?;
        value.assign_type(&DataType::big_int());
        let position = position_of(&value);
        match value.data_type() {
            Some(t) if t.type_id.is_exact_integer() => {}
            Some(t) => {
                return Err(BindError::TypeMismatch {
                    message: format!("{} needs an integer, found {}", clause, t),
                    position,
                })
            }
            None => return Err(BindError::NoResolvableType { position }),
        }
        if let ValueNode::Constant(Constant { value: Literal::Integer(n), .. }) = &value {
            if *n < 0 {
                return Err(BindError::TypeMismatch {
                    message: format!("{} must not be negative", clause),
                    position,
                });
            }
        }
        Ok(value)
    }

    /// Bind a query expression: a SELECT block, VALUES list or set operator.
    fn bind_query(
        &mut self,
        node: &mut ResultSetNode,
        parent: Option<&Scope<'_>>,
        level: usize,
        order_by: Option<&mut OrderByList>,
    ) -> BindResult<()> {
        match node {
            ResultSetNode::Select(select) => return self.bind_select(select, parent, level, order_by),
            ResultSetNode::Values(values) => self.bind_values(values, parent, level)?,
            ResultSetNode::SetOperator(set) => self.bind_set_operator(set, parent, level)?,
            other => return Err(BindError::Unsupported(format!("{} as a query", other.node_name()))),
        }
        if let Some(order_by) = order_by {
            bind_named_order_by(node.result_columns(), order_by)?;
        }
        Ok(())
    }

    fn bind_select(
        &mut self,
        select: &mut SelectNode,
        parent: Option<&Scope<'_>>,
        level: usize,
        order_by: Option<&mut OrderByList>,
    ) -> BindResult<()> {
        select.level = level;
        let mut scope = Scope::new(parent, level);
        for item in select.from_list.iter_mut() {
            self.bind_from_item(item, &mut scope, parent, level)?;
        }

        let mut columns = ResultColumnList::new();
        for item in std::mem::take(&mut select.items) {
            match item {
                SelectItem::Wildcard { qualifier } => self.expand_wildcard(&scope, qualifier.as_deref(), &mut columns)?,
                SelectItem::Expr { expr, alias } => {
                    let name = alias
                        .or_else(|| expr.as_column().map(|c| c.column.clone()))
                        .unwrap_or_else(|| (columns.len() + 1).to_string());
                    let bound = self.bind_expr(expr, &scope, Clause::SelectList)?;
                    columns.push(ResultColumn::new(name, bound));
                }
            }
        }
        select.result_columns = columns;

        if let Some(condition) = select.where_clause.take() {
            select.where_clause = Some(self.bind_condition(condition, &scope, Clause::Where)?);
        }
        let group_by = std::mem::take(&mut select.group_by);
        select.group_by = group_by
            .into_iter()
            .map(|g| self.bind_expr(g, &scope, Clause::GroupBy))
            .collect::<BindResult<_>>()?;
        if let Some(having) = select.having.take() {
            select.having = Some(self.bind_condition(having, &scope, Clause::Having)?);
        }
        if let Some(order_by) = order_by {
            self.bind_select_order_by(select, &scope, order_by)?;
        }

        if select.is_grouped() || select.having.is_some() {
            validate_grouping(select)?;
        }
        self.warn_unserializable_keys(select);
        Ok(())
    }

    fn expand_wildcard(
        &mut self,
        scope: &Scope<'_>,
        qualifier: Option<&str>,
        columns: &mut ResultColumnList,
    ) -> BindResult<()> {
        let tables: Vec<&ScopeTable> = match qualifier {
            Some(q) => vec![scope.table(q).ok_or_else(|| BindError::TableNotFound {
                name: q.to_string(),
                position: Position::default(),
            })?],
            None => scope.tables().iter().collect(),
        };
        if tables.is_empty() {
            return Err(BindError::Unsupported("SELECT * without a FROM list".into()));
        }
        for table in tables {
            for (column_position, column) in table.columns.iter().enumerate() {
                if let Some((schema, object)) = &table.privilege_target {
                    self.require(PrivilegeKind::Select, schema, object, Some(&column.name));
                }
                let reference = ValueNode::Column(ColumnReference {
                    table: Some(table.exposed_name.clone()),
                    column: column.name.clone(),
                    position: Position::default(),
                    source: Some(ColumnSource {
                        table_number: table.table_number,
                        column_position,
                        level: scope.level(),
                    }),
                    data_type: Some(column.data_type.clone()),
                });
                columns.push(ResultColumn::new(column.name.clone(), reference));
            }
        }
        Ok(())
    }

    fn bind_expr(&mut self, expr: ValueNode, scope: &Scope<'_>, clause: Clause) -> BindResult<ValueNode> {
        let mut binder = ExpressionBinder {
            binder: self,
            scope,
            clause,
            aggregate_depth: 0,
        };
        fold_value(expr, &mut binder)
    }

    /// Bind a search condition and normalize it.
    fn bind_condition(&mut self, condition: ValueNode, scope: &Scope<'_>, clause: Clause) -> BindResult<ValueNode> {
        let mut bound = self.bind_expr(condition, scope, clause)?;
        bound.assign_type(&DataType::boolean());
        match bound.data_type() {
            Some(t) if t.type_id == TypeId::Boolean => Ok(normalize(bound)),
            Some(t) => Err(BindError::TypeMismatch {
                message: format!("{} needs a BOOLEAN condition, found {}", clause.name(), t),
                position: position_of(&bound),
            }),
            None => Err(BindError::NoResolvableType {
                position: position_of(&bound),
            }),
        }
    }

    fn bind_select_order_by(
        &mut self,
        select: &mut SelectNode,
        scope: &Scope<'_>,
        order_by: &mut OrderByList,
    ) -> BindResult<()> {
        for key in order_by.columns.iter_mut() {
            let index = match &key.target {
                OrderByTarget::Position(n) => position_key(&select.result_columns, *n)?,
                OrderByTarget::Expression(expr) => match named_key(&select.result_columns, expr)? {
                    Some(index) => index,
                    None => {
                        let bound = self.bind_expr(expr.clone(), scope, Clause::OrderBy)?;
                        let existing = select
                            .result_columns
                            .iter()
                            .position(|c| !c.generated && c.expression.is_equivalent(&bound));
                        match existing {
                            Some(index) => index,
                            None if select.distinct => {
                                return Err(BindError::Unsupported(format!(
                                    "ORDER BY {} must be in the select list of a SELECT DISTINCT",
                                    bound
                                )))
                            }
                            None => {
                                key.added = true;
                                select
                                    .result_columns
                                    .push(ResultColumn::generated(bound.to_string(), bound))
                            }
                        }
                    }
                },
            };
            check_sortable(&select.result_columns, index)?;
            key.result_column = Some(index);
        }
        Ok(())
    }

    fn warn_unserializable_keys(&mut self, select: &SelectNode) {
        let distinct_keys = select
            .result_columns
            .iter()
            .filter(|_| select.distinct)
            .map(|c| &c.expression);
        for key in select.group_by.iter().chain(distinct_keys) {
            if let Some(t) = key.data_type() {
                if t.type_id == TypeId::Clob {
                    self.facts.warn(CompileWarning::TypeNotSerializable {
                        expression: key.to_string(),
                        type_name: t.to_string(),
                    });
                }
            }
        }
    }

    fn bind_from_item(
        &mut self,
        item: &mut ResultSetNode,
        scope: &mut Scope<'_>,
        parent: Option<&Scope<'_>>,
        level: usize,
    ) -> BindResult<()> {
        match item {
            ResultSetNode::BaseTable(table) => match self.resolve_table(table)? {
                TableReference::Table(schema, descriptor) => {
                    self.bind_base_table(table, schema, descriptor, scope, level)
                }
                TableReference::View(derived) => {
                    *item = ResultSetNode::Subquery(derived);
                    self.bind_from_item(item, scope, parent, level)
                }
            },
            ResultSetNode::Subquery(derived) => self.bind_derived(derived, scope, parent, level),
            ResultSetNode::Join(join) => self.bind_join(join, scope, parent, level),
            other => Err(BindError::Unsupported(format!("{} in a FROM list", other.node_name()))),
        }
    }

    fn resolve_table(&mut self, table: &BaseTableNode) -> BindResult<TableReference> {
        let schema = table
            .name
            .schema
            .clone()
            .unwrap_or_else(|| self.context.current_schema.clone());
        if let Some(descriptor) = self.catalog.table(&schema, &table.name.name)? {
            return Ok(TableReference::Table(schema, descriptor));
        }
        let Some(view) = self.catalog.view(&schema, &table.name.name)? else {
            return Err(BindError::TableNotFound {
                name: table.name.to_string(),
                position: table.position,
            });
        };

        let query = Parser::parse_query(&view.query).map_err(|source| BindError::ViewDefinition {
            view: format!("{}.{}", view.schema, view.name),
            source,
        })?;
        log::debug!("expanding view {}.{}", view.schema, view.name);
        self.facts.depend(DependencyKind::View, &view.schema, &view.name);
        self.require(PrivilegeKind::Select, &view.schema, &view.name, None);
        Ok(TableReference::View(FromSubquery {
            query: Box::new(query),
            alias: table.exposed_name().to_string(),
            column_aliases: view.columns.clone(),
            table_number: None,
            level: 0,
            result_columns: ResultColumnList::new(),
            view: Some(TableName::new(Some(&view.schema), view.name.clone())),
            dependency_map: TableMap::new(),
            access: None,
        }))
    }

    fn bind_base_table(
        &mut self,
        table: &mut BaseTableNode,
        schema: String,
        descriptor: Arc<TableDescriptor>,
        scope: &mut Scope<'_>,
        level: usize,
    ) -> BindResult<()> {
        let table_number = self.numbering.next_table();
        let exposed = table.exposed_name().to_string();
        let mut scope_columns = Vec::with_capacity(descriptor.columns.len());
        let mut result_columns = ResultColumnList::new();
        for (column_position, column) in descriptor.columns.iter().enumerate() {
            let data_type = column.data_type();
            result_columns.push(ResultColumn::new(
                column.name.clone(),
                ValueNode::Column(ColumnReference {
                    table: Some(exposed.clone()),
                    column: column.name.clone(),
                    position: table.position,
                    source: Some(ColumnSource {
                        table_number,
                        column_position,
                        level,
                    }),
                    data_type: Some(data_type.clone()),
                }),
            ));
            scope_columns.push(ScopeColumn {
                name: column.name.clone(),
                data_type,
            });
        }

        let mut scope_table = ScopeTable::new(exposed, table_number, scope_columns);
        scope_table.privilege_target = Some((schema.clone(), descriptor.name.clone()));
        scope.add(scope_table);

        self.facts.depend(DependencyKind::Table, &schema, &descriptor.name);
        let is_dml_target = self
            .dml_target
            .as_ref()
            .map_or(false, |(s, n)| *s == schema && *n == descriptor.name);
        if !is_dml_target {
            self.require(PrivilegeKind::Select, &schema, &descriptor.name, None);
        }

        table.name.schema = Some(schema);
        table.table_number = Some(table_number);
        table.result_columns = result_columns;
        table.descriptor = Some(descriptor);
        Ok(())
    }

    fn bind_derived(
        &mut self,
        derived: &mut FromSubquery,
        scope: &mut Scope<'_>,
        parent: Option<&Scope<'_>>,
        level: usize,
    ) -> BindResult<()> {
        let inner_level = level + 1;
        derived.level = inner_level;
        match &derived.view {
            Some(view) => {
                let schema = view
                    .schema
                    .clone()
                    .unwrap_or_else(|| self.context.current_schema.clone());
                let view_context = self.context.without_privilege_checks().with_schema(schema);
                let saved = std::mem::replace(&mut self.context, view_context);
                let bound = self.bind_query(&mut derived.query, None, inner_level, None);
                self.context = saved;
                bound?;
            }
            // Derived tables see enclosing query blocks, never their FROM-list siblings.
            None => self.bind_query(&mut derived.query, parent, inner_level, None)?,
        }
        let table_number = self.numbering.next_table();
        derived.table_number = Some(table_number);

        let visible: Vec<&ResultColumn> = derived.query.result_columns().iter().filter(|c| !c.generated).collect();
        if !derived.column_aliases.is_empty() && derived.column_aliases.len() != visible.len() {
            return Err(BindError::ColumnCountMismatch {
                expected: derived.column_aliases.len(),
                found: visible.len(),
            });
        }
        let mut result_columns = ResultColumnList::new();
        let mut scope_columns = Vec::with_capacity(visible.len());
        for (column_position, column) in visible.iter().enumerate() {
            let name = derived
                .column_aliases
                .get(column_position)
                .cloned()
                .unwrap_or_else(|| column.name.clone());
            let data_type = column.data_type().cloned().ok_or_else(|| BindError::NoResolvableType {
                position: position_of(&column.expression),
            })?;
            result_columns.push(ResultColumn::new(
                name.clone(),
                ValueNode::Virtual(VirtualColumn {
                    column_position,
                    name: name.clone(),
                    data_type: Some(data_type.clone()),
                }),
            ));
            scope_columns.push(ScopeColumn { name, data_type });
        }
        derived.result_columns = result_columns;
        scope.add(ScopeTable::new(derived.alias.clone(), table_number, scope_columns));
        Ok(())
    }

    fn bind_join(
        &mut self,
        join: &mut JoinNode,
        scope: &mut Scope<'_>,
        parent: Option<&Scope<'_>>,
        level: usize,
    ) -> BindResult<()> {
        let mut join_scope = Scope::new(parent, level);
        self.bind_from_item(&mut join.left, &mut join_scope, parent, level)?;
        let left_tables = join_scope.tables().len();
        self.bind_from_item(&mut join.right, &mut join_scope, parent, level)?;
        if join.kind == JoinKind::LeftOuter {
            for table in &mut join_scope.tables_mut()[left_tables..] {
                table.make_nullable();
            }
        }
        if let Some(on) = join.on.take() {
            join.on = Some(self.bind_condition(on, &join_scope, Clause::On)?);
        }

        let mut columns: ResultColumnList = join.left.result_columns().iter().cloned().collect();
        for column in join.right.result_columns() {
            columns.push(column.clone());
        }
        join.result_columns = columns;
        scope.extend(join_scope.into_tables());
        Ok(())
    }

    fn bind_values(&mut self, values: &mut ValuesNode, parent: Option<&Scope<'_>>, level: usize) -> BindResult<()> {
        let scope = Scope::new(parent, level);
        let width = values.rows.first().map_or(0, Vec::len);
        for row in values.rows.iter_mut() {
            if row.len() != width {
                return Err(BindError::ColumnCountMismatch {
                    expected: width,
                    found: row.len(),
                });
            }
            for cell in row.iter_mut() {
                let value = take_value(cell);
                *cell = self.bind_expr(value, &scope, Clause::Values)?;
            }
        }

        let mut result_columns = ResultColumnList::new();
        for index in 0..width {
            let types: Vec<DataType> = values
                .rows
                .iter()
                .filter_map(|row| row[index].data_type().cloned())
                .collect();
            let data_type = if types.is_empty() {
                None
            } else {
                let any_untyped = values.rows.iter().any(|row| row[index].is_untyped());
                let dominant = TypeResolver::new(&self.context).dominant_type(&types, position_of(&values.rows[0][index]))?;
                let dominant = dominant.clone().with_nullable(dominant.nullable || any_untyped);
                for row in values.rows.iter_mut() {
                    let cell = take_value(&mut row[index]);
                    row[index] = coerce_to(cell, &dominant);
                }
                Some(dominant)
            };
            let name = (index + 1).to_string();
            result_columns.push(ResultColumn::new(
                name.clone(),
                ValueNode::Virtual(VirtualColumn {
                    column_position: index,
                    name,
                    data_type,
                }),
            ));
        }
        values.result_columns = result_columns;
        Ok(())
    }

    fn bind_set_operator(
        &mut self,
        set: &mut SetOperatorNode,
        parent: Option<&Scope<'_>>,
        level: usize,
    ) -> BindResult<()> {
        self.bind_query(&mut set.left, parent, level, None)?;
        self.bind_query(&mut set.right, parent, level, None)?;
        let expected = set.left.result_columns().visible_len();
        let found = set.right.result_columns().visible_len();
        if expected != found {
            return Err(BindError::ColumnCountMismatch { expected, found });
        }

        let mut result_columns = ResultColumnList::new();
        for index in 0..expected {
            let name = set
                .left
                .result_columns()
                .get(index)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| (index + 1).to_string());
            let left_type = set.left.result_columns().get(index).and_then(|c| c.data_type()).cloned();
            let right_type = set.right.result_columns().get(index).and_then(|c| c.data_type()).cloned();
            let types: Vec<DataType> = left_type.iter().chain(right_type.iter()).cloned().collect();
            let data_type = if types.is_empty() {
                None
            } else {
                let dominant = TypeResolver::new(&self.context).dominant_type(&types, Position::default())?;
                let nullable = dominant.nullable || left_type.is_none() || right_type.is_none();
                let dominant = dominant.with_nullable(nullable);
                let mut coerce = |value: ValueNode| -> BindResult<ValueNode> { Ok(coerce_to(value, &dominant)) };
                convert_column(&mut set.left, index, &dominant, &mut coerce)?;
                convert_column(&mut set.right, index, &dominant, &mut coerce)?;
                Some(dominant)
            };
            result_columns.push(ResultColumn::new(
                name.clone(),
                ValueNode::Virtual(VirtualColumn {
                    column_position: index,
                    name,
                    data_type,
                }),
            ));
        }
        set.result_columns = result_columns;
        Ok(())
    }

    /// Target table of a DML statement; views are not updatable here.
    fn dml_table(&self, name: &TableName, position: Position, verb: &str) -> BindResult<(String, Arc<TableDescriptor>)> {
        let schema = name.schema.clone().unwrap_or_else(|| self.context.current_schema.clone());
        if let Some(descriptor) = self.catalog.table(&schema, &name.name)? {
            return Ok((schema, descriptor));
        }
        if self.catalog.view(&schema, &name.name)?.is_some() {
            return Err(BindError::Unsupported(format!("{} on view {}.{}", verb, schema, name.name)));
        }
        Err(BindError::TableNotFound {
            name: name.to_string(),
            position,
        })
    }

    fn target_positions(
        &self,
        descriptor: &TableDescriptor,
        columns: &[String],
        position: Position,
    ) -> BindResult<Vec<usize>> {
        let mut positions = Vec::with_capacity(columns.len());
        for name in columns {
            let column_position = descriptor
                .column_position(name)
                .ok_or_else(|| BindError::ColumnNotFound {
                    name: name.clone(),
                    position,
                })?;
            if positions.contains(&column_position) {
                return Err(BindError::DuplicateColumn(name.clone()));
            }
            positions.push(column_position);
        }
        Ok(positions)
    }

    fn bind_insert(&mut self, insert: &mut InsertNode) -> BindResult<()> {
        let (schema, descriptor) = self.dml_table(&insert.table, insert.position, "INSERT")?;
        let positions = if insert.columns.is_empty() {
            (0..descriptor.columns.len()).collect()
        } else {
            self.target_positions(&descriptor, &insert.columns, insert.position)?
        };
        self.facts.depend(DependencyKind::Table, &schema, &descriptor.name);
        self.require(PrivilegeKind::Insert, &schema, &descriptor.name, None);

        self.bind_query(&mut insert.source, None, 0, None)?;
        let found = insert.source.result_columns().visible_len();
        if found != positions.len() {
            return Err(BindError::ColumnCountMismatch {
                expected: positions.len(),
                found,
            });
        }
        let resolver = TypeResolver::new(&self.context);
        for (index, &column_position) in positions.iter().enumerate() {
            let column = &descriptor.columns[column_position];
            let target = column.data_type();
            let mut assign = |value: ValueNode| resolver.assignment(value, &target, &column.name);
            convert_column(&mut insert.source, index, &target, &mut assign)?;
        }

        insert.columns = positions.iter().map(|&p| descriptor.columns[p].name.clone()).collect();
        insert.column_positions = positions;
        insert.table.schema = Some(schema);
        insert.target = Some(descriptor);
        Ok(())
    }

    fn bind_update(&mut self, update: &mut UpdateNode) -> BindResult<()> {
        let (schema, descriptor) = self.dml_table(&update.table, update.position, "UPDATE")?;
        let positions = self.target_positions(&descriptor, &update.columns, update.position)?;
        self.facts.depend(DependencyKind::Table, &schema, &descriptor.name);
        for &column_position in &positions {
            let column = &descriptor.columns[column_position].name;
            self.require(PrivilegeKind::Update, &schema, &descriptor.name, Some(column));
        }

        self.dml_target = Some((schema.clone(), descriptor.name.clone()));
        let bound = self.bind_query(&mut update.source, None, 0, None);
        self.dml_target = None;
        bound?;

        if let Some(aggregate) = update
            .source
            .result_columns()
            .iter()
            .find(|c| c.expression.contains_aggregate())
        {
            return Err(BindError::AggregateNotAllowed {
                clause: "UPDATE SET",
                position: position_of(&aggregate.expression),
            });
        }
        let resolver = TypeResolver::new(&self.context);
        for (index, &column_position) in positions.iter().enumerate() {
            let column = &descriptor.columns[column_position];
            let target = column.data_type();
            let mut assign = |value: ValueNode| resolver.assignment(value, &target, &column.name);
            convert_column(&mut update.source, index, &target, &mut assign)?;
        }

        update.columns = positions.iter().map(|&p| descriptor.columns[p].name.clone()).collect();
        update.column_positions = positions;
        update.table.schema = Some(schema);
        Ok(())
    }

    fn bind_delete(&mut self, delete: &mut DeleteNode) -> BindResult<()> {
        let (schema, descriptor) = self.dml_table(&delete.table, delete.position, "DELETE")?;
        self.facts.depend(DependencyKind::Table, &schema, &descriptor.name);
        self.require(PrivilegeKind::Delete, &schema, &descriptor.name, None);

        self.dml_target = Some((schema.clone(), descriptor.name.clone()));
        let bound = self.bind_query(&mut delete.source, None, 0, None);
        self.dml_target = None;
        bound?;

        delete.table.schema = Some(schema);
        Ok(())
    }
}

/// Resolves column references and types expressions bottom-up.
struct ExpressionBinder<'b, 'a, 's> {
    binder: &'b mut Binder<'a>,
    scope: &'s Scope<'s>,
    clause: Clause,
    aggregate_depth: usize,
}

impl ValueRewriter for ExpressionBinder<'_, '_, '_> {
    type Error = BindError;

    fn pre(&mut self, node: &mut ValueNode) -> BindResult<Visit> {
        match node {
            ValueNode::Column(column) => {
                if column.source.is_some() {
                    return Ok(Visit::Skip);
                }
                let resolved = self
                    .scope
                    .lookup(column.table.as_deref(), &column.column, column.position)?
                    .ok_or_else(|| BindError::ColumnNotFound {
                        name: match &column.table {
                            Some(t) => format!("{}.{}", t, column.column),
                            None => column.column.clone(),
                        },
                        position: column.position,
                    })?;
                if let Some((schema, object)) = &resolved.privilege_target {
                    self.binder
                        .require(PrivilegeKind::Select, schema, object, Some(&resolved.column_name));
                }
                column.source = Some(resolved.source);
                column.data_type = Some(resolved.data_type);
                column.table = Some(resolved.exposed_name);
                column.column = resolved.column_name;
                Ok(Visit::Skip)
            }
            ValueNode::Aggregate(_) => {
                if !self.clause.allows_aggregates() {
                    return Err(BindError::AggregateNotAllowed {
                        clause: self.clause.name(),
                        position: position_of(node),
                    });
                }
                if self.aggregate_depth > 0 {
                    return Err(BindError::AggregateNotAllowed {
                        clause: "another aggregate",
                        position: position_of(node),
                    });
                }
                self.aggregate_depth += 1;
                Ok(Visit::Recurse)
            }
            ValueNode::Subquery(subquery) => {
                let level = self.scope.level() + 1;
                subquery.level = level;
                self.binder
                    .bind_query(&mut subquery.query, Some(self.scope), level, None)?;
                Ok(Visit::Recurse)
            }
            _ => Ok(Visit::Recurse),
        }
    }

    fn post(&mut self, node: ValueNode) -> BindResult<ValueNode> {
        if matches!(node, ValueNode::Aggregate(_)) {
            self.aggregate_depth -= 1;
        }
        TypeResolver::new(&self.binder.context).resolve(node)
    }
}

/// Apply `convert` to column `index` of a query's rows and retype the column.
fn convert_column(
    node: &mut ResultSetNode,
    index: usize,
    target: &DataType,
    convert: &mut dyn FnMut(ValueNode) -> BindResult<ValueNode>,
) -> BindResult<()> {
    match node {
        ResultSetNode::Select(select) => {
            if let Some(column) = select.result_columns.get_mut(index) {
                let value = take_value(&mut column.expression);
                column.expression = convert(value)?;
            }
        }
        ResultSetNode::Values(values) => {
            for row in values.rows.iter_mut() {
                if let Some(cell) = row.get_mut(index) {
                    let value = take_value(cell);
                    *cell = convert(value)?;
                }
            }
            let nullable = values
                .rows
                .iter()
                .any(|row| row.get(index).and_then(|c| c.data_type()).map_or(true, |t| t.nullable));
            retype_virtual(&mut values.result_columns, index, target.clone().with_nullable(nullable));
        }
        ResultSetNode::SetOperator(set) => {
            convert_column(&mut set.left, index, target, convert)?;
            convert_column(&mut set.right, index, target, convert)?;
            let nullable = [&set.left, &set.right].iter().any(|arm| {
                arm.result_columns()
                    .get(index)
                    .and_then(|c| c.data_type())
                    .map_or(true, |t| t.nullable)
            });
            retype_virtual(&mut set.result_columns, index, target.clone().with_nullable(nullable));
        }
        _ => {}
    }
    Ok(())
}

fn retype_virtual(columns: &mut ResultColumnList, index: usize, data_type: DataType) {
    if let Some(ValueNode::Virtual(column)) = columns.get_mut(index).map(|c| &mut c.expression) {
        column.data_type = Some(data_type);
    }
}

/// Zero-based index of a one-based ORDER BY position.
fn position_key(columns: &ResultColumnList, position: usize) -> BindResult<usize> {
    if position == 0 || position > columns.visible_len() {
        return Err(BindError::OrderByColumnNotFound(position.to_string()));
    }
    Ok(position - 1)
}

/// An unqualified ORDER BY name matching a select-list column name.
fn named_key(columns: &ResultColumnList, expr: &ValueNode) -> BindResult<Option<usize>> {
    let Some(column) = expr.as_column().filter(|c| c.table.is_none()) else {
        return Ok(None);
    };
    match columns.count_named(&column.column) {
        0 => Ok(None),
        1 => Ok(columns.position_of(&column.column)),
        _ => Err(BindError::AmbiguousColumn {
            name: column.column.clone(),
            position: column.position,
        }),
    }
}

fn bind_named_order_by(columns: &ResultColumnList, order_by: &mut OrderByList) -> BindResult<()> {
    for key in order_by.columns.iter_mut() {
        let index = match &key.target {
            OrderByTarget::Position(n) => position_key(columns, *n)?,
            OrderByTarget::Expression(expr) => {
                named_key(columns, expr)?.ok_or_else(|| BindError::OrderByColumnNotFound(expr.to_string()))?
            }
        };
        check_sortable(columns, index)?;
        key.result_column = Some(index);
    }
    Ok(())
}

fn check_sortable(columns: &ResultColumnList, index: usize) -> BindResult<()> {
    match columns.get(index).and_then(|c| c.data_type()) {
        Some(t) if t.type_id.is_large_object() => Err(BindError::TypeMismatch {
            message: format!("cannot sort on a {} column", t),
            position: columns.get(index).map(|c| position_of(&c.expression)).unwrap_or_default(),
        }),
        _ => Ok(()),
    }
}

/// Every column reference of this block outside an aggregate must be a
/// grouping expression.
fn validate_grouping(select: &SelectNode) -> BindResult<()> {
    for column in select.result_columns.iter() {
        check_grouped(&column.expression, &select.group_by, select.level)?;
    }
    if let Some(having) = &select.having {
        check_grouped(having, &select.group_by, select.level)?;
    }
    Ok(())
}

fn check_grouped(expr: &ValueNode, group_by: &[ValueNode], level: usize) -> BindResult<()> {
    if group_by.iter().any(|g| g.is_equivalent(expr)) {
        return Ok(());
    }
    match expr {
        ValueNode::Aggregate(_) => Ok(()),
        ValueNode::Column(column) if column.source.map_or(false, |s| s.level == level) => {
            Err(BindError::NotGroupingColumn {
                name: expr.to_string(),
                position: column.position,
            })
        }
        ValueNode::Subquery(subquery) => {
            let mut ungrouped = None;
            subquery.query.walk_values(&mut |node| {
                if ungrouped.is_some() {
                    return;
                }
                if let ValueNode::Column(column) = node {
                    let outer = column.source.map_or(false, |s| s.level == level);
                    if outer && !group_by.iter().any(|g| g.is_equivalent(node)) {
                        ungrouped = Some((node.to_string(), column.position));
                    }
                }
            });
            if let Some((name, position)) = ungrouped {
                return Err(BindError::NotGroupingColumn { name, position });
            }
            match subquery.operand.as_deref() {
                Some(operand) => check_grouped(operand, group_by, level),
                None => Ok(()),
            }
        }
        other => {
            for child in other.children() {
                check_grouped(child, group_by, level)?;
            }
            Ok(())
        }
    }
}

/// Fail on any parameter or NULL that never received a type.
fn check_typed(statement: &Statement) -> BindResult<()> {
    let mut untyped = None;
    statement.query().walk_values(&mut |node| {
        if untyped.is_none() && node.is_untyped() {
            untyped = Some(position_of(node));
        }
    });
    match untyped {
        Some(position) => Err(BindError::NoResolvableType { position }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::facts::RequiredPrivilege;
    use crate::catalog::{InMemoryCatalog, TableBuilder, ViewDescriptor};
    use crate::tree::{BinaryOp, JoinRole, OrderByTarget};

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog
            .add_table(
                TableBuilder::new("T")
                    .column("A", DataType::integer())
                    .required_column("B", DataType::varchar(10))
                    .column("D", DataType::decimal(5, 2))
                    .index("T_A", &["A"], true)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add_table(
                TableBuilder::new("U")
                    .required_column("A", DataType::integer())
                    .column("C", DataType::char(3))
                    .column("DOC", DataType::clob(1000))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .add_view(ViewDescriptor::new("V", "SELECT a, b FROM t WHERE a > 0"))
            .unwrap();
        catalog
    }

    fn bind(sql: &str) -> BindResult<(Statement, CompileFacts)> {
        let catalog = catalog();
        let context = CompilerContext::default();
        let mut facts = CompileFacts::new();
        let mut numbering = Numbering::new();
        let mut statement = Parser::parse(sql).unwrap();
        Binder::new(&catalog, &context, &mut facts, &mut numbering).bind(&mut statement)?;
        Ok((statement, facts))
    }

    fn select(statement: &Statement) -> &SelectNode {
        match statement.query() {
            ResultSetNode::Select(s) => s,
            other => panic!("expected a select, got {}", other.node_name()),
        }
    }

    #[test]
    fn test_comparison_keeps_operand_order() {
        let (statement, _) = bind("SELECT a FROM t WHERE 1 = a").unwrap();
        let s = select(&statement);
        assert_eq!(s.predicates.len(), 1);
        let p = s.predicates.iter().next().unwrap();
        assert_eq!(p.expr.to_string(), "(1 = T.A)");
        let t = p.expr.data_type().unwrap();
        assert_eq!(t.type_id, TypeId::Boolean);
        assert!(t.nullable);
    }

    #[test]
    fn test_wildcard_expansion_and_privileges() {
        let (statement, facts) = bind("SELECT * FROM t").unwrap();
        assert_eq!(select(&statement).result_columns.names(), vec!["A", "B", "D"]);
        let privileges: Vec<String> = facts.privileges().iter().map(RequiredPrivilege::to_string).collect();
        assert_eq!(privileges, vec!["SELECT ON APP.T (A, B, D)"]);
    }

    #[test]
    fn test_unknown_names() {
        assert!(matches!(bind("SELECT a FROM nope"), Err(BindError::TableNotFound { .. })));
        assert!(matches!(bind("SELECT z FROM t"), Err(BindError::ColumnNotFound { .. })));
        assert!(matches!(bind("SELECT a FROM t, u"), Err(BindError::AmbiguousColumn { .. })));
        assert!(matches!(bind("SELECT x.* FROM t"), Err(BindError::TableNotFound { .. })));
    }

    #[test]
    fn test_where_must_be_boolean_and_has_no_aggregates() {
        assert!(matches!(bind("SELECT a FROM t WHERE a + 1"), Err(BindError::TypeMismatch { .. })));
        assert!(matches!(
            bind("SELECT a FROM t WHERE COUNT(*) > 1"),
            Err(BindError::AggregateNotAllowed { clause: "WHERE", .. })
        ));
        assert!(matches!(
            bind("SELECT MAX(COUNT(a)) FROM t"),
            Err(BindError::AggregateNotAllowed { .. })
        ));
    }

    #[test]
    fn test_grouping_validation() {
        assert!(bind("SELECT a, COUNT(*) FROM t GROUP BY a").is_ok());
        assert!(matches!(
            bind("SELECT a, b, COUNT(*) FROM t GROUP BY a"),
            Err(BindError::NotGroupingColumn { .. })
        ));
        assert!(matches!(bind("SELECT b FROM t HAVING a > 1"), Err(BindError::NotGroupingColumn { .. })));
    }

    #[test]
    fn test_untyped_parameter_fails() {
        assert!(matches!(bind("SELECT ? FROM t"), Err(BindError::NoResolvableType { .. })));
        let (statement, _) = bind("SELECT a FROM t WHERE a = ?").unwrap();
        let mut typed = false;
        statement.query().walk_values(&mut |n| {
            if let ValueNode::Parameter(p) = n {
                typed = p.data_type == Some(DataType::integer());
            }
        });
        assert!(typed);
    }

    #[test]
    fn test_values_order_by_position() {
        let (statement, _) = bind("VALUES (1, 2, 3), (4, 5, 6) ORDER BY 2").unwrap();
        let Statement::Cursor(cursor) = &statement else { panic!("expected a cursor") };
        let key = &cursor.order_by.as_ref().unwrap().columns[0];
        assert!(matches!(key.target, OrderByTarget::Position(2)));
        assert_eq!(key.result_column, Some(1));
        assert_eq!(cursor.query.result_columns().names(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_order_by_adds_generated_column() {
        let (statement, _) = bind("SELECT a FROM t ORDER BY d").unwrap();
        let Statement::Cursor(cursor) = &statement else { panic!("expected a cursor") };
        let key = &cursor.order_by.as_ref().unwrap().columns[0];
        assert!(key.added);
        assert_eq!(key.result_column, Some(1));
        let columns = cursor.query.result_columns();
        assert_eq!(columns.visible_len(), 1);
        assert!(columns.get(1).unwrap().generated);

        assert!(matches!(
            bind("SELECT DISTINCT a FROM t ORDER BY d"),
            Err(BindError::Unsupported(_))
        ));
        assert!(matches!(bind("SELECT a FROM t ORDER BY 3"), Err(BindError::OrderByColumnNotFound(_))));
    }

    #[test]
    fn test_order_by_alias() {
        let (statement, _) = bind("SELECT a + 1 AS x FROM t ORDER BY x DESC").unwrap();
        let Statement::Cursor(cursor) = &statement else { panic!("expected a cursor") };
        let key = &cursor.order_by.as_ref().unwrap().columns[0];
        assert_eq!(key.result_column, Some(0));
        assert!(!key.added);
    }

    #[test]
    fn test_union_dominant_type() {
        let (statement, _) = bind("SELECT a FROM t UNION SELECT d FROM t").unwrap();
        let column = statement.query().result_columns().get(0).unwrap();
        assert_eq!(column.data_type().unwrap().to_string(), "DECIMAL(12,2)");
        let ResultSetNode::SetOperator(set) = statement.query() else { panic!("expected a set operator") };
        let left = set.left.result_columns().get(0).unwrap();
        assert!(matches!(left.expression, ValueNode::Cast(_)));

        assert!(matches!(
            bind("SELECT a, b FROM t UNION SELECT a FROM u"),
            Err(BindError::ColumnCountMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_outer_join_makes_inner_side_nullable() {
        let (statement, _) = bind("SELECT u.a FROM t LEFT JOIN u ON t.a = u.a").unwrap();
        let column = select(&statement).result_columns.get(0).unwrap();
        assert!(column.data_type().unwrap().nullable);
    }

    #[test]
    fn test_view_privileges_stay_on_the_view() {
        let (statement, facts) = bind("SELECT a FROM v").unwrap();
        let privileges: Vec<String> = facts.privileges().iter().map(RequiredPrivilege::to_string).collect();
        assert_eq!(privileges, vec!["SELECT ON APP.V"]);
        let deps: Vec<String> = facts.dependencies().iter().map(|d| d.to_string()).collect();
        assert!(deps.contains(&"view APP.V".to_string()));
        // The view body was flattened into the outer block.
        assert!(matches!(select(&statement).from_list[0], ResultSetNode::BaseTable(_)));
    }

    #[test]
    fn test_insert_assignment() {
        let (statement, facts) = bind("INSERT INTO t (d, a) VALUES (1, 2)").unwrap();
        let Statement::Insert(insert) = &statement else { panic!("expected an insert") };
        assert_eq!(insert.column_positions, vec![2, 0]);
        let ResultSetNode::Values(values) = &insert.source else { panic!("expected values") };
        assert!(matches!(values.rows[0][0], ValueNode::Cast(_)));
        assert!(matches!(values.rows[0][1], ValueNode::Constant(_)));
        assert_eq!(facts.privileges()[0].to_string(), "INSERT ON APP.T");

        assert!(matches!(bind("INSERT INTO t (a, a) VALUES (1, 2)"), Err(BindError::DuplicateColumn(_))));
        assert!(matches!(bind("INSERT INTO t VALUES (1)"), Err(BindError::ColumnCountMismatch { .. })));
        assert!(matches!(bind("INSERT INTO t (a) VALUES ('x')"), Err(BindError::TypeMismatch { .. })));
        assert!(matches!(bind("INSERT INTO v VALUES (1, 'x')"), Err(BindError::Unsupported(_))));
    }

    #[test]
    fn test_update_and_delete_privileges() {
        let (statement, facts) = bind("UPDATE t SET d = a WHERE b = 'x'").unwrap();
        let Statement::Update(update) = &statement else { panic!("expected an update") };
        assert_eq!(update.column_positions, vec![2]);
        let privileges: Vec<String> = facts.privileges().iter().map(RequiredPrivilege::to_string).collect();
        assert_eq!(privileges, vec!["SELECT ON APP.T (A, B)", "UPDATE ON APP.T (D)"]);

        let (_, facts) = bind("DELETE FROM t").unwrap();
        let privileges: Vec<String> = facts.privileges().iter().map(RequiredPrivilege::to_string).collect();
        assert_eq!(privileges, vec!["DELETE ON APP.T"]);
    }

    #[test]
    fn test_correlated_subquery_levels() {
        let (statement, _) = bind("SELECT a FROM t WHERE a > (SELECT MAX(u.a) FROM u WHERE u.c = t.b)").unwrap();
        let s = select(&statement);
        let p = s.predicates.iter().next().unwrap();
        let ValueNode::Binary(b) = &p.expr else { panic!("expected a comparison") };
        let ValueNode::Subquery(sub) = b.right.as_ref() else { panic!("expected a subquery") };
        assert_eq!(sub.level, 1);
        assert!(b.right.is_correlated_above(1));
    }

    #[test]
    fn test_clob_grouping_warns() {
        let (_, facts) = bind("SELECT DISTINCT doc FROM u").unwrap();
        assert!(matches!(
            facts.warnings()[0],
            CompileWarning::TypeNotSerializable { .. }
        ));
    }

    #[test]
    fn test_binding_is_deterministic() {
        let sql = "SELECT t.a, u.c FROM t JOIN u ON t.a = u.a WHERE t.b LIKE 'x%' OR t.d BETWEEN 1 AND 2";
        let (first, _) = bind(sql).unwrap();
        let (second, _) = bind(sql).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exists_join_role() {
        let (statement, _) = bind("SELECT a FROM t WHERE EXISTS (SELECT 1 FROM u WHERE u.a = t.a)").unwrap();
        let s = select(&statement);
        let ResultSetNode::BaseTable(u) = &s.from_list[1] else { panic!("expected a base table") };
        assert_eq!(u.join_role, JoinRole::Exists);
        assert!(s.predicates.iter().any(|p| matches!(&p.expr, ValueNode::Binary(b) if b.op == BinaryOp::Eq)));
    }
}
