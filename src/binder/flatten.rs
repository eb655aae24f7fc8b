//! Query-block flattening, run once binding succeeds.
//!
//! Inner joins in a FROM list are spliced into the list. Simple derived
//! tables are merged into their outer block. EXISTS and IN subqueries that
//! are top-level conjuncts become exists-joins (or plain joins when the
//! subquery column is unique). WHERE and ON clauses are split into
//! predicates, and the predicates implied by equijoins are added.
//! Everything is done bottom-up, so inner blocks are already in
//! final shape when the outer block looks at them.

use super::closure::transitive_closure;
use super::context::Numbering;
use super::error::BindResult;
use super::normalize::conjuncts;
use crate::tree::{
    BaseTableNode, BinaryOp, ColumnSource, DataType, JoinKind, JoinNode, JoinRole, Predicate, ResultColumnList,
    ResultSetNode, SelectNode, Statement, SubqueryKind, SubqueryNode, TableMap, ValueNode,
};

/// Flatten every query block of a bound statement.
pub fn flatten_statement(statement: &mut Statement, numbering: &mut Numbering) -> BindResult<()> {
    flatten_query(statement.query_mut(), numbering)
}

fn flatten_query(node: &mut ResultSetNode, numbering: &mut Numbering) -> BindResult<()> {
    match node {
        ResultSetNode::Select(select) => flatten_select(select, numbering),
        ResultSetNode::SetOperator(set) => {
            flatten_query(&mut set.left, numbering)?;
            flatten_query(&mut set.right, numbering)
        }
        ResultSetNode::Values(values) => {
            for cell in values.rows.iter_mut().flatten() {
                flatten_nested(cell, numbering)?;
            }
            Ok(())
        }
        ResultSetNode::Subquery(derived) => flatten_query(&mut derived.query, numbering),
        ResultSetNode::Join(join) => {
            flatten_query(&mut join.left, numbering)?;
            flatten_query(&mut join.right, numbering)?;
            if let Some(on) = &mut join.on {
                flatten_nested(on, numbering)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Flatten the bodies of subqueries used inside an expression.
fn flatten_nested(expr: &mut ValueNode, numbering: &mut Numbering) -> BindResult<()> {
    if let ValueNode::Subquery(subquery) = expr {
        flatten_query(&mut subquery.query, numbering)?;
    }
    for child in expr.children_mut() {
        flatten_nested(child, numbering)?;
    }
    Ok(())
}

fn flatten_select(select: &mut SelectNode, numbering: &mut Numbering) -> BindResult<()> {
    for item in select.from_list.iter_mut() {
        flatten_query(item, numbering)?;
    }
    for column in select.result_columns.iter_mut() {
        flatten_nested(&mut column.expression, numbering)?;
    }
    for expr in select.where_clause.iter_mut().chain(select.group_by.iter_mut()).chain(select.having.iter_mut()) {
        flatten_nested(expr, numbering)?;
    }

    let mut on_conjuncts = Vec::new();
    let from_list = std::mem::take(&mut select.from_list);
    for item in from_list {
        splice_inner_joins(item, &mut select.from_list, &mut on_conjuncts);
    }

    let level = select.level;
    let where_conjuncts = select.where_clause.take().map(conjuncts).unwrap_or_default();
    for expr in where_conjuncts.into_iter().chain(on_conjuncts) {
        select.predicates.push(Predicate::new(numbering.next_predicate(), expr, level));
    }

    let mut index = 0;
    while index < select.from_list.len() {
        index += flatten_derived_at(select, index);
    }
    flatten_subquery_predicates(select, numbering);

    for item in select.from_list.iter_mut() {
        if let ResultSetNode::Join(join) = item {
            number_outer_join(join, level, numbering);
        }
    }
    for predicate in select.predicates.iter_mut() {
        predicate.referenced_tables = predicate.expr.referenced_tables(level);
    }
    let semi_joined: TableMap = select
        .from_list
        .iter()
        .filter_map(|item| match item {
            ResultSetNode::BaseTable(table) if table.join_role != JoinRole::Plain => table.table_number,
            _ => None,
        })
        .collect();
    transitive_closure(&mut select.predicates, level, &semi_joined, numbering);
    log::trace!(
        "flattened block at level {}: {} tables, {} predicates",
        level,
        select.from_list.len(),
        select.predicates.len()
    );
    Ok(())
}

/// Move the operands of an inner join into the FROM list, keeping their ON
/// clauses as conjuncts of the block's WHERE.
fn splice_inner_joins(item: ResultSetNode, from_list: &mut Vec<ResultSetNode>, on: &mut Vec<ValueNode>) {
    match item {
        ResultSetNode::Join(join) if join.kind == JoinKind::Inner => {
            let JoinNode { left, right, on: condition, .. } = join;
            splice_inner_joins(*left, from_list, on);
            splice_inner_joins(*right, from_list, on);
            if let Some(condition) = condition {
                on.extend(conjuncts(condition));
            }
        }
        other => from_list.push(other),
    }
}

/// Table number, predicates and children of an outer join left in the FROM list.
///
/// Joins merged in from a derived table were numbered by their own block and
/// keep that number.
fn number_outer_join(join: &mut JoinNode, level: usize, numbering: &mut Numbering) {
    if join.table_number.is_some() {
        return;
    }
    for side in [&mut join.left, &mut join.right] {
        if let ResultSetNode::Join(inner) = side.as_mut() {
            number_outer_join(inner, level, numbering);
        }
    }
    join.table_number = Some(numbering.next_table());
    if let Some(on) = join.on.take() {
        for expr in conjuncts(on) {
            join.predicates.push(Predicate::new(numbering.next_predicate(), expr, level));
        }
    }
}

fn is_mergeable_derived(node: &ResultSetNode) -> bool {
    let ResultSetNode::Subquery(derived) = node else {
        return false;
    };
    let ResultSetNode::Select(inner) = derived.query.as_ref() else {
        return false;
    };
    !inner.distinct
        && inner.group_by.is_empty()
        && inner.having.is_none()
        && !inner.has_aggregates()
        && !inner.from_list.is_empty()
        && inner.result_columns.iter().all(|c| c.expression.is_copyable())
        && !inner.predicates.iter().any(|p| p.expr.contains_subquery())
}

/// Merge the derived table at `index` into `select` if it is simple enough.
/// Returns how many FROM list entries to advance past.
fn flatten_derived_at(select: &mut SelectNode, index: usize) -> usize {
    if !is_mergeable_derived(&select.from_list[index]) {
        return 1;
    }
    let ResultSetNode::Subquery(derived) = select.from_list.remove(index) else {
        return 1;
    };
    let Some(derived_table) = derived.table_number else {
        select.from_list.insert(index, ResultSetNode::Subquery(derived));
        return 1;
    };
    let inner_level = derived.level;
    let mut query = derived.query;
    relevel(&mut query, inner_level);
    let ResultSetNode::Select(inner) = *query else {
        return 0;
    };
    log::trace!("merging derived table {} into level {}", derived.alias, select.level);

    let replacements: Vec<ValueNode> = inner
        .result_columns
        .iter()
        .filter(|c| !c.generated)
        .map(|c| c.expression.clone())
        .collect();
    let outer_level = select.level;
    walk_select_values_mut(select, &mut |node| {
        let ValueNode::Column(column) = node else { return };
        let Some(ColumnSource { table_number, column_position, level }) = column.source else {
            return;
        };
        if table_number == derived_table && level == outer_level {
            if let Some(replacement) = replacements.get(column_position) {
                *node = replacement.clone();
            }
        }
    });

    let merged = inner.from_list.len();
    for (offset, table) in inner.from_list.into_iter().enumerate() {
        select.from_list.insert(index + offset, table);
    }
    select.predicates.extend(inner.predicates);
    merged
}

/// Mutable walk over every expression a select block owns, including the
/// expressions of its FROM list.
fn walk_select_values_mut(select: &mut SelectNode, f: &mut dyn FnMut(&mut ValueNode)) {
    for column in select.result_columns.iter_mut() {
        column.expression.walk_deep_mut(f);
    }
    for predicate in select.predicates.iter_mut() {
        predicate.expr.walk_deep_mut(f);
    }
    for expr in select.group_by.iter_mut().chain(select.having.iter_mut()) {
        expr.walk_deep_mut(f);
    }
    for item in select.from_list.iter_mut() {
        item.walk_values_mut(f);
    }
}

/// A top-level subquery conjunct that can become a join.
fn flattenable_subquery(expr: &ValueNode) -> Option<&SubqueryNode> {
    let ValueNode::Subquery(subquery) = expr else {
        return None;
    };
    if !subquery.under_top_and {
        return None;
    }
    match subquery.kind {
        SubqueryKind::Exists => {}
        SubqueryKind::In if !subquery.negated => {}
        _ => return None,
    }
    let ResultSetNode::Select(inner) = subquery.query.as_ref() else {
        return None;
    };
    let [ResultSetNode::BaseTable(table)] = inner.from_list.as_slice() else {
        return None;
    };
    if table.join_role != JoinRole::Plain
        || !inner.group_by.is_empty()
        || inner.having.is_some()
        || inner.has_aggregates()
        || inner.predicates.iter().any(|p| p.expr.contains_subquery())
    {
        return None;
    }
    let table_number = table.table_number?;
    match subquery.kind {
        SubqueryKind::In => {
            let operand_ok = subquery.operand.as_deref().map_or(false, ValueNode::is_copyable);
            (inner.result_columns.visible_len() == 1 && operand_ok).then_some(subquery)
        }
        _ if subquery.negated => {
            let inner_level = inner.level;
            inner
                .predicates
                .iter()
                .all(|p| p.expr.referenced_tables(inner_level).contains(table_number))
                .then_some(subquery)
        }
        _ => Some(subquery),
    }
}

/// Whether `column` is the only key column of a unique index on `table`.
fn is_unique_key(table: &BaseTableNode, expr: &ValueNode) -> bool {
    let (Some(descriptor), Some(table_number)) = (&table.descriptor, table.table_number) else {
        return false;
    };
    let Some(source) = expr.as_column().and_then(|c| c.source) else {
        return false;
    };
    if source.table_number != table_number {
        return false;
    }
    descriptor
        .indexes
        .iter()
        .filter(|index| index.unique && index.columns.len() == 1)
        .any(|index| descriptor.index_key_positions(index) == [source.column_position])
}

fn flatten_subquery_predicates(select: &mut SelectNode, numbering: &mut Numbering) {
    let level = select.level;
    let flattenable = select
        .predicates
        .take_where(|p| flattenable_subquery(&p.expr).is_some());
    for predicate in flattenable {
        let ValueNode::Subquery(subquery) = predicate.expr else {
            continue;
        };
        let SubqueryNode { kind, negated, operand, query, level: inner_level, .. } = subquery;
        let mut query = query;
        relevel(&mut query, inner_level);
        let ResultSetNode::Select(mut inner) = *query else {
            continue;
        };
        let Some(ResultSetNode::BaseTable(mut table)) = inner.from_list.pop() else {
            continue;
        };

        let mut new_predicates = inner.predicates.take_all();
        let mut unique_in = false;
        if let (SubqueryKind::In, Some(operand)) = (kind, operand) {
            let column = inner.result_columns.remove(0).expression;
            unique_in = is_unique_key(&table, &column);
            let nullable = [&*operand, &column]
                .iter()
                .any(|n| n.data_type().map_or(true, |t| t.nullable));
            let equality =
                ValueNode::typed_binary(BinaryOp::Eq, *operand, column, DataType::boolean().with_nullable(nullable));
            new_predicates.push(Predicate::new(numbering.next_predicate(), equality, level));
        }

        let Some(table_number) = table.table_number else {
            continue;
        };
        if !unique_in {
            table.join_role = if negated { JoinRole::NotExists } else { JoinRole::Exists };
            let mut dependencies = TableMap::new();
            for p in new_predicates.iter() {
                dependencies.or(&p.expr.referenced_tables(level));
            }
            dependencies.clear(table_number);
            if dependencies.is_empty() {
                dependencies = select
                    .from_list
                    .iter()
                    .filter(|item| {
                        !matches!(item, ResultSetNode::BaseTable(t) if t.join_role != JoinRole::Plain)
                    })
                    .filter_map(ResultSetNode::table_number)
                    .collect();
            }
            table.dependency_map = dependencies;
        }
        log::trace!(
            "subquery on {} flattened as {}",
            table.exposed_name(),
            if unique_in { "an inner join" } else if negated { "a not-exists join" } else { "an exists join" }
        );
        select.from_list.push(ResultSetNode::BaseTable(table));
        select.predicates.extend(new_predicates);
    }
}

/// Move a query block one level up: every level at or below `from` loses one.
fn relevel(node: &mut ResultSetNode, from: usize) {
    relevel_sets(node, from);
    node.walk_values_mut(&mut |value| match value {
        ValueNode::Column(column) => {
            if let Some(source) = &mut column.source {
                if source.level >= from {
                    source.level -= 1;
                }
            }
        }
        ValueNode::Subquery(subquery) => {
            if subquery.level >= from {
                subquery.level -= 1;
            }
            relevel_sets(&mut subquery.query, from);
        }
        _ => {}
    });
}

/// Level bookkeeping the value walk does not reach: block levels and the
/// result columns of base tables and joins.
fn relevel_sets(node: &mut ResultSetNode, from: usize) {
    let relevel_columns = |columns: &mut ResultColumnList| {
        for column in columns.iter_mut() {
            if let ValueNode::Column(c) = &mut column.expression {
                if let Some(source) = &mut c.source {
                    if source.level >= from {
                        source.level -= 1;
                    }
                }
            }
        }
    };
    match node {
        ResultSetNode::Select(select) => {
            if select.level >= from {
                select.level -= 1;
            }
            for item in select.from_list.iter_mut() {
                relevel_sets(item, from);
            }
        }
        ResultSetNode::BaseTable(table) => relevel_columns(&mut table.result_columns),
        ResultSetNode::Subquery(derived) => {
            if derived.level >= from {
                derived.level -= 1;
            }
            relevel_sets(&mut derived.query, from);
        }
        ResultSetNode::Join(join) => {
            relevel_columns(&mut join.result_columns);
            relevel_sets(&mut join.left, from);
            relevel_sets(&mut join.right, from);
        }
        ResultSetNode::SetOperator(set) => {
            relevel_sets(&mut set.left, from);
            relevel_sets(&mut set.right, from);
        }
        _ => {}
    }
}
