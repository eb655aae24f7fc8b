//! SQL parser implementation.
//!
//! Converts SQL strings to the unbound query tree using sqlparser.
//! Unquoted identifiers are folded to upper case; quoted identifiers keep
//! their spelling. ORDER BY, OFFSET and FETCH are accepted only on the
//! outermost query.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::error::{ParseError, ParseResult};
use crate::tree::{
    AggregateFn, AggregateNode, BaseTableNode, BinaryOp, CoalesceNode, CollationKind, CursorNode, DataType,
    DeleteNode, FromSubquery, InsertNode, JoinKind, JoinNode, Literal, OrderByColumn, OrderByList, OrderByTarget,
    Parameter, Position, ResultColumnList, ResultSetNode, SelectItem, SelectNode, SetOp, SetOperatorNode,
    Statement, SubqueryKind, SubqueryNode, TableMap, TableName, TernaryOp, UnaryOp, UpdateNode, ValueNode,
    ValuesNode,
};

/// SQL parser.
pub struct Parser;

impl Parser {
    /// Parse a SQL string into a statement.
    pub fn parse(sql: &str) -> ParseResult<Statement> {
        let statement = Self::parse_single(sql)?;
        Converter::default().convert_statement(&statement)
    }

    /// Parse multiple SQL statements separated by semicolons.
    pub fn parse_multi(sql: &str) -> ParseResult<Vec<Statement>> {
        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;
        statements
            .iter()
            .map(|s| Converter::default().convert_statement(s))
            .collect()
    }

    /// Parse the text of a view: a query without ORDER BY, OFFSET or FETCH.
    pub fn parse_query(sql: &str) -> ParseResult<ResultSetNode> {
        match Self::parse_single(sql)? {
            sp::Statement::Query(query) => Converter::default().convert_subquery(&query),
            other => Err(ParseError::UnsupportedStatement(format!("expected a query, got {}", other))),
        }
    }

    fn parse_single(sql: &str) -> ParseResult<sp::Statement> {
        let sql = sql.trim().trim_end_matches(';');
        if sql.trim().is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let dialect = GenericDialect {};
        let mut statements = SqlParser::parse_sql(&dialect, sql)?;

        if statements.len() > 1 {
            return Err(ParseError::MultipleStatements);
        }
        statements.pop().ok_or(ParseError::EmptyQuery)
    }
}

/// Per-statement conversion state.
#[derive(Default)]
struct Converter {
    /// Number of `?` placeholders seen so far.
    parameters: usize,
}

fn ident(id: &sp::Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_ascii_uppercase()
    }
}

fn position(id: &sp::Ident) -> Position {
    Position::new(id.span.start.line, id.span.start.column)
}

fn object_idents(name: &sp::ObjectName) -> ParseResult<Vec<&sp::Ident>> {
    name.0
        .iter()
        .map(|part| {
            part.as_ident()
                .ok_or_else(|| ParseError::InvalidIdentifier(name.to_string()))
        })
        .collect()
}

impl Converter {
    fn convert_statement(&mut self, stmt: &sp::Statement) -> ParseResult<Statement> {
        match stmt {
            sp::Statement::Query(query) => self.convert_cursor(query),
            sp::Statement::Insert(insert) => self.convert_insert(insert),
            sp::Statement::Update { table, assignments, selection, from, .. } => {
                if from.is_some() {
                    return Err(ParseError::UnsupportedClause("UPDATE ... FROM".into()));
                }
                self.convert_update(table, assignments, selection)
            }
            sp::Statement::Delete(delete) => self.convert_delete(delete),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_cursor(&mut self, query: &sp::Query) -> ParseResult<Statement> {
        if query.with.is_some() {
            return Err(ParseError::UnsupportedClause("WITH".into()));
        }
        let body = self.convert_set_expr(&query.body)?;
        let mut cursor = CursorNode::new(body);

        if let Some(order_by) = &query.order_by {
            cursor.order_by = Some(self.convert_order_by(order_by)?);
        }
        if let Some(offset) = &query.offset {
            cursor.offset = Some(self.convert_expr(&offset.value)?);
        }
        cursor.fetch = match (&query.fetch, &query.limit) {
            (Some(_), Some(_)) => {
                return Err(ParseError::UnsupportedClause("both LIMIT and FETCH".into()));
            }
            (Some(fetch), None) => {
                if fetch.percent || fetch.with_ties {
                    return Err(ParseError::UnsupportedClause("FETCH PERCENT / WITH TIES".into()));
                }
                match &fetch.quantity {
                    Some(quantity) => Some(self.convert_expr(quantity)?),
                    None => Some(ValueNode::literal(Literal::Integer(1))),
                }
            }
            (None, Some(limit)) => Some(self.convert_expr(limit)?),
            (None, None) => None,
        };

        Ok(Statement::Cursor(cursor))
    }

    /// A query nested in another statement or expression.
    fn convert_subquery(&mut self, query: &sp::Query) -> ParseResult<ResultSetNode> {
        if query.with.is_some() {
            return Err(ParseError::UnsupportedClause("WITH".into()));
        }
        if query.order_by.is_some() {
            return Err(ParseError::UnsupportedClause("ORDER BY in a subquery".into()));
        }
        if query.limit.is_some() || query.offset.is_some() || query.fetch.is_some() {
            return Err(ParseError::UnsupportedClause("OFFSET/FETCH in a subquery".into()));
        }
        self.convert_set_expr(&query.body)
    }

    fn convert_set_expr(&mut self, body: &sp::SetExpr) -> ParseResult<ResultSetNode> {
        match body {
            sp::SetExpr::Select(select) => self.convert_select(select),
            sp::SetExpr::Query(query) => self.convert_subquery(query),
            sp::SetExpr::SetOperation { op, set_quantifier, left, right } => {
                let op = match op {
                    sp::SetOperator::Union => SetOp::Union,
                    sp::SetOperator::Intersect => SetOp::Intersect,
                    sp::SetOperator::Except => SetOp::Except,
                    other => return Err(ParseError::UnsupportedClause(other.to_string())),
                };
                let all = match set_quantifier {
                    sp::SetQuantifier::All => true,
                    sp::SetQuantifier::Distinct | sp::SetQuantifier::None => false,
                    other => return Err(ParseError::UnsupportedClause(format!("{:?}", other))),
                };
                Ok(ResultSetNode::SetOperator(SetOperatorNode {
                    op,
                    all,
                    left: Box::new(self.convert_set_expr(left)?),
                    right: Box::new(self.convert_set_expr(right)?),
                    result_columns: ResultColumnList::new(),
                    cost: None,
                }))
            }
            sp::SetExpr::Values(values) => {
                let rows = values
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|e| self.convert_expr(e)).collect::<ParseResult<Vec<_>>>())
                    .collect::<ParseResult<Vec<_>>>()?;
                if rows.is_empty() {
                    return Err(ParseError::MissingClause("VALUES row".into()));
                }
                Ok(ResultSetNode::Values(ValuesNode::new(rows)))
            }
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_select(&mut self, select: &sp::Select) -> ParseResult<ResultSetNode> {
        let distinct = match &select.distinct {
            None => false,
            Some(sp::Distinct::Distinct) => true,
            Some(other) => return Err(ParseError::UnsupportedClause(format!("{:?}", other))),
        };

        let items = select
            .projection
            .iter()
            .map(|item| self.convert_select_item(item))
            .collect::<ParseResult<Vec<_>>>()?;

        let from_list = select
            .from
            .iter()
            .map(|t| self.convert_table_with_joins(t))
            .collect::<ParseResult<Vec<_>>>()?;

        let mut node = SelectNode::new(items, from_list);
        node.distinct = distinct;
        node.where_clause = select.selection.as_ref().map(|e| self.convert_expr(e)).transpose()?;
        node.group_by = match &select.group_by {
            sp::GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(ParseError::UnsupportedClause("GROUP BY modifiers".into()));
                }
                exprs.iter().map(|e| self.convert_expr(e)).collect::<ParseResult<Vec<_>>>()?
            }
            sp::GroupByExpr::All(_) => return Err(ParseError::UnsupportedClause("GROUP BY ALL".into())),
        };
        node.having = select.having.as_ref().map(|e| self.convert_expr(e)).transpose()?;

        Ok(ResultSetNode::Select(node))
    }

    fn convert_select_item(&mut self, item: &sp::SelectItem) -> ParseResult<SelectItem> {
        match item {
            sp::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard { qualifier: None }),
            sp::SelectItem::QualifiedWildcard(kind, _) => {
                let text = kind.to_string();
                let last = text.rsplit('.').next().unwrap_or(&text);
                let qualifier = if last.starts_with('"') {
                    last.trim_matches('"').to_string()
                } else {
                    last.to_ascii_uppercase()
                };
                Ok(SelectItem::Wildcard { qualifier: Some(qualifier) })
            }
            sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.convert_expr(expr)?,
                alias: None,
            }),
            sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.convert_expr(expr)?,
                alias: Some(ident(alias)),
            }),
        }
    }

    fn convert_table_with_joins(&mut self, from: &sp::TableWithJoins) -> ParseResult<ResultSetNode> {
        let mut node = self.convert_table_factor(&from.relation)?;
        for join in &from.joins {
            let right = self.convert_table_factor(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                sp::JoinOperator::Join(c) | sp::JoinOperator::Inner(c) => (JoinKind::Inner, c),
                sp::JoinOperator::Left(c) | sp::JoinOperator::LeftOuter(c) => (JoinKind::LeftOuter, c),
                other => return Err(ParseError::UnsupportedClause(format!("join {:?}", other))),
            };
            let on = match constraint {
                sp::JoinConstraint::On(expr) => self.convert_expr(expr)?,
                _ => return Err(ParseError::MissingClause("ON".into())),
            };
            node = ResultSetNode::Join(JoinNode::new(kind, node, right, Some(on)));
        }
        Ok(node)
    }

    fn convert_table_factor(&mut self, factor: &sp::TableFactor) -> ParseResult<ResultSetNode> {
        match factor {
            sp::TableFactor::Table { name, alias, args, .. } => {
                if args.is_some() {
                    return Err(ParseError::UnsupportedClause("table function".into()));
                }
                let (table, pos) = Self::table_name(name)?;
                if let Some(alias) = alias {
                    if !alias.columns.is_empty() {
                        return Err(ParseError::UnsupportedClause("column aliases on a table".into()));
                    }
                }
                Ok(ResultSetNode::BaseTable(BaseTableNode::new(
                    table,
                    alias.as_ref().map(|a| ident(&a.name)),
                    pos,
                )))
            }
            sp::TableFactor::Derived { lateral, subquery, alias, .. } => {
                if *lateral {
                    return Err(ParseError::UnsupportedClause("LATERAL".into()));
                }
                let alias = alias
                    .as_ref()
                    .ok_or_else(|| ParseError::MissingClause("correlation name for derived table".into()))?;
                let query = self.convert_subquery(subquery)?;
                Ok(ResultSetNode::Subquery(FromSubquery {
                    query: Box::new(query),
                    alias: ident(&alias.name),
                    column_aliases: alias.columns.iter().map(|c| ident(&c.name)).collect(),
                    table_number: None,
                    level: 0,
                    result_columns: ResultColumnList::new(),
                    view: None,
                    dependency_map: TableMap::new(),
                    access: None,
                }))
            }
            sp::TableFactor::NestedJoin { table_with_joins, alias, .. } => {
                if alias.is_some() {
                    return Err(ParseError::UnsupportedClause("alias on a parenthesized join".into()));
                }
                self.convert_table_with_joins(table_with_joins)
            }
            other => Err(ParseError::UnsupportedClause(other.to_string())),
        }
    }

    fn table_name(name: &sp::ObjectName) -> ParseResult<(TableName, Position)> {
        let parts = object_idents(name)?;
        match parts.as_slice() {
            [table] => Ok((TableName::new(None, ident(table)), position(table))),
            [schema, table] => Ok((TableName::new(Some(&ident(schema)), ident(table)), position(table))),
            _ => Err(ParseError::InvalidIdentifier(name.to_string())),
        }
    }

    fn convert_order_by(&mut self, order_by: &sp::OrderBy) -> ParseResult<OrderByList> {
        match &order_by.kind {
            sp::OrderByKind::All(_) => Err(ParseError::UnsupportedClause("ORDER BY ALL".into())),
            sp::OrderByKind::Expressions(exprs) => {
                let columns = exprs
                    .iter()
                    .map(|e| self.convert_order_by_expr(e))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(OrderByList::new(columns))
            }
        }
    }

    fn convert_order_by_expr(&mut self, expr: &sp::OrderByExpr) -> ParseResult<OrderByColumn> {
        let ascending = expr.options.asc.unwrap_or(true);
        let target = match &expr.expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::Number(s, _) => {
                    let n = s
                        .parse::<usize>()
                        .map_err(|_| ParseError::UnsupportedExpression(format!("ORDER BY {}", s)))?;
                    OrderByTarget::Position(n)
                }
                _ => OrderByTarget::Expression(self.convert_expr(&expr.expr)?),
            },
            other => OrderByTarget::Expression(self.convert_expr(other)?),
        };
        Ok(OrderByColumn::new(target, ascending))
    }

    fn convert_insert(&mut self, insert: &sp::Insert) -> ParseResult<Statement> {
        let (table, pos) = match &insert.table {
            sp::TableObject::TableName(name) => Self::table_name(name)?,
            sp::TableObject::TableFunction(_) => {
                return Err(ParseError::UnsupportedStatement("INSERT into a table function".into()))
            }
        };
        let source = insert
            .source
            .as_ref()
            .ok_or_else(|| ParseError::MissingClause("INSERT source".into()))?;
        let source = self.convert_subquery(source)?;

        Ok(Statement::Insert(InsertNode {
            table,
            position: pos,
            columns: insert.columns.iter().map(ident).collect(),
            column_positions: Vec::new(),
            source,
            target: None,
        }))
    }

    /// UPDATE becomes a query block over the target whose select list holds
    /// the assigned values.
    fn convert_update(
        &mut self,
        table: &sp::TableWithJoins,
        assignments: &[sp::Assignment],
        selection: &Option<sp::Expr>,
    ) -> ParseResult<Statement> {
        if !table.joins.is_empty() {
            return Err(ParseError::UnsupportedClause("UPDATE with joins".into()));
        }
        let target = self.convert_table_factor(&table.relation)?;
        let ResultSetNode::BaseTable(base) = &target else {
            return Err(ParseError::UnsupportedStatement("UPDATE of a derived table".into()));
        };
        let (name, pos) = (base.name.clone(), base.position);

        let mut columns = Vec::with_capacity(assignments.len());
        let mut items = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let column = match &assignment.target {
                sp::AssignmentTarget::ColumnName(parts) => {
                    let idents = object_idents(parts)?;
                    idents
                        .last()
                        .map(|id| ident(id))
                        .ok_or_else(|| ParseError::InvalidIdentifier(parts.to_string()))?
                }
                sp::AssignmentTarget::Tuple(_) => {
                    return Err(ParseError::UnsupportedClause("tuple assignment".into()))
                }
            };
            items.push(SelectItem::Expr {
                expr: self.convert_expr(&assignment.value)?,
                alias: Some(column.clone()),
            });
            columns.push(column);
        }

        let mut source = SelectNode::new(items, vec![target]);
        source.where_clause = selection.as_ref().map(|e| self.convert_expr(e)).transpose()?;

        Ok(Statement::Update(UpdateNode {
            table: name,
            position: pos,
            columns,
            column_positions: Vec::new(),
            source: ResultSetNode::Select(source),
        }))
    }

    fn convert_delete(&mut self, delete: &sp::Delete) -> ParseResult<Statement> {
        let tables = match &delete.from {
            sp::FromTable::WithFromKeyword(tables) => tables,
            sp::FromTable::WithoutKeyword(tables) => tables,
        };
        let [table] = tables.as_slice() else {
            return Err(ParseError::UnsupportedStatement(
                "DELETE from multiple tables not supported".into(),
            ));
        };
        if !table.joins.is_empty() {
            return Err(ParseError::UnsupportedClause("DELETE with joins".into()));
        }
        let target = self.convert_table_factor(&table.relation)?;
        let ResultSetNode::BaseTable(base) = &target else {
            return Err(ParseError::UnsupportedStatement("DELETE from a derived table".into()));
        };
        let (name, pos) = (base.name.clone(), base.position);

        let mut source = SelectNode::new(Vec::new(), vec![target]);
        source.where_clause = delete.selection.as_ref().map(|e| self.convert_expr(e)).transpose()?;

        Ok(Statement::Delete(DeleteNode {
            table: name,
            position: pos,
            source: ResultSetNode::Select(source),
        }))
    }

    fn convert_expr(&mut self, expr: &sp::Expr) -> ParseResult<ValueNode> {
        match expr {
            sp::Expr::Identifier(id) => Ok(ValueNode::column(None, ident(id), position(id))),

            sp::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [table, column] => Ok(ValueNode::column(Some(&ident(table)), ident(column), position(column))),
                [_schema, table, column] => {
                    Ok(ValueNode::column(Some(&ident(table)), ident(column), position(column)))
                }
                _ => Err(ParseError::InvalidIdentifier(expr.to_string())),
            },

            sp::Expr::Value(v) => self.convert_value(&v.value),

            sp::Expr::BinaryOp { left, op, right } => {
                let op = Self::convert_binary_op(op)?;
                Ok(ValueNode::binary(op, self.convert_expr(left)?, self.convert_expr(right)?))
            }

            sp::Expr::UnaryOp { op, expr } => {
                let operand = self.convert_expr(expr)?;
                let op = match op {
                    sp::UnaryOperator::Not => UnaryOp::Not,
                    sp::UnaryOperator::Minus => UnaryOp::Minus,
                    sp::UnaryOperator::Plus => UnaryOp::Plus,
                    other => return Err(ParseError::UnsupportedExpression(format!("unary operator {}", other))),
                };
                Ok(ValueNode::unary(op, operand))
            }

            sp::Expr::IsNull(e) => Ok(ValueNode::unary(UnaryOp::IsNull, self.convert_expr(e)?)),
            sp::Expr::IsNotNull(e) => Ok(ValueNode::unary(UnaryOp::IsNotNull, self.convert_expr(e)?)),

            sp::Expr::InList { expr, list, negated } => {
                // x IN (a, b) is (x = a) OR (x = b).
                let operand = self.convert_expr(expr)?;
                let mut disjuncts = Vec::with_capacity(list.len());
                for item in list {
                    let item = self.convert_expr(item)?;
                    disjuncts.push(ValueNode::binary(BinaryOp::Eq, operand.clone(), item));
                }
                let combined = disjuncts
                    .into_iter()
                    .reduce(|acc, next| ValueNode::binary(BinaryOp::Or, acc, next))
                    .ok_or_else(|| ParseError::MissingClause("IN list".into()))?;
                Ok(if *negated { ValueNode::unary(UnaryOp::Not, combined) } else { combined })
            }

            sp::Expr::InSubquery { expr, subquery, negated } => {
                let operand = self.convert_expr(expr)?;
                let query = self.convert_subquery(subquery)?;
                Ok(Self::subquery(SubqueryKind::In, *negated, Some(operand), query))
            }

            sp::Expr::Exists { subquery, negated } => {
                let query = self.convert_subquery(subquery)?;
                Ok(Self::subquery(SubqueryKind::Exists, *negated, None, query))
            }

            sp::Expr::Subquery(subquery) => {
                let query = self.convert_subquery(subquery)?;
                Ok(Self::subquery(SubqueryKind::Scalar, false, None, query))
            }

            sp::Expr::Between { expr, negated, low, high } => {
                let between = ValueNode::ternary(
                    TernaryOp::Between,
                    self.convert_expr(expr)?,
                    self.convert_expr(low)?,
                    Some(self.convert_expr(high)?),
                );
                Ok(if *negated { ValueNode::unary(UnaryOp::Not, between) } else { between })
            }

            sp::Expr::Like { negated, expr, pattern, escape_char, .. } => {
                let escape = escape_char
                    .as_ref()
                    .map(|c| ValueNode::literal(Literal::String(c.to_string().trim_matches('\'').to_string())));
                let like = ValueNode::ternary(
                    TernaryOp::Like,
                    self.convert_expr(expr)?,
                    self.convert_expr(pattern)?,
                    escape,
                );
                Ok(if *negated { ValueNode::unary(UnaryOp::Not, like) } else { like })
            }

            sp::Expr::Substring { expr, substring_from, substring_for, .. } => {
                let start = match substring_from {
                    Some(start) => self.convert_expr(start)?,
                    None => ValueNode::literal(Literal::Integer(1)),
                };
                let length = substring_for.as_ref().map(|l| self.convert_expr(l)).transpose()?;
                Ok(ValueNode::ternary(TernaryOp::Substr, self.convert_expr(expr)?, start, length))
            }

            sp::Expr::Cast { expr, data_type, .. } => {
                let target = Self::convert_data_type(data_type)?;
                Ok(ValueNode::cast(self.convert_expr(expr)?, target, false))
            }

            sp::Expr::Collate { expr, collation, .. } => {
                let kind = CollationKind::from_name(&collation.to_string())
                    .ok_or_else(|| ParseError::UnsupportedExpression(format!("collation {}", collation)))?;
                Ok(ValueNode::unary(UnaryOp::Collate(kind), self.convert_expr(expr)?))
            }

            sp::Expr::Function(f) => self.convert_function(f),

            sp::Expr::Nested(inner) => self.convert_expr(inner),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn subquery(kind: SubqueryKind, negated: bool, operand: Option<ValueNode>, query: ResultSetNode) -> ValueNode {
        ValueNode::Subquery(SubqueryNode {
            kind,
            negated,
            operand: operand.map(Box::new),
            query: Box::new(query),
            level: 0,
            under_top_and: false,
            data_type: None,
        })
    }

    fn convert_function(&mut self, f: &sp::Function) -> ParseResult<ValueNode> {
        let name = object_idents(&f.name)?
            .last()
            .map(|id| id.value.to_ascii_uppercase())
            .ok_or_else(|| ParseError::InvalidIdentifier(f.name.to_string()))?;

        let (distinct, raw_args) = match &f.args {
            sp::FunctionArguments::List(list) => (
                matches!(list.duplicate_treatment, Some(sp::DuplicateTreatment::Distinct)),
                list.args.as_slice(),
            ),
            sp::FunctionArguments::None => (false, &[][..]),
            sp::FunctionArguments::Subquery(_) => {
                return Err(ParseError::UnsupportedExpression(format!("{}(subquery)", name)))
            }
        };

        let mut wildcard = false;
        let mut args = Vec::with_capacity(raw_args.len());
        for arg in raw_args {
            match arg {
                sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => args.push(self.convert_expr(e)?),
                sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => wildcard = true,
                other => return Err(ParseError::UnsupportedExpression(format!("{}({})", name, other))),
            }
        }

        if let Some(func) = AggregateFn::from_name(&name) {
            let operand = match (func, wildcard, args.len()) {
                (AggregateFn::Count, true, 0) => None,
                (_, false, 1) => args.pop().map(Box::new),
                _ => return Err(ParseError::UnsupportedExpression(format!("{} arguments", name))),
            };
            return Ok(ValueNode::Aggregate(AggregateNode { func, distinct, operand, data_type: None }));
        }
        if wildcard || distinct {
            return Err(ParseError::UnsupportedExpression(format!("{}(...)", name)));
        }

        let mut args = args.into_iter();
        match (name.as_str(), args.len()) {
            ("UPPER" | "UCASE", 1) => Ok(ValueNode::unary(UnaryOp::Upper, Self::next_arg(&mut args)?)),
            ("LOWER" | "LCASE", 1) => Ok(ValueNode::unary(UnaryOp::Lower, Self::next_arg(&mut args)?)),
            ("SUBSTR", 2 | 3) => {
                let receiver = Self::next_arg(&mut args)?;
                let start = Self::next_arg(&mut args)?;
                Ok(ValueNode::ternary(TernaryOp::Substr, receiver, start, args.next()))
            }
            ("COALESCE" | "VALUE", n) if n >= 2 => Ok(ValueNode::Coalesce(CoalesceNode {
                args: args.collect(),
                data_type: None,
            })),
            _ => Err(ParseError::UnsupportedExpression(format!("function {}", f))),
        }
    }

    fn next_arg(args: &mut impl Iterator<Item = ValueNode>) -> ParseResult<ValueNode> {
        args.next().ok_or_else(|| ParseError::MissingClause("function argument".into()))
    }

    fn convert_value(&mut self, value: &sp::Value) -> ParseResult<ValueNode> {
        let literal = match value {
            sp::Value::Null => Literal::Null,
            sp::Value::Boolean(b) => Literal::Boolean(*b),
            sp::Value::Number(s, _) => Self::convert_number(s)?,
            sp::Value::SingleQuotedString(s) => Literal::String(s.clone()),
            sp::Value::Placeholder(_) => {
                let index = self.parameters;
                self.parameters += 1;
                return Ok(ValueNode::Parameter(Parameter {
                    index,
                    position: Position::default(),
                    data_type: None,
                }));
            }
            other => return Err(ParseError::UnsupportedExpression(format!("literal {}", other))),
        };
        Ok(ValueNode::literal(literal))
    }

    fn convert_number(s: &str) -> ParseResult<Literal> {
        if s.contains(['e', 'E']) {
            return s
                .parse::<f64>()
                .map(Literal::Double)
                .map_err(|_| ParseError::UnsupportedExpression(format!("invalid number: {}", s)));
        }
        if s.contains('.') {
            return Ok(Literal::Decimal(s.to_string()));
        }
        match s.parse::<i64>() {
            Ok(i) => Ok(Literal::Integer(i)),
            // Too large for BIGINT: an exact numeric literal.
            Err(_) if s.chars().all(|c| c.is_ascii_digit()) => Ok(Literal::Decimal(s.to_string())),
            Err(_) => Err(ParseError::UnsupportedExpression(format!("invalid number: {}", s))),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOp> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOp::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOp::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOp::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOp::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOp::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOp::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOp::And),
            sp::BinaryOperator::Or => Ok(BinaryOp::Or),
            sp::BinaryOperator::Plus => Ok(BinaryOp::Plus),
            sp::BinaryOperator::Minus => Ok(BinaryOp::Minus),
            sp::BinaryOperator::Multiply => Ok(BinaryOp::Multiply),
            sp::BinaryOperator::Divide => Ok(BinaryOp::Divide),
            sp::BinaryOperator::StringConcat => Ok(BinaryOp::Concat),
            other => Err(ParseError::UnsupportedExpression(format!("operator {}", other))),
        }
    }

    fn convert_data_type(dt: &sp::DataType) -> ParseResult<DataType> {
        dt.to_string()
            .parse::<DataType>()
            .map_err(|_| ParseError::UnsupportedDataType(dt.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(stmt: &Statement) -> &SelectNode {
        match stmt.query() {
            ResultSetNode::Select(s) => s,
            other => panic!("Expected Select, got {}", other.node_name()),
        }
    }

    #[test]
    fn test_parse_select_columns() {
        let stmt = Parser::parse("SELECT id, t.name AS n FROM app.users t").unwrap();
        let s = select(&stmt);
        assert_eq!(s.items.len(), 2);
        match &s.items[1] {
            SelectItem::Expr { expr, alias } => {
                assert_eq!(expr.to_string(), "T.NAME");
                assert_eq!(alias.as_deref(), Some("N"));
            }
            _ => panic!("Expected expression item"),
        }
        match &s.from_list[0] {
            ResultSetNode::BaseTable(t) => {
                assert_eq!(t.name.to_string(), "APP.USERS");
                assert_eq!(t.exposed_name(), "T");
                assert_eq!(t.position.line, 1);
            }
            _ => panic!("Expected BaseTable"),
        }
    }

    #[test]
    fn test_quoted_identifiers_keep_case() {
        let stmt = Parser::parse("SELECT \"Mixed\" FROM t").unwrap();
        match &select(&stmt).items[0] {
            SelectItem::Expr { expr, .. } => assert_eq!(expr.to_string(), "Mixed"),
            _ => panic!("Expected expression item"),
        }
    }

    #[test]
    fn test_parse_joins() {
        let stmt = Parser::parse("SELECT * FROM a INNER JOIN b ON a.x = b.x LEFT OUTER JOIN c ON b.y = c.y").unwrap();
        let s = select(&stmt);
        assert_eq!(s.from_list.len(), 1);
        match &s.from_list[0] {
            ResultSetNode::Join(j) => {
                assert_eq!(j.kind, JoinKind::LeftOuter);
                assert!(matches!(j.left.as_ref(), ResultSetNode::Join(inner) if inner.kind == JoinKind::Inner));
            }
            _ => panic!("Expected Join"),
        }
    }

    #[test]
    fn test_parse_cursor_clauses() {
        let stmt = Parser::parse("SELECT a FROM t ORDER BY 1 DESC, a OFFSET 5 ROWS FETCH FIRST 10 ROWS ONLY").unwrap();
        match stmt {
            Statement::Cursor(c) => {
                let order_by = c.order_by.unwrap();
                assert_eq!(order_by.len(), 2);
                assert_eq!(order_by.columns[0].target, OrderByTarget::Position(1));
                assert!(!order_by.columns[0].ascending);
                assert!(matches!(order_by.columns[1].target, OrderByTarget::Expression(_)));
                assert_eq!(c.offset.unwrap().to_string(), "5");
                assert_eq!(c.fetch.unwrap().to_string(), "10");
            }
            _ => panic!("Expected Cursor"),
        }
    }

    #[test]
    fn test_parameters_are_numbered() {
        let stmt = Parser::parse("SELECT a FROM t WHERE a = ? AND b > ?").unwrap();
        let mut indexes = Vec::new();
        stmt.query().walk_values(&mut |v| {
            if let ValueNode::Parameter(p) = v {
                indexes.push(p.index);
            }
        });
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn test_parse_subqueries() {
        let stmt = Parser::parse(
            "SELECT a FROM t WHERE EXISTS (SELECT 1 FROM u) AND a NOT IN (SELECT b FROM u) AND a = (SELECT MAX(b) FROM u)",
        )
        .unwrap();
        let mut kinds = Vec::new();
        select(&stmt).where_clause.as_ref().unwrap().walk(&mut |v| {
            if let ValueNode::Subquery(s) = v {
                kinds.push((s.kind, s.negated));
            }
        });
        assert_eq!(
            kinds,
            vec![
                (SubqueryKind::Exists, false),
                (SubqueryKind::In, true),
                (SubqueryKind::Scalar, false)
            ]
        );
    }

    #[test]
    fn test_order_by_in_subquery_rejected() {
        let result = Parser::parse("SELECT * FROM (SELECT a FROM t ORDER BY a) s");
        assert!(matches!(result, Err(ParseError::UnsupportedClause(_))));
    }

    #[test]
    fn test_derived_table_needs_alias() {
        assert!(matches!(
            Parser::parse("SELECT * FROM (SELECT a FROM t)"),
            Err(ParseError::MissingClause(_)) | Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_parse_values_and_set_operations() {
        let stmt = Parser::parse("VALUES (1, 2.5, 'x'), (4, 5e0, NULL)").unwrap();
        match stmt.query() {
            ResultSetNode::Values(v) => {
                assert_eq!(v.rows.len(), 2);
                assert_eq!(v.rows[0][1], ValueNode::literal(Literal::Decimal("2.5".into())));
                assert_eq!(v.rows[1][1], ValueNode::literal(Literal::Double(5.0)));
            }
            _ => panic!("Expected Values"),
        }

        let stmt = Parser::parse("SELECT a FROM t UNION ALL SELECT b FROM u").unwrap();
        assert!(matches!(stmt.query(), ResultSetNode::SetOperator(s) if s.all && s.op == SetOp::Union));
    }

    #[test]
    fn test_parse_functions() {
        let stmt = Parser::parse(
            "SELECT COUNT(*), COUNT(DISTINCT a), UPPER(b), SUBSTR(b, 2, 3), COALESCE(a, 0), CAST(a AS VARCHAR(10)) FROM t",
        )
        .unwrap();
        let rendered: Vec<String> = select(&stmt)
            .items
            .iter()
            .map(|i| match i {
                SelectItem::Expr { expr, .. } => expr.to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                "COUNT(*)",
                "COUNT(DISTINCT A)",
                "UPPER(B)",
                "SUBSTR(B, 2, 3)",
                "COALESCE(A, 0)",
                "CAST(A AS VARCHAR(10))"
            ]
        );
    }

    #[test]
    fn test_parse_dml() {
        match Parser::parse("INSERT INTO t (a, b) VALUES (1, 'x')").unwrap() {
            Statement::Insert(i) => {
                assert_eq!(i.columns, vec!["A", "B"]);
                assert!(matches!(i.source, ResultSetNode::Values(_)));
            }
            _ => panic!("Expected Insert"),
        }
        match Parser::parse("UPDATE t SET a = a + 1 WHERE b = 2").unwrap() {
            Statement::Update(u) => {
                assert_eq!(u.columns, vec!["A"]);
                assert!(select(&Statement::Update(u.clone())).where_clause.is_some());
            }
            _ => panic!("Expected Update"),
        }
        match Parser::parse("DELETE FROM t WHERE a IS NULL").unwrap() {
            Statement::Delete(d) => assert_eq!(d.table.name, "T"),
            _ => panic!("Expected Delete"),
        }
    }

    #[test]
    fn test_unsupported_statement() {
        assert!(matches!(
            Parser::parse("CREATE TABLE t (a INT)"),
            Err(ParseError::UnsupportedStatement(_))
        ));
        assert!(matches!(Parser::parse("   "), Err(ParseError::EmptyQuery)));
        assert!(matches!(Parser::parse("SELECT 1; SELECT 2"), Err(ParseError::MultipleStatements)));
    }
}
