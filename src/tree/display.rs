//! Indented tree rendering used by EXPLAIN.

use std::fmt;

use super::predicate::PredicateList;
use super::result_column::ResultColumnList;
use super::result_set::{ResultSetNode, SelectItem};
use super::statement::Statement;
use crate::optimizer::CostEstimate;

fn columns(list: &ResultColumnList) -> String {
    list.iter()
        .filter(|c| !c.generated)
        .map(|c| {
            let expr = c.expression.to_string();
            if expr.eq_ignore_ascii_case(&c.name) || expr.ends_with(&format!(".{}", c.name)) {
                expr
            } else {
                format!("{} AS {}", expr, c.name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn predicates(list: &PredicateList) -> String {
    list.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" AND ")
}

fn cost(f: &mut fmt::Formatter<'_>, estimate: Option<CostEstimate>) -> fmt::Result {
    match estimate {
        Some(c) => write!(f, " ({})", c),
        None => Ok(()),
    }
}

impl ResultSetNode {
    fn format_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            ResultSetNode::Select(s) => {
                write!(f, "{}Select{}", pad, if s.distinct { " DISTINCT" } else { "" })?;
                if s.result_columns.is_empty() {
                    let items: Vec<String> = s
                        .items
                        .iter()
                        .map(|i| match i {
                            SelectItem::Wildcard { qualifier: Some(q) } => format!("{}.*", q),
                            SelectItem::Wildcard { qualifier: None } => "*".to_string(),
                            SelectItem::Expr { expr, alias: Some(a) } => format!("{} AS {}", expr, a),
                            SelectItem::Expr { expr, alias: None } => expr.to_string(),
                        })
                        .collect();
                    write!(f, ": [{}]", items.join(", "))?;
                } else {
                    write!(f, ": [{}]", columns(&s.result_columns))?;
                }
                if let Some(w) = &s.where_clause {
                    write!(f, " WHERE {}", w)?;
                }
                if !s.predicates.is_empty() {
                    write!(f, " WHERE {}", predicates(&s.predicates))?;
                }
                if !s.group_by.is_empty() {
                    let keys: Vec<String> = s.group_by.iter().map(|g| g.to_string()).collect();
                    write!(f, " GROUP BY {}", keys.join(", "))?;
                }
                if let Some(h) = &s.having {
                    write!(f, " HAVING {}", h)?;
                }
                cost(f, s.cost)?;
                writeln!(f)?;
                for child in self.children() {
                    child.format_indent(f, indent + 1)?;
                }
                Ok(())
            }
            ResultSetNode::BaseTable(t) => {
                write!(f, "{}BaseTable: {}", pad, t.name)?;
                if let Some(alias) = &t.alias {
                    write!(f, " AS {}", alias)?;
                }
                if let Some(n) = t.table_number {
                    write!(f, " #{}", n)?;
                }
                match &t.access {
                    Some(access) => write!(f, " {}", access)?,
                    None => {}
                }
                let fetched: Vec<&str> = t
                    .result_columns
                    .iter()
                    .filter(|c| c.referenced)
                    .map(|c| c.name.as_str())
                    .collect();
                if !fetched.is_empty() {
                    write!(f, " [{}]", fetched.join(", "))?;
                }
                writeln!(f)
            }
            ResultSetNode::Subquery(s) => {
                write!(f, "{}Subquery: {}", pad, s.alias)?;
                if let Some(n) = s.table_number {
                    write!(f, " #{}", n)?;
                }
                if let Some(view) = &s.view {
                    write!(f, " (view {})", view)?;
                }
                if let Some(access) = &s.access {
                    write!(f, " {}", access)?;
                }
                writeln!(f)?;
                s.query.format_indent(f, indent + 1)
            }
            ResultSetNode::Join(j) => {
                write!(f, "{}Join: {}", pad, j.kind.sql())?;
                if let Some(strategy) = j.strategy {
                    write!(f, " {}", strategy)?;
                }
                if let Some(on) = &j.on {
                    write!(f, " ON {}", on)?;
                }
                if !j.predicates.is_empty() {
                    write!(f, " ON {}", predicates(&j.predicates))?;
                }
                cost(f, j.cost)?;
                writeln!(f)?;
                j.left.format_indent(f, indent + 1)?;
                j.right.format_indent(f, indent + 1)
            }
            ResultSetNode::SetOperator(s) => {
                write!(f, "{}{}{}", pad, s.op.sql(), if s.all { " ALL" } else { "" })?;
                cost(f, s.cost)?;
                writeln!(f)?;
                s.left.format_indent(f, indent + 1)?;
                s.right.format_indent(f, indent + 1)
            }
            ResultSetNode::Values(v) => {
                let rows: Vec<String> = v
                    .rows
                    .iter()
                    .map(|row| {
                        let values: Vec<String> = row.iter().map(|e| e.to_string()).collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                write!(f, "{}Values: {}", pad, rows.join(", "))?;
                cost(f, v.cost)?;
                writeln!(f)
            }
            ResultSetNode::ProjectRestrict(p) => {
                write!(f, "{}ProjectRestrict: [{}]", pad, columns(&p.result_columns))?;
                if !p.restriction.is_empty() {
                    write!(f, " WHERE {}", predicates(&p.restriction))?;
                }
                cost(f, p.cost)?;
                writeln!(f)?;
                p.child.format_indent(f, indent + 1)
            }
            ResultSetNode::GroupBy(g) => {
                let keys: Vec<String> = g.group_by.iter().map(|e| e.to_string()).collect();
                let aggs: Vec<String> = g.aggregates.iter().map(|e| e.to_string()).collect();
                write!(f, "{}GroupBy: group=[{}], aggs=[{}]", pad, keys.join(", "), aggs.join(", "))?;
                cost(f, g.cost)?;
                writeln!(f)?;
                g.child.format_indent(f, indent + 1)
            }
            ResultSetNode::Distinct(d) => {
                write!(f, "{}Distinct", pad)?;
                cost(f, d.cost)?;
                writeln!(f)?;
                d.child.format_indent(f, indent + 1)
            }
            ResultSetNode::OrderBy(o) => {
                let keys: Vec<String> = o
                    .order_by
                    .iter()
                    .map(|c| {
                        let position = c.result_column.map(|i| i + 1).unwrap_or(0);
                        format!("#{} {}", position, if c.ascending { "ASC" } else { "DESC" })
                    })
                    .collect();
                write!(f, "{}Sort: [{}]", pad, keys.join(", "))?;
                if o.eliminate_duplicates {
                    write!(f, " DISTINCT")?;
                }
                cost(f, o.cost)?;
                writeln!(f)?;
                o.child.format_indent(f, indent + 1)
            }
            ResultSetNode::RowCount(r) => {
                write!(f, "{}RowCount:", pad)?;
                if let Some(offset) = &r.offset {
                    write!(f, " OFFSET {}", offset)?;
                }
                if let Some(fetch) = &r.fetch {
                    write!(f, " FETCH {}", fetch)?;
                }
                cost(f, r.cost)?;
                writeln!(f)?;
                r.child.format_indent(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for ResultSetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_indent(f, 0)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Cursor(c) => {
                writeln!(f, "Cursor")?;
                c.query.format_indent(f, 1)
            }
            Statement::Insert(i) => {
                writeln!(f, "Insert: {}", i.table)?;
                i.source.format_indent(f, 1)
            }
            Statement::Update(u) => {
                writeln!(f, "Update: {} SET [{}]", u.table, u.columns.join(", "))?;
                u.source.format_indent(f, 1)
            }
            Statement::Delete(d) => {
                writeln!(f, "Delete: {}", d.table)?;
                d.source.format_indent(f, 1)
            }
        }
    }
}
