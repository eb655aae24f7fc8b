//! Predicates implied by equijoins.
//!
//! Within one query block, equijoins between plain column references group
//! columns into equivalence classes. Every pair of columns of a class on
//! different tables gets an equijoin, and a comparison of a column with a
//! constant (or a NULL test) is copied onto every column joined to it.
//! Tables joined through EXISTS or NOT EXISTS take no part.

use super::context::Numbering;
use crate::tree::{BinaryOp, DataType, Predicate, PredicateList, TableMap, UnaryNode, UnaryOp, ValueNode};

/// Table number and column position of a column of the block.
type ColumnKey = (usize, usize);

fn block_column(node: &ValueNode, level: usize, excluded: &TableMap) -> Option<ColumnKey> {
    let source = node.as_column()?.source?;
    (source.level == level && !excluded.contains(source.table_number))
        .then_some((source.table_number, source.column_position))
}

fn nullable(node: &ValueNode) -> bool {
    node.data_type().map_or(true, |t| t.nullable)
}

#[derive(Clone)]
enum SearchOp {
    Compare(BinaryOp, ValueNode),
    Test(UnaryOp),
}

/// A column compared with a constant, or tested for NULL.
#[derive(Clone)]
struct SearchClause {
    column: ColumnKey,
    op: SearchOp,
}

impl SearchClause {
    fn from_expr(expr: &ValueNode, level: usize, excluded: &TableMap) -> Option<Self> {
        match expr {
            ValueNode::Binary(b) if b.op.is_comparison() => {
                match (block_column(&b.left, level, excluded), block_column(&b.right, level, excluded)) {
                    (Some(column), None) if matches!(b.right.as_ref(), ValueNode::Constant(_)) => Some(Self {
                        column,
                        op: SearchOp::Compare(b.op, b.right.as_ref().clone()),
                    }),
                    (None, Some(column)) if matches!(b.left.as_ref(), ValueNode::Constant(_)) => Some(Self {
                        column,
                        op: SearchOp::Compare(b.op.flip(), b.left.as_ref().clone()),
                    }),
                    _ => None,
                }
            }
            ValueNode::Unary(u) if matches!(u.op, UnaryOp::IsNull | UnaryOp::IsNotNull) => Some(Self {
                column: block_column(&u.operand, level, excluded)?,
                op: SearchOp::Test(u.op),
            }),
            _ => None,
        }
    }

    fn same_as(&self, other: &SearchClause) -> bool {
        self.column == other.column
            && match (&self.op, &other.op) {
                (SearchOp::Compare(a, x), SearchOp::Compare(b, y)) => a == b && x.is_equivalent(y),
                (SearchOp::Test(a), SearchOp::Test(b)) => a == b,
                _ => false,
            }
    }

    /// The clause applied to `column`.
    fn expression(&self, column: ValueNode) -> ValueNode {
        match &self.op {
            SearchOp::Compare(op, constant) => {
                let result = DataType::boolean().with_nullable(nullable(&column) || nullable(constant));
                ValueNode::typed_binary(*op, column, constant.clone(), result)
            }
            SearchOp::Test(op) => ValueNode::Unary(UnaryNode {
                op: *op,
                operand: Box::new(column),
                data_type: Some(DataType::boolean().with_nullable(false)),
            }),
        }
    }
}

#[derive(Default)]
struct Equijoins {
    /// A bound reference for every column seen in an equijoin.
    columns: Vec<(ColumnKey, ValueNode)>,
    pairs: Vec<(ColumnKey, ColumnKey)>,
    classes: Vec<Vec<ColumnKey>>,
}

impl Equijoins {
    fn record(&mut self, expr: &ValueNode, level: usize, excluded: &TableMap) {
        let ValueNode::Binary(b) = expr else { return };
        if b.op != BinaryOp::Eq {
            return;
        }
        let (Some(left), Some(right)) =
            (block_column(&b.left, level, excluded), block_column(&b.right, level, excluded))
        else {
            return;
        };
        if left.0 == right.0 {
            return;
        }
        for (key, node) in [(left, b.left.as_ref()), (right, b.right.as_ref())] {
            if self.column(key).is_none() {
                self.columns.push((key, node.clone()));
            }
        }
        self.pairs.push((left, right));
        self.merge(left, right);
    }

    fn column(&self, key: ColumnKey) -> Option<&ValueNode> {
        self.columns.iter().find(|(k, _)| *k == key).map(|(_, node)| node)
    }

    fn joined(&self, a: ColumnKey, b: ColumnKey) -> bool {
        self.pairs.iter().any(|&pair| pair == (a, b) || pair == (b, a))
    }

    fn merge(&mut self, a: ColumnKey, b: ColumnKey) {
        let find = |key: ColumnKey| self.classes.iter().position(|class| class.contains(&key));
        match (find(a), find(b)) {
            (Some(i), Some(j)) if i == j => {}
            (Some(i), Some(j)) => {
                let moved = self.classes.remove(i.max(j));
                self.classes[i.min(j)].extend(moved);
            }
            (Some(i), None) => self.classes[i].push(b),
            (None, Some(j)) => self.classes[j].push(a),
            (None, None) => self.classes.push(vec![a, b]),
        }
    }

    /// Columns directly joined to `key`.
    fn partners(&self, key: ColumnKey) -> Vec<ColumnKey> {
        self.pairs
            .iter()
            .filter_map(|&(a, b)| {
                if a == key {
                    Some(b)
                } else if b == key {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Add the equijoins and search clauses implied by `predicates`. Tables in
/// `excluded` are ignored. Returns how many predicates were added.
pub fn transitive_closure(
    predicates: &mut PredicateList,
    level: usize,
    excluded: &TableMap,
    numbering: &mut Numbering,
) -> usize {
    let mut equijoins = Equijoins::default();
    for predicate in predicates.iter() {
        equijoins.record(&predicate.expr, level, excluded);
    }
    let mut added = Vec::new();

    let mut missing = Vec::new();
    for class in &equijoins.classes {
        for (i, &a) in class.iter().enumerate() {
            for &b in &class[i + 1..] {
                if a.0 != b.0 && !equijoins.joined(a, b) {
                    missing.push((a, b));
                }
            }
        }
    }
    for (a, b) in missing {
        let (Some(left), Some(right)) = (equijoins.column(a), equijoins.column(b)) else {
            continue;
        };
        let result = DataType::boolean().with_nullable(nullable(left) || nullable(right));
        let expr = ValueNode::typed_binary(BinaryOp::Eq, left.clone(), right.clone(), result);
        equijoins.pairs.push((a, b));
        added.push(Predicate::new(numbering.next_predicate(), expr, level));
    }

    let mut searches: Vec<SearchClause> = predicates
        .iter()
        .filter_map(|p| SearchClause::from_expr(&p.expr, level, excluded))
        .collect();
    let mut index = 0;
    while index < searches.len() {
        for target in equijoins.partners(searches[index].column) {
            let derived = SearchClause {
                column: target,
                op: searches[index].op.clone(),
            };
            if searches.iter().any(|s| s.same_as(&derived)) {
                continue;
            }
            let Some(column) = equijoins.column(target) else {
                continue;
            };
            added.push(Predicate::new(numbering.next_predicate(), derived.expression(column.clone()), level));
            searches.push(derived);
        }
        index += 1;
    }

    let count = added.len();
    for predicate in added {
        log::trace!("implied predicate {}", predicate);
        predicates.push(predicate);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{Binder, CompileFacts, CompilerContext};
    use crate::catalog::{InMemoryCatalog, TableBuilder};
    use crate::sql::Parser;
    use crate::tree::{ResultSetNode, SelectNode, Statement};

    fn bound(sql: &str) -> SelectNode {
        let catalog = InMemoryCatalog::new();
        for name in ["T", "U", "W"] {
            catalog
                .add_table(
                    TableBuilder::new(name)
                        .column("A", DataType::integer())
                        .column("B", DataType::integer())
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        let mut facts = CompileFacts::new();
        let mut numbering = Numbering::new();
        let mut statement = Parser::parse(sql).unwrap();
        Binder::new(&catalog, &CompilerContext::default(), &mut facts, &mut numbering)
            .bind(&mut statement)
            .unwrap();
        match statement {
            Statement::Cursor(cursor) => match cursor.query {
                ResultSetNode::Select(select) => select,
                other => panic!("expected a select, got {}", other.node_name()),
            },
            other => panic!("expected a cursor, got {}", other.kind()),
        }
    }

    fn exprs(select: &SelectNode) -> Vec<String> {
        select.predicates.iter().map(|p| p.expr.to_string()).collect()
    }

    #[test]
    fn test_search_clause_crosses_equijoin() {
        let select = bound("SELECT t.a FROM t, u WHERE t.a = u.b AND 5 = u.b");
        assert_eq!(exprs(&select), vec!["(T.A = U.B)", "(5 = U.B)", "(T.A = 5)"]);
        let implied = select.predicates.iter().last().unwrap();
        assert_eq!(implied.referenced_tables.count(), 1);

        let select = bound("SELECT t.a FROM t, u WHERE t.a = u.b AND u.b > 5 AND t.a > 5");
        assert_eq!(select.predicates.len(), 3);
    }

    #[test]
    fn test_equijoin_chain_is_closed() {
        let select = bound("SELECT t.a FROM t, u, w WHERE t.a = u.a AND u.a = w.a AND w.a IS NULL");
        let exprs = exprs(&select);
        assert!(exprs.contains(&"(T.A = W.A)".to_string()));
        assert_eq!(select.predicates.len(), 6);

        let mut ids = select.predicates.ids();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_not_exists_table_is_left_out() {
        let select = bound("SELECT a FROM t WHERE t.a = 5 AND NOT EXISTS (SELECT * FROM w WHERE w.b = t.a)");
        assert_eq!(select.from_list.len(), 2);
        assert_eq!(select.predicates.len(), 2);
    }
}
