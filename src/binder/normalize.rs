//! Boolean normalization of WHERE, ON and HAVING clauses.
//!
//! Output shape: a right-deep AND chain ending in TRUE whose left operands
//! are never ANDs. A left operand that is a disjunction is a right-deep OR
//! chain ending in FALSE. NOT does not survive except inside operands of
//! non-boolean operators. Expressions are typed before they get here and
//! every node built here is typed too.

use crate::tree::{BinaryNode, BinaryOp, DataType, Literal, TernaryNode, TernaryOp, UnaryNode, UnaryOp, ValueNode};

fn boolean(nullable: bool) -> DataType {
    DataType::boolean().with_nullable(nullable)
}

fn nullable(node: &ValueNode) -> bool {
    node.data_type().map(|t| t.nullable).unwrap_or(true)
}

/// Normalize a typed boolean expression.
pub fn normalize(expr: ValueNode) -> ValueNode {
    let expr = push_not(expr, false);
    let mut conjuncts = Vec::new();
    flatten(expr, BinaryOp::And, &mut conjuncts);
    let mut chain = and_chain(conjuncts.into_iter().map(normalize_conjunct).collect());
    mark_top_level_subqueries(&mut chain);
    chain
}

/// Conjuncts of a normalized AND chain, without the TRUE terminator.
pub fn conjuncts(expr: ValueNode) -> Vec<ValueNode> {
    let mut out = Vec::new();
    flatten(expr, BinaryOp::And, &mut out);
    out
}

/// Whether `expr` has the normalized shape.
pub fn is_normalized(expr: &ValueNode) -> bool {
    let mut node = expr;
    loop {
        match node {
            ValueNode::Binary(BinaryNode { op: BinaryOp::And, left, right, .. }) => {
                if left.is_and() || !disjunct_shape(left) {
                    return false;
                }
                node = right.as_ref();
            }
            other => return other.is_true(),
        }
    }
}

fn disjunct_shape(node: &ValueNode) -> bool {
    match node {
        ValueNode::Binary(BinaryNode { op: BinaryOp::Or, .. }) => {
            let mut node = node;
            loop {
                match node {
                    ValueNode::Binary(BinaryNode { op: BinaryOp::Or, left, right, .. }) => {
                        if left.is_or() || !disjunct_shape(left) {
                            return false;
                        }
                        node = right.as_ref();
                    }
                    other => return other.is_false(),
                }
            }
        }
        ValueNode::Binary(BinaryNode { op: BinaryOp::And, .. }) => is_normalized(node),
        ValueNode::Unary(UnaryNode { op: UnaryOp::Not, .. }) => false,
        ValueNode::Ternary(TernaryNode { op: TernaryOp::Between, receiver, .. }) => !receiver.is_copyable(),
        _ => true,
    }
}

/// Remove NOT by pushing it down to the leaves; BETWEEN is expanded on the way.
fn push_not(expr: ValueNode, negate: bool) -> ValueNode {
    match expr {
        ValueNode::Unary(UnaryNode { op: UnaryOp::Not, operand, .. }) => push_not(*operand, !negate),
        ValueNode::Binary(BinaryNode { op: op @ (BinaryOp::And | BinaryOp::Or), left, right, data_type }) => {
            let op = match (op, negate) {
                (BinaryOp::And, true) => BinaryOp::Or,
                (BinaryOp::Or, true) => BinaryOp::And,
                (op, _) => op,
            };
            ValueNode::Binary(BinaryNode {
                op,
                left: Box::new(push_not(*left, negate)),
                right: Box::new(push_not(*right, negate)),
                data_type,
            })
        }
        ValueNode::Binary(mut b) if negate && b.op.is_comparison() => {
            if let Some(negated) = b.op.negate() {
                b.op = negated;
            }
            ValueNode::Binary(b)
        }
        ValueNode::Unary(mut u) if negate && u.op.negate().is_some() => {
            if let Some(negated) = u.op.negate() {
                u.op = negated;
            }
            ValueNode::Unary(u)
        }
        ValueNode::Ternary(t) if t.op == TernaryOp::Between && t.receiver.is_copyable() => {
            push_not(expand_between(t), negate)
        }
        ValueNode::Subquery(mut s) if negate && s.kind != crate::tree::SubqueryKind::Scalar => {
            s.negated = !s.negated;
            ValueNode::Subquery(s)
        }
        ValueNode::Constant(mut c) if negate && matches!(c.value, Literal::Boolean(_)) => {
            if let Literal::Boolean(b) = c.value {
                c.value = Literal::Boolean(!b);
            }
            ValueNode::Constant(c)
        }
        other if negate => {
            let is_nullable = nullable(&other);
            ValueNode::typed_binary(BinaryOp::Eq, other, ValueNode::boolean(false), boolean(is_nullable))
        }
        other => other,
    }
}

fn expand_between(t: TernaryNode) -> ValueNode {
    let receiver = *t.receiver;
    let low = *t.left;
    let Some(high) = t.right.map(|h| *h) else {
        return ValueNode::Ternary(TernaryNode {
            receiver: Box::new(receiver),
            left: Box::new(low),
            right: None,
            ..t
        });
    };
    let low_nullable = nullable(&receiver) || nullable(&low);
    let high_nullable = nullable(&receiver) || nullable(&high);
    let lower = ValueNode::typed_binary(BinaryOp::GtEq, receiver.clone(), low, boolean(low_nullable));
    let upper = ValueNode::typed_binary(BinaryOp::LtEq, receiver, high, boolean(high_nullable));
    ValueNode::typed_binary(BinaryOp::And, lower, upper, boolean(low_nullable || high_nullable))
}

/// Collect the operands of nested `op` nodes, dropping the identity constant.
fn flatten(expr: ValueNode, op: BinaryOp, out: &mut Vec<ValueNode>) {
    match expr {
        ValueNode::Binary(b) if b.op == op => {
            flatten(*b.left, op, out);
            flatten(*b.right, op, out);
        }
        e if op == BinaryOp::And && e.is_true() => {}
        e if op == BinaryOp::Or && e.is_false() => {}
        e => out.push(e),
    }
}

fn and_chain(conjuncts: Vec<ValueNode>) -> ValueNode {
    chain(conjuncts, BinaryOp::And, ValueNode::boolean(true))
}

fn or_chain(disjuncts: Vec<ValueNode>) -> ValueNode {
    chain(disjuncts, BinaryOp::Or, ValueNode::boolean(false))
}

fn chain(operands: Vec<ValueNode>, op: BinaryOp, terminator: ValueNode) -> ValueNode {
    operands.into_iter().rev().fold(terminator, |rest, operand| {
        let is_nullable = nullable(&operand) || nullable(&rest);
        ValueNode::typed_binary(op, operand, rest, boolean(is_nullable))
    })
}

fn normalize_conjunct(conjunct: ValueNode) -> ValueNode {
    if !conjunct.is_or() {
        return conjunct;
    }
    let mut disjuncts = Vec::new();
    flatten(conjunct, BinaryOp::Or, &mut disjuncts);
    or_chain(disjuncts.into_iter().map(normalize_disjunct).collect())
}

fn normalize_disjunct(disjunct: ValueNode) -> ValueNode {
    if !disjunct.is_and() {
        return disjunct;
    }
    let mut conjuncts = Vec::new();
    flatten(disjunct, BinaryOp::And, &mut conjuncts);
    and_chain(conjuncts.into_iter().map(normalize_conjunct).collect())
}

fn mark_top_level_subqueries(chain: &mut ValueNode) {
    let mut node = chain;
    while let ValueNode::Binary(BinaryNode { op: BinaryOp::And, left, right, .. }) = node {
        if let ValueNode::Subquery(s) = left.as_mut() {
            s.under_top_and = true;
        }
        node = right.as_mut();
    }
}
