//! Rewrite-capable traversal of value expressions.
//!
//! A pass implements [`ValueRewriter`] and runs through [`fold_value`]. The
//! `pre` hook sees a node before its children and may descend, stop, or hand
//! back a replacement; the `post` hook sees the node after its children were
//! folded. Children are always visited through
//! [`ValueNode::map_children`], so no operand is skipped by accident.
//!
//! Read-only collection passes implement [`ValueVisitor`] instead.

use super::value::ValueNode;

/// What to do with a node after the `pre` hook ran.
#[derive(Debug)]
pub enum Visit {
    /// Fold the children, then call `post`.
    Recurse,
    /// Keep the node as it is; neither children nor `post` are visited.
    Skip,
    /// Put this node in place of the current one.
    Replace(ValueNode),
}

pub trait ValueRewriter {
    type Error;

    fn pre(&mut self, _node: &mut ValueNode) -> Result<Visit, Self::Error> {
        Ok(Visit::Recurse)
    }

    fn post(&mut self, node: ValueNode) -> Result<ValueNode, Self::Error> {
        Ok(node)
    }
}

/// Run a rewriter over `node` and return the rewritten tree.
pub fn fold_value<R: ValueRewriter>(mut node: ValueNode, rewriter: &mut R) -> Result<ValueNode, R::Error> {
    match rewriter.pre(&mut node)? {
        Visit::Skip => Ok(node),
        Visit::Replace(replacement) => Ok(replacement),
        Visit::Recurse => {
            let node = node.map_children(&mut |child| fold_value(child, rewriter))?;
            rewriter.post(node)
        }
    }
}

/// Read-only pre-order visitor. Subquery bodies are not entered.
pub trait ValueVisitor {
    /// Inspect `node`; returning false skips its children.
    fn visit(&mut self, node: &ValueNode) -> bool;
}

pub fn visit_value<V: ValueVisitor + ?Sized>(node: &ValueNode, visitor: &mut V) {
    if visitor.visit(node) {
        for child in node.children() {
            visit_value(child, visitor);
        }
    }
}
