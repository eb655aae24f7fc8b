//! Value expressions.
//!
//! Every expression variant owns its children directly. Before binding a
//! node's `data_type` is `None`; the binder fills it in for every node or
//! fails.

use std::fmt;

use super::result_set::ResultSetNode;
use super::table_map::TableMap;
use super::types::{CollationKind, DataType};

/// Source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: u64,
    pub column: u64,
}

impl Position {
    pub fn new(line: u64, column: u64) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Exact numeric kept in its source spelling.
    Decimal(String),
    Double(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(true) => write!(f, "TRUE"),
            Literal::Boolean(false) => write!(f, "FALSE"),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Decimal(d) => write!(f, "{}", d),
            Literal::Double(d) => write!(f, "{:e}", d),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Where a bound column reference gets its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnSource {
    /// Table number of the base table, derived table or VALUES list.
    pub table_number: usize,
    /// Zero-based position in that table's result columns.
    pub column_position: usize,
    /// Nesting level of the query block that owns the table.
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReference {
    pub table: Option<String>,
    pub column: String,
    pub position: Position,
    pub source: Option<ColumnSource>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: Literal,
    pub data_type: Option<DataType>,
}

/// A `?` placeholder. Its type comes from the surrounding expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub index: usize,
    pub position: Position,
    pub data_type: Option<DataType>,
}

/// Reference to a column of the immediate child result set, produced when
/// wrapper nodes are stacked on a finished plan.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualColumn {
    pub column_position: usize,
    pub name: String,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    IsNull,
    IsNotNull,
    Upper,
    Lower,
    Collate(CollationKind),
}

impl UnaryOp {
    pub fn negate(&self) -> Option<UnaryOp> {
        match self {
            UnaryOp::IsNull => Some(UnaryOp::IsNotNull),
            UnaryOp::IsNotNull => Some(UnaryOp::IsNull),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryNode {
    pub op: UnaryOp,
    pub operand: Box<ValueNode>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide)
    }

    /// Comparison whose result is the logical negation of this one.
    pub fn negate(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::NotEq),
            BinaryOp::NotEq => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::GtEq),
            BinaryOp::GtEq => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::LtEq),
            BinaryOp::LtEq => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    /// Comparison with its operands exchanged: `a < b` is `b > a`.
    pub fn flip(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => *other,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryNode {
    pub op: BinaryOp,
    pub left: Box<ValueNode>,
    pub right: Box<ValueNode>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryOp {
    /// receiver LIKE left [ESCAPE right]
    Like,
    /// receiver BETWEEN left AND right
    Between,
    /// SUBSTR(receiver, left [, right])
    Substr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TernaryNode {
    pub op: TernaryOp,
    pub receiver: Box<ValueNode>,
    pub left: Box<ValueNode>,
    pub right: Option<Box<ValueNode>>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastNode {
    pub operand: Box<ValueNode>,
    pub target: DataType,
    /// Spliced in by the type resolver rather than written by the user.
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoalesceNode {
    pub args: Vec<ValueNode>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubqueryKind {
    /// Single value.
    Scalar,
    Exists,
    /// `operand IN (subquery)`.
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryNode {
    pub kind: SubqueryKind,
    pub negated: bool,
    pub operand: Option<Box<ValueNode>>,
    pub query: Box<ResultSetNode>,
    /// Nesting level of the subquery's own query block.
    pub level: usize,
    /// Set by the normalizer when the subquery is a direct conjunct of the
    /// top-level AND chain.
    pub under_top_and: bool,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFn::Count),
            "SUM" => Some(AggregateFn::Sum),
            "AVG" => Some(AggregateFn::Avg),
            "MIN" => Some(AggregateFn::Min),
            "MAX" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub func: AggregateFn,
    pub distinct: bool,
    /// `None` for COUNT(*).
    pub operand: Option<Box<ValueNode>>,
    pub data_type: Option<DataType>,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Column(ColumnReference),
    Constant(Constant),
    Parameter(Parameter),
    Virtual(VirtualColumn),
    Unary(UnaryNode),
    Binary(BinaryNode),
    Ternary(TernaryNode),
    Cast(CastNode),
    Coalesce(CoalesceNode),
    Subquery(SubqueryNode),
    Aggregate(AggregateNode),
}

impl ValueNode {
    /// Unbound column reference.
    pub fn column(table: Option<&str>, column: impl Into<String>, position: Position) -> Self {
        ValueNode::Column(ColumnReference {
            table: table.map(str::to_string),
            column: column.into(),
            position,
            source: None,
            data_type: None,
        })
    }

    /// Untyped literal.
    pub fn literal(value: Literal) -> Self {
        ValueNode::Constant(Constant { value, data_type: None })
    }

    /// Typed literal.
    pub fn typed_literal(value: Literal, data_type: DataType) -> Self {
        ValueNode::Constant(Constant { value, data_type: Some(data_type) })
    }

    /// Non-null boolean constant.
    pub fn boolean(value: bool) -> Self {
        Self::typed_literal(Literal::Boolean(value), DataType::boolean().with_nullable(false))
    }

    /// Typed NULL.
    pub fn null_of(data_type: DataType) -> Self {
        Self::typed_literal(Literal::Null, data_type.with_nullable(true))
    }

    pub fn unary(op: UnaryOp, operand: ValueNode) -> Self {
        ValueNode::Unary(UnaryNode { op, operand: Box::new(operand), data_type: None })
    }

    pub fn binary(op: BinaryOp, left: ValueNode, right: ValueNode) -> Self {
        ValueNode::Binary(BinaryNode {
            op,
            left: Box::new(left),
            right: Box::new(right),
            data_type: None,
        })
    }

    /// Boolean binary node with its result type already known.
    pub fn typed_binary(op: BinaryOp, left: ValueNode, right: ValueNode, data_type: DataType) -> Self {
        ValueNode::Binary(BinaryNode {
            op,
            left: Box::new(left),
            right: Box::new(right),
            data_type: Some(data_type),
        })
    }

    pub fn ternary(op: TernaryOp, receiver: ValueNode, left: ValueNode, right: Option<ValueNode>) -> Self {
        ValueNode::Ternary(TernaryNode {
            op,
            receiver: Box::new(receiver),
            left: Box::new(left),
            right: right.map(Box::new),
            data_type: None,
        })
    }

    pub fn cast(operand: ValueNode, target: DataType, implicit: bool) -> Self {
        ValueNode::Cast(CastNode { operand: Box::new(operand), target, implicit })
    }

    pub fn data_type(&self) -> Option<&DataType> {
        match self {
            ValueNode::Column(c) => c.data_type.as_ref(),
            ValueNode::Constant(c) => c.data_type.as_ref(),
            ValueNode::Parameter(p) => p.data_type.as_ref(),
            ValueNode::Virtual(v) => v.data_type.as_ref(),
            ValueNode::Unary(u) => u.data_type.as_ref(),
            ValueNode::Binary(b) => b.data_type.as_ref(),
            ValueNode::Ternary(t) => t.data_type.as_ref(),
            ValueNode::Cast(c) => Some(&c.target),
            ValueNode::Coalesce(c) => c.data_type.as_ref(),
            ValueNode::Subquery(s) => s.data_type.as_ref(),
            ValueNode::Aggregate(a) => a.data_type.as_ref(),
        }
    }

    /// Parameter or NULL literal still waiting for a type from its context.
    pub fn is_untyped(&self) -> bool {
        match self {
            ValueNode::Parameter(p) => p.data_type.is_none(),
            ValueNode::Constant(Constant { value: Literal::Null, data_type }) => data_type.is_none(),
            _ => false,
        }
    }

    /// Give an untyped parameter or NULL the type demanded by its context.
    /// The assigned type is always nullable. Returns false if the node was
    /// not an untyped marker.
    pub fn assign_type(&mut self, data_type: &DataType) -> bool {
        let data_type = data_type.clone().with_nullable(true);
        match self {
            ValueNode::Parameter(p) if p.data_type.is_none() => {
                p.data_type = Some(data_type);
                true
            }
            ValueNode::Constant(c) if c.data_type.is_none() && c.value == Literal::Null => {
                c.data_type = Some(data_type);
                true
            }
            _ => false,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, ValueNode::Constant(Constant { value: Literal::Boolean(true), .. }))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, ValueNode::Constant(Constant { value: Literal::Boolean(false), .. }))
    }

    pub fn is_and(&self) -> bool {
        matches!(self, ValueNode::Binary(BinaryNode { op: BinaryOp::And, .. }))
    }

    pub fn is_or(&self) -> bool {
        matches!(self, ValueNode::Binary(BinaryNode { op: BinaryOp::Or, .. }))
    }

    pub fn as_column(&self) -> Option<&ColumnReference> {
        match self {
            ValueNode::Column(c) => Some(c),
            _ => None,
        }
    }

    /// Column reference, looking through implicit casts.
    pub fn underlying_column(&self) -> Option<&ColumnReference> {
        match self {
            ValueNode::Column(c) => Some(c),
            ValueNode::Cast(CastNode { operand, implicit: true, .. }) => operand.underlying_column(),
            _ => None,
        }
    }

    /// Immediate children, not descending into subquery bodies.
    pub fn children(&self) -> Vec<&ValueNode> {
        match self {
            ValueNode::Column(_) | ValueNode::Constant(_) | ValueNode::Parameter(_) | ValueNode::Virtual(_) => {
                Vec::new()
            }
            ValueNode::Unary(u) => vec![u.operand.as_ref()],
            ValueNode::Binary(b) => vec![b.left.as_ref(), b.right.as_ref()],
            ValueNode::Ternary(t) => {
                let mut children = vec![t.receiver.as_ref(), t.left.as_ref()];
                if let Some(right) = &t.right {
                    children.push(right.as_ref());
                }
                children
            }
            ValueNode::Cast(c) => vec![c.operand.as_ref()],
            ValueNode::Coalesce(c) => c.args.iter().collect(),
            ValueNode::Subquery(s) => s.operand.iter().map(|o| o.as_ref()).collect(),
            ValueNode::Aggregate(a) => a.operand.iter().map(|o| o.as_ref()).collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut ValueNode> {
        match self {
            ValueNode::Column(_) | ValueNode::Constant(_) | ValueNode::Parameter(_) | ValueNode::Virtual(_) => {
                Vec::new()
            }
            ValueNode::Unary(u) => vec![u.operand.as_mut()],
            ValueNode::Binary(b) => vec![b.left.as_mut(), b.right.as_mut()],
            ValueNode::Ternary(t) => {
                let mut children = vec![t.receiver.as_mut(), t.left.as_mut()];
                if let Some(right) = &mut t.right {
                    children.push(right.as_mut());
                }
                children
            }
            ValueNode::Cast(c) => vec![c.operand.as_mut()],
            ValueNode::Coalesce(c) => c.args.iter_mut().collect(),
            ValueNode::Subquery(s) => s.operand.iter_mut().map(|o| o.as_mut()).collect(),
            ValueNode::Aggregate(a) => a.operand.iter_mut().map(|o| o.as_mut()).collect(),
        }
    }

    /// Rebuild this node with every immediate child passed through `f`.
    pub fn map_children<E>(
        self,
        f: &mut dyn FnMut(ValueNode) -> Result<ValueNode, E>,
    ) -> Result<ValueNode, E> {
        let mut apply = |b: Box<ValueNode>| -> Result<Box<ValueNode>, E> { Ok(Box::new(f(*b)?)) };
        Ok(match self {
            leaf @ (ValueNode::Column(_) | ValueNode::Constant(_) | ValueNode::Parameter(_) | ValueNode::Virtual(_)) => {
                leaf
            }
            ValueNode::Unary(mut u) => {
                u.operand = apply(u.operand)?;
                ValueNode::Unary(u)
            }
            ValueNode::Binary(mut b) => {
                b.left = apply(b.left)?;
                b.right = apply(b.right)?;
                ValueNode::Binary(b)
            }
            ValueNode::Ternary(mut t) => {
                t.receiver = apply(t.receiver)?;
                t.left = apply(t.left)?;
                t.right = t.right.map(&mut apply).transpose()?;
                ValueNode::Ternary(t)
            }
            ValueNode::Cast(mut c) => {
                c.operand = apply(c.operand)?;
                ValueNode::Cast(c)
            }
            ValueNode::Coalesce(mut c) => {
                c.args = c
                    .args
                    .into_iter()
                    .map(|a| apply(Box::new(a)).map(|b| *b))
                    .collect::<Result<Vec<_>, E>>()?;
                ValueNode::Coalesce(c)
            }
            ValueNode::Subquery(mut s) => {
                s.operand = s.operand.map(&mut apply).transpose()?;
                ValueNode::Subquery(s)
            }
            ValueNode::Aggregate(mut a) => {
                a.operand = a.operand.map(&mut apply).transpose()?;
                ValueNode::Aggregate(a)
            }
        })
    }

    /// Visit this node and its descendants in pre-order, not descending into
    /// subquery bodies.
    pub fn walk(&self, f: &mut dyn FnMut(&ValueNode)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Visit this node and its descendants in pre-order, including every
    /// expression inside subquery bodies.
    pub fn walk_deep(&self, f: &mut dyn FnMut(&ValueNode)) {
        f(self);
        if let ValueNode::Subquery(s) = self {
            s.query.walk_values(f);
        }
        for child in self.children() {
            child.walk_deep(f);
        }
    }

    /// Mutable pre-order visit including subquery bodies. A node replaced by
    /// `f` has the replacement's children visited instead.
    pub fn walk_deep_mut(&mut self, f: &mut dyn FnMut(&mut ValueNode)) {
        f(self);
        if let ValueNode::Subquery(s) = self {
            s.query.walk_values_mut(f);
        }
        for child in self.children_mut() {
            child.walk_deep_mut(f);
        }
    }

    /// Tables owned by query block `level` that this expression references,
    /// including correlated references from nested subqueries.
    pub fn referenced_tables(&self, level: usize) -> TableMap {
        let mut map = TableMap::new();
        self.walk_deep(&mut |node| {
            if let ValueNode::Column(ColumnReference { source: Some(src), .. }) = node {
                if src.level == level {
                    map.set(src.table_number);
                }
            }
        });
        map
    }

    /// Whether any column reference points at a query block shallower than
    /// `level`.
    pub fn is_correlated_above(&self, level: usize) -> bool {
        let mut correlated = false;
        self.walk_deep(&mut |node| {
            if let ValueNode::Column(ColumnReference { source: Some(src), .. }) = node {
                if src.level < level {
                    correlated = true;
                }
            }
        });
        correlated
    }

    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= matches!(node, ValueNode::Subquery(_)));
        found
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= matches!(node, ValueNode::Aggregate(_)));
        found
    }

    pub fn contains_parameter(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| found |= matches!(node, ValueNode::Parameter(_)));
        found
    }

    /// Whether this expression can be duplicated during flattening without
    /// duplicating a subquery or aggregate evaluation.
    pub fn is_copyable(&self) -> bool {
        !self.contains_subquery() && !self.contains_aggregate()
    }

    /// Structural equivalence: same variant, same operator, equivalent operands.
    /// Subqueries are never equivalent to anything.
    pub fn is_equivalent(&self, other: &ValueNode) -> bool {
        match (self, other) {
            (ValueNode::Column(a), ValueNode::Column(b)) => match (&a.source, &b.source) {
                (Some(sa), Some(sb)) => sa == sb,
                (None, None) => {
                    a.column.eq_ignore_ascii_case(&b.column)
                        && match (&a.table, &b.table) {
                            (Some(ta), Some(tb)) => ta.eq_ignore_ascii_case(tb),
                            (None, None) => true,
                            _ => false,
                        }
                }
                _ => false,
            },
            (ValueNode::Constant(a), ValueNode::Constant(b)) => {
                a.value == b.value
                    && match (&a.data_type, &b.data_type) {
                        (Some(ta), Some(tb)) => ta.type_id == tb.type_id,
                        _ => true,
                    }
            }
            (ValueNode::Parameter(a), ValueNode::Parameter(b)) => a.index == b.index,
            (ValueNode::Virtual(a), ValueNode::Virtual(b)) => a.column_position == b.column_position,
            (ValueNode::Unary(a), ValueNode::Unary(b)) => a.op == b.op && a.operand.is_equivalent(&b.operand),
            (ValueNode::Binary(a), ValueNode::Binary(b)) => {
                a.op == b.op && a.left.is_equivalent(&b.left) && a.right.is_equivalent(&b.right)
            }
            (ValueNode::Ternary(a), ValueNode::Ternary(b)) => {
                a.op == b.op
                    && a.receiver.is_equivalent(&b.receiver)
                    && a.left.is_equivalent(&b.left)
                    && match (&a.right, &b.right) {
                        (Some(x), Some(y)) => x.is_equivalent(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (ValueNode::Cast(a), ValueNode::Cast(b)) => {
                a.target.same_shape(&b.target) && a.operand.is_equivalent(&b.operand)
            }
            (ValueNode::Coalesce(a), ValueNode::Coalesce(b)) => {
                a.args.len() == b.args.len() && a.args.iter().zip(&b.args).all(|(x, y)| x.is_equivalent(y))
            }
            (ValueNode::Aggregate(a), ValueNode::Aggregate(b)) => {
                a.func == b.func
                    && a.distinct == b.distinct
                    && match (&a.operand, &b.operand) {
                        (Some(x), Some(y)) => x.is_equivalent(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueNode::Column(c) => match &c.table {
                Some(t) => write!(f, "{}.{}", t, c.column),
                None => write!(f, "{}", c.column),
            },
            ValueNode::Constant(c) => write!(f, "{}", c.value),
            ValueNode::Parameter(p) => write!(f, "?{}", p.index),
            ValueNode::Virtual(v) => write!(f, "#{}", v.column_position),
            ValueNode::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "NOT {}", u.operand),
                UnaryOp::Minus => write!(f, "-{}", u.operand),
                UnaryOp::Plus => write!(f, "+{}", u.operand),
                UnaryOp::IsNull => write!(f, "{} IS NULL", u.operand),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", u.operand),
                UnaryOp::Upper => write!(f, "UPPER({})", u.operand),
                UnaryOp::Lower => write!(f, "LOWER({})", u.operand),
                UnaryOp::Collate(kind) => write!(f, "{} COLLATE {}", u.operand, kind.sql_name()),
            },
            ValueNode::Binary(b) => write!(f, "({} {} {})", b.left, b.op.sql(), b.right),
            ValueNode::Ternary(t) => match (t.op, &t.right) {
                (TernaryOp::Like, Some(esc)) => write!(f, "{} LIKE {} ESCAPE {}", t.receiver, t.left, esc),
                (TernaryOp::Like, None) => write!(f, "{} LIKE {}", t.receiver, t.left),
                (TernaryOp::Between, Some(high)) => write!(f, "{} BETWEEN {} AND {}", t.receiver, t.left, high),
                (TernaryOp::Between, None) => write!(f, "{} BETWEEN {}", t.receiver, t.left),
                (TernaryOp::Substr, Some(len)) => write!(f, "SUBSTR({}, {}, {})", t.receiver, t.left, len),
                (TernaryOp::Substr, None) => write!(f, "SUBSTR({}, {})", t.receiver, t.left),
            },
            ValueNode::Cast(c) => write!(f, "CAST({} AS {})", c.operand, c.target),
            ValueNode::Coalesce(c) => {
                let args: Vec<String> = c.args.iter().map(|a| a.to_string()).collect();
                write!(f, "COALESCE({})", args.join(", "))
            }
            ValueNode::Subquery(s) => {
                let not = if s.negated { "NOT " } else { "" };
                match (s.kind, &s.operand) {
                    (SubqueryKind::Exists, _) => write!(f, "{}EXISTS (subquery)", not),
                    (SubqueryKind::In, Some(op)) => write!(f, "{} {}IN (subquery)", op, not),
                    _ => write!(f, "(subquery)"),
                }
            }
            ValueNode::Aggregate(a) => {
                let distinct = if a.distinct { "DISTINCT " } else { "" };
                match &a.operand {
                    Some(op) => write!(f, "{}({}{})", a.func.sql(), distinct, op),
                    None => write!(f, "{}(*)", a.func.sql()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_column(table_number: usize, column_position: usize) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: Some("T".into()),
            column: format!("C{}", column_position),
            position: Position::default(),
            source: Some(ColumnSource { table_number, column_position, level: 0 }),
            data_type: Some(DataType::integer()),
        })
    }

    #[test]
    fn test_comparison_negation() {
        assert_eq!(BinaryOp::Lt.negate(), Some(BinaryOp::GtEq));
        assert_eq!(BinaryOp::Eq.negate(), Some(BinaryOp::NotEq));
        assert_eq!(BinaryOp::And.negate(), None);
        assert_eq!(UnaryOp::IsNull.negate(), Some(UnaryOp::IsNotNull));
        assert_eq!(BinaryOp::LtEq.flip(), BinaryOp::GtEq);
    }

    #[test]
    fn test_equivalence_is_structural() {
        let a = ValueNode::binary(BinaryOp::Plus, bound_column(0, 1), ValueNode::literal(Literal::Integer(1)));
        let b = ValueNode::binary(BinaryOp::Plus, bound_column(0, 1), ValueNode::literal(Literal::Integer(1)));
        let c = ValueNode::binary(BinaryOp::Minus, bound_column(0, 1), ValueNode::literal(Literal::Integer(1)));
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
        assert!(!bound_column(0, 1).is_equivalent(&bound_column(1, 1)));
    }

    #[test]
    fn test_referenced_tables() {
        let expr = ValueNode::binary(BinaryOp::Eq, bound_column(2, 0), bound_column(5, 3));
        let map = expr.referenced_tables(0);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![2, 5]);
        assert!(expr.referenced_tables(1).is_empty());
    }

    #[test]
    fn test_assign_type_only_for_untyped_markers() {
        let mut param = ValueNode::Parameter(Parameter { index: 0, position: Position::default(), data_type: None });
        assert!(param.is_untyped());
        assert!(param.assign_type(&DataType::integer().with_nullable(false)));
        assert!(param.data_type().unwrap().nullable);
        assert!(!param.assign_type(&DataType::double()));

        let mut column = bound_column(0, 0);
        assert!(!column.assign_type(&DataType::double()));
    }

    #[test]
    fn test_display() {
        let expr = ValueNode::binary(
            BinaryOp::Eq,
            bound_column(0, 1),
            ValueNode::literal(Literal::String("it's".into())),
        );
        assert_eq!(expr.to_string(), "(T.C1 = 'it''s')");
    }
}
