//! Type and collation resolution.
//!
//! [`TypeResolver::resolve`] types one node whose children are already
//! typed; the binder calls it from the `post` hook of its rewriter, so a
//! whole expression is typed bottom-up. Implicit conversions become
//! explicit `Cast` nodes marked `implicit`.

use super::context::CompilerContext;
use super::error::{BindError, BindResult};
use crate::tree::{
    AggregateFn, BinaryOp, Collation, DataType, Literal, Position, ResultSetNode, SubqueryKind, TernaryOp, TypeId,
    UnaryOp, ValueNode, CLOB_MAX_WIDTH, CHAR_MAX_WIDTH, DECIMAL_MAX_PRECISION, VARCHAR_MAX_WIDTH,
};

/// First source position found in an expression, for error messages.
pub fn position_of(node: &ValueNode) -> Position {
    let mut position = None;
    node.walk(&mut |n| {
        if position.is_none() {
            match n {
                ValueNode::Column(c) => position = Some(c.position),
                ValueNode::Parameter(p) => position = Some(p.position),
                _ => {}
            }
        }
    });
    position.unwrap_or_default()
}

/// Wrap `node` in an implicit cast to `target`, keeping its nullability.
pub fn splice_cast(node: ValueNode, target: &DataType) -> ValueNode {
    let nullable = node.data_type().map(|t| t.nullable).unwrap_or(true);
    ValueNode::cast(node, target.clone().with_nullable(nullable), true)
}

fn boolean(nullable: bool) -> DataType {
    DataType::boolean().with_nullable(nullable)
}

fn nullable(node: &ValueNode) -> bool {
    node.data_type().map(|t| t.nullable).unwrap_or(true)
}

/// Whether an explicit CAST from one type to another is legal.
pub fn cast_allowed(from: TypeId, to: TypeId) -> bool {
    use TypeId::*;
    if from == to {
        return true;
    }
    match (from, to) {
        (f, t) if f.is_numeric() && t.is_numeric() => true,
        (f, t) if f.is_numeric() && t.is_string() => !t.is_large_object(),
        (f, t) if f.is_string() && t.is_numeric() => !f.is_large_object(),
        (f, t) if f.is_string() && t.is_string() => true,
        (f, t) if f.is_string() && (t.is_datetime() || t == Boolean) => !f.is_large_object(),
        (f, t) if (f.is_datetime() || f == Boolean) && t.is_string() => !t.is_large_object(),
        (Date, Timestamp) | (Time, Timestamp) | (Timestamp, Date) | (Timestamp, Time) => true,
        _ => false,
    }
}

/// Whether a value of type `from` may be stored in a column of type `to`.
pub fn storable(from: TypeId, to: TypeId) -> bool {
    from == to
        || (from.is_numeric() && to.is_numeric())
        || (from.is_string() && to.is_string())
        || (to.is_datetime() && from.is_string())
}

fn mismatch(message: impl Into<String>, position: Position) -> BindError {
    BindError::TypeMismatch {
        message: message.into(),
        position,
    }
}

/// Precision and scale of a DECIMAL arithmetic result.
pub fn decimal_result(op: BinaryOp, left: (u32, u32), right: (u32, u32)) -> (u32, u32) {
    let (p1, s1) = (i64::from(left.0), i64::from(left.1));
    let (p2, s2) = (i64::from(right.0), i64::from(right.1));
    let max = i64::from(DECIMAL_MAX_PRECISION);
    let (mut precision, mut scale) = match op {
        BinaryOp::Multiply => (p1 + p2, s1 + s2),
        BinaryOp::Divide => (max, (max - p1 + s1 - s2).max(0)),
        _ => {
            let scale = s1.max(s2);
            ((p1 - s1).max(p2 - s2) + scale + 1, scale)
        }
    };
    if precision > max {
        scale = (scale - (precision - max)).max(0);
        precision = max;
    }
    scale = scale.min(precision);
    (precision as u32, scale as u32)
}

/// Result type of `left || right` for two string types. Operands without a
/// collation yield `fallback`.
pub fn concat_type(left: &DataType, right: &DataType, fallback: Collation) -> DataType {
    let width = u64::from(left.max_width) + u64::from(right.max_width);
    let clob = || DataType::clob(width.min(u64::from(CLOB_MAX_WIDTH)) as u32);
    let varchar_or_clob = || {
        if width <= u64::from(VARCHAR_MAX_WIDTH) {
            DataType::varchar(width as u32)
        } else {
            clob()
        }
    };
    let result = match (left.type_id, right.type_id) {
        (TypeId::Clob, _) | (_, TypeId::Clob) => clob(),
        (TypeId::Char, TypeId::Char) if width <= u64::from(CHAR_MAX_WIDTH) => DataType::char(width as u32),
        _ => varchar_or_clob(),
    };
    let collation = match (left.collation, right.collation) {
        (Some(a), Some(b)) => Collation::combine(a, b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => fallback,
    };
    result
        .with_collation(collation)
        .with_nullable(left.nullable || right.nullable)
}

/// Types one expression node at a time.
pub struct TypeResolver<'c> {
    context: &'c CompilerContext,
}

impl<'c> TypeResolver<'c> {
    pub fn new(context: &'c CompilerContext) -> Self {
        Self { context }
    }

    /// Type `node`, whose children are already typed.
    pub fn resolve(&self, node: ValueNode) -> BindResult<ValueNode> {
        let position = position_of(&node);
        match node {
            ValueNode::Constant(mut c) => {
                if c.data_type.is_none() {
                    c.data_type = self.literal_type(&c.value);
                }
                Ok(ValueNode::Constant(c))
            }
            ValueNode::Unary(mut u) => {
                let operand = u.operand.as_mut();
                let data_type = match u.op {
                    UnaryOp::Not => {
                        operand.assign_type(&DataType::boolean());
                        self.expect(operand, TypeId::Boolean, "NOT", position)?;
                        boolean(nullable(operand))
                    }
                    UnaryOp::Minus | UnaryOp::Plus => {
                        let t = self.typed(operand)?;
                        if !t.type_id.is_numeric() {
                            return Err(mismatch(format!("unary minus on {}", t), position));
                        }
                        t.clone()
                    }
                    UnaryOp::IsNull | UnaryOp::IsNotNull => {
                        self.typed(operand)?;
                        boolean(false)
                    }
                    UnaryOp::Upper | UnaryOp::Lower => {
                        operand.assign_type(&self.context.default_string_type());
                        let t = self.string_operand(operand, "UPPER/LOWER", position)?;
                        t.clone()
                    }
                    UnaryOp::Collate(kind) => {
                        operand.assign_type(&self.context.default_string_type());
                        let t = self.string_operand(operand, "COLLATE", position)?;
                        t.clone().with_collation(Collation::explicit(kind))
                    }
                };
                u.data_type = Some(data_type);
                Ok(ValueNode::Unary(u))
            }
            ValueNode::Binary(b) => {
                let (op, left, right) = (b.op, *b.left, *b.right);
                if op.is_logical() {
                    self.logical(op, left, right, position)
                } else if op.is_comparison() {
                    self.comparison(op, left, right)
                } else if op == BinaryOp::Concat {
                    self.concat(left, right, position)
                } else {
                    self.arithmetic(op, left, right, position)
                }
            }
            ValueNode::Ternary(mut t) => {
                let data_type = match t.op {
                    TernaryOp::Like => {
                        let default = self.context.default_string_type();
                        if t.receiver.is_untyped() && t.left.is_untyped() {
                            return Err(BindError::NoResolvableType { position });
                        }
                        t.receiver.assign_type(&default);
                        t.left.assign_type(&default);
                        let receiver = self.string_operand(&t.receiver, "LIKE", position)?.clone();
                        let pattern = self.string_operand(&t.left, "LIKE", position)?.clone();
                        self.check_collations(&receiver, &pattern, position)?;
                        if let Some(escape) = t.right.as_deref_mut() {
                            escape.assign_type(&default);
                            self.string_operand(escape, "ESCAPE", position)?;
                        }
                        boolean(receiver.nullable || pattern.nullable)
                    }
                    TernaryOp::Between => {
                        let high = t
                            .right
                            .take()
                            .ok_or_else(|| BindError::Unsupported("BETWEEN without an upper bound".into()))?;
                        let (receiver, low) = self.coerce_pair(*t.receiver, *t.left)?;
                        let (receiver, high) = self.coerce_pair(receiver, *high)?;
                        let is_nullable = nullable(&receiver) || nullable(&low) || nullable(&high);
                        t.receiver = Box::new(receiver);
                        t.left = Box::new(low);
                        t.right = Some(Box::new(high));
                        boolean(is_nullable)
                    }
                    TernaryOp::Substr => {
                        t.receiver.assign_type(&self.context.default_string_type());
                        let receiver = self.string_operand(&t.receiver, "SUBSTR", position)?.clone();
                        let mut any_nullable = receiver.nullable;
                        for arg in std::iter::once(t.left.as_mut()).chain(t.right.as_deref_mut()) {
                            arg.assign_type(&DataType::integer());
                            let at = self.typed(arg)?;
                            if !at.type_id.is_exact_integer() {
                                return Err(mismatch(format!("SUBSTR position of type {}", at), position));
                            }
                            any_nullable |= at.nullable;
                        }
                        let result = if receiver.type_id == TypeId::Clob {
                            receiver.clone()
                        } else {
                            let mut varchar = DataType::varchar(receiver.max_width);
                            varchar.collation = receiver.collation;
                            varchar
                        };
                        result.with_nullable(any_nullable)
                    }
                };
                t.data_type = Some(data_type);
                Ok(ValueNode::Ternary(t))
            }
            ValueNode::Cast(mut c) => {
                if c.operand.assign_type(&c.target) {
                    return Ok(ValueNode::Cast(c));
                }
                let from = self.typed(&c.operand)?.clone();
                if !cast_allowed(from.type_id, c.target.type_id) {
                    return Err(BindError::IllegalCast {
                        from: from.to_string(),
                        to: c.target.to_string(),
                        position,
                    });
                }
                c.target.nullable = from.nullable;
                if c.target.type_id.is_string() && !c.implicit {
                    c.target = c.target.clone().with_collation(self.context.literal_collation());
                }
                Ok(ValueNode::Cast(c))
            }
            ValueNode::Coalesce(mut c) => {
                let types: Vec<DataType> = c.args.iter().filter_map(|a| a.data_type().cloned()).collect();
                if types.is_empty() {
                    return Err(BindError::NoResolvableType { position });
                }
                let dominant = self.dominant_type(&types, position)?;
                let all_nullable = c.args.iter().all(|a| a.is_untyped() || nullable(a));
                c.args = c
                    .args
                    .into_iter()
                    .map(|mut arg| {
                        if arg.assign_type(&dominant) {
                            return arg;
                        }
                        match arg.data_type() {
                            Some(t) if t.type_id != dominant.type_id => splice_cast(arg, &dominant),
                            _ => arg,
                        }
                    })
                    .collect();
                c.data_type = Some(dominant.with_nullable(all_nullable));
                Ok(ValueNode::Coalesce(c))
            }
            ValueNode::Subquery(mut s) => {
                let data_type = match s.kind {
                    SubqueryKind::Exists => boolean(false),
                    SubqueryKind::Scalar => {
                        let column = single_column_type(&s.query, position)?;
                        column.with_nullable(true)
                    }
                    SubqueryKind::In => {
                        let column = single_column_type(&s.query, position)?;
                        let mut operand = s
                            .operand
                            .take()
                            .map(|o| *o)
                            .ok_or_else(|| BindError::Unsupported("IN without an operand".into()))?;
                        operand.assign_type(&column);
                        let operand_type = self.typed(&operand)?.clone();
                        if operand_type.type_id.is_string() && !column.type_id.is_string() {
                            operand = splice_cast(operand, &column);
                        } else if column.type_id.is_string() && !operand_type.type_id.is_string() {
                            let query_column = match s.query.as_mut() {
                                ResultSetNode::Select(select) => select.result_columns.get_mut(0),
                                _ => None,
                            }
                            .ok_or_else(|| {
                                mismatch(format!("IN between {} and {}", operand_type, column), position)
                            })?;
                            let expression = std::mem::replace(
                                &mut query_column.expression,
                                ValueNode::literal(Literal::Null),
                            );
                            query_column.expression = splice_cast(expression, &operand_type);
                        } else {
                            self.check_comparable(&operand_type, &column, position)?;
                        }
                        let is_nullable = operand_type.nullable || column.nullable;
                        s.operand = Some(Box::new(operand));
                        boolean(is_nullable)
                    }
                };
                s.data_type = Some(data_type);
                Ok(ValueNode::Subquery(s))
            }
            ValueNode::Aggregate(mut a) => {
                let data_type = match (a.func, a.operand.as_deref()) {
                    (AggregateFn::Count, _) => DataType::integer().with_nullable(false),
                    (_, None) => return Err(BindError::Unsupported(format!("{}(*)", a.func.sql()))),
                    (func, Some(operand)) => {
                        let t = self.typed(operand)?;
                        match func {
                            AggregateFn::Sum | AggregateFn::Avg if !t.type_id.is_numeric() => {
                                return Err(mismatch(format!("{} of {}", func.sql(), t), position));
                            }
                            _ if t.type_id.is_large_object() => {
                                return Err(mismatch(format!("{} of {}", func.sql(), t), position));
                            }
                            _ => t.clone().with_nullable(true),
                        }
                    }
                };
                a.data_type = Some(data_type);
                Ok(ValueNode::Aggregate(a))
            }
            other => Ok(other),
        }
    }

    fn literal_type(&self, literal: &Literal) -> Option<DataType> {
        let data_type = match literal {
            Literal::Null => return None,
            Literal::Boolean(_) => DataType::boolean(),
            Literal::Integer(i) if i32::try_from(*i).is_ok() => DataType::integer(),
            Literal::Integer(_) => DataType::big_int(),
            Literal::Decimal(text) => {
                let digits = text.trim_start_matches(['-', '+']);
                let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
                let int_digits = int_part.trim_start_matches('0').len() as u32;
                let scale = frac_part.len() as u32;
                DataType::decimal((int_digits + scale).max(1), scale)
            }
            Literal::Double(_) => DataType::double(),
            Literal::String(s) => {
                let width = s.chars().count() as u32;
                let base = if width <= CHAR_MAX_WIDTH {
                    DataType::char(width)
                } else {
                    DataType::varchar(width)
                };
                base.with_collation(self.context.literal_collation())
            }
        };
        Some(data_type.with_nullable(false))
    }

    fn typed<'n>(&self, node: &'n ValueNode) -> BindResult<&'n DataType> {
        node.data_type().ok_or_else(|| BindError::NoResolvableType {
            position: position_of(node),
        })
    }

    fn expect(&self, node: &ValueNode, type_id: TypeId, context: &str, position: Position) -> BindResult<()> {
        let t = self.typed(node)?;
        if t.type_id != type_id {
            return Err(mismatch(format!("{} needs {}, found {}", context, type_id, t), position));
        }
        Ok(())
    }

    fn string_operand<'n>(&self, node: &'n ValueNode, context: &str, position: Position) -> BindResult<&'n DataType> {
        let t = self.typed(node)?;
        if !t.type_id.is_string() {
            return Err(mismatch(format!("{} needs a string, found {}", context, t), position));
        }
        Ok(t)
    }

    fn check_collations(&self, left: &DataType, right: &DataType, position: Position) -> BindResult<()> {
        if let (Some(a), Some(b)) = (left.collation, right.collation) {
            if !Collation::comparable(a, b) {
                return Err(BindError::CollationMismatch {
                    left: a.to_string(),
                    right: b.to_string(),
                    position,
                });
            }
        }
        Ok(())
    }

    fn check_comparable(&self, left: &DataType, right: &DataType, position: Position) -> BindResult<()> {
        let (l, r) = (left.type_id, right.type_id);
        if l.is_large_object() || r.is_large_object() {
            return Err(mismatch(format!("cannot compare {} with {}", left, right), position));
        }
        if l.is_string() && r.is_string() {
            return self.check_collations(left, right, position);
        }
        let ok = (l.is_numeric() && r.is_numeric()) || (l.is_datetime() && l == r) || (l == TypeId::Boolean && l == r);
        if ok {
            Ok(())
        } else {
            Err(mismatch(format!("cannot compare {} with {}", left, right), position))
        }
    }

    /// Make two operands comparable: type untyped markers from the other
    /// side and cast a string operand compared with a non-string one.
    pub fn coerce_pair(&self, mut left: ValueNode, mut right: ValueNode) -> BindResult<(ValueNode, ValueNode)> {
        let position = position_of(&left);
        match (left.is_untyped(), right.is_untyped()) {
            (true, true) => return Err(BindError::NoResolvableType { position }),
            (true, false) => {
                let t = self.typed(&right)?.clone();
                left.assign_type(&t);
            }
            (false, true) => {
                let t = self.typed(&left)?.clone();
                right.assign_type(&t);
            }
            (false, false) => {}
        }
        let lt = self.typed(&left)?.clone();
        let rt = self.typed(&right)?.clone();
        if lt.type_id.is_large_object() || rt.type_id.is_large_object() {
            return Err(mismatch(format!("cannot compare {} with {}", lt, rt), position));
        }
        match (lt.type_id.is_string(), rt.type_id.is_string()) {
            (true, false) => left = splice_cast(left, &rt),
            (false, true) => right = splice_cast(right, &lt),
            _ => self.check_comparable(&lt, &rt, position)?,
        }
        Ok((left, right))
    }

    /// Typed comparison `left op right`; operand order is preserved.
    pub fn comparison(&self, op: BinaryOp, left: ValueNode, right: ValueNode) -> BindResult<ValueNode> {
        let (left, right) = self.coerce_pair(left, right)?;
        let is_nullable = nullable(&left) || nullable(&right);
        Ok(ValueNode::typed_binary(op, left, right, boolean(is_nullable)))
    }

    fn logical(&self, op: BinaryOp, mut left: ValueNode, mut right: ValueNode, position: Position) -> BindResult<ValueNode> {
        left.assign_type(&DataType::boolean());
        right.assign_type(&DataType::boolean());
        self.expect(&left, TypeId::Boolean, op.sql(), position)?;
        self.expect(&right, TypeId::Boolean, op.sql(), position)?;
        let is_nullable = nullable(&left) || nullable(&right);
        Ok(ValueNode::typed_binary(op, left, right, boolean(is_nullable)))
    }

    fn arithmetic(&self, op: BinaryOp, mut left: ValueNode, mut right: ValueNode, position: Position) -> BindResult<ValueNode> {
        match (left.is_untyped(), right.is_untyped()) {
            (true, true) => return Err(BindError::NoResolvableType { position }),
            (true, false) => {
                let t = self.typed(&right)?.clone();
                left.assign_type(&t);
            }
            (false, true) => {
                let t = self.typed(&left)?.clone();
                right.assign_type(&t);
            }
            (false, false) => {}
        }
        let lt = self.typed(&left)?.clone();
        let rt = self.typed(&right)?.clone();
        let (Some(lp), Some(rp)) = (lt.type_id.numeric_precedence(), rt.type_id.numeric_precedence()) else {
            return Err(mismatch(format!("{} {} {}", lt, op.sql(), rt), position));
        };
        let dominant = if lp >= rp { &lt } else { &rt };
        let result = match dominant.type_id {
            TypeId::Decimal => {
                let (precision, scale) = decimal_result(op, lt.decimal_shape(), rt.decimal_shape());
                DataType::decimal(precision, scale)
            }
            TypeId::SmallInt => DataType::integer(),
            other => DataType::for_type_id(other),
        };
        let result = result.with_nullable(lt.nullable || rt.nullable);
        Ok(ValueNode::typed_binary(op, left, right, result))
    }

    fn concat(&self, mut left: ValueNode, mut right: ValueNode, position: Position) -> BindResult<ValueNode> {
        let default = self.context.default_string_type();
        left.assign_type(&default);
        right.assign_type(&default);
        let lt = self.string_operand(&left, "||", position)?.clone();
        let rt = self.string_operand(&right, "||", position)?.clone();
        let result = concat_type(&lt, &rt, self.context.literal_collation());
        Ok(ValueNode::typed_binary(BinaryOp::Concat, left, right, result))
    }

    /// Type that values of all `types` convert to: COALESCE arguments,
    /// VALUES rows and set-operator arms. Nullable if any input is.
    pub fn dominant_type(&self, types: &[DataType], position: Position) -> BindResult<DataType> {
        let Some(first) = types.first() else {
            return Err(BindError::NoResolvableType { position });
        };
        let any_nullable = types.iter().any(|t| t.nullable);
        let incompatible = || {
            let names: Vec<String> = types.iter().map(|t| t.to_string()).collect();
            mismatch(format!("incompatible types {}", names.join(", ")), position)
        };

        let result = if types.iter().all(|t| t.type_id.is_numeric()) {
            let top = types
                .iter()
                .max_by_key(|t| t.type_id.numeric_precedence())
                .map(|t| t.type_id)
                .unwrap_or(first.type_id);
            if top == TypeId::Decimal {
                let scale = types.iter().map(|t| t.decimal_shape().1).max().unwrap_or(0);
                let integer_digits = types
                    .iter()
                    .map(|t| {
                        let (p, s) = t.decimal_shape();
                        p.saturating_sub(s)
                    })
                    .max()
                    .unwrap_or(1);
                let precision = (integer_digits + scale).min(DECIMAL_MAX_PRECISION);
                DataType::decimal(precision, scale.min(precision))
            } else {
                DataType::for_type_id(top)
            }
        } else if types.iter().all(|t| t.type_id.is_string()) {
            let top = types
                .iter()
                .max_by_key(|t| t.type_id.string_precedence())
                .map(|t| t.type_id)
                .unwrap_or(first.type_id);
            let width = types.iter().map(|t| t.max_width).max().unwrap_or(1);
            let base = match top {
                TypeId::Char => DataType::char(width),
                TypeId::Varchar => DataType::varchar(width),
                TypeId::LongVarchar => DataType::long_varchar(),
                _ => DataType::clob(width),
            };
            let collation = types
                .iter()
                .filter_map(|t| t.collation)
                .reduce(Collation::combine)
                .unwrap_or_else(|| self.context.literal_collation());
            base.with_collation(collation)
        } else if types.iter().all(|t| t.type_id == first.type_id) {
            first.clone()
        } else {
            return Err(incompatible());
        };
        Ok(result.with_nullable(any_nullable))
    }

    /// Convert a value for storage into a column of type `target`.
    pub fn assignment(&self, mut value: ValueNode, target: &DataType, column: &str) -> BindResult<ValueNode> {
        if value.assign_type(target) {
            return Ok(value);
        }
        let position = position_of(&value);
        let from = self.typed(&value)?.clone();
        if !storable(from.type_id, target.type_id) {
            return Err(mismatch(
                format!("column {} of type {} cannot hold a value of type {}", column, target, from),
                position,
            ));
        }
        if from.type_id != target.type_id {
            value = splice_cast(value, target);
        }
        Ok(value)
    }
}

fn single_column_type(query: &ResultSetNode, position: Position) -> BindResult<DataType> {
    let columns = query.result_columns();
    if columns.visible_len() != 1 {
        return Err(BindError::ColumnCountMismatch {
            expected: 1,
            found: columns.visible_len(),
        });
    }
    columns
        .get(0)
        .and_then(|c| c.data_type())
        .cloned()
        .ok_or(BindError::NoResolvableType { position })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{CollationKind, ColumnReference, ColumnSource, Derivation, Parameter};

    fn column(data_type: DataType) -> ValueNode {
        ValueNode::Column(ColumnReference {
            table: Some("T".into()),
            column: "C".into(),
            position: Position::new(1, 8),
            source: Some(ColumnSource { table_number: 0, column_position: 0, level: 0 }),
            data_type: Some(data_type),
        })
    }

    fn param() -> ValueNode {
        ValueNode::Parameter(Parameter { index: 0, position: Position::new(1, 20), data_type: None })
    }

    fn resolve(node: ValueNode) -> BindResult<ValueNode> {
        let context = CompilerContext::default();
        TypeResolver::new(&context).resolve(node)
    }

    fn resolved_literal(literal: Literal) -> ValueNode {
        resolve(ValueNode::literal(literal)).unwrap()
    }

    #[test]
    fn test_decimal_arithmetic_rules() {
        assert_eq!(decimal_result(BinaryOp::Plus, (5, 2), (10, 0)), (13, 2));
        assert_eq!(decimal_result(BinaryOp::Multiply, (5, 2), (4, 1)), (9, 3));
        assert_eq!(decimal_result(BinaryOp::Divide, (10, 2), (5, 0)), (31, 23));
        assert_eq!(decimal_result(BinaryOp::Multiply, (20, 5), (20, 5)), (31, 1));
    }

    #[test]
    fn test_concat_width_escalation() {
        let ucs = Collation::implicit(CollationKind::UcsBasic);
        assert_eq!(concat_type(&DataType::char(100), &DataType::char(100), ucs).type_id, TypeId::Char);
        let wide = concat_type(&DataType::char(200), &DataType::char(100), ucs);
        assert_eq!((wide.type_id, wide.max_width), (TypeId::Varchar, 300));
        let huge = concat_type(&DataType::varchar(30_000), &DataType::varchar(10_000), ucs);
        assert_eq!((huge.type_id, huge.max_width), (TypeId::Clob, 40_000));
        assert_eq!(concat_type(&DataType::clob(10), &DataType::char(1), ucs).type_id, TypeId::Clob);
        let nullable = concat_type(&DataType::char(1).with_nullable(false), &DataType::char(1), ucs);
        assert!(nullable.nullable);
    }

    #[test]
    fn test_concat_without_collation_uses_context_default() {
        let context = CompilerContext::new().with_default_collation(CollationKind::TerritoryBased);
        let uncollated = |t: DataType| DataType { collation: None, ..t };
        let expr = ValueNode::binary(
            BinaryOp::Concat,
            column(uncollated(DataType::varchar(5))),
            column(uncollated(DataType::char(2))),
        );
        let resolved = TypeResolver::new(&context).resolve(expr).unwrap();
        assert_eq!(
            resolved.data_type().unwrap().collation,
            Some(Collation::implicit(CollationKind::TerritoryBased))
        );
    }

    #[test]
    fn test_literal_types() {
        let int = resolved_literal(Literal::Integer(7));
        assert_eq!(int.data_type().unwrap(), &DataType::integer().with_nullable(false));
        let big = resolved_literal(Literal::Integer(1 << 40));
        assert_eq!(big.data_type().unwrap().type_id, TypeId::BigInt);
        let dec = resolved_literal(Literal::Decimal("12.345".into()));
        assert_eq!(dec.data_type().unwrap().to_string(), "DECIMAL(5,3)");
        let s = resolved_literal(Literal::String("abc".into()));
        assert_eq!(s.data_type().unwrap().to_string(), "CHAR(3)");
        assert!(resolved_literal(Literal::Null).is_untyped());
    }

    #[test]
    fn test_string_compared_with_number_gets_cast() {
        let expr = ValueNode::binary(BinaryOp::Eq, column(DataType::varchar(10)), column(DataType::integer()));
        let resolved = resolve(expr).unwrap();
        let ValueNode::Binary(b) = &resolved else { panic!("expected binary") };
        assert!(matches!(b.left.as_ref(), ValueNode::Cast(c) if c.implicit && c.target.type_id == TypeId::Integer));
        assert_eq!(b.data_type.as_ref().unwrap().type_id, TypeId::Boolean);
        assert!(b.data_type.as_ref().unwrap().nullable);
    }

    #[test]
    fn test_parameter_takes_type_from_other_operand() {
        let expr = ValueNode::binary(BinaryOp::Lt, column(DataType::decimal(8, 2)), param());
        let resolved = resolve(expr).unwrap();
        let ValueNode::Binary(b) = &resolved else { panic!("expected binary") };
        assert_eq!(b.right.data_type().unwrap().to_string(), "DECIMAL(8,2)");

        let both = ValueNode::binary(BinaryOp::Eq, param(), param());
        assert!(matches!(resolve(both), Err(BindError::NoResolvableType { .. })));
    }

    #[test]
    fn test_collation_mismatch_rejected() {
        let ucs = DataType::varchar(5);
        let territory = DataType::varchar(5).with_collation(Collation::implicit(CollationKind::TerritoryBased));
        let expr = ValueNode::binary(BinaryOp::Eq, column(ucs.clone()), column(territory.clone()));
        assert!(matches!(resolve(expr), Err(BindError::CollationMismatch { .. })));

        let explicit = ValueNode::unary(UnaryOp::Collate(CollationKind::TerritoryBased), column(ucs));
        let expr = ValueNode::binary(BinaryOp::Concat, resolve(explicit).unwrap(), column(territory));
        let resolved = resolve(expr).unwrap();
        assert_eq!(resolved.data_type().unwrap().collation.unwrap().derivation, Derivation::Explicit);
    }

    #[test]
    fn test_comparing_clob_rejected() {
        let expr = ValueNode::binary(BinaryOp::Eq, column(DataType::clob(100)), column(DataType::clob(100)));
        assert!(matches!(resolve(expr), Err(BindError::TypeMismatch { .. })));
    }

    #[test]
    fn test_coalesce_dominant_type_and_nullability() {
        let expr = ValueNode::Coalesce(crate::tree::CoalesceNode {
            args: vec![
                column(DataType::small_int()),
                column(DataType::decimal(7, 2).with_nullable(false)),
                param(),
            ],
            data_type: None,
        });
        let resolved = resolve(expr).unwrap();
        let ValueNode::Coalesce(c) = &resolved else { panic!("expected coalesce") };
        let t = c.data_type.as_ref().unwrap();
        assert_eq!(t.to_string(), "DECIMAL(7,2)");
        assert!(!t.nullable);
        assert!(matches!(&c.args[0], ValueNode::Cast(_)));
        assert_eq!(c.args[2].data_type().unwrap().type_id, TypeId::Decimal);
    }

    #[test]
    fn test_cast_legality() {
        assert!(cast_allowed(TypeId::Varchar, TypeId::Date));
        assert!(cast_allowed(TypeId::Integer, TypeId::Char));
        assert!(cast_allowed(TypeId::Timestamp, TypeId::Date));
        assert!(!cast_allowed(TypeId::Date, TypeId::Integer));
        assert!(!cast_allowed(TypeId::Clob, TypeId::Integer));

        let illegal = ValueNode::cast(column(DataType::date()), DataType::integer(), false);
        assert!(matches!(resolve(illegal), Err(BindError::IllegalCast { .. })));
    }

    #[test]
    fn test_aggregate_types() {
        let count = ValueNode::Aggregate(crate::tree::AggregateNode {
            func: AggregateFn::Count,
            distinct: false,
            operand: None,
            data_type: None,
        });
        assert_eq!(resolve(count).unwrap().data_type().unwrap(), &DataType::integer().with_nullable(false));

        let sum = ValueNode::Aggregate(crate::tree::AggregateNode {
            func: AggregateFn::Sum,
            distinct: false,
            operand: Some(Box::new(column(DataType::varchar(3)))),
            data_type: None,
        });
        assert!(matches!(resolve(sum), Err(BindError::TypeMismatch { .. })));
    }

    #[test]
    fn test_assignment_casts_and_rejects() {
        let context = CompilerContext::default();
        let resolver = TypeResolver::new(&context);
        let widened = resolver
            .assignment(column(DataType::integer()), &DataType::big_int(), "B")
            .unwrap();
        assert!(matches!(widened, ValueNode::Cast(_)));
        assert!(resolver.assignment(column(DataType::integer()), &DataType::char(3), "C").is_err());
        let assigned = resolver.assignment(param(), &DataType::date(), "D").unwrap();
        assert_eq!(assigned.data_type().unwrap().type_id, TypeId::Date);
    }
}
