//! SQL data types and collations carried by bound expressions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Longest fixed-length character string.
pub const CHAR_MAX_WIDTH: u32 = 254;
/// Longest variable-length character string.
pub const VARCHAR_MAX_WIDTH: u32 = 32_672;
/// Width of LONG VARCHAR.
pub const LONG_VARCHAR_MAX_WIDTH: u32 = 32_700;
/// Longest character large object.
pub const CLOB_MAX_WIDTH: u32 = 2_147_483_647;
/// Highest DECIMAL precision.
pub const DECIMAL_MAX_PRECISION: u32 = 31;

/// Type identifiers known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeId {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Char,
    Varchar,
    LongVarchar,
    Clob,
    Date,
    Time,
    Timestamp,
}

impl TypeId {
    /// Get the SQL name for this type.
    pub fn sql_name(&self) -> &'static str {
        match self {
            TypeId::Boolean => "BOOLEAN",
            TypeId::SmallInt => "SMALLINT",
            TypeId::Integer => "INTEGER",
            TypeId::BigInt => "BIGINT",
            TypeId::Decimal => "DECIMAL",
            TypeId::Real => "REAL",
            TypeId::Double => "DOUBLE",
            TypeId::Char => "CHAR",
            TypeId::Varchar => "VARCHAR",
            TypeId::LongVarchar => "LONG VARCHAR",
            TypeId::Clob => "CLOB",
            TypeId::Date => "DATE",
            TypeId::Time => "TIME",
            TypeId::Timestamp => "TIMESTAMP",
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_precedence().is_some()
    }

    pub fn is_exact_integer(&self) -> bool {
        matches!(self, TypeId::SmallInt | TypeId::Integer | TypeId::BigInt)
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            TypeId::Char | TypeId::Varchar | TypeId::LongVarchar | TypeId::Clob
        )
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, TypeId::Date | TypeId::Time | TypeId::Timestamp)
    }

    /// Large objects cannot be compared, sorted or grouped on.
    pub fn is_large_object(&self) -> bool {
        matches!(self, TypeId::Clob)
    }

    /// Position in the numeric promotion order, `None` for non-numeric types.
    pub fn numeric_precedence(&self) -> Option<u8> {
        match self {
            TypeId::SmallInt => Some(1),
            TypeId::Integer => Some(2),
            TypeId::BigInt => Some(3),
            TypeId::Decimal => Some(4),
            TypeId::Real => Some(5),
            TypeId::Double => Some(6),
            _ => None,
        }
    }

    /// Position in the string escalation order, `None` for non-strings.
    pub fn string_precedence(&self) -> Option<u8> {
        match self {
            TypeId::Char => Some(1),
            TypeId::Varchar => Some(2),
            TypeId::LongVarchar => Some(3),
            TypeId::Clob => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Collation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollationKind {
    /// Code-point ordering.
    UcsBasic,
    /// Locale-sensitive ordering.
    TerritoryBased,
}

impl CollationKind {
    pub fn sql_name(&self) -> &'static str {
        match self {
            CollationKind::UcsBasic => "UCS_BASIC",
            CollationKind::TerritoryBased => "TERRITORY_BASED",
        }
    }

    /// Resolve a collation name as written in a COLLATE clause.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_matches('"').to_ascii_uppercase().as_str() {
            "UCS_BASIC" => Some(CollationKind::UcsBasic),
            "TERRITORY_BASED" => Some(CollationKind::TerritoryBased),
            _ => None,
        }
    }
}

/// How a string value acquired its collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    Implicit,
    Explicit,
    /// Conflicting collations were combined; the value cannot be compared.
    None,
}

/// Collation of a string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collation {
    pub kind: CollationKind,
    pub derivation: Derivation,
}

impl Collation {
    pub fn implicit(kind: CollationKind) -> Self {
        Self { kind, derivation: Derivation::Implicit }
    }

    pub fn explicit(kind: CollationKind) -> Self {
        Self { kind, derivation: Derivation::Explicit }
    }

    /// Combine the collations of two operands whose values flow into one result
    /// (concatenation, COALESCE, set operator columns).
    pub fn combine(a: Collation, b: Collation) -> Collation {
        use Derivation::*;
        match (a.derivation, b.derivation) {
            (None, _) | (_, None) => Collation { kind: a.kind, derivation: None },
            (Explicit, Explicit) if a.kind != b.kind => Collation { kind: a.kind, derivation: None },
            (Explicit, _) => a,
            (_, Explicit) => b,
            (Implicit, Implicit) if a.kind == b.kind => a,
            (Implicit, Implicit) => Collation { kind: a.kind, derivation: None },
        }
    }

    /// Whether two values with these collations may be compared.
    pub fn comparable(a: Collation, b: Collation) -> bool {
        a.derivation != Derivation::None && b.derivation != Derivation::None && a.kind == b.kind
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.derivation {
            Derivation::Implicit => write!(f, "{}", self.kind.sql_name()),
            Derivation::Explicit => write!(f, "{} (explicit)", self.kind.sql_name()),
            Derivation::None => write!(f, "NONE"),
        }
    }
}

/// A fully described SQL type: identifier, nullability, precision/scale or
/// width, and collation for strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataType {
    pub type_id: TypeId,
    pub nullable: bool,
    pub precision: u32,
    pub scale: u32,
    pub max_width: u32,
    pub collation: Option<Collation>,
}

impl DataType {
    fn of(type_id: TypeId, precision: u32, scale: u32, max_width: u32) -> Self {
        let collation = type_id
            .is_string()
            .then(|| Collation::implicit(CollationKind::UcsBasic));
        Self {
            type_id,
            nullable: true,
            precision,
            scale,
            max_width,
            collation,
        }
    }

    pub fn boolean() -> Self {
        Self::of(TypeId::Boolean, 1, 0, 1)
    }

    pub fn small_int() -> Self {
        Self::of(TypeId::SmallInt, 5, 0, 2)
    }

    pub fn integer() -> Self {
        Self::of(TypeId::Integer, 10, 0, 4)
    }

    pub fn big_int() -> Self {
        Self::of(TypeId::BigInt, 19, 0, 8)
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        let precision = precision.clamp(1, DECIMAL_MAX_PRECISION);
        let scale = scale.min(precision);
        Self::of(TypeId::Decimal, precision, scale, precision / 2 + 1)
    }

    pub fn real() -> Self {
        Self::of(TypeId::Real, 7, 0, 4)
    }

    pub fn double() -> Self {
        Self::of(TypeId::Double, 15, 0, 8)
    }

    pub fn char(width: u32) -> Self {
        Self::of(TypeId::Char, 0, 0, width.clamp(1, CHAR_MAX_WIDTH))
    }

    pub fn varchar(width: u32) -> Self {
        Self::of(TypeId::Varchar, 0, 0, width.clamp(1, VARCHAR_MAX_WIDTH))
    }

    pub fn long_varchar() -> Self {
        Self::of(TypeId::LongVarchar, 0, 0, LONG_VARCHAR_MAX_WIDTH)
    }

    pub fn clob(width: u32) -> Self {
        Self::of(TypeId::Clob, 0, 0, width.clamp(1, CLOB_MAX_WIDTH))
    }

    pub fn date() -> Self {
        Self::of(TypeId::Date, 0, 0, 4)
    }

    pub fn time() -> Self {
        Self::of(TypeId::Time, 0, 0, 8)
    }

    pub fn timestamp() -> Self {
        Self::of(TypeId::Timestamp, 0, 0, 12)
    }

    /// Default descriptor for a type identifier.
    pub fn for_type_id(type_id: TypeId) -> Self {
        match type_id {
            TypeId::Boolean => Self::boolean(),
            TypeId::SmallInt => Self::small_int(),
            TypeId::Integer => Self::integer(),
            TypeId::BigInt => Self::big_int(),
            TypeId::Decimal => Self::decimal(5, 0),
            TypeId::Real => Self::real(),
            TypeId::Double => Self::double(),
            TypeId::Char => Self::char(1),
            TypeId::Varchar => Self::varchar(VARCHAR_MAX_WIDTH),
            TypeId::LongVarchar => Self::long_varchar(),
            TypeId::Clob => Self::clob(CLOB_MAX_WIDTH),
            TypeId::Date => Self::date(),
            TypeId::Time => Self::time(),
            TypeId::Timestamp => Self::timestamp(),
        }
    }

    /// Set nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the collation of a string type. Ignored for other types.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        if self.type_id.is_string() {
            self.collation = Some(collation);
        }
        self
    }

    /// Precision/scale pair used by DECIMAL arithmetic; integers behave as
    /// DECIMAL(p, 0).
    pub fn decimal_shape(&self) -> (u32, u32) {
        match self.type_id {
            TypeId::SmallInt => (5, 0),
            TypeId::Integer => (10, 0),
            TypeId::BigInt => (19, 0),
            _ => (self.precision, self.scale),
        }
    }

    /// Approximate number of bytes one value occupies, used for memory estimates.
    pub fn storage_width(&self) -> u64 {
        match self.type_id {
            TypeId::Clob => 24,
            TypeId::LongVarchar => 64,
            _ => u64::from(self.max_width),
        }
    }

    /// Same type ignoring nullability.
    pub fn same_shape(&self, other: &DataType) -> bool {
        self.type_id == other.type_id
            && self.precision == other.precision
            && self.scale == other.scale
            && self.max_width == other.max_width
    }

    /// Describe the type including nullability, for plan output.
    pub fn describe(&self) -> String {
        if self.nullable {
            self.to_string()
        } else {
            format!("{} NOT NULL", self)
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_id {
            TypeId::Decimal => write!(f, "DECIMAL({},{})", self.precision, self.scale),
            TypeId::Char | TypeId::Varchar | TypeId::Clob => {
                write!(f, "{}({})", self.type_id.sql_name(), self.max_width)
            }
            other => write!(f, "{}", other.sql_name()),
        }
    }
}

/// Error produced when a type name cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown data type: {0}")]
pub struct UnknownType(pub String);

impl FromStr for DataType {
    type Err = UnknownType;

    /// Parse a type name such as `INTEGER`, `VARCHAR(20)` or `DECIMAL(10, 2)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_uppercase();
        let (name, args) = match text.find('(') {
            Some(open) => {
                let close = text.rfind(')').ok_or_else(|| UnknownType(s.to_string()))?;
                let args = text[open + 1..close]
                    .split(',')
                    .map(|a| a.trim().parse::<u32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| UnknownType(s.to_string()))?;
                (text[..open].trim().to_string(), args)
            }
            None => (text.clone(), Vec::new()),
        };
        let arg = |i: usize, default: u32| args.get(i).copied().unwrap_or(default);

        let data_type = match name.as_str() {
            "BOOLEAN" | "BOOL" => DataType::boolean(),
            "SMALLINT" => DataType::small_int(),
            "INT" | "INTEGER" => DataType::integer(),
            "BIGINT" => DataType::big_int(),
            "DECIMAL" | "NUMERIC" | "DEC" => DataType::decimal(arg(0, 5), arg(1, 0)),
            "REAL" => DataType::real(),
            "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => DataType::double(),
            "CHAR" | "CHARACTER" => DataType::char(arg(0, 1)),
            "VARCHAR" | "CHAR VARYING" | "CHARACTER VARYING" => DataType::varchar(arg(0, VARCHAR_MAX_WIDTH)),
            "LONG VARCHAR" => DataType::long_varchar(),
            "CLOB" | "CHARACTER LARGE OBJECT" => DataType::clob(arg(0, CLOB_MAX_WIDTH)),
            "DATE" => DataType::date(),
            "TIME" => DataType::time(),
            "TIMESTAMP" => DataType::timestamp(),
            _ => return Err(UnknownType(s.to_string())),
        };
        Ok(data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_names() {
        assert_eq!("integer".parse::<DataType>().unwrap(), DataType::integer());
        assert_eq!("VARCHAR(20)".parse::<DataType>().unwrap(), DataType::varchar(20));
        assert_eq!("decimal(10, 2)".parse::<DataType>().unwrap(), DataType::decimal(10, 2));
        assert_eq!("CHARACTER VARYING(5)".parse::<DataType>().unwrap(), DataType::varchar(5));
        assert!("GEOMETRY".parse::<DataType>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for dt in [
            DataType::decimal(12, 3),
            DataType::char(10),
            DataType::clob(1000),
            DataType::timestamp(),
            DataType::long_varchar(),
        ] {
            assert_eq!(dt.to_string().parse::<DataType>().unwrap(), dt);
        }
    }

    #[test]
    fn test_collation_combine() {
        let ucs = Collation::implicit(CollationKind::UcsBasic);
        let terr = Collation::implicit(CollationKind::TerritoryBased);
        let terr_explicit = Collation::explicit(CollationKind::TerritoryBased);

        assert_eq!(Collation::combine(ucs, ucs), ucs);
        assert_eq!(Collation::combine(ucs, terr_explicit), terr_explicit);
        assert_eq!(Collation::combine(ucs, terr).derivation, Derivation::None);
        assert_eq!(
            Collation::combine(Collation::explicit(CollationKind::UcsBasic), terr_explicit).derivation,
            Derivation::None
        );
        assert!(!Collation::comparable(ucs, terr));
        assert!(Collation::comparable(ucs, Collation::explicit(CollationKind::UcsBasic)));
    }

    #[test]
    fn test_numeric_precedence() {
        assert!(TypeId::SmallInt.numeric_precedence() < TypeId::Double.numeric_precedence());
        assert!(TypeId::Decimal.numeric_precedence() < TypeId::Real.numeric_precedence());
        assert_eq!(TypeId::Varchar.numeric_precedence(), None);
    }
}
