//! Dialect-independent column types, default values and referential actions.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dialect-independent ("abstract") column type.
///
/// Every dialect owns a two-way mapping between these and its concrete
/// types. The textual form (`string(255)`, `decimal(10,2)`,
/// `enum(draft,published)`) is used by configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AbstractType {
    /// Auto-incrementing 32-bit primary key.
    Primary,
    /// Auto-incrementing 64-bit primary key.
    BigPrimary,
    /// Boolean.
    Boolean,
    /// Small integer (8 or 16 bit depending on the dialect).
    TinyInteger,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Variable-length string with a maximum size.
    String(u32),
    /// Short text.
    TinyText,
    /// Text.
    Text,
    /// Long text.
    LongText,
    /// Exact numeric with precision and scale.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Digits after the decimal point.
        scale: u8,
    },
    /// Double precision float.
    Double,
    /// Single precision float.
    Float,
    /// Date and time.
    Datetime,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Small binary object.
    TinyBinary,
    /// Binary object.
    Binary,
    /// Large binary object.
    LongBinary,
    /// One of a fixed set of string values.
    Enum(Vec<String>),
    /// JSON document.
    Json,
}

impl AbstractType {
    /// Returns true for the auto-incrementing primary key types.
    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        matches!(self, Self::Primary | Self::BigPrimary)
    }

    /// Returns true for integer-like types (including primary types).
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Primary
                | Self::BigPrimary
                | Self::TinyInteger
                | Self::Integer
                | Self::BigInteger
        )
    }

    /// Returns true for types whose values are written as quoted strings.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::String(_)
                | Self::TinyText
                | Self::Text
                | Self::LongText
                | Self::Enum(_)
                | Self::Json
                | Self::Datetime
                | Self::Date
                | Self::Time
                | Self::Timestamp
        )
    }

    /// Enum values, if this is an enum type.
    #[must_use]
    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            Self::Enum(values) => Some(values),
            _ => None,
        }
    }

    /// Length of the longest enum value (used for `VARCHAR` backed enums).
    #[must_use]
    pub fn enum_size(&self) -> usize {
        self.enum_values()
            .and_then(|values| values.iter().map(String::len).max())
            .unwrap_or(0)
            .max(1)
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::BigPrimary => f.write_str("bigPrimary"),
            Self::Boolean => f.write_str("boolean"),
            Self::TinyInteger => f.write_str("tinyInteger"),
            Self::Integer => f.write_str("integer"),
            Self::BigInteger => f.write_str("bigInteger"),
            Self::String(size) => write!(f, "string({size})"),
            Self::TinyText => f.write_str("tinyText"),
            Self::Text => f.write_str("text"),
            Self::LongText => f.write_str("longText"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            Self::Double => f.write_str("double"),
            Self::Float => f.write_str("float"),
            Self::Datetime => f.write_str("datetime"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TinyBinary => f.write_str("tinyBinary"),
            Self::Binary => f.write_str("binary"),
            Self::LongBinary => f.write_str("longBinary"),
            Self::Enum(values) => write!(f, "enum({})", values.join(",")),
            Self::Json => f.write_str("json"),
        }
    }
}

static TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]+)\s*(?:\((.*)\))?\s*$").expect("valid type pattern")
});

impl FromStr for AbstractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TYPE_PATTERN
            .captures(s)
            .ok_or_else(|| format!("invalid column type '{s}'"))?;
        let name = caps[1].to_ascii_lowercase().replace('_', "");
        let args: Vec<&str> = caps
            .get(2)
            .map(|m| m.as_str().split(',').map(str::trim).collect())
            .unwrap_or_default();

        let number = |idx: usize, default: u32| -> Result<u32, String> {
            match args.get(idx) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| format!("invalid size '{raw}' in column type '{s}'")),
                None => Ok(default),
            }
        };

        let ty = match name.as_str() {
            "primary" => Self::Primary,
            "bigprimary" => Self::BigPrimary,
            "boolean" | "bool" => Self::Boolean,
            "tinyinteger" => Self::TinyInteger,
            "integer" | "int" => Self::Integer,
            "biginteger" | "bigint" => Self::BigInteger,
            "string" => Self::String(number(0, 255)?),
            "tinytext" => Self::TinyText,
            "text" => Self::Text,
            "longtext" => Self::LongText,
            "decimal" => {
                let precision = u8::try_from(number(0, 10)?)
                    .map_err(|_| format!("precision out of range in '{s}'"))?;
                let scale = u8::try_from(number(1, 0)?)
                    .map_err(|_| format!("scale out of range in '{s}'"))?;
                Self::Decimal { precision, scale }
            }
            "double" => Self::Double,
            "float" => Self::Float,
            "datetime" => Self::Datetime,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "tinybinary" => Self::TinyBinary,
            "binary" => Self::Binary,
            "longbinary" => Self::LongBinary,
            "enum" => {
                let values: Vec<String> = args
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_string())
                    .collect();
                if values.is_empty() {
                    return Err(format!("enum type '{s}' has no values"));
                }
                Self::Enum(values)
            }
            "json" => Self::Json,
            _ => return Err(format!("unknown column type '{s}'")),
        };
        Ok(ty)
    }
}

impl TryFrom<String> for AbstractType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AbstractType> for String {
    fn from(value: AbstractType) -> Self {
        value.to_string()
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// The current timestamp, whatever the dialect calls it.
    CurrentTimestamp,
    /// Raw SQL expression, emitted verbatim.
    Expression(String),
}

static CAST_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)::[A-Za-z_][A-Za-z0-9_ ]*(?:\(\d+(?:,\s*\d+)?\))?(?:\[\])?$")
        .expect("valid cast pattern")
});

/// Comparable form of a default value with cosmetic differences removed.
#[derive(Debug, PartialEq)]
enum Normalized {
    Absent,
    Number(f64),
    Text(String),
    Timestamp,
    Expression(String),
}

impl DefaultValue {
    /// Returns the generic SQL representation of this default value.
    ///
    /// Dialects override the boolean rendering where needed.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => quote_literal(s),
            Self::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            Self::Expression(expr) => expr.clone(),
        }
    }

    /// Parses a default as reported by a catalog, typed by the column type.
    ///
    /// Strips wrapping parentheses, `::type` casts and literal quoting.
    /// Returns `None` when the catalog reports no default.
    #[must_use]
    pub fn from_sql(raw: &str, ty: &AbstractType) -> Option<Self> {
        let mut value = raw.trim();
        loop {
            let stripped = strip_parens(value);
            let stripped = CAST_SUFFIX
                .captures(stripped)
                .and_then(|caps| caps.get(1))
                .map_or(stripped, |m| m.as_str().trim());
            if stripped == value {
                break;
            }
            value = stripped;
        }
        if value.is_empty() {
            return None;
        }

        let upper = value.to_ascii_uppercase();
        if upper == "NULL" {
            return Some(Self::Null);
        }
        if matches!(
            upper.as_str(),
            "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" | "NOW()" | "LOCALTIMESTAMP"
        ) || upper.starts_with("CURRENT_TIMESTAMP(")
        {
            return Some(Self::CurrentTimestamp);
        }

        let literal = unquote_literal(value);
        let text = literal.as_deref().unwrap_or(value);

        match ty {
            AbstractType::Boolean => match text.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "b'1'" => Some(Self::Bool(true)),
                "0" | "f" | "false" | "b'0'" => Some(Self::Bool(false)),
                _ => Some(Self::Expression(value.to_string())),
            },
            t if t.is_integer() => {
                if let Ok(i) = text.parse::<i64>() {
                    Some(Self::Integer(i))
                } else if let Ok(f) = text.parse::<f64>() {
                    Some(Self::Float(f))
                } else {
                    Some(Self::Expression(value.to_string()))
                }
            }
            AbstractType::Decimal { .. } | AbstractType::Double | AbstractType::Float => {
                match text.parse::<f64>() {
                    Ok(f) => Some(Self::Float(f)),
                    Err(_) => Some(Self::Expression(value.to_string())),
                }
            }
            _ => match literal {
                Some(s) => Some(Self::String(s)),
                // Bare words are unquoted literals, calls are expressions.
                None if ty.is_textual() && !value.contains('(') => {
                    Some(Self::String(value.to_string()))
                }
                None => Some(Self::Expression(value.to_string())),
            },
        }
    }

    fn normalized(value: Option<&Self>) -> Normalized {
        match value {
            None | Some(Self::Null) => Normalized::Absent,
            Some(Self::Bool(b)) => Normalized::Number(if *b { 1.0 } else { 0.0 }),
            Some(Self::Integer(i)) => Normalized::Number(*i as f64),
            Some(Self::Float(f)) => Normalized::Number(*f),
            Some(Self::String(s)) => Normalized::Text(s.clone()),
            Some(Self::CurrentTimestamp) => Normalized::Timestamp,
            Some(Self::Expression(expr)) => {
                let upper = expr.trim().to_ascii_uppercase();
                if upper == "CURRENT_TIMESTAMP" || upper == "NOW()" {
                    Normalized::Timestamp
                } else {
                    Normalized::Expression(upper)
                }
            }
        }
    }

    /// Compares two optional defaults, ignoring cosmetic differences
    /// (quoting, `NULL` vs no default, booleans stored as `0`/`1`,
    /// numeric formatting).
    #[must_use]
    pub fn equivalent(a: Option<&Self>, b: Option<&Self>) -> bool {
        match (Self::normalized(a), Self::normalized(b)) {
            (Normalized::Number(x), Normalized::Number(y)) => (x - y).abs() < 1e-9,
            (Normalized::Number(x), Normalized::Text(s))
            | (Normalized::Text(s), Normalized::Number(x)) => s
                .trim()
                .parse::<f64>()
                .is_ok_and(|y| (x - y).abs() < 1e-9),
            (x, y) => x == y,
        }
    }
}

/// Quotes a string literal with single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn strip_parens(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        // Only strip when the parentheses wrap the whole expression.
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut depth = 0i32;
        for c in inner.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return trimmed;
                    }
                }
                _ => {}
            }
        }
        if depth == 0 {
            return inner.trim();
        }
    }
    trimmed
}

fn unquote_literal(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'' {
        Some(value[1..value.len() - 1].replace("''", "'"))
    } else {
        None
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses a rule as reported by a catalog (`SET NULL`, `cascade`...).
    #[must_use]
    pub fn from_sql(rule: &str) -> Option<Self> {
        match rule.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_type_text_form() {
        assert_eq!("string(64)".parse(), Ok(AbstractType::String(64)));
        assert_eq!("string".parse(), Ok(AbstractType::String(255)));
        assert_eq!("bigPrimary".parse(), Ok(AbstractType::BigPrimary));
        assert_eq!("big_integer".parse(), Ok(AbstractType::BigInteger));
        assert_eq!(
            "decimal(10, 2)".parse(),
            Ok(AbstractType::Decimal {
                precision: 10,
                scale: 2
            })
        );
        assert_eq!(
            "enum(draft, published)".parse::<AbstractType>().unwrap().to_string(),
            "enum(draft,published)"
        );
        assert!("enum()".parse::<AbstractType>().is_err());
        assert!("geometry".parse::<AbstractType>().is_err());
    }

    #[test]
    fn test_default_from_sql_strips_quoting_and_casts() {
        let text = AbstractType::String(32);
        assert_eq!(
            DefaultValue::from_sql("'it''s'::character varying", &text),
            Some(DefaultValue::String("it's".to_string()))
        );
        assert_eq!(
            DefaultValue::from_sql("('guest')", &text),
            Some(DefaultValue::String("guest".to_string()))
        );
        assert_eq!(
            DefaultValue::from_sql("NULL::character varying", &text),
            Some(DefaultValue::Null)
        );
        assert_eq!(
            DefaultValue::from_sql("CURRENT_TIMESTAMP", &AbstractType::Timestamp),
            Some(DefaultValue::CurrentTimestamp)
        );
        assert_eq!(
            DefaultValue::from_sql("now()", &AbstractType::Datetime),
            Some(DefaultValue::CurrentTimestamp)
        );
        assert_eq!(
            DefaultValue::from_sql("(-1)", &AbstractType::Integer),
            Some(DefaultValue::Integer(-1))
        );
        assert_eq!(
            DefaultValue::from_sql("'1.50'::numeric", &AbstractType::Decimal { precision: 8, scale: 2 }),
            Some(DefaultValue::Float(1.5))
        );
        assert_eq!(
            DefaultValue::from_sql("true", &AbstractType::Boolean),
            Some(DefaultValue::Bool(true))
        );
        assert_eq!(DefaultValue::from_sql("  ", &text), None);
    }

    #[test]
    fn test_default_equivalence_ignores_cosmetics() {
        let bool_true = DefaultValue::Bool(true);
        let one = DefaultValue::Integer(1);
        assert!(DefaultValue::equivalent(Some(&bool_true), Some(&one)));
        assert!(DefaultValue::equivalent(None, Some(&DefaultValue::Null)));
        assert!(DefaultValue::equivalent(
            Some(&DefaultValue::Float(2.0)),
            Some(&DefaultValue::Integer(2))
        ));
        assert!(DefaultValue::equivalent(
            Some(&DefaultValue::CurrentTimestamp),
            Some(&DefaultValue::Expression("current_timestamp".into()))
        ));
        assert!(!DefaultValue::equivalent(
            Some(&DefaultValue::String("a".into())),
            Some(&DefaultValue::String("b".into()))
        ));
        assert!(!DefaultValue::equivalent(None, Some(&DefaultValue::Integer(0))));
    }

    #[test]
    fn test_foreign_key_action_round_trip() {
        for action in [
            ForeignKeyAction::NoAction,
            ForeignKeyAction::Restrict,
            ForeignKeyAction::Cascade,
            ForeignKeyAction::SetNull,
            ForeignKeyAction::SetDefault,
        ] {
            assert_eq!(ForeignKeyAction::from_sql(action.to_sql()), Some(action));
        }
        assert_eq!(
            ForeignKeyAction::from_sql("set_null"),
            Some(ForeignKeyAction::SetNull)
        );
        assert_eq!(ForeignKeyAction::from_sql("bogus"), None);
    }
}
