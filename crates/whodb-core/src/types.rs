use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Store category; determines the operator set and capability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sql,
    Document,
    KeyValue,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sql => "sql",
            Category::Document => "document",
            Category::KeyValue => "keyvalue",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Category::Sql),
            "document" => Ok(Category::Document),
            "keyvalue" | "key-value" | "key_value" => Ok(Category::KeyValue),
            other => Err(Error::Unsupported(format!("unknown store category '{other}'"))),
        }
    }
}

/// Parsed native type such as `VARCHAR(255)` or `DECIMAL(10,2)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    /// Type name without parameters, uppercase.
    pub base: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

static TYPE_PARAMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("valid type parameter regex")
});

impl TypeSpec {
    /// Parse a native type string.
    ///
    /// `VARCHAR(255)` yields a length, `DECIMAL(10,2)` a precision and scale.
    /// Trailing modifiers (`unsigned`, `with time zone`) stay in `base`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (name, first, second) = match TYPE_PARAMS_RE.captures(raw) {
            Some(caps) => {
                let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
                let name = format!("{} {}", &raw[..whole.start], &raw[whole.end..]);
                let first = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
                let second = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
                (name, first, second)
            }
            None => (raw.to_string(), None, None),
        };
        let base = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        match (first, second) {
            (Some(precision), Some(scale)) => Self {
                base,
                length: None,
                precision: Some(precision),
                scale: Some(scale),
            },
            (Some(n), None) if is_numeric_base(&base) => Self {
                base,
                length: None,
                precision: Some(n),
                scale: Some(0),
            },
            (Some(length), None) => Self {
                base,
                length: Some(length),
                precision: None,
                scale: None,
            },
            _ => Self {
                base,
                length: None,
                precision: None,
                scale: None,
            },
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.precision, self.scale, self.length) {
            (Some(precision), Some(scale), _) => write!(f, "{}({precision},{scale})", self.base),
            (_, _, Some(length)) => write!(f, "{}({length})", self.base),
            _ => f.write_str(&self.base),
        }
    }
}

fn is_numeric_base(base: &str) -> bool {
    matches!(base, "DECIMAL" | "NUMERIC" | "NUMBER" | "DEC")
}

/// Backend-independent column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalType {
    Integer { bytes: u8, signed: bool },
    Decimal { precision: Option<u32>, scale: Option<u32> },
    Float,
    Boolean,
    Text { max_len: Option<u32> },
    Uuid,
    Date,
    Time,
    Timestamp,
    Json,
    Binary,
    Array { element: Box<CanonicalType> },
    Other { name: String },
}

impl CanonicalType {
    /// Map a native type name onto the canonical vocabulary.
    pub fn from_native(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(inner) = trimmed.strip_suffix("[]") {
            return CanonicalType::Array {
                element: Box::new(CanonicalType::from_native(inner)),
            };
        }
        if trimmed.starts_with('_') && trimmed.len() > 1 {
            // Postgres reports array udt names as `_int4`, `_text`, ...
            return CanonicalType::Array {
                element: Box::new(CanonicalType::from_native(&trimmed[1..])),
            };
        }

        let spec = TypeSpec::parse(trimmed);
        let base = spec.base.as_str();
        let unsigned = base.ends_with(" UNSIGNED");
        let base = base.trim_end_matches(" UNSIGNED").trim();

        if base.starts_with("TIMESTAMP") || base == "DATETIME" || base == "DATETIME2"
            || base == "SMALLDATETIME" || base == "DATETIMEOFFSET" || base == "DATETIME64"
        {
            return CanonicalType::Timestamp;
        }
        if base.starts_with("TIME") {
            return CanonicalType::Time;
        }
        if base.starts_with("CHARACTER VARYING") || base.starts_with("CHARACTER") {
            return CanonicalType::Text {
                max_len: spec.length,
            };
        }

        match base {
            "TINYINT" | "INT1" => integer(1, !unsigned),
            "SMALLINT" | "INT2" | "SMALLSERIAL" | "SERIAL2" | "INT16" => integer(2, !unsigned),
            "MEDIUMINT" => integer(3, !unsigned),
            "INT" | "INTEGER" | "INT4" | "SERIAL" | "SERIAL4" | "INT32" => integer(4, !unsigned),
            "BIGINT" | "INT8" | "BIGSERIAL" | "SERIAL8" | "INT64" => integer(8, !unsigned),
            "UINT8" => integer(1, false),
            "UINT16" => integer(2, false),
            "UINT32" => integer(4, false),
            "UINT64" => integer(8, false),
            "DECIMAL" | "NUMERIC" | "NUMBER" | "DEC" | "MONEY" | "SMALLMONEY" => {
                CanonicalType::Decimal {
                    precision: spec.precision,
                    scale: spec.scale,
                }
            }
            "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" | "DOUBLE PRECISION"
            | "FLOAT32" | "FLOAT64" | "BINARY_FLOAT" | "BINARY_DOUBLE" => CanonicalType::Float,
            "BOOL" | "BOOLEAN" | "BIT" => CanonicalType::Boolean,
            "VARCHAR" | "CHAR" | "BPCHAR" | "NVARCHAR" | "NCHAR" | "VARCHAR2" | "NVARCHAR2"
            | "TEXT" | "CITEXT" | "STRING" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "NTEXT"
            | "CLOB" | "NCLOB" | "NAME" | "FIXEDSTRING" | "ENUM" | "SET" => CanonicalType::Text {
                max_len: spec.length,
            },
            "UUID" | "UNIQUEIDENTIFIER" => CanonicalType::Uuid,
            "DATE" | "DATE32" => CanonicalType::Date,
            "JSON" | "JSONB" => CanonicalType::Json,
            "BYTEA" | "BLOB" | "BINARY" | "VARBINARY" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB"
            | "IMAGE" | "RAW" => CanonicalType::Binary,
            "ARRAY" => CanonicalType::Array {
                element: Box::new(CanonicalType::Text { max_len: None }),
            },
            other => CanonicalType::Other {
                name: other.to_lowercase(),
            },
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CanonicalType::Integer { .. } | CanonicalType::Decimal { .. } | CanonicalType::Float
        )
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, CanonicalType::Text { .. } | CanonicalType::Other { .. })
    }

    /// Inclusive integer bounds for the declared width and signedness.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let CanonicalType::Integer { bytes, signed } = self else {
            return None;
        };
        let bits = u32::from(*bytes) * 8;
        if *signed {
            let max = (1_i128 << (bits - 1)) - 1;
            Some((-max - 1, max))
        } else {
            Some((0, (1_i128 << bits) - 1))
        }
    }
}

fn integer(bytes: u8, signed: bool) -> CanonicalType {
    CanonicalType::Integer { bytes, signed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_length_and_precision() {
        let spec = TypeSpec::parse("varchar(255)");
        assert_eq!(spec.base, "VARCHAR");
        assert_eq!(spec.length, Some(255));

        let spec = TypeSpec::parse("DECIMAL(10, 2)");
        assert_eq!(spec.precision, Some(10));
        assert_eq!(spec.scale, Some(2));
        assert_eq!(spec.to_string(), "DECIMAL(10,2)");

        let spec = TypeSpec::parse("numeric(8)");
        assert_eq!(spec.precision, Some(8));
        assert_eq!(spec.scale, Some(0));
    }

    #[test]
    fn keeps_trailing_modifiers() {
        let spec = TypeSpec::parse("int(11) unsigned");
        assert_eq!(spec.base, "INT UNSIGNED");
        assert_eq!(spec.length, Some(11));
    }

    #[test]
    fn maps_native_types() {
        assert_eq!(
            CanonicalType::from_native("bigint"),
            CanonicalType::Integer {
                bytes: 8,
                signed: true
            }
        );
        assert_eq!(
            CanonicalType::from_native("tinyint unsigned"),
            CanonicalType::Integer {
                bytes: 1,
                signed: false
            }
        );
        assert_eq!(
            CanonicalType::from_native("character varying(40)"),
            CanonicalType::Text { max_len: Some(40) }
        );
        assert_eq!(
            CanonicalType::from_native("timestamp with time zone"),
            CanonicalType::Timestamp
        );
        assert_eq!(CanonicalType::from_native("time"), CanonicalType::Time);
        assert_eq!(
            CanonicalType::from_native("numeric(6,2)"),
            CanonicalType::Decimal {
                precision: Some(6),
                scale: Some(2)
            }
        );
        assert_eq!(
            CanonicalType::from_native("integer[]"),
            CanonicalType::Array {
                element: Box::new(CanonicalType::Integer {
                    bytes: 4,
                    signed: true
                })
            }
        );
        assert_eq!(
            CanonicalType::from_native("point"),
            CanonicalType::Other {
                name: "point".to_string()
            }
        );
    }

    #[test]
    fn integer_bounds_follow_width() {
        let tiny = CanonicalType::Integer {
            bytes: 1,
            signed: true,
        };
        assert_eq!(tiny.integer_bounds(), Some((-128, 127)));
        let unsigned = CanonicalType::Integer {
            bytes: 2,
            signed: false,
        };
        assert_eq!(unsigned.integer_bounds(), Some((0, 65535)));
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in [Category::Sql, Category::Document, Category::KeyValue] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("graph".parse::<Category>().is_err());
    }
}
