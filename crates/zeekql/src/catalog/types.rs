//! Zeek field types and their mapping onto engine types.
//!
//! Every `#types` token parses to a [`ZeekType`]; parsing is total, so an
//! unknown token becomes [`ZeekType::Other`] and is queried as text.

use std::fmt;

/// Textual null marker (`#unset_field`).
pub const NULL_MARKER: &str = "-";

/// Marker Zeek writes for an empty container or string (`#empty_field`).
pub const EMPTY_MARKER: &str = "(empty)";

/// Separator between container elements (`#set_separator`).
pub const SET_SEPARATOR: &str = ",";

/// What the engine session can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The `inet` extension is loaded, so `INET` and containment operators exist.
    pub inet: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { inet: true }
    }
}

/// A Zeek log field type, as declared by a `#types` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ZeekType {
    Time,
    Interval,
    Count,
    Int,
    Port,
    Double,
    Addr,
    Subnet,
    Bool,
    String,
    Pattern,
    Enum,
    /// `table[...] of ...`, kept verbatim
    Table,
    /// `record ...`, kept verbatim
    Record,
    /// `vector[T]`, written as `[a,b,c]` or `a,b,c`
    Vector(Box<ZeekType>),
    /// `set[T]`, written as `{a,b,c}` or `a,b,c`
    Set(Box<ZeekType>),
    Function,
    Event,
    Hook,
    File,
    Opaque,
    Any,
    /// Anything else; queried as text.
    Other(String),
}

/// Engine column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Double,
    BigInt,
    Inet,
    Boolean,
    Varchar,
    List(Box<SqlType>),
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Double => f.write_str("DOUBLE"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Inet => f.write_str("INET"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::Varchar => f.write_str("VARCHAR"),
            SqlType::List(item) => write!(f, "{}[]", item),
        }
    }
}

impl ZeekType {
    /// Parse a `#types` token. Never fails.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        match token {
            "time" => ZeekType::Time,
            "interval" => ZeekType::Interval,
            "count" => ZeekType::Count,
            "int" => ZeekType::Int,
            "port" => ZeekType::Port,
            "double" => ZeekType::Double,
            "addr" => ZeekType::Addr,
            "subnet" => ZeekType::Subnet,
            "bool" => ZeekType::Bool,
            "string" => ZeekType::String,
            "pattern" => ZeekType::Pattern,
            "enum" => ZeekType::Enum,
            "function" => ZeekType::Function,
            "event" => ZeekType::Event,
            "hook" => ZeekType::Hook,
            "file" => ZeekType::File,
            "any" => ZeekType::Any,
            _ => Self::parse_compound(token),
        }
    }

    fn parse_compound(token: &str) -> Self {
        if let Some(inner) = container_inner(token, "vector") {
            return ZeekType::Vector(Box::new(Self::parse(inner)));
        }
        if let Some(inner) = container_inner(token, "set") {
            return ZeekType::Set(Box::new(Self::parse(inner)));
        }
        if token == "table" || token.starts_with("table[") {
            return ZeekType::Table;
        }
        if token == "record" || token.starts_with("record ") || token.starts_with("record{") {
            return ZeekType::Record;
        }
        if token == "opaque" || token.starts_with("opaque ") {
            return ZeekType::Opaque;
        }
        ZeekType::Other(token.to_string())
    }

    /// Engine type this field is cast to.
    pub fn sql_type(&self, caps: Capabilities) -> SqlType {
        match self {
            ZeekType::Time | ZeekType::Interval | ZeekType::Double => SqlType::Double,
            ZeekType::Count | ZeekType::Int | ZeekType::Port => SqlType::BigInt,
            ZeekType::Addr | ZeekType::Subnet if caps.inet => SqlType::Inet,
            ZeekType::Bool => SqlType::Boolean,
            ZeekType::Vector(inner) | ZeekType::Set(inner) => {
                SqlType::List(Box::new(inner.sql_type(caps)))
            }
            _ => SqlType::Varchar,
        }
    }

    /// SQL expression turning the raw text column `column` into a typed value.
    ///
    /// `column` must be a valid SQL expression of type VARCHAR (usually a
    /// quoted identifier). The null marker becomes NULL before any cast.
    pub fn projection(&self, column: &str, caps: Capabilities) -> String {
        self.projection_at_depth(column, caps, 1)
    }

    fn projection_at_depth(&self, column: &str, caps: Capabilities, depth: usize) -> String {
        let unset = format!("NULLIF({}, '{}')", column, NULL_MARKER);
        match self {
            ZeekType::Vector(inner) => container_projection(column, inner, '[', ']', caps, depth),
            ZeekType::Set(inner) => container_projection(column, inner, '{', '}', caps, depth),
            ZeekType::Bool => format!(
                "CASE {unset} WHEN 'T' THEN true WHEN 'F' THEN false ELSE TRY_CAST({unset} AS BOOLEAN) END"
            ),
            _ => match self.sql_type(caps) {
                SqlType::Varchar => unset,
                sql_type => format!("TRY_CAST({} AS {})", unset, sql_type),
            },
        }
    }
}

impl fmt::Display for ZeekType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZeekType::Time => "time",
            ZeekType::Interval => "interval",
            ZeekType::Count => "count",
            ZeekType::Int => "int",
            ZeekType::Port => "port",
            ZeekType::Double => "double",
            ZeekType::Addr => "addr",
            ZeekType::Subnet => "subnet",
            ZeekType::Bool => "bool",
            ZeekType::String => "string",
            ZeekType::Pattern => "pattern",
            ZeekType::Enum => "enum",
            ZeekType::Table => "table",
            ZeekType::Record => "record",
            ZeekType::Vector(inner) => return write!(f, "vector[{}]", inner),
            ZeekType::Set(inner) => return write!(f, "set[{}]", inner),
            ZeekType::Function => "function",
            ZeekType::Event => "event",
            ZeekType::Hook => "hook",
            ZeekType::File => "file",
            ZeekType::Opaque => "opaque",
            ZeekType::Any => "any",
            ZeekType::Other(token) => token,
        };
        f.write_str(name)
    }
}

fn container_inner<'a>(token: &'a str, kind: &str) -> Option<&'a str> {
    token
        .strip_prefix(kind)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|inner| !inner.trim().is_empty())
}

fn container_projection(
    column: &str,
    inner: &ZeekType,
    open: char,
    close: char,
    caps: Capabilities,
    depth: usize,
) -> String {
    let var = format!("x{}", depth);
    let body = format!(
        "regexp_replace({}, '^\\{}|\\{}$', '', 'g')",
        column, open, close
    );
    let element = format!("replace(trim({}), '\\x2c', '{}')", var, SET_SEPARATOR);
    let element_expr = inner.projection_at_depth(&element, caps, depth + 1);
    let list_type = SqlType::List(Box::new(inner.sql_type(caps)));
    format!(
        "CASE WHEN NULLIF({column}, '{null}') IS NULL THEN NULL \
         WHEN {body} IN ('', '{empty}') THEN CAST([] AS {list_type}) \
         ELSE list_transform(string_split({body}, '{sep}'), {var} -> {element_expr}) END",
        column = column,
        null = NULL_MARKER,
        body = body,
        empty = EMPTY_MARKER,
        list_type = list_type,
        sep = SET_SEPARATOR,
        var = var,
        element_expr = element_expr,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const INET: Capabilities = Capabilities { inet: true };
    const NO_INET: Capabilities = Capabilities { inet: false };

    #[test]
    fn scalar_tokens_map_to_exact_engine_types() {
        let cases = [
            ("time", SqlType::Double),
            ("interval", SqlType::Double),
            ("count", SqlType::BigInt),
            ("int", SqlType::BigInt),
            ("port", SqlType::BigInt),
            ("double", SqlType::Double),
            ("addr", SqlType::Inet),
            ("subnet", SqlType::Inet),
            ("bool", SqlType::Boolean),
            ("string", SqlType::Varchar),
            ("pattern", SqlType::Varchar),
            ("enum", SqlType::Varchar),
            ("table[string] of count", SqlType::Varchar),
            ("record", SqlType::Varchar),
            ("function", SqlType::Varchar),
            ("event", SqlType::Varchar),
            ("hook", SqlType::Varchar),
            ("file", SqlType::Varchar),
            ("opaque of md5", SqlType::Varchar),
            ("any", SqlType::Varchar),
        ];
        for (token, expected) in cases {
            assert_eq!(ZeekType::parse(token).sql_type(INET), expected, "{}", token);
        }
    }

    #[test]
    fn containers_carry_element_type() {
        assert_eq!(
            ZeekType::parse("vector[string]"),
            ZeekType::Vector(Box::new(ZeekType::String))
        );
        assert_eq!(
            ZeekType::parse("set[addr]").sql_type(INET).to_string(),
            "INET[]"
        );
        assert_eq!(
            ZeekType::parse("vector[interval]").sql_type(INET).to_string(),
            "DOUBLE[]"
        );
    }

    #[test]
    fn nested_containers_are_representable() {
        let ty = ZeekType::parse("vector[set[count]]");
        assert_eq!(
            ty,
            ZeekType::Vector(Box::new(ZeekType::Set(Box::new(ZeekType::Count))))
        );
        assert_eq!(ty.sql_type(INET).to_string(), "BIGINT[][]");
        assert_eq!(ty.to_string(), "vector[set[count]]");
    }

    #[test]
    fn unknown_tokens_fall_back_to_text() {
        for token in ["blob", "vector[", "set[]", "vector[count"] {
            let ty = ZeekType::parse(token);
            assert_eq!(ty, ZeekType::Other(token.to_string()));
            assert_eq!(ty.sql_type(INET), SqlType::Varchar);
        }
    }

    #[test]
    fn addresses_degrade_to_text_without_inet() {
        assert_eq!(ZeekType::Addr.sql_type(NO_INET), SqlType::Varchar);
        assert_eq!(
            ZeekType::parse("set[subnet]").sql_type(NO_INET).to_string(),
            "VARCHAR[]"
        );
        assert_eq!(
            ZeekType::Addr.projection("\"a\"", NO_INET),
            "NULLIF(\"a\", '-')"
        );
    }

    #[test]
    fn scalar_projection_nulls_marker_before_cast() {
        assert_eq!(
            ZeekType::Count.projection("\"n\"", INET),
            "TRY_CAST(NULLIF(\"n\", '-') AS BIGINT)"
        );
        assert_eq!(
            ZeekType::String.projection("\"s\"", INET),
            "NULLIF(\"s\", '-')"
        );
    }

    #[test]
    fn container_projection_uses_distinct_lambda_per_depth() {
        let sql = ZeekType::parse("vector[set[count]]").projection("\"v\"", INET);
        assert!(sql.contains("x1 ->"));
        assert!(sql.contains("x2 ->"));
        assert!(sql.contains("CAST([] AS BIGINT[][])"));
        assert!(sql.contains("regexp_replace(\"v\", '^\\[|\\]$', '', 'g')"));
    }

    #[test]
    fn display_round_trips_tokens() {
        for token in ["time", "port", "set[addr]", "vector[string]"] {
            assert_eq!(ZeekType::parse(token).to_string(), token);
        }
    }
}
