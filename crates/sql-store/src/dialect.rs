//! Dialect detection from the connection string.
//!
//! Some database servers front several SQL dialects behind one driver
//! family and declare the active one in the connection string, e.g.
//! `postgres://db.internal:54321/jobs?productName=MySQL`. The declared
//! product name decides which DDL flavor the schema provisioner emits.

use std::fmt;

const PRODUCT_NAME_KEY: &str = "productname=";

/// Extract the declared product name from a connection string.
///
/// The scan is case-insensitive and the value runs up to the next `&` or
/// the end of the string, lower-cased and trimmed. Total function: absent
/// input or a missing parameter yields `"unknown"`.
pub fn detect_mode(connection_string: Option<&str>) -> String {
    let Some(connection_string) = connection_string else {
        return "unknown".to_string();
    };
    let lower = connection_string.to_lowercase();
    let Some(idx) = lower.find(PRODUCT_NAME_KEY) else {
        return "unknown".to_string();
    };
    let mode = &lower[idx + PRODUCT_NAME_KEY.len()..];
    let mode = match mode.find('&') {
        Some(amp) => &mode[..amp],
        None => mode,
    };
    mode.trim().to_string()
}

/// SQL dialect spoken by the server behind the connection string.
///
/// Anything that is not one of the three explicitly-handled vendors is
/// treated as PostgreSQL-compatible for DDL purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Oracle,
    SqlServer,
    PostgresCompatible,
    Unknown,
}

impl Dialect {
    /// Map a detected mode tag onto the closed dialect set.
    pub fn from_mode(mode: &str) -> Self {
        match mode {
            "mysql" => Dialect::MySql,
            "oracle" => Dialect::Oracle,
            "sqlserver" => Dialect::SqlServer,
            "postgres" | "postgresql" | "pg" => Dialect::PostgresCompatible,
            _ => Dialect::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Oracle => "oracle",
            Dialect::SqlServer => "sqlserver",
            Dialect::PostgresCompatible => "postgres",
            Dialect::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder syntax understood by the wire backend.
///
/// The Any driver executes SQL verbatim against whichever backend the URL
/// scheme selects, so DML has to be rendered with that backend's
/// placeholder style: postgres numbers its parameters, everything else
/// takes positional `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    Dollar,
    Question,
}

impl BindStyle {
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or("").to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => BindStyle::Dollar,
            _ => BindStyle::Question,
        }
    }

    /// Render the placeholder for the `n`-th bind parameter (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            BindStyle::Dollar => format!("${n}"),
            BindStyle::Question => "?".to_string(),
        }
    }
}
