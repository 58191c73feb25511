// tally-core/src/ports/dialect.rs

// Everything vendor-specific the query builder needs, as SQL fragments.
// Default methods render ANSI SQL; adapters override what their engine spells
// differently.

use crate::domain::scan::formats;
use crate::domain::scan::specification::ConfigLiteral;

const ANSI_TEXT_TYPES: &[&str] = &["CHARACTER VARYING", "CHARACTER", "VARCHAR", "CHAR", "TEXT"];
const ANSI_NUMBER_TYPES: &[&str] = &[
    "SMALLINT",
    "INTEGER",
    "INT",
    "BIGINT",
    "DECIMAL",
    "NUMERIC",
    "REAL",
    "FLOAT",
    "DOUBLE PRECISION",
];
const ANSI_TIME_TYPES: &[&str] = &["DATE", "TIME", "TIMESTAMP"];

/// Upper-cased type name without its `(precision, scale)` suffix.
pub fn base_type(data_type: &str) -> String {
    let upper = data_type.trim().to_uppercase();
    match upper.find('(') {
        Some(pos) => upper[..pos].trim_end().to_string(),
        None => upper,
    }
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    // --- TYPE CATEGORIES ---

    fn text_types(&self) -> &[&str] {
        ANSI_TEXT_TYPES
    }

    fn number_types(&self) -> &[&str] {
        ANSI_NUMBER_TYPES
    }

    fn time_types(&self) -> &[&str] {
        ANSI_TIME_TYPES
    }

    fn is_text(&self, data_type: &str) -> bool {
        let base = base_type(data_type);
        self.text_types().iter().any(|t| *t == base)
    }

    fn is_number(&self, data_type: &str) -> bool {
        let base = base_type(data_type);
        self.number_types().iter().any(|t| *t == base)
    }

    fn is_time(&self, data_type: &str) -> bool {
        let base = base_type(data_type);
        self.time_types().iter().any(|t| *t == base || base.starts_with(t))
    }

    fn decimal_type(&self) -> &str {
        "DECIMAL(38, 9)"
    }

    // --- IDENTIFIERS & LITERALS ---

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn qualify_table_name(&self, table_name: &str) -> String {
        self.quote_identifier(table_name)
    }

    fn qualify_column_name(&self, column_name: &str) -> String {
        self.quote_identifier(column_name)
    }

    fn literal_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn literal_number(&self, value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{}", value)
        }
    }

    fn literal(&self, value: &ConfigLiteral) -> String {
        match value {
            ConfigLiteral::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            ConfigLiteral::Integer(i) => i.to_string(),
            ConfigLiteral::Decimal(d) => self.literal_number(*d),
            ConfigLiteral::Text(s) => self.literal_string(s),
        }
    }

    // --- AGGREGATES ---

    fn sql_expr_count_all(&self) -> String {
        "COUNT(*)".to_string()
    }

    fn sql_expr_count_conditional(&self, condition: &str) -> String {
        format!("COUNT(CASE WHEN {} THEN 1 END)", condition)
    }

    fn sql_expr_conditional(&self, condition: &str, expr: &str) -> String {
        format!("CASE WHEN {} THEN {} END", condition, expr)
    }

    fn sql_expr_length(&self, expr: &str) -> String {
        format!("LENGTH({})", expr)
    }

    fn sql_expr_min(&self, expr: &str) -> String {
        format!("MIN({})", expr)
    }

    fn sql_expr_max(&self, expr: &str) -> String {
        format!("MAX({})", expr)
    }

    fn sql_expr_avg(&self, expr: &str) -> String {
        format!("AVG({})", expr)
    }

    fn sql_expr_sum(&self, expr: &str) -> String {
        format!("SUM({})", expr)
    }

    fn sql_expr_variance(&self, expr: &str) -> String {
        format!("VAR_SAMP({})", expr)
    }

    fn sql_expr_stddev(&self, expr: &str) -> String {
        format!("STDDEV_SAMP({})", expr)
    }

    // --- PREDICATES ---

    fn sql_expr_regexp_like(&self, expr: &str, pattern: &str) -> String {
        format!("REGEXP_LIKE({}, {})", expr, self.literal_string(pattern))
    }

    fn sql_expr_in_list(&self, expr: &str, values: &[ConfigLiteral]) -> String {
        let items: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
        format!("{} IN ({})", expr, items.join(", "))
    }

    fn sql_expr_cast(&self, expr: &str) -> String {
        format!("CAST({} AS {})", expr, self.decimal_type())
    }

    /// Number-as-text to numeric. `number_whole` casts directly; the other
    /// formats strip currency, percent and grouping characters first.
    fn sql_expr_cast_text_to_number(&self, quoted_column: &str, validity_format: &str) -> String {
        if validity_format == "number_whole" {
            return self.sql_expr_cast(quoted_column);
        }
        let comma_decimal = matches!(
            validity_format,
            "number_decimal_comma" | "number_money_eur" | "number_percentage"
        );
        let (keep, decimal_separator) = if comma_decimal {
            ("[^-0-9\\,\\.]", true)
        } else {
            ("[^-0-9\\.]", false)
        };
        let mut stripped = format!(
            "REGEXP_REPLACE({}, {}, '', 'g')",
            quoted_column,
            self.literal_string(keep)
        );
        if decimal_separator && validity_format == "number_money_eur" {
            // '.' groups thousands in this format
            stripped = format!("REPLACE({}, '.', '')", stripped);
        }
        if decimal_separator {
            stripped = format!("REPLACE({}, ',', '.')", stripped);
        }
        self.sql_expr_cast(&stripped)
    }

    // --- CLAUSES ---

    fn sql_table_sample(&self, method: &str, percentage: f64) -> String {
        format!(
            "TABLESAMPLE {} ({})",
            method.to_uppercase(),
            self.literal_number(percentage)
        )
    }

    fn sql_limit(&self, limit: i64) -> String {
        format!("LIMIT {}", limit)
    }
}

/// True when `format` is a known `number_*` validity format.
pub fn is_castable_number_format(format: &str) -> bool {
    formats::is_number_format(format) && formats::validity_format(format).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ansi;

    impl Dialect for Ansi {
        fn name(&self) -> &str {
            "ansi"
        }
    }

    #[test]
    fn test_type_categories() {
        let d = Ansi;
        assert!(d.is_text("VARCHAR(255)"));
        assert!(d.is_text("character varying"));
        assert!(d.is_number("DECIMAL(18, 3)"));
        assert!(d.is_time("TIMESTAMP WITH TIME ZONE"));
        assert!(!d.is_number("VARCHAR"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let d = Ansi;
        assert_eq!(d.literal_string("O'Neil"), "'O''Neil'");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(d.literal_number(5.0), "5");
        assert_eq!(d.literal_number(2.5), "2.5");
        assert_eq!(
            d.sql_expr_in_list("\"c\"", &[ConfigLiteral::Text("N/A".into()), ConfigLiteral::Integer(0)]),
            "\"c\" IN ('N/A', 0)"
        );
    }

    #[test]
    fn test_cast_text_to_number() {
        let d = Ansi;
        assert_eq!(
            d.sql_expr_cast_text_to_number("\"qty\"", "number_whole"),
            "CAST(\"qty\" AS DECIMAL(38, 9))"
        );
        let money = d.sql_expr_cast_text_to_number("\"price\"", "number_money_eur");
        assert!(money.contains("REPLACE(REPLACE(REGEXP_REPLACE(\"price\""));
        let usd = d.sql_expr_cast_text_to_number("\"price\"", "number_money_usd");
        assert!(!usd.contains("','"));
    }
}
