//! Copy target parsing and INSERT statement building

use crate::placeholder::Placeholder;

/// Where copied rows go, determined once from the target string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Bare table name, columns must be discovered
    Table(String),
    /// Table name followed by a parenthesized column list
    TableWithColumns(String),
    /// Literal INSERT statement, used verbatim for one row at a time
    Statement(String),
}

impl Target {
    pub fn parse(target: &str) -> Self {
        if target.trim().to_lowercase().starts_with("insert into") {
            Target::Statement(target.to_string())
        } else if target.contains('(') {
            Target::TableWithColumns(target.to_string())
        } else {
            Target::Table(target.to_string())
        }
    }

    /// Rows per execution for this target
    ///
    /// The parameter layout of a literal statement is unknown beyond its
    /// first row, so literal statements never batch.
    pub fn effective_batch_size(&self, batch_size: usize) -> usize {
        match self {
            Target::Statement(_) => 1,
            _ => batch_size,
        }
    }
}

/// Zero-row query whose result shape gives the columns of `table`
pub fn probe_query(table: &str) -> String {
    format!("SELECT * FROM {} WHERE 1=0", table)
}

/// Append discovered column names to a bare table name
pub fn with_columns(table: &str, columns: &[String]) -> String {
    format!("{}({})", table, columns.join(", "))
}

/// Build a multi-row INSERT for `rows` rows of `columns` values each
///
/// Placeholder positions run across the whole statement: row 0 takes
/// `1..=columns`, row 1 takes `columns+1..=2*columns`, and so on.
pub fn insert_statement(
    table: &str,
    columns: usize,
    rows: usize,
    placeholder: &Placeholder,
) -> String {
    let tuples: Vec<String> = (0..rows)
        .map(|row| {
            let values: Vec<String> = (1..=columns)
                .map(|col| placeholder.format(row * columns + col))
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    format!("INSERT INTO {} VALUES {}", table, tuples.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_table() {
        assert_eq!(Target::parse("hello"), Target::Table("hello".to_string()));
    }

    #[test]
    fn test_parse_table_with_columns() {
        assert_eq!(
            Target::parse("hello(a, b)"),
            Target::TableWithColumns("hello(a, b)".to_string())
        );
    }

    #[test]
    fn test_parse_insert_statement() {
        let sql = "insert into hello(a, b) values (?, ?)";
        assert_eq!(Target::parse(sql), Target::Statement(sql.to_string()));
    }

    #[test]
    fn test_parse_insert_statement_case_and_whitespace() {
        let sql = "  INSERT INTO hello VALUES ($1, $2)";
        assert_eq!(Target::parse(sql), Target::Statement(sql.to_string()));
    }

    #[test]
    fn test_effective_batch_size() {
        assert_eq!(Target::parse("t").effective_batch_size(10), 10);
        assert_eq!(Target::parse("t(a)").effective_batch_size(10), 10);
        assert_eq!(
            Target::parse("insert into t values (?)").effective_batch_size(10),
            1
        );
    }

    #[test]
    fn test_probe_query() {
        assert_eq!(probe_query("hello"), "SELECT * FROM hello WHERE 1=0");
    }

    #[test]
    fn test_with_columns() {
        let columns = vec!["a".to_string(), "b".to_string()];
        assert_eq!(with_columns("hello", &columns), "hello(a, b)");
    }

    #[test]
    fn test_insert_statement_single_row() {
        let sql = insert_statement("hello(a, b)", 2, 1, &Placeholder::fixed("?"));
        assert_eq!(sql, "INSERT INTO hello(a, b) VALUES (?, ?)");
    }

    #[test]
    fn test_insert_statement_numbers_across_rows() {
        let sql = insert_statement("hello(a, b)", 2, 3, &Placeholder::numbered("$"));
        assert_eq!(
            sql,
            "INSERT INTO hello(a, b) VALUES ($1, $2), ($3, $4), ($5, $6)"
        );
    }

    #[test]
    fn test_insert_statement_parameter_count() {
        let sql = insert_statement("t(a, b, c)", 3, 10, &Placeholder::fixed("?"));
        assert_eq!(sql.matches('?').count(), 30);
    }
}
