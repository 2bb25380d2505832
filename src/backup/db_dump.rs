// sitebackup/src/backup/db_dump.rs
use chrono::Local;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlPool, Row};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::backup::logic::Diagnostic;
use crate::errors::{BackupError, Result};

const BATCH_SIZE: i64 = 500;

/// Dumps every table whose name starts with `table_prefix` into one
/// MySQL-dialect SQL file at `output_path`.
///
/// Schema comes verbatim from `SHOW CREATE TABLE`; data is emitted as one
/// `INSERT` per row with every value either `NULL` or a quoted escaped string.
/// The all-strings policy trades typed fidelity for portability (the target
/// engine coerces on load) and is deliberate, not an accident of the row API.
///
/// A query failure mid-stream leaves the partial dump in place and surfaces
/// the error; a write failure reports the underlying filesystem error.
pub async fn dump(
    pool: &MySqlPool,
    table_prefix: &str,
    output_path: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let host: String = sqlx::query_scalar("SELECT @@hostname")
        .fetch_one(pool)
        .await?;
    let db_name: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
        .fetch_one(pool)
        .await?;
    let db_name = db_name.unwrap_or_default();
    let charset: String = sqlx::query_scalar("SELECT @@character_set_connection")
        .fetch_one(pool)
        .await?;

    let tables = list_tables(pool).await?;
    let (kept, skipped) = partition_tables(&tables, table_prefix);
    record_skipped(&skipped, table_prefix, diagnostics);

    let file = File::create(output_path).map_err(|source| BackupError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    write_text(&mut out, output_path, &header(&host, &db_name, &charset))?;

    for table in kept {
        info!(table = %table, "dumping table");
        // Each table section is flushed as soon as it is complete, so a
        // query failure leaves the tables dumped so far on disk.
        let section = dump_table(pool, table).await?;
        write_text(&mut out, output_path, &section)?;
        out.flush().map_err(|source| BackupError::Write {
            path: output_path.to_path_buf(),
            source,
        })?;
    }

    write_text(&mut out, output_path, footer())?;
    out.flush().map_err(|source| BackupError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Splits the enumerated tables into those belonging to the installation's
/// namespace (exact byte-wise prefix match) and the rest. Only kept tables
/// produce any statement in the dump; skipped ones are informational.
fn partition_tables<'a>(all: &'a [String], prefix: &str) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut kept = Vec::new();
    let mut skipped = Vec::new();
    for table in all {
        if table.starts_with(prefix) {
            kept.push(table.as_str());
        } else {
            skipped.push(table.as_str());
        }
    }
    (kept, skipped)
}

fn record_skipped(skipped: &[&str], prefix: &str, diagnostics: &mut Vec<Diagnostic>) {
    for table in skipped {
        debug!(table = %table, "skipping table outside prefix");
        diagnostics.push(Diagnostic::info(format!(
            "Skipping table {} (not matching prefix {})",
            table, prefix
        )));
    }
}

async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    let rows = sqlx::query("SHOW TABLES").fetch_all(pool).await?;
    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        tables.push(row.try_get::<String, _>(0)?);
    }
    Ok(tables)
}

async fn dump_table(pool: &MySqlPool, table: &str) -> Result<String> {
    let mut section = format!("DROP TABLE IF EXISTS {};\n", quote_ident(table));

    let create_row = sqlx::query(&format!("SHOW CREATE TABLE {}", quote_ident(table)))
        .fetch_one(pool)
        .await?;
    let create_stmt: String = create_row.try_get(1)?;
    section.push_str(&create_stmt);
    section.push_str(";\n\n");

    // Batched fetch keeps memory bounded on large tables without changing
    // the emitted format.
    let mut offset: i64 = 0;
    let mut wrote_rows = false;
    loop {
        let query = format!(
            "SELECT * FROM {} ORDER BY 1 LIMIT {} OFFSET {}",
            quote_ident(table),
            BATCH_SIZE,
            offset
        );
        let rows = sqlx::query(&query).fetch_all(pool).await?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            let columns: Vec<String> = row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let mut cells = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                cells.push(cell_text(row, idx)?);
            }
            section.push_str(&insert_statement(table, &columns, &cells));
            wrote_rows = true;
        }

        offset += BATCH_SIZE;
    }
    if wrote_rows {
        section.push('\n');
    }

    Ok(section)
}

/// Converts one cell to its text representation, trying the common MySQL
/// decodings in turn. Everything funnels into `Option<String>`; rendering to
/// `NULL`-or-quoted-literal happens in `insert_statement`.
fn cell_text(row: &MySqlRow, idx: usize) -> Result<Option<String>> {
    if let Ok(val) = row.try_get::<Option<String>, _>(idx) {
        return Ok(val);
    }
    if let Ok(val) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<u64>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<f32>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<sqlx::types::BigDecimal>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Ok(val.map(|v| v.naive_utc().to_string()));
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return Ok(val.map(|v| v.to_string()));
    }
    if let Ok(val) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Ok(val.map(|v| String::from_utf8_lossy(&v).into_owned()));
    }

    Err(BackupError::Query(sqlx::Error::ColumnDecode {
        index: idx.to_string(),
        source: "unsupported column type for text dump".into(),
    }))
}

/// Header comment block plus the session pragmas that make the dump portable:
/// no auto-increment zero rejection, UTC timezone, and charset capture.
fn header(host: &str, db_name: &str, charset: &str) -> String {
    let mut text = String::new();
    text.push_str("-- Sitebackup Database Backup\n");
    text.push_str(&format!("-- Host: {}\n", host));
    text.push_str(&format!("-- Database: {}\n", db_name));
    text.push_str(&format!(
        "-- Generation Time: {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    text.push_str("SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";\n");
    text.push_str("SET time_zone = \"+00:00\";\n\n");
    text.push_str("/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;\n");
    text.push_str("/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;\n");
    text.push_str("/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;\n");
    text.push_str(&format!("/*!40101 SET NAMES {} */;\n\n", charset));
    text
}

/// Closing block restoring the charset/collation variables saved up top.
fn footer() -> &'static str {
    "/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;\n\
     /*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;\n\
     /*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;\n"
}

/// Renders one row as an `INSERT` with the full column list in field order.
fn insert_statement(table: &str, columns: &[String], cells: &[Option<String>]) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let vals = cells
        .iter()
        .map(|cell| match cell {
            None => "NULL".to_string(),
            Some(v) => format!("'{}'", escape_sql(v)),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});\n",
        quote_ident(table),
        cols,
        vals
    )
}

/// Backtick-quotes an identifier, doubling any embedded backtick.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escapes a value for inclusion in a single-quoted MySQL string literal.
fn escape_sql(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            '\x1a' => escaped.push_str("\\Z"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn write_text(out: &mut BufWriter<File>, path: &Path, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())
        .map_err(|source| BackupError::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_portability_pragmas() {
        let text = header("db.example.net", "appdb", "utf8mb4");
        assert!(text.contains("-- Host: db.example.net\n"));
        assert!(text.contains("-- Database: appdb\n"));
        assert!(text.contains("SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";"));
        assert!(text.contains("SET time_zone = \"+00:00\";"));
        assert!(text.contains("/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;"));
        assert!(text.contains("/*!40101 SET NAMES utf8mb4 */;"));
    }

    #[test]
    fn footer_restores_saved_session_variables() {
        let text = footer();
        assert!(text.contains("SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT"));
        assert!(text.contains("SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS"));
        assert!(text.contains("SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION"));
    }

    #[test]
    fn insert_covers_every_column_in_order() {
        let columns = vec!["id".to_string(), "title".to_string(), "body".to_string()];
        let cells = vec![
            Some("1".to_string()),
            Some("Hello".to_string()),
            None,
        ];
        let stmt = insert_statement("app_posts", &columns, &cells);
        assert_eq!(
            stmt,
            "INSERT INTO `app_posts` (`id`, `title`, `body`) VALUES ('1', 'Hello', NULL);\n"
        );
    }

    #[test]
    fn keeps_only_prefix_matched_tables() {
        let all = vec![
            "app_posts".to_string(),
            "app_users".to_string(),
            "other_posts".to_string(),
            "apple".to_string(),
        ];
        let (kept, skipped) = partition_tables(&all, "app_");
        assert_eq!(kept, vec!["app_posts", "app_users"]);
        assert_eq!(skipped, vec!["other_posts", "apple"]);
    }

    #[test]
    fn skipped_tables_become_info_diagnostics_not_statements() {
        let all = vec!["app_posts".to_string(), "other_posts".to_string()];
        let (kept, skipped) = partition_tables(&all, "app_");
        assert!(!kept.contains(&"other_posts"));

        let mut diagnostics = Vec::new();
        record_skipped(&skipped, "app_", &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].level, crate::backup::logic::Level::Info);
        assert!(diagnostics[0].message.contains("other_posts"));

        // No statement is rendered for a skipped table: only kept tables
        // flow into the section assembly.
        for table in &kept {
            let stmt = insert_statement(table, &["id".to_string()], &[Some("1".to_string())]);
            assert!(!stmt.contains("other_posts"));
        }
    }

    #[test]
    fn quotes_identifiers_and_doubles_embedded_backticks() {
        assert_eq!(quote_ident("app_posts"), "`app_posts`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");

        let stmt = insert_statement(
            "odd`table",
            &["plain".to_string(), "odd`col".to_string()],
            &[Some("1".to_string()), None],
        );
        assert_eq!(
            stmt,
            "INSERT INTO `odd``table` (`plain`, `odd``col`) VALUES ('1', NULL);\n"
        );
    }

    #[test]
    fn escapes_quotes_backslashes_and_control_chars() {
        assert_eq!(escape_sql("it's"), "it\\'s");
        assert_eq!(escape_sql("a\\b"), "a\\\\b");
        assert_eq!(escape_sql("line1\nline2"), "line1\\nline2");
        assert_eq!(escape_sql("cr\rnul\0"), "cr\\rnul\\0");
        assert_eq!(escape_sql("plain"), "plain");
    }

    #[test]
    fn numbers_and_dates_pass_through_as_quoted_strings() {
        // The all-strings policy: numeric cells are still quoted literals.
        let stmt = insert_statement(
            "app_meta",
            &["k".to_string(), "v".to_string()],
            &[Some("count".to_string()), Some("42".to_string())],
        );
        assert!(stmt.contains("VALUES ('count', '42')"));
    }
}
