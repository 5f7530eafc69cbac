//! Integration tests for loader behavior
//!
//! These tests use SQLite in-memory databases and real delimited files to
//! test end to end scenarios of a load.

#[cfg(test)]
mod tests {
    use crate::{
        db::{Pool, RelationalDriver, TableName, pool::PoolConnection},
        engine::{LoadOptions, Loader},
        error::{BulkInsertError, LoadError, SourceError},
        io::LocalObjectStore,
        runner::{LoadArgs, run_load},
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::fs;

    // ============ Test Helpers ============

    /// Helper to write a source file under the store root, creating parent directories
    async fn write_source(dir: &TempDir, key: &str, content: &str) {
        let path = dir.path().join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(&path, content).await.unwrap();
    }

    /// Helper to create a SQLite pool with one table and optional seed rows
    async fn setup_sqlite_table(table_name: &str, columns: &str, seed_rows: &[&str]) -> Pool {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        pool.execute(&format!("CREATE TABLE {} ({})", table_name, columns))
            .await
            .unwrap();
        for values in seed_rows {
            pool.execute(&format!("INSERT INTO {} VALUES ({})", table_name, values))
                .await
                .unwrap();
        }
        pool
    }

    /// Helper to query table row count
    async fn get_table_count(pool: &Pool, table_name: &str) -> i64 {
        pool.query_scalar(&format!("SELECT COUNT(*) FROM {}", table_name))
            .await
            .unwrap()
    }

    /// Helper to read one text column, in insertion order
    async fn fetch_text_column(pool: &Pool, sql: &str) -> Vec<Option<String>> {
        let mut conn = pool.acquire().await.unwrap();
        match conn {
            PoolConnection::Sqlite(ref mut sqlite_conn) => sqlx::query_scalar(sql)
                .fetch_all(&mut **sqlite_conn)
                .await
                .unwrap(),
            _ => panic!("expected a SQLite connection"),
        }
    }

    /// Helper to run a load of `key` from `dir` into `table_name`
    async fn load(
        pool: &Pool,
        dir: &TempDir,
        key: &str,
        table_name: &str,
        options: LoadOptions,
    ) -> Result<crate::engine::LoadReport, LoadError> {
        let store = Arc::new(LocalObjectStore::new(dir.path()));
        let loader = Loader::new(store, Arc::new(pool.clone()));
        loader
            .load_file_to_table(key, &TableName::unqualified(table_name), &options)
            .await
    }

    fn excluding(columns: &[&str]) -> LoadOptions {
        LoadOptions {
            excluded_columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn test_args(dir: &TempDir, file_name: &str, table: &str, pool: &Pool) -> LoadArgs {
        LoadArgs {
            endpoint: "test".to_string(),
            port: 5432,
            database: "test".to_string(),
            username: "test".to_string(),
            password: None,
            iam: false,
            region: None,
            source_uri: dir.path().join(file_name).to_string_lossy().into_owned(),
            source_prefix: None,
            format: None,
            table: table.to_string(),
            optional_columns: vec![],
            date_columns: Default::default(),
            test_pool: Some(pool.clone()),
        }
    }

    // ============ Tests ============

    #[tokio::test]
    async fn test_replace_all_load_with_optional_column() {
        let temp_dir = TempDir::new().unwrap();
        write_source(
            &temp_dir,
            "inputstream/cdw/orgcode.csv",
            "ac_code;name;amount\nAC1;First;1.5\nAC2;Second;\nAC3;Third;3\n",
        )
        .await;
        let pool = setup_sqlite_table(
            "orgcode",
            "ac_code TEXT, name TEXT, amount REAL, PROCESS_NAME TEXT",
            &["'OLD1', 'old', 1, 'etl'", "'OLD2', 'old', 2, 'etl'"],
        )
        .await;

        let report = load(
            &pool,
            &temp_dir,
            "inputstream/cdw/orgcode.csv",
            "orgcode",
            excluding(&["PROCESS_NAME"]),
        )
        .await
        .unwrap();

        assert_eq!(
            report.statement,
            "INSERT INTO orgcode(ac_code, name, amount) VALUES (?1, ?2, ?3)"
        );
        assert_eq!(report.columns, vec!["ac_code", "name", "amount"]);
        assert_eq!(report.rows_inserted, 3);
        assert_eq!(report.count_before, Some(0));
        assert_eq!(report.count_after, Some(3));

        let codes = fetch_text_column(&pool, "SELECT ac_code FROM orgcode ORDER BY rowid").await;
        assert_eq!(
            codes,
            vec![
                Some("AC1".to_string()),
                Some("AC2".to_string()),
                Some("AC3".to_string())
            ]
        );

        let process_names =
            fetch_text_column(&pool, "SELECT PROCESS_NAME FROM orgcode ORDER BY rowid").await;
        assert!(process_names.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_empty_cells_are_stored_as_null() {
        let temp_dir = TempDir::new().unwrap();
        write_source(
            &temp_dir,
            "amounts.csv",
            "code;amount;note\nA;1.5;x\nB;;\nC;3;z\n",
        )
        .await;
        let pool = setup_sqlite_table("amounts", "code TEXT, amount REAL, note TEXT", &[]).await;

        load(&pool, &temp_dir, "amounts.csv", "amounts", LoadOptions::default())
            .await
            .unwrap();

        let null_amounts = pool
            .query_scalar("SELECT COUNT(*) FROM amounts WHERE amount IS NULL")
            .await
            .unwrap();
        assert_eq!(null_amounts, 1);

        let notes = fetch_text_column(&pool, "SELECT note FROM amounts ORDER BY rowid").await;
        assert_eq!(notes, vec![Some("x".to_string()), None, Some("z".to_string())]);
    }

    #[tokio::test]
    async fn test_column_with_spaces_is_quoted() {
        let temp_dir = TempDir::new().unwrap();
        write_source(
            &temp_dir,
            "hierarchies.csv",
            "code;LEVEL FROM PARENT\nA;1\nB;2\n",
        )
        .await;
        let pool = setup_sqlite_table(
            "hierarchies",
            "code TEXT, \"LEVEL FROM PARENT\" INTEGER",
            &[],
        )
        .await;

        let report = load(
            &pool,
            &temp_dir,
            "hierarchies.csv",
            "hierarchies",
            LoadOptions::default(),
        )
        .await
        .unwrap();

        assert!(report.statement.contains("(code, \"LEVEL FROM PARENT\")"));
        let level_sum = pool
            .query_scalar("SELECT SUM(\"LEVEL FROM PARENT\") FROM hierarchies")
            .await
            .unwrap();
        assert_eq!(level_sum, 3);
    }

    #[tokio::test]
    async fn test_extra_source_column_fails_after_truncate() {
        // Table [A, B, C] minus {C}, file still three wide
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "abc.csv", "A;B;C\n1;2;3\n4;5;6\n").await;
        let pool = setup_sqlite_table("abc", "A TEXT, B TEXT, C TEXT", &["'x', 'y', 'z'"]).await;

        let err = load(&pool, &temp_dir, "abc.csv", "abc", excluding(&["C"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::BulkInsert(BulkInsertError::Rejected { .. })
        ));
        assert_eq!(get_table_count(&pool, "abc").await, 0);
    }

    #[tokio::test]
    async fn test_rejected_row_rolls_back_whole_batch() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "codes.csv", "code;n\nA;1\n;2\nC;3\n").await;
        let pool = setup_sqlite_table(
            "codes",
            "code TEXT NOT NULL, n INTEGER",
            &["'OLD', 9"],
        )
        .await;

        let err = load(&pool, &temp_dir, "codes.csv", "codes", LoadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::BulkInsert(_)));
        // The first row is not committed on its own and the old row is gone
        assert_eq!(get_table_count(&pool, "codes").await, 0);
    }

    #[tokio::test]
    async fn test_date_parse_unknown_to_database() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "dates.csv", "ID;START\n1;01/02/2024\n").await;
        let pool = setup_sqlite_table("dates", "ID INTEGER, START TEXT", &[]).await;

        let options = LoadOptions {
            date_columns: [(1, "DD/MM/YYYY".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let err = load(&pool, &temp_dir, "dates.csv", "dates", options)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::BulkInsert(BulkInsertError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_table_fails_truncate() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "orgcode.csv", "a;b\n1;2\n").await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let err = load(&pool, &temp_dir, "orgcode.csv", "orgcode", LoadOptions::default())
            .await
            .unwrap_err();

        // The delete-all against a missing table fails first
        assert!(matches!(err, LoadError::Truncate { .. }));
    }

    #[tokio::test]
    async fn test_header_only_file_empties_table() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "orgcode.csv", "ac_code;name\n").await;
        let pool =
            setup_sqlite_table("orgcode", "ac_code TEXT, name TEXT", &["'OLD', 'old'"]).await;

        let report = load(&pool, &temp_dir, "orgcode.csv", "orgcode", LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(report.rows_inserted, 0);
        assert_eq!(report.count_after, Some(0));
        assert_eq!(get_table_count(&pool, "orgcode").await, 0);
    }

    #[tokio::test]
    async fn test_na_tokens_are_stored_as_null() {
        let temp_dir = TempDir::new().unwrap();
        write_source(
            &temp_dir,
            "amounts.csv",
            "code;amount\nA;1.5\nB;NA\nC;3\nD;#N/A\n",
        )
        .await;
        let pool = setup_sqlite_table("amounts", "code TEXT, amount REAL", &[]).await;

        load(&pool, &temp_dir, "amounts.csv", "amounts", LoadOptions::default())
            .await
            .unwrap();

        let null_amounts = pool
            .query_scalar("SELECT COUNT(*) FROM amounts WHERE amount IS NULL")
            .await
            .unwrap();
        assert_eq!(null_amounts, 2);
        // The column stays numeric, so the sum is exact
        let total = pool
            .query_scalar("SELECT CAST(SUM(amount) * 10 AS INTEGER) FROM amounts")
            .await
            .unwrap();
        assert_eq!(total, 45);
    }

    #[tokio::test]
    async fn test_spreadsheet_load() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("data")
            .join("orgcode.xlsx");
        fs::copy(&fixture, temp_dir.path().join("orgcode.xlsx"))
            .await
            .unwrap();
        let pool = setup_sqlite_table(
            "orgcode",
            "AC_CODE TEXT, VALID_FROM TEXT, ACTIVE INTEGER, AMOUNT REAL, NOTE TEXT",
            &["'OLD', NULL, 0, 0, 'old'"],
        )
        .await;

        let report = load(&pool, &temp_dir, "orgcode.xlsx", "orgcode", LoadOptions::default())
            .await
            .unwrap();

        assert_eq!(report.rows_inserted, 3);
        assert_eq!(report.count_after, Some(3));

        let dates = fetch_text_column(&pool, "SELECT VALID_FROM FROM orgcode ORDER BY rowid").await;
        assert_eq!(
            dates,
            vec![
                Some("2024-01-31 00:00:00".to_string()),
                None,
                Some("2024-02-01 00:00:00".to_string())
            ]
        );
        let notes = fetch_text_column(&pool, "SELECT NOTE FROM orgcode ORDER BY rowid").await;
        assert_eq!(notes, vec![Some("first".to_string()), None, None]);
        let active = pool
            .query_scalar("SELECT SUM(ACTIVE) FROM orgcode")
            .await
            .unwrap();
        assert_eq!(active, 2);
    }

    #[tokio::test]
    async fn test_row_limit_refuses_load_before_truncate() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "orgcode.csv", "ac_code;name\nAC1;a\nAC2;b\nAC3;c\n").await;
        let pool = setup_sqlite_table("orgcode", "ac_code TEXT, name TEXT", &["'OLD', 'old'"])
            .await
            .with_row_limit(2);

        let err = load(&pool, &temp_dir, "orgcode.csv", "orgcode", LoadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::BulkInsert(BulkInsertError::TransactionLimit { rows: 3, limit: 2 })
        ));
        assert_eq!(get_table_count(&pool, "orgcode").await, 1);
    }

    #[tokio::test]
    async fn test_run_load_from_local_path() {
        let temp_dir = TempDir::new().unwrap();
        write_source(
            &temp_dir,
            "orgcode.csv",
            "ac_code;name\nAC1;First\nAC2;Second\n",
        )
        .await;
        let pool = setup_sqlite_table(
            "orgcode",
            "ac_code TEXT, name TEXT, ETL_CYCLE INTEGER",
            &["'OLD', 'old', 1"],
        )
        .await;

        let mut args = test_args(&temp_dir, "orgcode.csv", "main.orgcode", &pool);
        args.optional_columns = vec!["ETL_CYCLE".to_string()];

        let report = run_load(args).await.unwrap();

        assert_eq!(report.table, TableName::new("main", "orgcode"));
        assert_eq!(report.rows_inserted, 2);
        assert_eq!(get_table_count(&pool, "orgcode").await, 2);
    }

    #[tokio::test]
    async fn test_run_load_missing_source_keeps_table() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "other.csv", "ac_code;name\nAC1;First\n").await;
        let pool =
            setup_sqlite_table("orgcode", "ac_code TEXT, name TEXT", &["'OLD', 'old'"]).await;

        let err = run_load(test_args(&temp_dir, "orgcode.csv", "orgcode", &pool))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::Source(SourceError::NotFound { .. }))
        ));
        assert_eq!(get_table_count(&pool, "orgcode").await, 1);
    }

    #[tokio::test]
    async fn test_run_load_rejects_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "orgcode.txt", "ac_code;name\nAC1;First\n").await;
        let pool =
            setup_sqlite_table("orgcode", "ac_code TEXT, name TEXT", &["'OLD', 'old'"]).await;

        let err = run_load(test_args(&temp_dir, "orgcode.txt", "orgcode", &pool))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::Source(SourceError::UnsupportedFormat(_)))
        ));
        assert_eq!(get_table_count(&pool, "orgcode").await, 1);
    }

    #[tokio::test]
    async fn test_run_load_format_override() {
        let temp_dir = TempDir::new().unwrap();
        write_source(&temp_dir, "orgcode.txt", "ac_code;name\nAC1;First\n").await;
        let pool =
            setup_sqlite_table("orgcode", "ac_code TEXT, name TEXT", &["'OLD', 'old'"]).await;

        let mut args = test_args(&temp_dir, "orgcode.txt", "orgcode", &pool);
        args.format = Some(crate::formats::Format::Delimited);
        let report = run_load(args).await.unwrap();

        assert_eq!(report.rows_inserted, 1);
        assert_eq!(get_table_count(&pool, "orgcode").await, 1);
    }
}
