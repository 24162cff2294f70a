use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};

use crate::config::DatabaseConfig;
use crate::error::IngestError;
use crate::model::{Identifier, MovieRow};

/// Hands out connections to the destination database.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>, IngestError>;
}

/// One open session against the destination database.
///
/// `close` consumes the connection, so it can be released at most once.
#[async_trait]
pub trait WarehouseConnection: Send {
    /// Selects the destination database, creating it and the table first when the
    /// deployment owns the schema.
    async fn prepare(&mut self) -> Result<(), IngestError>;

    /// Empties the destination table and inserts `rows` in one transaction.
    /// Returns the number of rows inserted.
    async fn replace_rows(&mut self, rows: &[MovieRow]) -> Result<u64, IngestError>;

    async fn close(self: Box<Self>) -> Result<(), IngestError>;
}

/// The MySQL / Aurora MySQL destination, reached with a fresh connection per file.
pub struct MySqlWarehouse {
    options: MySqlConnectOptions,
    database: Identifier,
    table: Identifier,
    ensure_schema: bool,
}

impl MySqlWarehouse {
    pub fn new(config: &DatabaseConfig) -> Self {
        // The database is selected in `prepare` so it can be created first.
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password);

        Self::with_options(
            options,
            config.database.clone(),
            config.table.clone(),
            config.ensure_schema,
        )
    }

    pub fn with_options(
        options: MySqlConnectOptions,
        database: Identifier,
        table: Identifier,
        ensure_schema: bool,
    ) -> Self {
        Self {
            options,
            database,
            table,
            ensure_schema,
        }
    }
}

#[async_trait]
impl Warehouse for MySqlWarehouse {
    #[tracing::instrument(skip(self), fields(database = %self.database))]
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>, IngestError> {
        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| IngestError::Connection(e.to_string()))?;

        Ok(Box::new(MySqlSession {
            conn,
            database: self.database.clone(),
            table: self.table.clone(),
            ensure_schema: self.ensure_schema,
        }))
    }
}

/// Statements run by `prepare`, in order.
fn schema_statements(database: &Identifier, table: &Identifier, ensure_schema: bool) -> Vec<String> {
    let database = database.quoted();
    let mut statements = Vec::with_capacity(3);
    if ensure_schema {
        statements.push(format!("CREATE DATABASE IF NOT EXISTS {database}"));
    }
    statements.push(format!("USE {database}"));
    if ensure_schema {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (id INT, title VARCHAR(100), tagline VARCHAR(100))",
            table.quoted()
        ));
    }
    statements
}

// TRUNCATE commits implicitly in MySQL; DELETE keeps the reload atomic.
fn delete_all_sql(table: &Identifier) -> String {
    format!("DELETE FROM {}", table.quoted())
}

fn insert_row_sql(table: &Identifier) -> String {
    format!(
        "INSERT INTO {} (id, title, tagline) VALUES (?, ?, ?)",
        table.quoted()
    )
}

struct MySqlSession {
    conn: MySqlConnection,
    database: Identifier,
    table: Identifier,
    ensure_schema: bool,
}

fn query_error(e: sqlx::Error) -> IngestError {
    IngestError::Query(e.to_string())
}

#[async_trait]
impl WarehouseConnection for MySqlSession {
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn prepare(&mut self) -> Result<(), IngestError> {
        // MySQL refuses to prepare `USE`, so these go over the text protocol.
        for statement in schema_statements(&self.database, &self.table, self.ensure_schema) {
            self.conn
                .execute(sqlx::raw_sql(&statement))
                .await
                .map_err(query_error)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, rows), fields(table = %self.table, rows = rows.len()))]
    async fn replace_rows(&mut self, rows: &[MovieRow]) -> Result<u64, IngestError> {
        let truncate = delete_all_sql(&self.table);
        let insert = insert_row_sql(&self.table);

        let mut tx = self.conn.begin().await.map_err(query_error)?;
        let removed = sqlx::query(&truncate)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?
            .rows_affected();
        tracing::debug!(removed, "emptied destination table");

        let mut inserted = 0u64;
        for row in rows {
            tracing::trace!(id = row.id, title = %row.title, "inserting row");
            inserted += sqlx::query(&insert)
                .bind(row.id)
                .bind(&row.title)
                .bind(&row.tagline)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?
                .rows_affected();
        }

        tx.commit().await.map_err(query_error)?;
        Ok(inserted)
    }

    async fn close(self: Box<Self>) -> Result<(), IngestError> {
        self.conn
            .close()
            .await
            .map_err(|e| IngestError::Connection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn ident(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    #[test]
    fn schema_creation_wraps_database_selection() {
        assert_eq!(
            schema_statements(&ident("moviesdb"), &ident("movies"), true),
            vec![
                "CREATE DATABASE IF NOT EXISTS `moviesdb`".to_string(),
                "USE `moviesdb`".to_string(),
                "CREATE TABLE IF NOT EXISTS `movies` (id INT, title VARCHAR(100), tagline VARCHAR(100))"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn assumed_schema_only_selects_database() {
        assert_eq!(
            schema_statements(&ident("moviesdb"), &ident("movies"), false),
            vec!["USE `moviesdb`".to_string()]
        );
    }

    #[test]
    fn load_statements_quote_the_table() {
        assert_eq!(delete_all_sql(&ident("movies_v2")), "DELETE FROM `movies_v2`");
        assert_eq!(
            insert_row_sql(&ident("movies_v2")),
            "INSERT INTO `movies_v2` (id, title, tagline) VALUES (?, ?, ?)"
        );
    }

    /// Needs a reachable server, e.g.
    /// `MYSQL_TEST_URL=mysql://root:pw@localhost:3306 cargo test -- --ignored`.
    #[ignore]
    #[tokio::test]
    async fn loads_into_real_mysql() {
        let url = std::env::var("MYSQL_TEST_URL").expect("MYSQL_TEST_URL must be provided");
        let options = MySqlConnectOptions::from_str(&url).unwrap();
        let warehouse = MySqlWarehouse::with_options(
            options.clone(),
            ident("ingest_lambda_test"),
            ident("movies"),
            true,
        );
        let row = |id: i32, title: &str| MovieRow {
            id,
            title: title.to_string(),
            tagline: "tagline".to_string(),
        };

        for batch in [vec![row(9, "Stale")], vec![row(1, "Toy Story"), row(2, "Jumanji")]] {
            let mut conn = warehouse.connect().await.unwrap();
            conn.prepare().await.unwrap();
            assert_eq!(conn.replace_rows(&batch).await.unwrap(), batch.len() as u64);
            conn.close().await.unwrap();
        }

        let mut check = MySqlConnection::connect_with(&options.database("ingest_lambda_test"))
            .await
            .unwrap();
        let rows: Vec<(i32, String)> =
            sqlx::query_as("SELECT id, title FROM `movies` ORDER BY id")
                .fetch_all(&mut check)
                .await
                .unwrap();
        check.close().await.unwrap();
        assert_eq!(
            rows,
            vec![(1, "Toy Story".to_string()), (2, "Jumanji".to_string())]
        );
    }
}
