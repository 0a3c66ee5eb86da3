//! Built-in drivers: the relational (postgres/greenplum) driver and the
//! kafka stream driver.
//!
//! Connector SQL is deliberately minimal; the interesting surface is the
//! capability boundary, and the external transfer engine does the actual
//! data movement.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use datalift_core::job::TransferEndpoint;

use crate::capability::{DriverSet, DsDriver, DsReader, DsWriter, StreamReader, StreamWriter, TableInfo};
use crate::error::DriverError;
use crate::registry::DriverRegistry;

/// Connections a driver-owned pool keeps open. Drivers only run
/// housekeeping statements (truncate, cursor lookup), not data movement.
const DRIVER_POOL_CONNECTIONS: u32 = 2;

/// Register the built-in driver set.
pub fn register_builtin(registry: &mut DriverRegistry) {
    registry.register("postgres", |connect_id| {
        Ok(relational_set(RelationalDriver::new("postgres", connect_id)))
    });
    registry.register("greenplum", |connect_id| {
        Ok(relational_set(RelationalDriver::new("greenplum", connect_id)))
    });
    registry.register("kafka", |connect_id| {
        let driver = Arc::new(KafkaDriver {
            connect_id: connect_id.to_string(),
        });
        Ok(DriverSet {
            driver: driver.clone(),
            reader: None,
            writer: None,
            stream_reader: Some(driver.clone()),
            stream_writer: Some(driver),
        })
    });
}

fn relational_set(driver: RelationalDriver) -> DriverSet {
    let driver = Arc::new(driver);
    DriverSet {
        driver: driver.clone(),
        reader: Some(driver.clone()),
        writer: Some(driver),
        stream_reader: None,
        stream_writer: None,
    }
}

// ---------------------------------------------------------------------------
// Relational driver (postgres, greenplum)
// ---------------------------------------------------------------------------

/// Driver for PostgreSQL-protocol relational sources.
///
/// Greenplum speaks the PostgreSQL wire protocol, so both tags share this
/// implementation; only the type tag in the emitted specs differs.
#[derive(Debug)]
pub struct RelationalDriver {
    ds_type: &'static str,
    connect_id: String,
    /// Lazily created on first database operation. Spec building never
    /// touches the network.
    pool: tokio::sync::Mutex<Option<PgPool>>,
}

impl RelationalDriver {
    fn new(ds_type: &'static str, connect_id: &str) -> Self {
        Self {
            ds_type,
            connect_id: connect_id.to_string(),
            pool: tokio::sync::Mutex::new(None),
        }
    }

    /// The connect id with its tag rewritten to the `postgres` scheme
    /// sqlx understands.
    fn database_url(&self) -> String {
        match self.connect_id.split_once("://") {
            Some((_, rest)) => format!("postgres://{rest}"),
            None => self.connect_id.clone(),
        }
    }

    async fn pool(&self) -> Result<PgPool, DriverError> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        let pool = PgPoolOptions::new()
            .max_connections(DRIVER_POOL_CONNECTIONS)
            .connect(&self.database_url())
            .await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    fn endpoint_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        json!({
            "type": self.ds_type,
            "connect_id": endpoint.connect_id,
            "schema": endpoint.schema,
            "table": endpoint.table,
            "cursor_column": endpoint.cursor_column,
        })
    }

    async fn describe_table(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError> {
        let pool = self.pool().await?;
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(&endpoint.schema)
        .bind(&endpoint.table)
        .fetch_all(&pool)
        .await?;

        Ok(TableInfo {
            schema: endpoint.schema.clone(),
            table: endpoint.table.clone(),
            columns,
        })
    }
}

impl DsDriver for RelationalDriver {
    fn ds_type(&self) -> &str {
        self.ds_type
    }
}

#[async_trait]
impl DsReader for RelationalDriver {
    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError> {
        self.describe_table(endpoint).await
    }

    async fn max_cursor_value(
        &self,
        endpoint: &TransferEndpoint,
    ) -> Result<Option<String>, DriverError> {
        let Some(cursor_column) = endpoint.cursor_column.as_deref() else {
            return Ok(None);
        };

        let pool = self.pool().await?;
        let query = format!(
            "SELECT MAX(\"{cursor_column}\")::TEXT FROM \"{}\".\"{}\"",
            endpoint.schema, endpoint.table,
        );
        let row = sqlx::query(&query).fetch_one(&pool).await?;
        Ok(row.try_get(0)?)
    }

    fn reader_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        self.endpoint_spec(endpoint)
    }
}

#[async_trait]
impl DsWriter for RelationalDriver {
    async fn truncate(&self, endpoint: &TransferEndpoint) -> Result<(), DriverError> {
        let pool = self.pool().await?;
        let query = format!(
            "TRUNCATE TABLE \"{}\".\"{}\"",
            endpoint.schema, endpoint.table,
        );
        tracing::info!(
            ds_type = self.ds_type,
            schema = %endpoint.schema,
            table = %endpoint.table,
            "Truncating writer table before transfer",
        );
        sqlx::query(&query).execute(&pool).await?;
        Ok(())
    }

    async fn table_info(&self, endpoint: &TransferEndpoint) -> Result<TableInfo, DriverError> {
        self.describe_table(endpoint).await
    }

    fn writer_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        self.endpoint_spec(endpoint)
    }
}

// ---------------------------------------------------------------------------
// Kafka stream driver
// ---------------------------------------------------------------------------

/// Stream-capable driver: exposes only the stream capabilities, making it
/// the canonical `CapabilityUnsupported` case when resolved as a batch
/// reader or writer.
#[derive(Debug)]
pub struct KafkaDriver {
    connect_id: String,
}

impl DsDriver for KafkaDriver {
    fn ds_type(&self) -> &str {
        "kafka"
    }
}

impl StreamReader for KafkaDriver {
    fn stream_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        kafka_spec(&self.connect_id, endpoint, "source")
    }
}

impl StreamWriter for KafkaDriver {
    fn stream_spec(&self, endpoint: &TransferEndpoint) -> serde_json::Value {
        kafka_spec(&self.connect_id, endpoint, "sink")
    }
}

fn kafka_spec(connect_id: &str, endpoint: &TransferEndpoint, role: &str) -> serde_json::Value {
    json!({
        "type": "kafka",
        "role": role,
        "connect_id": connect_id,
        // The endpoint table doubles as the kafka topic name.
        "topic": endpoint.table,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
