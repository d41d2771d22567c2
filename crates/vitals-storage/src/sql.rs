//! Relational storage implementation.
//!
//! Counters upsert with `value = counters.value + EXCLUDED.value` so the
//! additive semantics live in the database and concurrent writers stay
//! correct without application-level locking. Batches run inside one
//! transaction per repository.

use crate::{CountersRepository, GaugesRepository, Result, Storage, StorageError};
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement, TransactionTrait};
use std::collections::HashMap;
use vitals_common::model::{Counter, Gauge, MetricCounter, MetricGauge};

const QUERY_GET_GAUGE: &str = "SELECT value FROM gauges WHERE name = $1";
const QUERY_GET_GAUGES_ALL: &str = "SELECT name, value FROM gauges";
const QUERY_SET_GAUGE: &str = "\
INSERT INTO gauges (name, value) VALUES ($1, $2) \
ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated = now()";
const QUERY_DELETE_GAUGE: &str = "DELETE FROM gauges WHERE name = $1";

const QUERY_GET_COUNTER: &str = "SELECT value FROM counters WHERE name = $1";
const QUERY_GET_COUNTERS_ALL: &str = "SELECT name, value FROM counters";
const QUERY_SET_COUNTER: &str = "\
INSERT INTO counters (name, value) VALUES ($1, $2) \
ON CONFLICT (name) DO UPDATE SET value = counters.value + EXCLUDED.value, updated = now()";
const QUERY_DELETE_COUNTER: &str = "DELETE FROM counters WHERE name = $1";

/// Storage backed by the relational database named in the DSN.
pub struct SqlStorage {
    db: DatabaseConnection,
    gauges: SqlGauges,
    counters: SqlCounters,
}

impl SqlStorage {
    /// Connects to `dsn` and brings the schema up to date.
    ///
    /// The repositories share the pooled connection by cloning its handle;
    /// the storage outlives both, so no cycle exists.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let db = Database::connect(dsn).await?;
        Migrator::up(&db, None).await?;
        tracing::info!("database schema is up to date");

        Ok(Self {
            gauges: SqlGauges { db: db.clone() },
            counters: SqlCounters { db: db.clone() },
            db,
        })
    }
}

#[async_trait]
impl Storage for SqlStorage {
    fn gauges(&self) -> &dyn GaugesRepository {
        &self.gauges
    }

    fn counters(&self) -> &dyn CountersRepository {
        &self.counters
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Closing a clone closes the shared pool underneath.
        self.db.clone().close().await?;
        Ok(())
    }
}

fn statement(db: &DatabaseConnection, sql: &str, values: Vec<sea_orm::Value>) -> Statement {
    Statement::from_sql_and_values(db.get_database_backend(), sql, values)
}

struct SqlGauges {
    db: DatabaseConnection,
}

#[async_trait]
impl GaugesRepository for SqlGauges {
    async fn get(&self, name: &str) -> Result<Gauge> {
        let row = self
            .db
            .query_one(statement(&self.db, QUERY_GET_GAUGE, vec![name.into()]))
            .await?
            .ok_or(StorageError::NotFound)?;

        let value: f64 = row.try_get("", "value")?;
        Ok(Gauge(value))
    }

    async fn get_all(&self) -> Result<HashMap<String, Gauge>> {
        let rows = self
            .db
            .query_all(statement(&self.db, QUERY_GET_GAUGES_ALL, vec![]))
            .await?;

        let mut gauges = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("", "name")?;
            let value: f64 = row.try_get("", "value")?;
            gauges.insert(name, Gauge(value));
        }

        Ok(gauges)
    }

    async fn set(&self, name: &str, value: Gauge) -> Result<()> {
        self.db
            .execute(statement(
                &self.db,
                QUERY_SET_GAUGE,
                vec![name.into(), value.0.into()],
            ))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.db
            .execute(statement(&self.db, QUERY_DELETE_GAUGE, vec![name.into()]))
            .await?;
        Ok(())
    }

    async fn batch_update(&self, gauges: &[MetricGauge]) -> Result<()> {
        let txn = self.db.begin().await?;
        for gauge in gauges {
            if let Err(e) = txn
                .execute(statement(
                    &self.db,
                    QUERY_SET_GAUGE,
                    vec![gauge.name.as_str().into(), gauge.value.0.into()],
                ))
                .await
            {
                tracing::error!(name = %gauge.name, error = %e, "gauge upsert failed, rolling back batch");
                return Err(e.into());
            }
        }
        txn.commit().await?;

        tracing::debug!(count = gauges.len(), "gauge batch applied");
        Ok(())
    }
}

struct SqlCounters {
    db: DatabaseConnection,
}

#[async_trait]
impl CountersRepository for SqlCounters {
    async fn get(&self, name: &str) -> Result<Counter> {
        let row = self
            .db
            .query_one(statement(&self.db, QUERY_GET_COUNTER, vec![name.into()]))
            .await?
            .ok_or(StorageError::NotFound)?;

        let value: i64 = row.try_get("", "value")?;
        Ok(Counter(value))
    }

    async fn get_all(&self) -> Result<HashMap<String, Counter>> {
        let rows = self
            .db
            .query_all(statement(&self.db, QUERY_GET_COUNTERS_ALL, vec![]))
            .await?;

        let mut counters = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("", "name")?;
            let value: i64 = row.try_get("", "value")?;
            counters.insert(name, Counter(value));
        }

        Ok(counters)
    }

    async fn set(&self, name: &str, value: Counter) -> Result<()> {
        self.db
            .execute(statement(
                &self.db,
                QUERY_SET_COUNTER,
                vec![name.into(), value.0.into()],
            ))
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.db
            .execute(statement(&self.db, QUERY_DELETE_COUNTER, vec![name.into()]))
            .await?;
        Ok(())
    }

    async fn batch_update(&self, counters: &[MetricCounter]) -> Result<()> {
        let txn = self.db.begin().await?;
        for counter in counters {
            if let Err(e) = txn
                .execute(statement(
                    &self.db,
                    QUERY_SET_COUNTER,
                    vec![counter.name.as_str().into(), counter.value.0.into()],
                ))
                .await
            {
                tracing::error!(name = %counter.name, error = %e, "counter upsert failed, rolling back batch");
                return Err(e.into());
            }
        }
        txn.commit().await?;

        tracing::debug!(count = counters.len(), "counter batch applied");
        Ok(())
    }
}
