use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS counters (
    name VARCHAR(500) NOT NULL PRIMARY KEY,
    value BIGINT NOT NULL DEFAULT 0,
    updated TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS gauges (
    name VARCHAR(500) NOT NULL PRIMARY KEY,
    value DOUBLE PRECISION NOT NULL DEFAULT 0,
    updated TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS counters;
DROP TABLE IF EXISTS gauges;
";
