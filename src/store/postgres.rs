//! PostgreSQL store. All tables live in a schema named from `DESCRIBO_SCHEMA` env (default `describo`).

use super::{EntityStore, SessionStore};
use crate::error::StoreError;
use crate::model::{Entity, EntityFind, EntityPage, EntityPatch, EntityQuery, NewEntity, Property, Removal};
use crate::session::{Session, SessionData, User};
use async_trait::async_trait;
use sqlx::{ConnectOptions, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use uuid::Uuid;

/// Schema name for service tables. From env `DESCRIBO_SCHEMA`, default `describo`. Must be a valid PostgreSQL identifier.
pub fn describo_schema() -> String {
    std::env::var("DESCRIBO_SCHEMA").unwrap_or_else(|_| "describo".into())
}

/// Returns schema-qualified table name (e.g. "describo.entity").
pub fn qualified_table(table: &str) -> String {
    format!("{}.{}", describo_schema(), table)
}

const ENTITY_COLUMNS: &str = "id, eid, etype, name, hierarchy, collection_id, created_at, updated_at";
const PROPERTY_COLUMNS: &str = "id, name, value, tgt_entity_id, entity_id, collection_id, created_at";

/// Create the schema and tables if they do not exist.
pub async fn ensure_tables(pool: &PgPool) -> Result<(), StoreError> {
    let schema = describo_schema();
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let entity = qualified_table("entity");
    let property = qualified_table("property");
    let users = qualified_table("users");
    let session = qualified_table("session");
    let ddl = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                eid TEXT NOT NULL,
                etype TEXT NOT NULL,
                name TEXT,
                hierarchy TEXT,
                collection_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (collection_id, eid)
            )
            "#,
            entity
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                value TEXT,
                tgt_entity_id UUID REFERENCES {} (id) ON DELETE CASCADE,
                entity_id UUID NOT NULL REFERENCES {} (id) ON DELETE CASCADE,
                collection_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            property, entity, entity
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS property_entity_idx ON {} (entity_id)",
            property
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS property_tgt_entity_idx ON {} (tgt_entity_id)",
            property
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT
            )
            "#,
            users
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES {} (id) ON DELETE CASCADE,
                data JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            session, users
        ),
    ];
    for stmt in &ddl {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| StoreError::Invalid(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Invalid("DATABASE_URL: no path".into()))?
        + 1;
    let db_name = url
        .get(path_start..)
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps unique violations to `Conflict`, everything else to `Db`.
fn map_write_err(e: sqlx::Error, eid: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(format!("an entity with @id '{}' already exists", eid));
        }
    }
    StoreError::Db(e)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn require_entity(&self, collection_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1 AND collection_id = $2)",
            qualified_table("entity")
        );
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(id)
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }
        Ok(())
    }
}

fn push_entity_filter(qb: &mut QueryBuilder<'_, Postgres>, collection_id: Uuid, filter: Option<&str>) {
    qb.push(" WHERE collection_id = ").push_bind(collection_id);
    if let Some(f) = filter.filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", f.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR eid ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn get_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Entity, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND collection_id = $2",
            ENTITY_COLUMNS,
            qualified_table("entity")
        );
        tracing::debug!(sql = %sql, %id, "query");
        sqlx::query_as::<_, Entity>(&sql)
            .bind(id)
            .bind(collection_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))
    }

    async fn list_entities(&self, collection_id: Uuid, query: &EntityQuery) -> Result<EntityPage, StoreError> {
        let table = qualified_table("entity");

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", table));
        push_entity_filter(&mut count, collection_id, query.filter.as_deref());
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM {}", ENTITY_COLUMNS, table));
        push_entity_filter(&mut qb, collection_id, query.filter.as_deref());
        qb.push(" ORDER BY ");
        for field in &query.order_by {
            qb.push(field.column()).push(" ").push(query.direction.sql()).push(", ");
        }
        qb.push("id ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        tracing::debug!(sql = %qb.sql(), "query");
        let entities = qb.build_query_as::<Entity>().fetch_all(&self.pool).await?;
        Ok(EntityPage {
            entities,
            total: total.max(0) as u64,
        })
    }

    async fn entity_properties(&self, collection_id: Uuid, id: Uuid) -> Result<Vec<Property>, StoreError> {
        self.require_entity(collection_id, id).await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE entity_id = $1 AND collection_id = $2 ORDER BY created_at, id",
            PROPERTY_COLUMNS,
            qualified_table("property")
        );
        tracing::debug!(sql = %sql, %id, "query");
        Ok(sqlx::query_as::<_, Property>(&sql)
            .bind(id)
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_entities(&self, collection_id: Uuid, find: &EntityFind) -> Result<Vec<Entity>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE collection_id = ",
            ENTITY_COLUMNS,
            qualified_table("entity")
        ));
        qb.push_bind(collection_id);
        for (column, value) in [
            ("hierarchy", &find.hierarchy),
            ("eid", &find.eid),
            ("etype", &find.etype),
            ("name", &find.name),
        ] {
            if let Some(v) = value {
                qb.push(format!(" AND {} = ", column)).push_bind(v.clone());
            }
        }
        qb.push(" ORDER BY created_at, id");
        tracing::debug!(sql = %qb.sql(), "query");
        Ok(qb.build_query_as::<Entity>().fetch_all(&self.pool).await?)
    }

    async fn insert_entity(&self, collection_id: Uuid, new: NewEntity) -> Result<Entity, StoreError> {
        let eid = new.eid.ok_or_else(|| StoreError::Invalid("entity eid is required".into()))?;
        let sql = format!(
            "INSERT INTO {} (id, eid, etype, name, hierarchy, collection_id) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            qualified_table("entity"),
            ENTITY_COLUMNS
        );
        tracing::debug!(sql = %sql, eid = %eid, "query");
        sqlx::query_as::<_, Entity>(&sql)
            .bind(Uuid::new_v4())
            .bind(&eid)
            .bind(&new.etype)
            .bind(&new.name)
            .bind(&new.hierarchy)
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_err(e, &eid))
    }

    async fn update_entity(&self, collection_id: Uuid, id: Uuid, patch: EntityPatch) -> Result<Entity, StoreError> {
        let sql = format!(
            "UPDATE {} SET name = COALESCE($3, name), eid = COALESCE($4, eid), updated_at = NOW() \
             WHERE id = $1 AND collection_id = $2 RETURNING {}",
            qualified_table("entity"),
            ENTITY_COLUMNS
        );
        tracing::debug!(sql = %sql, %id, "query");
        let eid = patch.eid.clone().unwrap_or_default();
        sqlx::query_as::<_, Entity>(&sql)
            .bind(id)
            .bind(collection_id)
            .bind(patch.name)
            .bind(patch.eid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_err(e, &eid))?
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))
    }

    async fn remove_entity(&self, collection_id: Uuid, id: Uuid) -> Result<Removal, StoreError> {
        let entity_table = qualified_table("entity");
        let property_table = qualified_table("property");
        let mut tx = self.pool.begin().await?;

        let updated: Vec<Uuid> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT entity_id FROM {} WHERE tgt_entity_id = $1 AND entity_id <> $1 AND collection_id = $2 ORDER BY entity_id",
            property_table
        ))
        .bind(id)
        .bind(collection_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE (entity_id = $1 OR tgt_entity_id = $1) AND collection_id = $2",
            property_table
        ))
        .bind(id)
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query_as::<_, Entity>(&format!(
            "DELETE FROM {} WHERE id = $1 AND collection_id = $2 RETURNING {}",
            entity_table, ENTITY_COLUMNS
        ))
        .bind(id)
        .bind(collection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;

        tx.commit().await?;
        Ok(Removal { updated, removed })
    }

    async fn attach_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        name: &str,
        value: Option<String>,
        tgt_entity_id: Option<Uuid>,
    ) -> Result<Property, StoreError> {
        self.require_entity(collection_id, entity_id).await?;
        if let Some(tgt) = tgt_entity_id {
            self.require_entity(collection_id, tgt).await?;
        }
        let sql = format!(
            "INSERT INTO {} (id, name, value, tgt_entity_id, entity_id, collection_id) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            qualified_table("property"),
            PROPERTY_COLUMNS
        );
        tracing::debug!(sql = %sql, %entity_id, property = %name, "query");
        Ok(sqlx::query_as::<_, Property>(&sql)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(value)
            .bind(tgt_entity_id)
            .bind(entity_id)
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_property(
        &self,
        collection_id: Uuid,
        entity_id: Uuid,
        property_id: Uuid,
        value: Option<String>,
    ) -> Result<Property, StoreError> {
        let sql = format!(
            "UPDATE {} SET value = $4 WHERE id = $1 AND entity_id = $2 AND collection_id = $3 RETURNING {}",
            qualified_table("property"),
            PROPERTY_COLUMNS
        );
        tracing::debug!(sql = %sql, %property_id, "query");
        sqlx::query_as::<_, Property>(&sql)
            .bind(property_id)
            .bind(entity_id)
            .bind(collection_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("property {}", property_id)))
    }

    async fn remove_property(&self, collection_id: Uuid, entity_id: Uuid, property_id: Uuid) -> Result<(), StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 AND entity_id = $2 AND collection_id = $3",
            qualified_table("property")
        );
        tracing::debug!(sql = %sql, %property_id, "query");
        let result = sqlx::query(&sql)
            .bind(property_id)
            .bind(entity_id)
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("property {}", property_id)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT id, user_id, data FROM {} WHERE id = $1", qualified_table("session"));
        let row: Option<(Uuid, Uuid, serde_json::Value)> =
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            None => Ok(None),
            Some((id, user_id, data)) => {
                let data = SessionData::from_value(data)
                    .map_err(|e| StoreError::Invalid(format!("session {} has malformed data: {}", id, e)))?;
                Ok(Some(Session { id, user_id, data }))
            }
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT id, email, name FROM {} WHERE id = $1", qualified_table("users"));
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_session_data(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET data = $2, updated_at = NOW() WHERE id = $1",
            qualified_table("session")
        );
        let data = serde_json::to_value(data)
            .map_err(|e| StoreError::Invalid(format!("session data: {}", e)))?;
        let result = sqlx::query(&sql).bind(id).bind(data).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {}", id)));
        }
        Ok(())
    }
}
