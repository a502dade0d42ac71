use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::error::{MetamodelError, Result};
use crate::model::{
    normalize_parent, EntityId, EntityKind, EntityPatch, EntityRecord, NewEntity, UpsertStatus,
};
use crate::store::traits::{validate_new_entity, validate_patch, EntityStore, Store};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column list that maps every table onto the same row shape
fn select_columns(kind: EntityKind) -> String {
    if kind.is_root() {
        return "id, name, company_name, NULL::INTEGER AS ecosystem_id, \
                NULL::INTEGER AS parent_id, NULL::TEXT AS description"
            .to_string();
    }
    let parent = kind.parent_column().unwrap_or("NULL::INTEGER");
    format!(
        "id, name, NULL::TEXT AS company_name, ecosystem_id, {} AS parent_id, description",
        parent
    )
}

fn map_row(kind: EntityKind, row: &PgRow) -> std::result::Result<EntityRecord, sqlx::Error> {
    Ok(EntityRecord {
        kind,
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        ecosystem_id: row.try_get("ecosystem_id")?,
        parent_id: row.try_get("parent_id")?,
        description: row.try_get("description")?,
        company_name: row.try_get("company_name")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

async fn select_by_name(
    conn: &mut PgConnection,
    kind: EntityKind,
    name: &str,
    ecosystem_id: Option<EntityId>,
) -> std::result::Result<Option<EntityRecord>, sqlx::Error> {
    let row = if kind.is_root() {
        let sql = format!(
            "SELECT {} FROM {} WHERE name = $1",
            select_columns(kind),
            kind.table()
        );
        sqlx::query(&sql).bind(name).fetch_optional(conn).await?
    } else {
        let sql = format!(
            "SELECT {} FROM {} WHERE name = $1 AND ecosystem_id = $2",
            select_columns(kind),
            kind.table()
        );
        sqlx::query(&sql)
            .bind(name)
            .bind(ecosystem_id)
            .fetch_optional(conn)
            .await?
    };

    row.map(|row| map_row(kind, &row)).transpose()
}

async fn insert_row(
    conn: &mut PgConnection,
    entity: &NewEntity,
) -> std::result::Result<EntityRecord, sqlx::Error> {
    let kind = entity.kind;
    let returning = select_columns(kind);
    let row = if kind.is_root() {
        let sql = format!(
            "INSERT INTO {} (name, company_name) VALUES ($1, $2) RETURNING {}",
            kind.table(),
            returning
        );
        sqlx::query(&sql)
            .bind(&entity.name)
            .bind(&entity.company_name)
            .fetch_one(conn)
            .await?
    } else if let Some(parent) = kind.parent_column() {
        let sql = format!(
            "INSERT INTO {} (name, ecosystem_id, {}, description) VALUES ($1, $2, $3, $4) RETURNING {}",
            kind.table(),
            parent,
            returning
        );
        sqlx::query(&sql)
            .bind(&entity.name)
            .bind(entity.ecosystem_id)
            .bind(normalize_parent(entity.parent_id))
            .bind(&entity.description)
            .fetch_one(conn)
            .await?
    } else {
        let sql = format!(
            "INSERT INTO {} (name, ecosystem_id, description) VALUES ($1, $2, $3) RETURNING {}",
            kind.table(),
            returning
        );
        sqlx::query(&sql)
            .bind(&entity.name)
            .bind(entity.ecosystem_id)
            .bind(&entity.description)
            .fetch_one(conn)
            .await?
    };

    map_row(kind, &row)
}

#[async_trait::async_trait]
impl EntityStore for PostgresStore {
    async fn find_or_create(&self, entity: NewEntity) -> Result<(EntityRecord, UpsertStatus)> {
        validate_new_entity(&entity)?;
        let kind = entity.kind;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MetamodelError::store("Failed to begin transaction", e))?;

        let existing = select_by_name(&mut tx, kind, &entity.name, entity.ecosystem_id)
            .await
            .map_err(|e| MetamodelError::store(format!("Failed to look up {}", kind), e))?;
        if let Some(existing) = existing {
            tx.commit()
                .await
                .map_err(|e| MetamodelError::store("Failed to commit transaction", e))?;
            log::warn!("{} already exists: {}", kind, entity.name);
            return Ok((existing, UpsertStatus::AlreadyExists));
        }

        match insert_row(&mut tx, &entity).await {
            Ok(record) => {
                tx.commit()
                    .await
                    .map_err(|e| MetamodelError::store("Failed to commit transaction", e))?;
                log::debug!("{} inserted: {} (id {})", kind, record.name, record.id);
                Ok((record, UpsertStatus::Created))
            }
            Err(e) if is_unique_violation(&e) => {
                // Lost a race against a concurrent insert of the same key
                tx.rollback()
                    .await
                    .map_err(|e| MetamodelError::store("Failed to roll back transaction", e))?;
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| MetamodelError::store("Failed to acquire connection", e))?;
                let winner = select_by_name(&mut conn, kind, &entity.name, entity.ecosystem_id)
                    .await
                    .map_err(|e| MetamodelError::store(format!("Failed to look up {}", kind), e))?
                    .ok_or_else(|| {
                        MetamodelError::store(
                            format!("Failed to insert {}", kind),
                            anyhow::anyhow!(
                                "unique violation on '{}' but no matching row found",
                                entity.name
                            ),
                        )
                    })?;
                log::warn!("{} already exists after concurrent insert: {}", kind, entity.name);
                Ok((winner, UpsertStatus::AlreadyExists))
            }
            Err(e) => Err(MetamodelError::store(format!("Failed to insert {}", kind), e)),
        }
    }

    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> Result<EntityRecord> {
        validate_patch(kind, &patch)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MetamodelError::store("Failed to begin transaction", e))?;

        // Only the fields the patch sets are written; omitted ones keep their value
        let mut query = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET name = ", kind.table()));
        query.push_bind(patch.name.clone());
        if kind.is_root() {
            if let Some(company_name) = &patch.company_name {
                query.push(", company_name = ").push_bind(company_name.clone());
            }
        } else if let (Some(parent), Some(parent_id)) = (kind.parent_column(), patch.parent_change()) {
            query
                .push(format!(", {} = ", parent))
                .push_bind(parent_id);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(select_columns(kind));

        let result = query.build().fetch_optional(&mut *tx).await;

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => return Err(MetamodelError::NotFound { kind, id }),
            Err(e) if is_unique_violation(&e) => {
                return Err(MetamodelError::Conflict {
                    kind,
                    name: patch.name,
                })
            }
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(MetamodelError::InvalidInput(format!(
                    "{} {} references a missing parent",
                    kind, id
                )))
            }
            Err(e) => return Err(MetamodelError::store(format!("Failed to update {}", kind), e)),
        };
        let record = map_row(kind, &row)
            .map_err(|e| MetamodelError::store(format!("Failed to decode {}", kind), e))?;

        tx.commit()
            .await
            .map_err(|e| MetamodelError::store("Failed to commit transaction", e))?;
        Ok(record)
    }

    async fn get_by_name_and_scope(
        &self,
        kind: EntityKind,
        name: &str,
        ecosystem_id: Option<EntityId>,
    ) -> Result<Option<EntityRecord>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MetamodelError::store("Failed to acquire connection", e))?;
        select_by_name(&mut conn, kind, name, ecosystem_id)
            .await
            .map_err(|e| MetamodelError::store(format!("Failed to fetch {}", kind), e))
    }

    async fn get_by_id(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns(kind),
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MetamodelError::store(format!("Failed to fetch {}", kind), e))?;

        row.map(|row| map_row(kind, &row))
            .transpose()
            .map_err(|e| MetamodelError::store(format!("Failed to decode {}", kind), e))
    }

    async fn list(&self, kind: EntityKind, ecosystem_id: Option<EntityId>) -> Result<Vec<EntityRecord>> {
        let rows = match ecosystem_id {
            Some(ecosystem_id) if !kind.is_root() => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE ecosystem_id = $1 ORDER BY id",
                    select_columns(kind),
                    kind.table()
                );
                sqlx::query(&sql).bind(ecosystem_id).fetch_all(&self.pool).await
            }
            _ => {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY id",
                    select_columns(kind),
                    kind.table()
                );
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| MetamodelError::store(format!("Failed to list {}", kind), e))?;

        rows.iter()
            .map(|row| map_row(kind, row))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MetamodelError::store(format!("Failed to decode {}", kind), e))
    }
}

impl Store for PostgresStore {}
