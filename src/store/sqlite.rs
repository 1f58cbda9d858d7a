use super::{Identifiable, Repository, StoreError, UserRecord, VmProvider, VmRecord, VmStatus};
use crate::security::Role;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned, Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rusqlite::{
    params, params_from_iter, types::Type, Connection, ErrorCode, OptionalExtension, Row,
};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// V 0
const USER_ACCOUNT_TABLE_V_0: Table = Table {
    name: "user_account",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("first_name", &SqlType::Text, non_null = true),
        sqlite_column!("last_name", &SqlType::Text, non_null = true),
        sqlite_column!("hashed_password", &SqlType::Text, non_null = true),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_account_username", "username")],
};

/// V 1
const VIRTUAL_MACHINE_TABLE_V_1: Table = Table {
    name: "virtual_machine",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("owner_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_virtual_machine_owner", "owner_id")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[USER_ACCOUNT_TABLE_V_0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[USER_ACCOUNT_TABLE_V_0, VIRTUAL_MACHINE_TABLE_V_1],
        migration: Some(|conn: &Connection| VIRTUAL_MACHINE_TABLE_V_1.create(conn)),
    },
];

/// Mapping between a record and its table. Every mapped column is TEXT.
pub trait SqliteRecord: Identifiable {
    const TABLE: &'static str;
    /// Mapped columns, id first.
    const COLUMNS: &'static [&'static str];
    /// Column holding `unique_key()`.
    const UNIQUE_COLUMN: &'static str;

    fn from_row(row: &Row) -> rusqlite::Result<Self>;

    /// Values in `COLUMNS` order.
    fn values(&self) -> Vec<String>;
}

fn invalid_column(index: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(index, name.to_string(), Type::Text)
}

impl SqliteRecord for UserRecord {
    const TABLE: &'static str = "user_account";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "first_name",
        "last_name",
        "hashed_password",
        "salt",
        "role",
    ];
    const UNIQUE_COLUMN: &'static str = "username";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let role: String = row.get(6)?;
        Ok(UserRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            hashed_password: row.get(4)?,
            salt: row.get(5)?,
            role: Role::from_id(&role).ok_or_else(|| invalid_column(6, "role"))?,
        })
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.username.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.hashed_password.clone(),
            self.salt.clone(),
            self.role.as_id().to_string(),
        ]
    }
}

impl SqliteRecord for VmRecord {
    const TABLE: &'static str = "virtual_machine";
    const COLUMNS: &'static [&'static str] = &["id", "provider", "status", "owner_id"];
    const UNIQUE_COLUMN: &'static str = "id";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let provider: String = row.get(1)?;
        let status: String = row.get(2)?;
        Ok(VmRecord {
            id: row.get(0)?,
            provider: VmProvider::from_str(&provider).ok_or_else(|| invalid_column(1, "provider"))?,
            status: VmStatus::from_str(&status).ok_or_else(|| invalid_column(2, "status"))?,
            owner_id: row.get(3)?,
        })
    }

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.provider.as_str().to_string(),
            self.status.as_str().to_string(),
            self.owner_id.clone(),
        ]
    }
}

/// Shared connection to the central database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn users(&self) -> SqliteRepository<UserRecord> {
        SqliteRepository::new(self.clone())
    }

    pub fn vms(&self) -> SqliteRepository<VmRecord> {
        SqliteRepository::new(self.clone())
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend(anyhow!("database mutex poisoned")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(e.into()))?
    }
}

pub struct SqliteRepository<T> {
    store: SqliteStore,
    _record: PhantomData<fn() -> T>,
}

impl<T: SqliteRecord> SqliteRepository<T> {
    fn new(store: SqliteStore) -> Self {
        SqliteRepository {
            store,
            _record: PhantomData,
        }
    }

    fn select_sql(filter: &str) -> String {
        format!(
            "SELECT {} FROM {} {} ORDER BY rowid",
            T::COLUMNS.join(", "),
            T::TABLE,
            filter
        )
    }

    fn upsert_sql() -> String {
        let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = T::COLUMNS
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            T::TABLE,
            T::COLUMNS.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        )
    }

    fn map_write_error(err: rusqlite::Error, item: &T) -> StoreError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                StoreError::Duplicate {
                    kind: T::KIND,
                    key: item.unique_key().to_string(),
                }
            }
            _ => err.into(),
        }
    }

    fn write(conn: &Connection, item: &T) -> Result<(), StoreError> {
        conn.execute(&Self::upsert_sql(), params_from_iter(item.values()))
            .map_err(|e| Self::map_write_error(e, item))?;
        Ok(())
    }
}

#[async_trait]
impl<T: SqliteRecord> Repository<T> for SqliteRepository<T> {
    async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.store
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&Self::select_sql(""))?;
                let rows = stmt
                    .query_map([], |row| T::from_row(row))?
                    .collect::<rusqlite::Result<Vec<T>>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get(&self, id: &str) -> Result<T, StoreError> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                conn.query_row(&Self::select_sql("WHERE id = ?1"), params![id], |row| {
                    T::from_row(row)
                })
                .optional()?
                .ok_or(StoreError::NotFound { kind: T::KIND, id })
            })
            .await
    }

    async fn add(&self, item: T, ensure_unique: bool) -> Result<T, StoreError> {
        self.store
            .with_conn(move |conn| {
                let filter = format!("WHERE id = ?1 OR {} = ?2", T::UNIQUE_COLUMN);
                let existing = conn
                    .query_row(
                        &Self::select_sql(&filter),
                        params![item.id(), item.unique_key()],
                        |row| T::from_row(row),
                    )
                    .optional()?;
                match existing {
                    Some(_) if ensure_unique => Err(StoreError::Duplicate {
                        kind: T::KIND,
                        key: item.unique_key().to_string(),
                    }),
                    Some(existing) => {
                        debug!("{} {} already present", T::KIND, item.unique_key());
                        Ok(existing)
                    }
                    None => {
                        Self::write(conn, &item)?;
                        Ok(item)
                    }
                }
            })
            .await
    }

    async fn put(&self, item: T) -> Result<T, StoreError> {
        self.store
            .with_conn(move |conn| {
                Self::write(conn, &item)?;
                Ok(item)
            })
            .await
    }

    async fn put_all(&self, items: Vec<T>) -> Result<Vec<T>, StoreError> {
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                for item in &items {
                    Self::write(&tx, item)?;
                }
                tx.commit()?;
                Ok(items)
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.store
            .with_conn(move |conn| {
                let deleted = conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", T::TABLE),
                    params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound { kind: T::KIND, id });
                }
                Ok(())
            })
            .await
    }
}
