use crate::models::{NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Holds registered users and assigns their ids.
///
/// `insert` must perform the name uniqueness check and the write as one
/// step, so two concurrent registrations of the same name cannot both win.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError>;
    async fn list_all(&self) -> Result<Vec<User>, StoreError>;
}

#[derive(Debug)]
struct MemoryInner {
    users: Vec<User>,
    next_id: u64,
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug)]
pub struct MemoryUserStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                users: Vec::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.iter().any(|u| u.name == user.name) {
            return Err(StoreError::Duplicate(user.name));
        }
        let created = User {
            id: inner.next_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        inner.next_id += 1;
        inner.users.push(created.clone());
        Ok(created)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.name == name).cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.lock().await.users.clone())
    }
}

pub type DbConnection = Arc<Mutex<Connection>>;

/// SQLite-backed store; the `UNIQUE` constraint on `name` enforces uniqueness.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    conn: DbConnection,
}

impl SqliteUserStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(User {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at,
    })
}

const SELECT_USER: &str = "SELECT id, name, email, password_hash, created_at FROM users";

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let conn = self.conn.lock().await;
        let now = Utc::now();

        let result = conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
            params![user.name, user.email, user.password_hash, now.to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(User {
                id: conn.last_insert_rowid() as u64,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::Duplicate(user.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(&format!("{SELECT_USER} WHERE name = ?"), [name], user_from_row)
            .optional()?;
        Ok(user)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                &format!("{SELECT_USER} WHERE id = ?"),
                [id as i64],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{SELECT_USER} ORDER BY id"))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
        }
    }

    async fn exercise_store(store: &dyn UserStore) {
        let ana = store.insert(new_user("ana")).await.unwrap();
        let bob = store.insert(new_user("bob")).await.unwrap();
        assert_eq!(ana.id, 1);
        assert_eq!(bob.id, 2);

        let dup = store.insert(new_user("ana")).await;
        assert!(matches!(dup, Err(StoreError::Duplicate(ref n)) if n == "ana"));

        assert_eq!(store.find_by_name("bob").await.unwrap().unwrap().id, 2);
        assert!(store.find_by_name("carol").await.unwrap().is_none());
        assert_eq!(store.find_by_id(1).await.unwrap().unwrap().name, "ana");
        assert!(store.find_by_id(99).await.unwrap().is_none());

        let names: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["ana", "bob"]);
    }

    #[tokio::test]
    async fn test_memory_store_operations() {
        exercise_store(&MemoryUserStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_operations() {
        exercise_store(&SqliteUserStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");
        {
            let store = SqliteUserStore::open(&path).unwrap();
            store.insert(new_user("ana")).await.unwrap();
        }
        let store = SqliteUserStore::open(&path).unwrap();
        let user = store.find_by_name("ana").await.unwrap().unwrap();
        assert_eq!(user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_concurrent_inserts_of_same_name_admit_one() {
        let store = Arc::new(MemoryUserStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.insert(new_user("ana")).await },
            ));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
