use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("storage: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait IdentityRepo: Send + Sync {
    /// Uniqueness is enforced here (storage constraint), not by the caller.
    async fn create_identity(&self, handle: &str, digest: &str) -> RepoResult<Identity>;
    async fn get_identity(&self, handle: &str) -> RepoResult<Identity>;
    /// Rewrites the stored digest (legacy plaintext upgrade path).
    async fn replace_digest(&self, handle: &str, digest: &str) -> RepoResult<()>;
    async fn list_identities(&self) -> RepoResult<Vec<Identity>>;
}

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn append_message(&self, new: NewMessage) -> RepoResult<Message>;
    /// Both directions of a handle pair, ascending (created_at, id).
    async fn conversation(&self, a: &str, b: &str) -> RepoResult<Vec<Message>>;
    /// Earliest tagged message of the pair decides the topic; the log is the
    /// only source of truth for it.
    async fn conversation_theme(&self, a: &str, b: &str) -> RepoResult<Option<String>>;
    /// Board feed order: descending by id.
    async fn thread_messages(&self, thread_id: Id) -> RepoResult<Vec<Message>>;
    async fn delete_message(&self, id: Id) -> RepoResult<()>;
    async fn purge_thread(&self, thread_id: Id) -> RepoResult<u64>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn list_threads(&self, keyword: Option<&str>) -> RepoResult<Vec<Thread>>;
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
}

#[async_trait]
pub trait FriendRepo: Send + Sync {
    /// Conflict when any request for the ordered (from, to) pair exists,
    /// pending or approved alike. The threshold precondition is the surface
    /// controller's job, not re-verified here.
    async fn create_friend_request(&self, from: &str, to: &str) -> RepoResult<FriendRequest>;
    async fn pending_requests_to(&self, to: &str) -> RepoResult<Vec<FriendRequest>>;
    /// Sets the matching request to approved and inserts both directed
    /// edges in the same transaction; duplicate edges are a no-op, so
    /// re-approval converges on the same edge set.
    async fn approve_friend_request(&self, to: &str, from: &str) -> RepoResult<()>;
    async fn friends_of(&self, handle: &str) -> RepoResult<Vec<String>>;
}

pub trait Repo: IdentityRepo + ConversationRepo + ThreadRepo + FriendRepo {}

impl<T> Repo for T where T: IdentityRepo + ConversationRepo + ThreadRepo + FriendRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    /// Identity row with the digest kept; the API model hides it from
    /// serialization, which would otherwise drop credentials from the
    /// snapshot.
    #[derive(Clone, Serialize, Deserialize)]
    struct IdentityRecord {
        handle: String,
        digest: String,
        created_at: chrono::DateTime<Utc>,
    }

    impl From<&IdentityRecord> for Identity {
        fn from(r: &IdentityRecord) -> Self {
            Identity { handle: r.handle.clone(), digest: r.digest.clone(), created_at: r.created_at }
        }
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        identities: Vec<IdentityRecord>,
        messages: Vec<Message>,
        threads: Vec<Thread>,
        requests: Vec<FriendRequest>,
        friends: Vec<(String, String)>,
        next_message_id: Id,
        next_thread_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("MOBIUS_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Arc::new(snapshot_path) }
        }

        fn next_message_id(state: &mut State) -> Id {
            state.next_message_id += 1;
            state.next_message_id
        }

        fn next_thread_id(state: &mut State) -> Id {
            state.next_thread_id += 1;
            state.next_thread_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl IdentityRepo for InMemRepo {
        async fn create_identity(&self, handle: &str, digest: &str) -> RepoResult<Identity> {
            let mut s = self.state.write().unwrap();
            if s.identities.iter().any(|r| r.handle == handle) {
                return Err(RepoError::Conflict);
            }
            let rec = IdentityRecord {
                handle: handle.to_string(),
                digest: digest.to_string(),
                created_at: Utc::now(),
            };
            let identity = Identity::from(&rec);
            s.identities.push(rec);
            drop(s);
            self.persist();
            Ok(identity)
        }

        async fn get_identity(&self, handle: &str) -> RepoResult<Identity> {
            let s = self.state.read().unwrap();
            s.identities
                .iter()
                .find(|r| r.handle == handle)
                .map(Identity::from)
                .ok_or(RepoError::NotFound)
        }

        async fn replace_digest(&self, handle: &str, digest: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let rec = s
                .identities
                .iter_mut()
                .find(|r| r.handle == handle)
                .ok_or(RepoError::NotFound)?;
            rec.digest = digest.to_string();
            drop(s);
            self.persist();
            Ok(())
        }

        async fn list_identities(&self) -> RepoResult<Vec<Identity>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Identity> = s.identities.iter().map(Identity::from).collect();
            v.sort_by(|a, b| a.handle.cmp(&b.handle));
            Ok(v)
        }
    }

    #[async_trait]
    impl ConversationRepo for InMemRepo {
        async fn append_message(&self, new: NewMessage) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_message_id(&mut s);
            let msg = Message {
                id,
                sender: new.sender,
                target: new.target,
                body: new.body,
                created_at: Utc::now(),
                theme: new.theme,
            };
            s.messages.push(msg.clone());
            drop(s);
            self.persist();
            Ok(msg)
        }

        async fn conversation(&self, a: &str, b: &str) -> RepoResult<Vec<Message>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Message> = s
                .messages
                .iter()
                .filter(|m| (m.sender == a && m.target == b) || (m.sender == b && m.target == a))
                .cloned()
                .collect();
            v.sort_by(|x, y| x.created_at.cmp(&y.created_at).then(x.id.cmp(&y.id)));
            Ok(v)
        }

        async fn conversation_theme(&self, a: &str, b: &str) -> RepoResult<Option<String>> {
            let v = self.conversation(a, b).await?;
            Ok(v.into_iter().find_map(|m| m.theme))
        }

        async fn thread_messages(&self, thread_id: Id) -> RepoResult<Vec<Message>> {
            let target = thread_target(thread_id);
            let s = self.state.read().unwrap();
            let mut v: Vec<Message> = s
                .messages
                .iter()
                .filter(|m| m.target == target)
                .cloned()
                .collect();
            v.sort_by(|x, y| y.id.cmp(&x.id)); // feed order, newest first
            Ok(v)
        }

        async fn delete_message(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let before = s.messages.len();
            s.messages.retain(|m| m.id != id);
            if s.messages.len() == before {
                return Err(RepoError::NotFound);
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn purge_thread(&self, thread_id: Id) -> RepoResult<u64> {
            let target = thread_target(thread_id);
            let mut s = self.state.write().unwrap();
            let before = s.messages.len();
            s.messages.retain(|m| m.target != target);
            let removed = (before - s.messages.len()) as u64;
            drop(s);
            self.persist();
            Ok(removed)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn list_threads(&self, keyword: Option<&str>) -> RepoResult<Vec<Thread>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Thread> = s
                .threads
                .iter()
                .filter(|t| keyword.map(|k| t.title.contains(k)).unwrap_or(true))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(v)
        }

        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_thread_id(&mut s);
            let thread = Thread { id, title: new.title, created_at: Utc::now() };
            s.threads.push(thread.clone());
            drop(s);
            self.persist();
            Ok(thread)
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.state.read().unwrap();
            s.threads.iter().find(|t| t.id == id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl FriendRepo for InMemRepo {
        async fn create_friend_request(&self, from: &str, to: &str) -> RepoResult<FriendRequest> {
            let mut s = self.state.write().unwrap();
            // ordered-pair uniqueness regardless of status
            if s.requests.iter().any(|r| r.from == from && r.to == to) {
                return Err(RepoError::Conflict);
            }
            let req = FriendRequest {
                from: from.to_string(),
                to: to.to_string(),
                status: RequestStatus::Pending,
                created_at: Utc::now(),
            };
            s.requests.push(req.clone());
            drop(s);
            self.persist();
            Ok(req)
        }

        async fn pending_requests_to(&self, to: &str) -> RepoResult<Vec<FriendRequest>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<FriendRequest> = s
                .requests
                .iter()
                .filter(|r| r.to == to && r.status == RequestStatus::Pending)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn approve_friend_request(&self, to: &str, from: &str) -> RepoResult<()> {
            // single critical section: status flip and both edges together
            let mut s = self.state.write().unwrap();
            let req = s
                .requests
                .iter_mut()
                .find(|r| r.from == from && r.to == to)
                .ok_or(RepoError::NotFound)?;
            req.status = RequestStatus::Approved;
            for edge in [(to.to_string(), from.to_string()), (from.to_string(), to.to_string())] {
                if !s.friends.contains(&edge) {
                    s.friends.push(edge);
                }
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn friends_of(&self, handle: &str) -> RepoResult<Vec<String>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<String> = s
                .friends
                .iter()
                .filter(|(user, _)| user == handle)
                .map(|(_, friend)| friend.clone())
                .collect();
            v.sort();
            Ok(v)
        }
    }
}

// Sqlite implementation (feature = "sqlite-store")
#[cfg(feature = "sqlite-store")]
pub mod sqlite {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Pool, Row, Sqlite};

    #[derive(Clone)]
    pub struct SqliteRepo { pool: Pool<Sqlite> }

    impl SqliteRepo {
        pub fn new(pool: Pool<Sqlite>) -> Self { Self { pool } }
        pub fn pool(&self) -> &Pool<Sqlite> { &self.pool }
    }

    fn map_db(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    fn col<'r, T>(row: &'r SqliteRow, name: &str) -> RepoResult<T>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get(name).map_err(|e| RepoError::Internal(e.to_string()))
    }

    fn identity_from_row(row: &SqliteRow) -> RepoResult<Identity> {
        Ok(Identity {
            handle: col(row, "handle")?,
            digest: col(row, "digest")?,
            created_at: col::<DateTime<Utc>>(row, "created_at")?,
        })
    }

    fn message_from_row(row: &SqliteRow) -> RepoResult<Message> {
        Ok(Message {
            id: col(row, "id")?,
            sender: col(row, "sender")?,
            target: col(row, "target")?,
            body: col(row, "body")?,
            created_at: col::<DateTime<Utc>>(row, "created_at")?,
            theme: col(row, "theme")?,
        })
    }

    fn thread_from_row(row: &SqliteRow) -> RepoResult<Thread> {
        Ok(Thread {
            id: col(row, "id")?,
            title: col(row, "title")?,
            created_at: col::<DateTime<Utc>>(row, "created_at")?,
        })
    }

    fn request_from_row(row: &SqliteRow) -> RepoResult<FriendRequest> {
        let raw: String = col(row, "status")?;
        let status = RequestStatus::parse(&raw)
            .ok_or_else(|| RepoError::Internal(format!("unknown request status '{raw}'")))?;
        Ok(FriendRequest {
            from: col(row, "from_handle")?,
            to: col(row, "to_handle")?,
            status,
            created_at: col::<DateTime<Utc>>(row, "created_at")?,
        })
    }

    #[async_trait]
    impl IdentityRepo for SqliteRepo {
        async fn create_identity(&self, handle: &str, digest: &str) -> RepoResult<Identity> {
            let now = Utc::now();
            sqlx::query("INSERT INTO users (handle, digest, created_at) VALUES (?, ?, ?)")
                .bind(handle)
                .bind(digest)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            Ok(Identity { handle: handle.to_string(), digest: digest.to_string(), created_at: now })
        }

        async fn get_identity(&self, handle: &str) -> RepoResult<Identity> {
            let row = sqlx::query("SELECT handle, digest, created_at FROM users WHERE handle = ?")
                .bind(handle)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db)?
                .ok_or(RepoError::NotFound)?;
            identity_from_row(&row)
        }

        async fn replace_digest(&self, handle: &str, digest: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET digest = ? WHERE handle = ?")
                .bind(digest)
                .bind(handle)
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn list_identities(&self) -> RepoResult<Vec<Identity>> {
            let rows = sqlx::query("SELECT handle, digest, created_at FROM users ORDER BY handle")
                .fetch_all(&self.pool)
                .await
                .map_err(map_db)?;
            rows.iter().map(identity_from_row).collect()
        }
    }

    #[async_trait]
    impl ConversationRepo for SqliteRepo {
        async fn append_message(&self, new: NewMessage) -> RepoResult<Message> {
            let now = Utc::now();
            let row = sqlx::query(
                "INSERT INTO messages (sender, target, body, created_at, theme) VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&new.sender)
            .bind(&new.target)
            .bind(&new.body)
            .bind(now)
            .bind(&new.theme)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(Message {
                id: col(&row, "id")?,
                sender: new.sender,
                target: new.target,
                body: new.body,
                created_at: now,
                theme: new.theme,
            })
        }

        async fn conversation(&self, a: &str, b: &str) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query(
                "SELECT id, sender, target, body, created_at, theme FROM messages \
                 WHERE (sender = ? AND target = ?) OR (sender = ? AND target = ?) \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(a)
            .bind(b)
            .bind(b)
            .bind(a)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            rows.iter().map(message_from_row).collect()
        }

        async fn conversation_theme(&self, a: &str, b: &str) -> RepoResult<Option<String>> {
            let row = sqlx::query(
                "SELECT theme FROM messages \
                 WHERE ((sender = ? AND target = ?) OR (sender = ? AND target = ?)) \
                 AND theme IS NOT NULL \
                 ORDER BY created_at ASC, id ASC LIMIT 1",
            )
            .bind(a)
            .bind(b)
            .bind(b)
            .bind(a)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?;
            match row {
                Some(row) => Ok(Some(col(&row, "theme")?)),
                None => Ok(None),
            }
        }

        async fn thread_messages(&self, thread_id: Id) -> RepoResult<Vec<Message>> {
            let rows = sqlx::query(
                "SELECT id, sender, target, body, created_at, theme FROM messages \
                 WHERE target = ? ORDER BY id DESC",
            )
            .bind(thread_target(thread_id))
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            rows.iter().map(message_from_row).collect()
        }

        async fn delete_message(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM messages WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn purge_thread(&self, thread_id: Id) -> RepoResult<u64> {
            let res = sqlx::query("DELETE FROM messages WHERE target = ?")
                .bind(thread_target(thread_id))
                .execute(&self.pool)
                .await
                .map_err(map_db)?;
            Ok(res.rows_affected())
        }
    }

    #[async_trait]
    impl ThreadRepo for SqliteRepo {
        async fn list_threads(&self, keyword: Option<&str>) -> RepoResult<Vec<Thread>> {
            let rows = match keyword {
                Some(kw) => {
                    sqlx::query(
                        "SELECT id, title, created_at FROM threads WHERE title LIKE ? ORDER BY id DESC",
                    )
                    .bind(format!("%{kw}%"))
                    .fetch_all(&self.pool)
                    .await
                }
                None => {
                    sqlx::query("SELECT id, title, created_at FROM threads ORDER BY id DESC")
                        .fetch_all(&self.pool)
                        .await
                }
            }
            .map_err(map_db)?;
            rows.iter().map(thread_from_row).collect()
        }

        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let now = Utc::now();
            let row = sqlx::query("INSERT INTO threads (title, created_at) VALUES (?, ?) RETURNING id")
                .bind(&new.title)
                .bind(now)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db)?;
            Ok(Thread { id: col(&row, "id")?, title: new.title, created_at: now })
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let row = sqlx::query("SELECT id, title, created_at FROM threads WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db)?
                .ok_or(RepoError::NotFound)?;
            thread_from_row(&row)
        }
    }

    #[async_trait]
    impl FriendRepo for SqliteRepo {
        async fn create_friend_request(&self, from: &str, to: &str) -> RepoResult<FriendRequest> {
            let now = Utc::now();
            // UNIQUE(from_handle, to_handle) turns the duplicate race into a
            // constraint violation rather than a check-then-act window.
            sqlx::query(
                "INSERT INTO friend_requests (from_handle, to_handle, status, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(from)
            .bind(to)
            .bind(RequestStatus::Pending.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
            Ok(FriendRequest {
                from: from.to_string(),
                to: to.to_string(),
                status: RequestStatus::Pending,
                created_at: now,
            })
        }

        async fn pending_requests_to(&self, to: &str) -> RepoResult<Vec<FriendRequest>> {
            let rows = sqlx::query(
                "SELECT from_handle, to_handle, status, created_at FROM friend_requests \
                 WHERE to_handle = ? AND status = 'pending' ORDER BY created_at ASC",
            )
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            rows.iter().map(request_from_row).collect()
        }

        async fn approve_friend_request(&self, to: &str, from: &str) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_db)?;
            let res = sqlx::query(
                "UPDATE friend_requests SET status = 'approved' WHERE from_handle = ? AND to_handle = ?",
            )
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await
            .map_err(map_db)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            for (user, friend) in [(to, from), (from, to)] {
                sqlx::query("INSERT OR IGNORE INTO friends (user, friend) VALUES (?, ?)")
                    .bind(user)
                    .bind(friend)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db)?;
            }
            tx.commit().await.map_err(map_db)?;
            Ok(())
        }

        async fn friends_of(&self, handle: &str) -> RepoResult<Vec<String>> {
            let rows = sqlx::query("SELECT friend FROM friends WHERE user = ? ORDER BY friend")
                .bind(handle)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db)?;
            rows.iter().map(|r| col(r, "friend")).collect()
        }
    }
}
