use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{message_path, DocumentStore, StoreError};
use crate::models::{Entry, EntryUpdate, Message, NewMessage, Role, Subject};

/// Postgres-backed document store.
///
/// Insertion order is kept in a `seq` column so ties on message timestamps
/// resolve the same way on every read.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: String,
    plant_type: Option<String>,
    nickname: Option<String>,
    description: Option<String>,
    date_acquired: Option<String>,
    age_when_acquired: Option<String>,
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    created_at: String,
    entry_date: Option<String>,
    name: Option<String>,
    summary: String,
    human_summary: Option<String>,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    uid: String,
    sent_at: String,
    role: String,
    content: String,
    images: Json<Vec<String>>,
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        Entry {
            id: row.id,
            created_at: row.created_at,
            entry_date: row.entry_date,
            name: row.name,
            summary: row.summary,
            human_summary: row.human_summary,
            messages: Vec::new(),
        }
    }
}

impl MessageRow {
    fn into_message(self, subject_id: &str, entry_id: &str) -> Result<Message, StoreError> {
        let role = Role::parse(&self.role).ok_or_else(|| StoreError::Corrupt {
            path: message_path(subject_id, entry_id, &self.id),
            message: format!("unknown role '{}'", self.role),
        })?;

        Ok(Message {
            id: self.id,
            uid: self.uid,
            timestamp: self.sent_at,
            role,
            content: self.content,
            images: self.images.0,
        })
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace subject metadata (entries are written separately).
    pub async fn put_subject(&self, subject: &Subject) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subjects (id, plant_type, nickname, description, date_acquired, age_when_acquired)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                plant_type = EXCLUDED.plant_type,
                nickname = EXCLUDED.nickname,
                description = EXCLUDED.description,
                date_acquired = EXCLUDED.date_acquired,
                age_when_acquired = EXCLUDED.age_when_acquired
            "#,
        )
        .bind(&subject.id)
        .bind(&subject.plant_type)
        .bind(&subject.nickname)
        .bind(&subject.description)
        .bind(&subject.date_acquired)
        .bind(&subject.age_when_acquired)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert an entry row (messages are appended separately).
    pub async fn put_entry(&self, subject_id: &str, entry: &Entry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO entries (subject_id, id, created_at, entry_date, name, summary, human_summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subject_id, id) DO UPDATE SET
                entry_date = EXCLUDED.entry_date,
                name = EXCLUDED.name,
                human_summary = EXCLUDED.human_summary
            "#,
        )
        .bind(subject_id)
        .bind(&entry.id)
        .bind(&entry.created_at)
        .bind(&entry.entry_date)
        .bind(&entry.name)
        .bind(&entry.summary)
        .bind(&entry.human_summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get_subject(&self, subject_id: &str) -> Result<Option<Subject>, StoreError> {
        let row: Option<SubjectRow> = sqlx::query_as(
            "SELECT id, plant_type, nickname, description, date_acquired, age_when_acquired
             FROM subjects WHERE id = $1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries: Vec<EntryRow> = sqlx::query_as(
            "SELECT id, created_at, entry_date, name, summary, human_summary
             FROM entries WHERE subject_id = $1 ORDER BY seq ASC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Subject {
            id: row.id,
            plant_type: row.plant_type,
            nickname: row.nickname,
            description: row.description,
            date_acquired: row.date_acquired,
            age_when_acquired: row.age_when_acquired,
            entries: entries.into_iter().map(Entry::from).collect(),
        }))
    }

    async fn get_entry(
        &self,
        subject_id: &str,
        entry_id: &str,
    ) -> Result<Option<Entry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT id, created_at, entry_date, name, summary, human_summary
             FROM entries WHERE subject_id = $1 AND id = $2",
        )
        .bind(subject_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, uid, sent_at, role, content, images
             FROM messages WHERE subject_id = $1 AND entry_id = $2 ORDER BY seq ASC",
        )
        .bind(subject_id)
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entry = Entry::from(row);
        entry.messages = messages
            .into_iter()
            .map(|m| m.into_message(subject_id, entry_id))
            .collect::<Result<_, _>>()?;
        Ok(Some(entry))
    }

    async fn get_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, uid, sent_at, role, content, images
             FROM messages WHERE subject_id = $1 AND entry_id = $2 AND id = $3",
        )
        .bind(subject_id)
        .bind(entry_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|m| m.into_message(subject_id, entry_id)).transpose()
    }

    async fn append_message(
        &self,
        subject_id: &str,
        entry_id: &str,
        message: NewMessage,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO messages (subject_id, entry_id, id, uid, sent_at, role, content, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subject_id)
        .bind(entry_id)
        .bind(&id)
        .bind(&message.uid)
        .bind(&message.timestamp)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(Json(&message.images))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_entry(
        &self,
        subject_id: &str,
        entry_id: &str,
        update: EntryUpdate,
    ) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }

        // COALESCE keeps columns the update leaves unset.
        let result = sqlx::query(
            "UPDATE entries
             SET summary = COALESCE($3, summary), name = COALESCE($4, name)
             WHERE subject_id = $1 AND id = $2",
        )
        .bind(subject_id)
        .bind(entry_id)
        .bind(&update.summary)
        .bind(&update.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::entry_not_found(subject_id, entry_id));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }

    fn emits_change_events(&self) -> bool {
        true
    }
}
