use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{now_millis, Backend, BackendError, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
    pub created_at: i64,
}

impl Record {
    /// Deserializes the document with its id spliced in as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_owned(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// `field == value` on a top-level document field.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: String,
    value: Value,
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_owned(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    field: String,
    descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_owned(), descending: false }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_owned(), descending: true }
    }
}

fn to_fields<T: Serialize>(document: &T) -> Result<Map<String, Value>, BackendError> {
    match serde_json::to_value(document)? {
        Value::Object(fields) => Ok(fields),
        other => Err(BackendError::Malformed(<serde_json::Error as serde::ser::Error>::custom(
            format!("expected a document, got {other}"),
        ))),
    }
}

impl Backend {
    /// Writes a new document under a fresh id and returns that id.
    pub async fn create_record<T: Serialize>(&self, collection: &str, document: &T) -> Result<String, BackendError> {
        let id = Uuid::now_v7().to_string();
        self.write(collection, &id, to_fields(document)?).await?;
        Ok(id)
    }

    /// Writes a document under a caller-chosen id, replacing whatever was there.
    pub async fn set_record<T: Serialize>(&self, collection: &str, id: &str, document: &T) -> Result<(), BackendError> {
        self.write(collection, id, to_fields(document)?).await
    }

    async fn write(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<(), BackendError> {
        sqlx::query(
            "INSERT INTO records (collection,id,fields,created_at) VALUES (?,?,?,?) \
             ON CONFLICT (collection,id) DO UPDATE SET fields=excluded.fields, created_at=excluded.created_at",
        )
            .bind(collection)
            .bind(id)
            .bind(Value::Object(fields).to_string())
            .bind(now_millis())
            .execute(&self.db_pool)
            .await?;

        debug!("wrote {collection}/{id}");
        self.notify(collection, id);
        Ok(())
    }

    pub async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>, BackendError> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT id,fields,created_at FROM records WHERE collection=? AND id=?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        row.map(into_record).transpose()
    }

    pub async fn query_records(
        &self,
        collection: &str,
        predicates: &[Predicate],
        ordering: Option<&OrderBy>,
    ) -> Result<Vec<Record>, BackendError> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT id,fields,created_at FROM records WHERE collection=");
        query.push_bind(collection.to_owned());

        for Predicate { field, value } in predicates {
            query.push(" AND json_extract(fields, ").push_bind(format!("$.{field}")).push(")");
            match value {
                Value::Null => {
                    query.push(" IS NULL");
                }
                Value::Bool(b) => {
                    query.push(" = ").push_bind(*b);
                }
                Value::Number(n) => match n.as_i64() {
                    Some(i) => {
                        query.push(" = ").push_bind(i);
                    }
                    None => {
                        query.push(" = ").push_bind(n.as_f64().unwrap_or_default());
                    }
                },
                Value::String(s) => {
                    query.push(" = ").push_bind(s.clone());
                }
                // json_extract hands back arrays and objects as minified JSON text
                other => {
                    query.push(" = ").push_bind(other.to_string());
                }
            }
        }

        match ordering {
            Some(OrderBy { field, descending }) => {
                query.push(" ORDER BY json_extract(fields, ").push_bind(format!("$.{field}"));
                query.push(if *descending { ") DESC, id DESC" } else { ") ASC, id ASC" });
            }
            None => {
                query.push(" ORDER BY created_at, id");
            }
        }

        let rows: Vec<(String, String, i64)> = query.build_query_as().fetch_all(&self.db_pool).await?;
        rows.into_iter().map(into_record).collect()
    }

    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM records WHERE collection=? AND id=?")
            .bind(collection)
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        debug!("deleted {collection}/{id}");
        self.notify(collection, id);
        Ok(())
    }

    /// Live version of [`Backend::query_records`].
    ///
    /// `project` turns the matching records into whatever the consumer wants
    /// to see. A new snapshot is pushed whenever the projected set differs
    /// from the last one delivered, starting with the current state.
    pub fn subscribe_records<T, F>(
        &self,
        collection: &str,
        predicates: Vec<Predicate>,
        ordering: Option<OrderBy>,
        project: F,
    ) -> Subscription<Vec<T>>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(Vec<Record>) -> Vec<T> + Send + 'static,
    {
        let backend = self.clone();
        let collection = collection.to_owned();
        // subscribe before the first read so no write slips between the two
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let mut last: Option<Vec<T>> = None;
            loop {
                match backend.query_records(&collection, &predicates, ordering.as_ref()).await {
                    Ok(records) => {
                        let snapshot = project(records);
                        if last.as_ref() != Some(&snapshot) {
                            if tx.send(snapshot.clone()).await.is_err() {
                                return;
                            }
                            last = Some(snapshot);
                        }
                    }
                    Err(e) => warn!("live query on {collection} failed: {e}"),
                }

                loop {
                    match changes.recv().await {
                        Ok(change) if change.collection == collection => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("live query on {collection} lagged by {skipped} changes");
                            break;
                        }
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        });

        Subscription::new(rx, task)
    }
}

fn into_record((id, fields, created_at): (String, String, i64)) -> Result<Record, BackendError> {
    Ok(Record {
        id,
        fields: serde_json::from_str(&fields)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use crate::backend::test_backend;

    use super::*;

    #[tokio::test]
    async fn create_then_get() {
        let (backend, _) = test_backend().await;
        let id = backend.create_record("startups", &json!({ "name": "Acme" })).await.unwrap();

        let record = backend.get_record("startups", &id).await.unwrap().unwrap();
        assert_eq!(record.fields["name"], "Acme");
        assert!(backend.get_record("startups", "nope").await.unwrap().is_none());
        assert!(backend.get_record("users", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_record_overwrites() {
        let (backend, _) = test_backend().await;
        backend.set_record("users", "alice1", &json!({ "uid": "a" })).await.unwrap();
        backend.set_record("users", "alice1", &json!({ "uid": "b" })).await.unwrap();

        let record = backend.get_record("users", "alice1").await.unwrap().unwrap();
        assert_eq!(record.fields["uid"], "b");
    }

    #[tokio::test]
    async fn query_filters_on_equality_and_orders() {
        let (backend, _) = test_backend().await;
        backend.create_record("startups", &json!({ "name": "a", "owner": "x", "rank": 2, "live": true })).await.unwrap();
        backend.create_record("startups", &json!({ "name": "b", "owner": "y", "rank": 1, "live": true })).await.unwrap();
        backend.create_record("startups", &json!({ "name": "c", "owner": "x", "rank": 3, "live": false })).await.unwrap();

        let owned = backend.query_records("startups", &[Predicate::eq("owner", "x")], None).await.unwrap();
        let names: Vec<_> = owned.iter().map(|r| r.fields["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "c"]);

        let live = backend
            .query_records("startups", &[Predicate::eq("live", true)], Some(&OrderBy::desc("rank")))
            .await
            .unwrap();
        let names: Vec<_> = live.iter().map(|r| r.fields["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "b"]);

        let ranked = backend.query_records("startups", &[Predicate::eq("rank", 1)], None).await.unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let (backend, _) = test_backend().await;
        let id = backend.create_record("startups", &json!({ "name": "gone" })).await.unwrap();
        backend.delete_record("startups", &id).await.unwrap();
        assert!(backend.get_record("startups", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscription_pushes_full_snapshots() {
        let (backend, _) = test_backend().await;
        let mut sub = backend.subscribe_records(
            "messages",
            vec![Predicate::eq("to", "b")],
            None,
            |records| records.into_iter().map(|r| r.id).collect::<Vec<_>>(),
        );

        assert_eq!(sub.next().await.unwrap(), Vec::<String>::new());

        let first = backend.create_record("messages", &json!({ "to": "b" })).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), vec![first.clone()]);

        // a write that doesn't touch the matching set is not re-delivered
        backend.create_record("messages", &json!({ "to": "c" })).await.unwrap();
        let quiet = timeout(Duration::from_millis(200), sub.next()).await;
        assert!(quiet.is_err());

        let second = backend.create_record("messages", &json!({ "to": "b" })).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn dropped_subscription_stops_its_task() {
        let (backend, _) = test_backend().await;
        let mut sub = backend.subscribe_records("messages", vec![], None, |records| records);
        sub.next().await.unwrap();
        assert_eq!(backend.changes.receiver_count(), 1);

        sub.unsubscribe();
        timeout(Duration::from_secs(1), async {
            while backend.changes.receiver_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // writes still go through with nobody listening
        backend.create_record("messages", &json!({ "to": "b" })).await.unwrap();
    }
}
