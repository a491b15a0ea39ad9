//! Document-store execution path (MongoDB).
//!
//! A document query is written `collection` or `collection|<filter>`, where
//! the filter is a JSON object. Every document becomes one row; the header is
//! the union of the documents' keys in first-seen order and each cell holds a
//! `key=value` string, or `null` when the document lacks that key.
//!
//! A client is created per call and shut down on every exit path.

use crate::config::EngineSettings;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, PaginationRequest, TabularResult};
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Collection};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info};

/// A parsed `collection|filter` query.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    pub filter: Document,
}

/// Split `collection|filter` on the first `|`. Both halves are trimmed; a
/// missing or blank filter matches every document.
pub fn parse_query(text: &str) -> DbResult<DocumentQuery> {
    let (collection, filter) = match text.split_once('|') {
        Some((collection, filter)) => (collection.trim(), filter.trim()),
        None => (text.trim(), ""),
    };

    if collection.is_empty() {
        return Err(DbError::malformed_statement(
            "Document query needs a collection name: <collection> or <collection>|<filter>",
        ));
    }

    Ok(DocumentQuery {
        collection: collection.to_string(),
        filter: parse_filter(filter)?,
    })
}

/// Parse filter text into a BSON document.
pub fn parse_filter(text: &str) -> DbResult<Document> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Document::new());
    }

    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| DbError::invalid_filter(format!("Invalid filter JSON: {}", e)))?;
    if !value.is_object() {
        return Err(DbError::invalid_filter(format!(
            "Filter must be a JSON object, got: {}",
            text
        )));
    }

    mongodb::bson::to_document(&value)
        .map_err(|e| DbError::invalid_filter(format!("Invalid filter document: {}", e)))
}

/// Run a document query.
pub async fn execute(
    descriptor: &ConnectionDescriptor,
    text: &str,
    pagination: Option<&PaginationRequest>,
    settings: &EngineSettings,
) -> DbResult<TabularResult> {
    let query = parse_query(text)?;
    let (client, database) = connect(descriptor, settings).await?;
    let database = match database {
        Some(name) => name,
        None => {
            client.shutdown().await;
            return Err(DbError::invalid_input(
                "The MongoDB URI names no database; add /<database> to it",
            ));
        }
    };

    let start = Instant::now();
    let collection = client
        .database(&database)
        .collection::<Document>(&query.collection);
    let fetched = find(&collection, &query, pagination, settings).await;
    drop(collection);
    client.shutdown().await;

    let documents = fetched?;
    debug!(
        database = %database,
        collection = %query.collection,
        documents = documents.len(),
        "Fetched documents"
    );

    let (header, rows) = project(&documents);
    Ok(TabularResult::new(header, rows)?
        .paged(pagination.map(PaginationRequest::page_size))
        .with_execution_time(start.elapsed().as_millis() as u64))
}

async fn find(
    collection: &Collection<Document>,
    query: &DocumentQuery,
    pagination: Option<&PaginationRequest>,
    settings: &EngineSettings,
) -> DbResult<Vec<Document>> {
    let work = async {
        let mut find = collection.find(query.filter.clone());
        if let Some(req) = pagination {
            find = find.skip(req.offset()).limit(req.fetch_size() as i64);
        }
        let cursor = find.await?;
        Ok::<_, DbError>(cursor.try_collect::<Vec<_>>().await?)
    };

    match timeout(settings.query_timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(
            "document query",
            settings.query_timeout.as_secs(),
        )),
    }
}

/// Header is the ordered union of keys; cells are `key=value` strings.
pub fn project(documents: &[Document]) -> (Vec<String>, Vec<Vec<JsonValue>>) {
    let mut header: Vec<String> = Vec::new();
    for document in documents {
        for key in document.keys() {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }

    let rows = documents
        .iter()
        .map(|document| {
            header
                .iter()
                .map(|key| match document.get(key) {
                    Some(value) => JsonValue::String(format!("{}={}", key, render(value))),
                    None => JsonValue::Null,
                })
                .collect()
        })
        .collect();

    (header, rows)
}

fn render(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

/// Ping the server. Returns `MongoDB <version>` when the server reports it.
pub async fn test_connection(
    descriptor: &ConnectionDescriptor,
    settings: &EngineSettings,
) -> DbResult<Option<String>> {
    let (client, _) = connect(descriptor, settings).await?;
    let result = client
        .database("admin")
        .run_command(doc! { "buildInfo": 1 })
        .await;
    client.shutdown().await;

    let info = result?;
    let version = info
        .get_str("version")
        .ok()
        .map(|v| format!("MongoDB {}", v));
    info!(
        connection = %descriptor.masked(),
        version = ?version,
        "Connection test succeeded"
    );
    Ok(version)
}

/// Database names on the server.
pub async fn list_databases(
    descriptor: &ConnectionDescriptor,
    settings: &EngineSettings,
) -> DbResult<Vec<String>> {
    let (client, _) = connect(descriptor, settings).await?;
    let result = client.list_database_names().await;
    client.shutdown().await;
    Ok(result?)
}

/// Collection names in the URI's database.
pub async fn list_collections(
    descriptor: &ConnectionDescriptor,
    settings: &EngineSettings,
) -> DbResult<Vec<String>> {
    let (client, database) = connect(descriptor, settings).await?;
    let result = match &database {
        Some(name) => client
            .database(name)
            .list_collection_names()
            .await
            .map_err(DbError::from),
        None => Err(DbError::invalid_input(
            "The MongoDB URI names no database; add /<database> to it",
        )),
    };
    client.shutdown().await;
    let mut names = result?;
    names.sort();
    Ok(names)
}

/// Keys of the first document in a collection, the closest thing a
/// collection has to columns.
pub async fn collection_fields(
    descriptor: &ConnectionDescriptor,
    collection: &str,
    settings: &EngineSettings,
) -> DbResult<Vec<String>> {
    let (client, database) = connect(descriptor, settings).await?;
    let result = match &database {
        Some(name) => client
            .database(name)
            .collection::<Document>(collection)
            .find_one(doc! {})
            .await
            .map_err(DbError::from),
        None => Err(DbError::invalid_input(
            "The MongoDB URI names no database; add /<database> to it",
        )),
    };
    client.shutdown().await;
    Ok(result?
        .map(|document| document.keys().cloned().collect())
        .unwrap_or_default())
}

/// Build a client for the descriptor. Credentials on the descriptor are used
/// only when the URI carries none of its own.
async fn connect(
    descriptor: &ConnectionDescriptor,
    settings: &EngineSettings,
) -> DbResult<(Client, Option<String>)> {
    let mut options = ClientOptions::parse(descriptor.connection_string())
        .await
        .map_err(|e| {
            DbError::connection(
                format!("Invalid MongoDB URI: {}", e),
                crate::error::ConnectionFailureKind::Unknown,
                "Use mongodb://[user:password@]host[:port]/[database]",
            )
        })?;

    if options.credential.is_none() && !descriptor.username().is_empty() {
        options.credential = Some(
            Credential::builder()
                .username(descriptor.username().to_string())
                .password(descriptor.password().to_string())
                .build(),
        );
    }
    options.connect_timeout = Some(settings.connect_timeout);
    options.server_selection_timeout = Some(settings.connect_timeout);
    options.app_name = Some("db-studio".to_string());

    let database = options.default_database.clone();
    info!(
        connection = %descriptor.masked(),
        database = ?database,
        "Opening MongoDB client"
    );
    Ok((Client::with_options(options)?, database))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_collection_only() {
        let query = parse_query("  users ").unwrap();
        assert_eq!(query.collection, "users");
        assert!(query.filter.is_empty());
    }

    #[test]
    fn test_parse_query_with_filter() {
        let query = parse_query("users | {\"age\": {\"$gt\": 30}}").unwrap();
        assert_eq!(query.collection, "users");
        let gt = query.filter.get_document("age").unwrap().get("$gt").unwrap();
        assert!(matches!(gt, Bson::Int32(30) | Bson::Int64(30)), "{:?}", gt);
    }

    #[test]
    fn test_parse_query_blank_filter_matches_all() {
        let query = parse_query("users|   ").unwrap();
        assert!(query.filter.is_empty());
    }

    #[test]
    fn test_parse_query_splits_on_first_pipe() {
        let query = parse_query("logs|{\"msg\": \"a|b\"}").unwrap();
        assert_eq!(query.collection, "logs");
        assert_eq!(query.filter, doc! { "msg": "a|b" });
    }

    #[test]
    fn test_parse_query_invalid_filter() {
        for text in ["users|{age: }", "users|[1, 2]", "users|42", "users|{\"a\": 1"] {
            let err = parse_query(text).unwrap_err();
            assert!(matches!(err, DbError::InvalidFilter { .. }), "{}", text);
        }
    }

    #[test]
    fn test_parse_query_missing_collection() {
        let err = parse_query("|{}").unwrap_err();
        assert!(matches!(err, DbError::MalformedStatement { .. }));
    }

    #[test]
    fn test_project_header_union_and_cells() {
        let documents = vec![
            doc! { "name": "ada", "age": 36_i32 },
            doc! { "name": "alan", "city": "London" },
        ];
        let (header, rows) = project(&documents);
        assert_eq!(header, vec!["name", "age", "city"]);
        assert_eq!(
            rows[0],
            vec![
                JsonValue::String("name=ada".into()),
                JsonValue::String("age=36".into()),
                JsonValue::Null,
            ]
        );
        assert_eq!(
            rows[1],
            vec![
                JsonValue::String("name=alan".into()),
                JsonValue::Null,
                JsonValue::String("city=London".into()),
            ]
        );
    }

    #[test]
    fn test_project_empty() {
        let (header, rows) = project(&[]);
        assert!(header.is_empty());
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_filter_before_connecting() {
        let desc = ConnectionDescriptor::new("mongodb://127.0.0.1:1/app", "", "");
        let err = execute(&desc, "users|not json", None, &EngineSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidFilter { .. }));
    }
}
