use std::{collections::BTreeMap, str::FromStr, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, errors::Error, services::lock, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Certificate,
    Payment,
    Transfer,
    AcademicLeave,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Certificate,
        DocumentKind::Payment,
        DocumentKind::Transfer,
        DocumentKind::AcademicLeave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Certificate => "certificate",
            DocumentKind::Payment => "payment",
            DocumentKind::Transfer => "transfer",
            DocumentKind::AcademicLeave => "academic_leave",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Certificate => "Enrollment certificate",
            DocumentKind::Payment => "Tuition payment",
            DocumentKind::Transfer => "Transfer",
            DocumentKind::AcademicLeave => "Academic leave",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::NotFound(format!("document type {s:?}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Completed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: u64,
    pub user_id: UserId,
    pub kind: DocumentKind,
    pub description: String,
    pub status: DocumentStatus,
    pub response: Option<String>,
    /// Messenger file id attached to the answer.
    pub response_file: Option<String>,
    pub response_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn create(&self, user_id: UserId, kind: DocumentKind, description: &str) -> Result<Document>;
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Document>>;
    async fn get(&self, id: u64) -> Result<Option<Document>>;
    async fn list(&self) -> Result<Vec<Document>>;
    /// Text or file answer; the request becomes `Completed`.
    async fn add_response(
        &self,
        id: u64,
        text: Option<&str>,
        file: Option<&str>,
        by: UserId,
    ) -> Result<Document>;
}

#[derive(Default)]
struct Documents {
    next_id: u64,
    by_id: BTreeMap<u64, Document>,
}

#[derive(Default)]
pub struct InMemoryDocumentService {
    inner: Mutex<Documents>,
}

impl InMemoryDocumentService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentService for InMemoryDocumentService {
    async fn create(&self, user_id: UserId, kind: DocumentKind, description: &str) -> Result<Document> {
        let mut inner = lock(&self.inner, "documents")?;
        inner.next_id += 1;
        let now = Utc::now();
        let doc = Document {
            id: inner.next_id,
            user_id,
            kind,
            description: description.to_string(),
            status: DocumentStatus::Pending,
            response: None,
            response_file: None,
            response_by: None,
            created_at: now,
            updated_at: now,
        };
        inner.by_id.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Document>> {
        Ok(lock(&self.inner, "documents")?
            .by_id
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: u64) -> Result<Option<Document>> {
        Ok(lock(&self.inner, "documents")?.by_id.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Ok(lock(&self.inner, "documents")?.by_id.values().cloned().collect())
    }

    async fn add_response(
        &self,
        id: u64,
        text: Option<&str>,
        file: Option<&str>,
        by: UserId,
    ) -> Result<Document> {
        if text.is_none() && file.is_none() {
            return Err(Error::Service("document answer needs text or a file".to_string()));
        }
        let mut inner = lock(&self.inner, "documents")?;
        let doc = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
        doc.response = text.map(str::to_string);
        doc.response_file = file.map(str::to_string);
        doc.response_by = Some(by);
        doc.status = DocumentStatus::Completed;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answering_completes_the_request() {
        let svc = InMemoryDocumentService::new();
        let d = svc
            .create(UserId(3), DocumentKind::Certificate, "for the bank")
            .await
            .unwrap();
        assert_eq!(d.status, DocumentStatus::Pending);

        let d = svc
            .add_response(d.id, None, Some("file-1"), UserId(9))
            .await
            .unwrap();
        assert_eq!(d.status, DocumentStatus::Completed);
        assert_eq!(d.response_file.as_deref(), Some("file-1"));
        assert_eq!(d.response, None);
    }

    #[tokio::test]
    async fn empty_answer_is_refused() {
        let svc = InMemoryDocumentService::new();
        let d = svc.create(UserId(3), DocumentKind::Payment, "").await.unwrap();
        assert!(svc.add_response(d.id, None, None, UserId(9)).await.is_err());
    }

    #[test]
    fn kinds_parse_from_payload_names() {
        assert_eq!(
            "academic_leave".parse::<DocumentKind>().unwrap(),
            DocumentKind::AcademicLeave
        );
        assert!("diploma".parse::<DocumentKind>().is_err());
    }
}
