use std::{collections::BTreeMap, fmt, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{domain::UserId, errors::Error, services::lock, Result};

pub const LOAN_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq)]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: String,
    pub isbn: String,
}

/// requested -> issued -> taken -> returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanStatus {
    /// Ordered by a reader, not yet prepared.
    Requested,
    /// Prepared at the desk, waiting for pickup.
    Issued,
    Taken,
    Returned,
}

impl LoanStatus {
    pub fn is_active(&self) -> bool {
        *self != LoanStatus::Returned
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Issued => "issued",
            LoanStatus::Taken => "taken",
            LoanStatus::Returned => "returned",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Loan {
    pub id: u64,
    pub user_id: UserId,
    pub book: Book,
    /// Reader's name at the time of the order.
    pub borrower: String,
    pub status: LoanStatus,
    pub requested_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub taken_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LibraryService: Send + Sync {
    /// Books without an active loan, by id.
    async fn available(&self) -> Result<Vec<Book>>;
    async fn book(&self, id: u64) -> Result<Option<Book>>;
    /// Fails with `Error::NotFound` for an unknown book and `Error::Service`
    /// when someone already holds it.
    async fn borrow(
        &self,
        user_id: UserId,
        borrower: &str,
        book_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Loan>;
    /// The reader's active loans.
    async fn loans_by_user(&self, user_id: UserId) -> Result<Vec<Loan>>;
    async fn active_loans(&self) -> Result<Vec<Loan>>;
    async fn issue(&self, user_id: UserId, book_id: u64, now: DateTime<Utc>) -> Result<Loan>;
    async fn mark_taken(&self, user_id: UserId, book_id: u64, now: DateTime<Utc>) -> Result<Loan>;
    async fn mark_returned(&self, user_id: UserId, book_id: u64) -> Result<Loan>;
}

#[derive(Default)]
struct Library {
    books: BTreeMap<u64, Book>,
    next_loan: u64,
    loans: BTreeMap<u64, Loan>,
}

impl Library {
    fn on_loan(&self, book_id: u64) -> bool {
        self.loans
            .values()
            .any(|l| l.book.id == book_id && l.status.is_active())
    }

    fn loan_in(&mut self, user_id: UserId, book_id: u64, status: LoanStatus) -> Result<&mut Loan> {
        self.loans
            .values_mut()
            .find(|l| l.user_id == user_id && l.book.id == book_id && l.status == status)
            .ok_or_else(|| Error::NotFound(format!("{status} loan of book {book_id} for user {}", user_id.0)))
    }
}

#[derive(Default)]
pub struct InMemoryLibraryService {
    inner: Mutex<Library>,
}

impl InMemoryLibraryService {
    pub fn new(books: Vec<Book>) -> Self {
        let inner = Library {
            books: books.into_iter().map(|b| (b.id, b)).collect(),
            ..Library::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A small catalogue for demo setups.
    pub fn seeded() -> Self {
        let book = |id, title: &str, author: &str, isbn: &str| Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            isbn: isbn.to_string(),
        };
        Self::new(vec![
            book(1, "Introduction to Algorithms", "Thomas Cormen", "978-0-262-04630-5"),
            book(2, "Clean Code", "Robert Martin", "978-0-13-235088-4"),
            book(3, "Structured Computer Organization", "Andrew Tanenbaum", "978-0-13-291652-3"),
            book(4, "Design Patterns", "Gang of Four", "978-0-201-63361-0"),
        ])
    }
}

#[async_trait]
impl LibraryService for InMemoryLibraryService {
    async fn available(&self) -> Result<Vec<Book>> {
        let inner = lock(&self.inner, "library")?;
        Ok(inner
            .books
            .values()
            .filter(|b| !inner.on_loan(b.id))
            .cloned()
            .collect())
    }

    async fn book(&self, id: u64) -> Result<Option<Book>> {
        Ok(lock(&self.inner, "library")?.books.get(&id).cloned())
    }

    async fn borrow(
        &self,
        user_id: UserId,
        borrower: &str,
        book_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Loan> {
        let mut inner = lock(&self.inner, "library")?;
        let book = inner
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("book {book_id}")))?;
        if inner.on_loan(book_id) {
            return Err(Error::Service(format!("\"{}\" is already taken", book.title)));
        }
        inner.next_loan += 1;
        let loan = Loan {
            id: inner.next_loan,
            user_id,
            book,
            borrower: borrower.to_string(),
            status: LoanStatus::Requested,
            requested_at: now,
            due_at: now + Duration::days(LOAN_DAYS),
            issued_at: None,
            taken_at: None,
        };
        inner.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn loans_by_user(&self, user_id: UserId) -> Result<Vec<Loan>> {
        Ok(lock(&self.inner, "library")?
            .loans
            .values()
            .filter(|l| l.user_id == user_id && l.status.is_active())
            .cloned()
            .collect())
    }

    async fn active_loans(&self) -> Result<Vec<Loan>> {
        Ok(lock(&self.inner, "library")?
            .loans
            .values()
            .filter(|l| l.status.is_active())
            .cloned()
            .collect())
    }

    async fn issue(&self, user_id: UserId, book_id: u64, now: DateTime<Utc>) -> Result<Loan> {
        let mut inner = lock(&self.inner, "library")?;
        let loan = inner.loan_in(user_id, book_id, LoanStatus::Requested)?;
        loan.status = LoanStatus::Issued;
        loan.issued_at = Some(now);
        Ok(loan.clone())
    }

    async fn mark_taken(&self, user_id: UserId, book_id: u64, now: DateTime<Utc>) -> Result<Loan> {
        let mut inner = lock(&self.inner, "library")?;
        let loan = inner.loan_in(user_id, book_id, LoanStatus::Issued)?;
        loan.status = LoanStatus::Taken;
        loan.taken_at = Some(now);
        Ok(loan.clone())
    }

    async fn mark_returned(&self, user_id: UserId, book_id: u64) -> Result<Loan> {
        let mut inner = lock(&self.inner, "library")?;
        let loan = inner.loan_in(user_id, book_id, LoanStatus::Taken)?;
        loan.status = LoanStatus::Returned;
        Ok(loan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn borrowed_book_leaves_the_shelf_until_returned() {
        let svc = InMemoryLibraryService::seeded();
        let now = Utc::now();
        let loan = svc.borrow(UserId(3), "Ann Lee", 2, now).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Requested);
        assert_eq!(loan.due_at, now + Duration::days(LOAN_DAYS));

        let ids: Vec<u64> = svc.available().await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(svc.borrow(UserId(4), "Bob", 2, now).await.is_err());

        svc.issue(UserId(3), 2, now).await.unwrap();
        svc.mark_taken(UserId(3), 2, now).await.unwrap();
        assert_eq!(svc.loans_by_user(UserId(3)).await.unwrap()[0].status, LoanStatus::Taken);

        let done = svc.mark_returned(UserId(3), 2).await.unwrap();
        assert_eq!(done.status, LoanStatus::Returned);
        assert!(svc.loans_by_user(UserId(3)).await.unwrap().is_empty());
        assert_eq!(svc.available().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn steps_cannot_be_skipped() {
        let svc = InMemoryLibraryService::seeded();
        let now = Utc::now();
        svc.borrow(UserId(3), "Ann Lee", 1, now).await.unwrap();
        assert!(matches!(
            svc.mark_taken(UserId(3), 1, now).await,
            Err(Error::NotFound(_))
        ));
        assert!(svc.mark_returned(UserId(3), 1).await.is_err());
        assert!(svc.issue(UserId(4), 1, now).await.is_err());
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let svc = InMemoryLibraryService::seeded();
        assert!(matches!(
            svc.borrow(UserId(3), "Ann", 99, Utc::now()).await,
            Err(Error::NotFound(_))
        ));
    }
}
