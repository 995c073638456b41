use crate::models::{
    Author, AuthorName, Book, BookListing, BookTitle, BookWithAuthor, CreateAuthorError,
    CreateAuthorRequest, CreateBookError, CreateBookRequest, FindAllAuthorsError, FindAuthorError,
    FindAuthorRequest, FindBooksByAuthorError, FindBooksByAuthorRequest, Isbn, ListBooksError,
    ListBooksRequest, SortBy,
};
use crate::repositories::{AuthorRepository, BookRepository};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{FromRow, Row, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!();

const SELECT_BOOKS_WITH_AUTHOR: &str = "SELECT b.id AS book_id, b.title, b.isbn, \
     b.publication_year, b.author_id, a.name AS author_name, \
     a.birth_date AS author_birth_date, a.date_of_death AS author_date_of_death \
     FROM books b JOIN authors a ON a.id = b.author_id";

/// SQLite-backed storage for the catalog. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct Sqlite {
    pool: SqlitePool,
}

impl Sqlite {
    /// Opens the database at `url`, creating the file if needed, and applies
    /// the catalog schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database path {url}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(opts)
            .await
            .with_context(|| format!("Failed to open database at {url}"))?;

        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to apply catalog schema")?;

        info!(url, "Opened catalog database");
        Ok(Self { pool })
    }

    /// Waits for checked-out connections to be returned, then closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed catalog database");
    }
}

impl<'r> FromRow<'r, SqliteRow> for Author {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let name: &str = row.try_get("name")?;
        let birth_date = row.try_get("birth_date")?;
        let date_of_death = row.try_get("date_of_death")?;

        let name = AuthorName::new_unchecked(name);
        Ok(Self::new(id, name, birth_date, date_of_death))
    }
}

impl<'r> FromRow<'r, SqliteRow> for Book {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let title: &str = row.try_get("title")?;
        let isbn: &str = row.try_get("isbn")?;
        let publication_year = row.try_get("publication_year")?;
        let author_id = row.try_get("author_id")?;

        let title = BookTitle::new_unchecked(title);
        let isbn = Isbn::new_unchecked(isbn);
        Ok(Self::new(id, title, isbn, publication_year, author_id))
    }
}

impl<'r> FromRow<'r, SqliteRow> for BookWithAuthor {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let book_id = row.try_get("book_id")?;
        let title: &str = row.try_get("title")?;
        let isbn: &str = row.try_get("isbn")?;
        let publication_year = row.try_get("publication_year")?;
        let author_id = row.try_get("author_id")?;
        let author_name: &str = row.try_get("author_name")?;
        let birth_date: NaiveDate = row.try_get("author_birth_date")?;
        let date_of_death: Option<NaiveDate> = row.try_get("author_date_of_death")?;

        let book = Book::new(
            book_id,
            BookTitle::new_unchecked(title),
            Isbn::new_unchecked(isbn),
            publication_year,
            author_id,
        );
        let author = Author::new(
            author_id,
            AuthorName::new_unchecked(author_name),
            birth_date,
            date_of_death,
        );
        Ok(Self::new(book, author))
    }
}

#[async_trait]
impl AuthorRepository for Sqlite {
    async fn create_author(&self, req: &CreateAuthorRequest) -> Result<Author, CreateAuthorError> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            CreateAuthorError(anyhow!(err).context("Failed to begin transaction"))
        })?;

        let inserted = sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name, birth_date, date_of_death) VALUES (?, ?, ?) \
             RETURNING id, name, birth_date, date_of_death",
        )
        .bind(req.name().as_str())
        .bind(req.birth_date())
        .bind(req.date_of_death())
        .fetch_one(&mut *tx)
        .await;

        let author = match inserted {
            Ok(author) => author,
            Err(err) => {
                rollback(tx).await;
                let err = anyhow!(err).context(format!(
                    r#"Failed to create author with name "{}""#,
                    req.name()
                ));
                return Err(CreateAuthorError(err));
            }
        };

        tx.commit().await.map_err(|err| {
            CreateAuthorError(anyhow!(err).context(format!(
                r#"Failed to commit author with name "{}""#,
                req.name()
            )))
        })?;

        info!(id = author.id(), name = %author.name(), "Created author");
        Ok(author)
    }

    async fn find_author(&self, req: &FindAuthorRequest) -> Result<Author, FindAuthorError> {
        let author =
            sqlx::query_as("SELECT id, name, birth_date, date_of_death FROM authors WHERE id = ?")
                .bind(req.id())
                .fetch_one(&self.pool)
                .await
                .map_err(|err| {
                    if matches!(err, sqlx::Error::RowNotFound) {
                        FindAuthorError::NotFound { id: req.id() }
                    } else {
                        let err = anyhow!(err).context(format!(
                            r#"Failed to retrieve author with id "{}""#,
                            req.id()
                        ));
                        FindAuthorError::Other(err)
                    }
                })?;

        Ok(author)
    }

    async fn find_all_authors(&self) -> Result<Vec<Author>, FindAllAuthorsError> {
        let authors =
            sqlx::query_as("SELECT id, name, birth_date, date_of_death FROM authors ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|err| {
                    let err = anyhow!(err).context("Failed to retrieve all authors");
                    FindAllAuthorsError(err)
                })?;

        Ok(authors)
    }
}

#[async_trait]
impl BookRepository for Sqlite {
    async fn create_book(&self, req: &CreateBookRequest) -> Result<Book, CreateBookError> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            CreateBookError::Other(anyhow!(err).context("Failed to begin transaction"))
        })?;

        let inserted = sqlx::query_as::<_, Book>(
            "INSERT INTO books (title, isbn, publication_year, author_id) VALUES (?, ?, ?, ?) \
             RETURNING id, title, isbn, publication_year, author_id",
        )
        .bind(req.title().as_str())
        .bind(req.isbn().as_str())
        .bind(req.publication_year())
        .bind(req.author_id())
        .fetch_one(&mut *tx)
        .await;

        let book = match inserted {
            Ok(book) => book,
            Err(err) => {
                rollback(tx).await;
                return Err(if is_unique_violation(&err) {
                    CreateBookError::DuplicateIsbn {
                        isbn: req.isbn().to_string(),
                    }
                } else if is_foreign_key_violation(&err) {
                    CreateBookError::UnknownAuthor {
                        author_id: req.author_id(),
                    }
                } else {
                    let err = anyhow!(err).context(format!(
                        r#"Failed to create book with title "{}""#,
                        req.title()
                    ));
                    CreateBookError::Other(err)
                });
            }
        };

        tx.commit().await.map_err(|err| {
            CreateBookError::Other(anyhow!(err).context(format!(
                r#"Failed to commit book with title "{}""#,
                req.title()
            )))
        })?;

        info!(id = book.id(), title = %book.title(), "Created book");
        Ok(book)
    }

    async fn list_books(&self, req: &ListBooksRequest) -> Result<BookListing, ListBooksError> {
        let search = req.search_term();

        let mut query = String::from(SELECT_BOOKS_WITH_AUTHOR);
        if search.is_some() {
            // lower() only folds ASCII letters
            query.push_str(
                " WHERE instr(lower(b.title), lower(?)) > 0 OR instr(lower(a.name), lower(?)) > 0",
            );
        }
        query.push_str(match req.sort_by() {
            SortBy::Title => " ORDER BY b.title ASC, b.id ASC",
            SortBy::Author => " ORDER BY a.name ASC, b.id ASC",
        });

        let mut query = sqlx::query_as::<_, BookWithAuthor>(&query);
        if let Some(term) = search {
            query = query.bind(term).bind(term);
        }

        let books = query.fetch_all(&self.pool).await.map_err(|err| {
            let err = anyhow!(err).context(format!(
                r#"Failed to list books sorted by {} matching "{}""#,
                req.sort_by(),
                req.search()
            ));
            ListBooksError(err)
        })?;

        debug!(
            sort_by = %req.sort_by(),
            search = req.search(),
            count = books.len(),
            "Listed books"
        );
        Ok(BookListing::new(
            books,
            req.sort_by(),
            req.search().to_string(),
        ))
    }

    async fn find_books_by_author(
        &self,
        req: &FindBooksByAuthorRequest,
    ) -> Result<Vec<Book>, FindBooksByAuthorError> {
        self.find_author(&FindAuthorRequest::new(req.author_id()))
            .await
            .map_err(|err| match err {
                FindAuthorError::NotFound { id } => {
                    FindBooksByAuthorError::AuthorNotFound { author_id: id }
                }
                FindAuthorError::Other(err) => FindBooksByAuthorError::Other(err),
            })?;

        let books = sqlx::query_as(
            "SELECT id, title, isbn, publication_year, author_id FROM books \
             WHERE author_id = ? ORDER BY id",
        )
        .bind(req.author_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| {
            let err = anyhow!(err).context(format!(
                r#"Failed to retrieve books of author with id "{}""#,
                req.author_id()
            ));
            FindBooksByAuthorError::Other(err)
        })?;

        Ok(books)
    }
}

async fn rollback(tx: Transaction<'_, sqlx::Sqlite>) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "Failed to roll back transaction");
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.is_unique_violation();
    }

    false
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.is_foreign_key_violation();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_COVER_PATH, parse_date, parse_optional_date};
    use tempfile::TempDir;

    async fn create_tmp_store() -> (Sqlite, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("test.db");
        let store = Sqlite::new(&format!("sqlite://{}", temp_file_path.display()))
            .await
            .unwrap();
        (store, temp_dir)
    }

    async fn add_author(store: &Sqlite, name: &str, birth_date: &str) -> Author {
        let req = CreateAuthorRequest::new(
            AuthorName::new(name).unwrap(),
            parse_date("birthdate", birth_date).unwrap(),
            None,
        );
        store.create_author(&req).await.unwrap()
    }

    async fn add_book(store: &Sqlite, title: &str, isbn: &str, author_id: i32) -> Book {
        let req = CreateBookRequest::new(
            BookTitle::new(title).unwrap(),
            Isbn::new(isbn).unwrap(),
            None,
            author_id,
        );
        store.create_book(&req).await.unwrap()
    }

    async fn count_books(store: &Sqlite) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    /// Orwell's two books plus one unrelated book by Austen.
    async fn seed_catalog(store: &Sqlite) -> (Author, Author) {
        let orwell = add_author(store, "George Orwell", "1903-06-25").await;
        let austen = add_author(store, "Jane Austen", "1775-12-16").await;
        add_book(store, "Animal Farm", "9780451526342", orwell.id()).await;
        add_book(store, "Pride and Prejudice", "9780141199078", austen.id()).await;
        add_book(store, "1984", "9780451524935", orwell.id()).await;
        (orwell, austen)
    }

    fn titles(listing: &BookListing) -> Vec<&str> {
        listing
            .books()
            .iter()
            .map(|entry| entry.book().title().as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_create_author() {
        let (store, _temp_dir) = create_tmp_store().await;

        let req = CreateAuthorRequest::new(
            AuthorName::new("George Orwell").unwrap(),
            parse_date("birthdate", "1903-06-25").unwrap(),
            parse_optional_date("date_of_death", Some("1950-01-21")).unwrap(),
        );
        let orwell = store.create_author(&req).await.unwrap();
        assert_eq!(orwell.name().as_str(), "George Orwell");
        assert_eq!(orwell.birth_date(), NaiveDate::from_ymd_opt(1903, 6, 25).unwrap());
        assert_eq!(orwell.date_of_death(), NaiveDate::from_ymd_opt(1950, 1, 21));

        let austen = add_author(&store, "Jane Austen", "1775-12-16").await;
        assert_ne!(orwell.id(), austen.id());
        assert_eq!(austen.date_of_death(), None);

        let found = store
            .find_author(&FindAuthorRequest::new(orwell.id()))
            .await
            .unwrap();
        assert_eq!(found, orwell);
    }

    #[tokio::test]
    async fn test_find_missing_author() {
        let (store, _temp_dir) = create_tmp_store().await;

        let result = store.find_author(&FindAuthorRequest::new(42)).await;
        assert!(matches!(result, Err(FindAuthorError::NotFound { id: 42 })));
    }

    #[tokio::test]
    async fn lists_authors_in_insertion_order() {
        let (store, _temp_dir) = create_tmp_store().await;

        assert!(store.find_all_authors().await.unwrap().is_empty());

        let twain = add_author(&store, "Mark Twain", "1835-11-30").await;
        let austen = add_author(&store, "Jane Austen", "1775-12-16").await;

        let authors = store.find_all_authors().await.unwrap();
        assert_eq!(authors, vec![twain, austen]);
    }

    #[tokio::test]
    async fn test_create_book() {
        let (store, _temp_dir) = create_tmp_store().await;
        let orwell = add_author(&store, "George Orwell", "1903-06-25").await;

        let req = CreateBookRequest::new(
            BookTitle::new("1984").unwrap(),
            Isbn::new("9780451524935").unwrap(),
            Some(1949),
            orwell.id(),
        );
        let book = store.create_book(&req).await.unwrap();
        assert_eq!(book.title().as_str(), "1984");
        assert_eq!(book.publication_year(), Some(1949));
        assert_eq!(book.author_id(), orwell.id());
        assert_eq!(
            book.cover_url(),
            "https://covers.openlibrary.org/b/isbn/9780451524935-L.jpg"
        );
    }

    #[tokio::test]
    async fn test_duplicate_isbn_is_rolled_back() {
        let (store, _temp_dir) = create_tmp_store().await;
        let orwell = add_author(&store, "George Orwell", "1903-06-25").await;
        add_book(&store, "1984", "9780451524935", orwell.id()).await;
        assert_eq!(count_books(&store).await, 1);

        let req = CreateBookRequest::new(
            BookTitle::new("Nineteen Eighty-Four").unwrap(),
            Isbn::new("9780451524935").unwrap(),
            None,
            orwell.id(),
        );
        let result = store.create_book(&req).await;
        assert!(
            matches!(result, Err(CreateBookError::DuplicateIsbn { ref isbn }) if isbn == "9780451524935")
        );
        assert_eq!(count_books(&store).await, 1);
    }

    #[tokio::test]
    async fn test_cannot_create_book_without_author() {
        let (store, _temp_dir) = create_tmp_store().await;

        let req = CreateBookRequest::new(
            BookTitle::new("Orphan").unwrap(),
            Isbn::new("0000000000000").unwrap(),
            None,
            7,
        );
        let result = store.create_book(&req).await;
        assert!(matches!(
            result,
            Err(CreateBookError::UnknownAuthor { author_id: 7 })
        ));
        assert_eq!(count_books(&store).await, 0);
    }

    #[tokio::test]
    async fn lists_books_by_title_by_default() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;

        let listing = store
            .list_books(&ListBooksRequest::default())
            .await
            .unwrap();
        assert_eq!(
            titles(&listing),
            vec!["1984", "Animal Farm", "Pride and Prejudice"]
        );
        assert_eq!(listing.sort_by(), SortBy::Title);
        assert_eq!(listing.search(), "");
    }

    #[tokio::test]
    async fn lists_books_by_author_name() {
        let (store, _temp_dir) = create_tmp_store().await;
        let (orwell, austen) = seed_catalog(&store).await;

        let listing = store
            .list_books(&ListBooksRequest::new(SortBy::Author, ""))
            .await
            .unwrap();

        let authors: Vec<&Author> = listing.books().iter().map(|entry| entry.author()).collect();
        assert_eq!(authors, vec![&orwell, &orwell, &austen]);
        // same author keeps insertion order
        assert_eq!(
            titles(&listing),
            vec!["Animal Farm", "1984", "Pride and Prejudice"]
        );
    }

    #[tokio::test]
    async fn search_matches_author_name_ignoring_case() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;

        let listing = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "orwell"))
            .await
            .unwrap();
        assert_eq!(titles(&listing), vec!["1984", "Animal Farm"]);
        assert_eq!(listing.search(), "orwell");
    }

    #[tokio::test]
    async fn search_matches_title_or_author() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;
        let dickens = add_author(&store, "Charles Dickens", "1812-02-07").await;
        add_book(&store, "A Tale of Two Cities", "9780486406510", dickens.id()).await;

        let by_title = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "PRIDE"))
            .await
            .unwrap();
        assert_eq!(titles(&by_title), vec!["Pride and Prejudice"]);

        let by_author = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "dick"))
            .await
            .unwrap();
        assert_eq!(titles(&by_author), vec!["A Tale of Two Cities"]);

        let either = store
            .list_books(&ListBooksRequest::new(SortBy::Author, "an"))
            .await
            .unwrap();
        assert_eq!(titles(&either), vec!["Animal Farm", "Pride and Prejudice"]);

        let none = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "tolkien"))
            .await
            .unwrap();
        assert!(none.books().is_empty());
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;

        let listing = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "%"))
            .await
            .unwrap();
        assert!(listing.books().is_empty());
    }

    #[tokio::test]
    async fn search_keeps_surrounding_whitespace() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;
        let plato = add_author(&store, "Plato", "0427-01-01").await;
        add_book(&store, "Republic", "9780872201361", plato.id()).await;

        let spaced = store
            .list_books(&ListBooksRequest::new(SortBy::Title, " "))
            .await
            .unwrap();
        assert_eq!(
            titles(&spaced),
            vec!["1984", "Animal Farm", "Pride and Prejudice"]
        );
        assert_eq!(spaced.search(), " ");

        let trailing = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "Republic "))
            .await
            .unwrap();
        assert!(trailing.books().is_empty());

        let inner = store
            .list_books(&ListBooksRequest::new(SortBy::Title, "animal "))
            .await
            .unwrap();
        assert_eq!(titles(&inner), vec!["Animal Farm"]);
    }

    #[tokio::test]
    async fn only_exact_author_sorts_by_author() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;
        let plato = add_author(&store, "Plato", "0427-01-01").await;
        add_book(&store, "Republic", "9780872201361", plato.id()).await;

        let by_author = store
            .list_books(&ListBooksRequest::new(SortBy::parse("author"), ""))
            .await
            .unwrap();
        assert_eq!(
            titles(&by_author),
            vec!["Animal Farm", "1984", "Pride and Prejudice", "Republic"]
        );

        let capitalized = store
            .list_books(&ListBooksRequest::new(SortBy::parse("Author"), ""))
            .await
            .unwrap();
        assert_eq!(
            titles(&capitalized),
            vec!["1984", "Animal Farm", "Pride and Prejudice", "Republic"]
        );
    }

    #[tokio::test]
    async fn stored_book_without_isbn_uses_default_cover() {
        let (store, _temp_dir) = create_tmp_store().await;
        let orwell = add_author(&store, "George Orwell", "1903-06-25").await;

        let req = CreateBookRequest::new(
            BookTitle::new("Untitled Draft").unwrap(),
            Isbn::new_unchecked(""),
            None,
            orwell.id(),
        );
        let created = store.create_book(&req).await.unwrap();
        assert_eq!(created.cover_url(), DEFAULT_COVER_PATH);

        let listing = store
            .list_books(&ListBooksRequest::default())
            .await
            .unwrap();
        assert_eq!(listing.books().len(), 1);
        let stored = listing.books()[0].book();
        assert_eq!(stored.isbn().as_str(), "");
        assert_eq!(stored.cover_url(), DEFAULT_COVER_PATH);
    }

    #[tokio::test]
    async fn listing_is_repeatable() {
        let (store, _temp_dir) = create_tmp_store().await;
        seed_catalog(&store).await;

        let req = ListBooksRequest::new(SortBy::Author, "a");
        let first = store.list_books(&req).await.unwrap();
        let second = store.list_books(&req).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn finds_books_by_author() {
        let (store, _temp_dir) = create_tmp_store().await;
        let (orwell, austen) = seed_catalog(&store).await;
        let twain = add_author(&store, "Mark Twain", "1835-11-30").await;

        let books = store
            .find_books_by_author(&FindBooksByAuthorRequest::new(orwell.id()))
            .await
            .unwrap();
        let titles: Vec<&str> = books.iter().map(|book| book.title().as_str()).collect();
        assert_eq!(titles, vec!["Animal Farm", "1984"]);

        let books = store
            .find_books_by_author(&FindBooksByAuthorRequest::new(austen.id()))
            .await
            .unwrap();
        assert_eq!(books.len(), 1);

        let books = store
            .find_books_by_author(&FindBooksByAuthorRequest::new(twain.id()))
            .await
            .unwrap();
        assert!(books.is_empty());

        let result = store
            .find_books_by_author(&FindBooksByAuthorRequest::new(99))
            .await;
        assert!(matches!(
            result,
            Err(FindBooksByAuthorError::AuthorNotFound { author_id: 99 })
        ));
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", temp_dir.path().join("test.db").display());

        let store = Sqlite::new(&url).await.unwrap();
        let orwell = add_author(&store, "George Orwell", "1903-06-25").await;
        store.close().await;

        let store = Sqlite::new(&url).await.unwrap();
        let authors = store.find_all_authors().await.unwrap();
        assert_eq!(authors, vec![orwell]);
    }
}
