use chrono::NaiveDate;
use thiserror::Error;

const COVER_URL_BASE: &str = "https://covers.openlibrary.org/b/isbn";
pub const DEFAULT_COVER_PATH: &str = "/static/default-cover.png";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorName(String);

impl AuthorName {
    pub fn new(raw: &str) -> Result<Self, AuthorNameEmptyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(AuthorNameEmptyError)
        } else {
            Ok(Self(trimmed.into()))
        }
    }

    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuthorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
#[error("Author name cannot be empty")]
pub struct AuthorNameEmptyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookTitle(String);

impl BookTitle {
    pub fn new(raw: &str) -> Result<Self, BookTitleEmptyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(BookTitleEmptyError)
        } else {
            Ok(Self(trimmed.into()))
        }
    }

    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BookTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
#[error("Book title cannot be empty")]
pub struct BookTitleEmptyError;

/// An ISBN as entered. Only presence is checked; neither the length nor the
/// checksum is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isbn(String);

impl Isbn {
    pub fn new(raw: &str) -> Result<Self, IsbnEmptyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(IsbnEmptyError)
        } else {
            Ok(Self(trimmed.into()))
        }
    }

    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Large cover image from the Open Library covers service, or the bundled
    /// placeholder when there is no ISBN to look up.
    pub fn cover_url(&self) -> String {
        if self.0.is_empty() {
            DEFAULT_COVER_PATH.to_string()
        } else {
            format!("{COVER_URL_BASE}/{}-L.jpg", self.0)
        }
    }
}

impl std::fmt::Display for Isbn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
#[error("ISBN cannot be empty")]
pub struct IsbnEmptyError;

#[derive(Error, Debug)]
#[error(r#"{field} "{value}" is not a valid date, expected YYYY-MM-DD"#)]
pub struct DateParseError {
    field: &'static str,
    value: String,
}

/// Parses a required `YYYY-MM-DD` date.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| DateParseError {
        field,
        value: trimmed.into(),
    })
}

/// Parses an optional `YYYY-MM-DD` date. Absent and blank input both mean none.
pub fn parse_optional_date(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<NaiveDate>, DateParseError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(field, value).map(Some),
    }
}

#[derive(Error, Debug)]
#[error(r#"Publication year "{0}" is not a valid year"#)]
pub struct PublicationYearError(String);

/// Form input sends an empty string when no year was entered.
pub fn parse_publication_year(raw: Option<&str>) -> Result<Option<i32>, PublicationYearError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i32>()
            .map(Some)
            .map_err(|_| PublicationYearError(value.into())),
    }
}

#[derive(Error, Debug)]
#[error(r#"Author id "{0}" is not a valid id"#)]
pub struct AuthorIdError(String);

pub fn parse_author_id(raw: &str) -> Result<i32, AuthorIdError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i32>()
        .map_err(|_| AuthorIdError(trimmed.into()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    id: i32,
    name: AuthorName,
    birth_date: NaiveDate,
    date_of_death: Option<NaiveDate>,
}

impl Author {
    pub const fn new(
        id: i32,
        name: AuthorName,
        birth_date: NaiveDate,
        date_of_death: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            name,
            birth_date,
            date_of_death,
        }
    }

    pub const fn id(&self) -> i32 {
        self.id
    }

    pub const fn name(&self) -> &AuthorName {
        &self.name
    }

    pub const fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub const fn date_of_death(&self) -> Option<NaiveDate> {
        self.date_of_death
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    id: i32,
    title: BookTitle,
    isbn: Isbn,
    publication_year: Option<i32>,
    author_id: i32,
}

impl Book {
    pub const fn new(
        id: i32,
        title: BookTitle,
        isbn: Isbn,
        publication_year: Option<i32>,
        author_id: i32,
    ) -> Self {
        Self {
            id,
            title,
            isbn,
            publication_year,
            author_id,
        }
    }

    pub const fn id(&self) -> i32 {
        self.id
    }

    pub const fn title(&self) -> &BookTitle {
        &self.title
    }

    pub const fn isbn(&self) -> &Isbn {
        &self.isbn
    }

    pub const fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    pub const fn author_id(&self) -> i32 {
        self.author_id
    }

    pub fn cover_url(&self) -> String {
        self.isbn.cover_url()
    }
}

/// A book together with the author it belongs to, as produced by the catalog
/// listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookWithAuthor {
    book: Book,
    author: Author,
}

impl BookWithAuthor {
    pub const fn new(book: Book, author: Author) -> Self {
        Self { book, author }
    }

    pub const fn book(&self) -> &Book {
        &self.book
    }

    pub const fn author(&self) -> &Author {
        &self.author
    }
}

#[derive(Debug)]
pub struct CreateAuthorRequest {
    name: AuthorName,
    birth_date: NaiveDate,
    date_of_death: Option<NaiveDate>,
}

impl CreateAuthorRequest {
    pub const fn new(
        name: AuthorName,
        birth_date: NaiveDate,
        date_of_death: Option<NaiveDate>,
    ) -> Self {
        Self {
            name,
            birth_date,
            date_of_death,
        }
    }

    pub const fn name(&self) -> &AuthorName {
        &self.name
    }

    pub const fn birth_date(&self) -> NaiveDate {
        self.birth_date
    }

    pub const fn date_of_death(&self) -> Option<NaiveDate> {
        self.date_of_death
    }
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct CreateAuthorError(#[from] pub anyhow::Error);

#[derive(Debug)]
pub struct FindAuthorRequest {
    id: i32,
}

impl FindAuthorRequest {
    pub const fn new(id: i32) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> i32 {
        self.id
    }
}

#[derive(Error, Debug)]
pub enum FindAuthorError {
    #[error("Author with id \"{id}\" does not exist")]
    NotFound { id: i32 },
    #[error(transparent)]
    Other(anyhow::Error),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct FindAllAuthorsError(#[from] pub anyhow::Error);

#[derive(Debug)]
pub struct CreateBookRequest {
    title: BookTitle,
    isbn: Isbn,
    publication_year: Option<i32>,
    author_id: i32,
}

impl CreateBookRequest {
    pub const fn new(
        title: BookTitle,
        isbn: Isbn,
        publication_year: Option<i32>,
        author_id: i32,
    ) -> Self {
        Self {
            title,
            isbn,
            publication_year,
            author_id,
        }
    }

    pub const fn title(&self) -> &BookTitle {
        &self.title
    }

    pub const fn isbn(&self) -> &Isbn {
        &self.isbn
    }

    pub const fn publication_year(&self) -> Option<i32> {
        self.publication_year
    }

    pub const fn author_id(&self) -> i32 {
        self.author_id
    }
}

#[derive(Error, Debug)]
pub enum CreateBookError {
    #[error("Book with ISBN \"{isbn}\" already exists")]
    DuplicateIsbn { isbn: String },
    #[error("Author with id \"{author_id}\" does not exist")]
    UnknownAuthor { author_id: i32 },
    #[error(transparent)]
    Other(anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Title,
    Author,
}

impl SortBy {
    /// Anything other than exactly `"author"` sorts by title.
    pub fn parse(raw: &str) -> Self {
        if raw == "author" {
            Self::Author
        } else {
            Self::Title
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
        }
    }
}

impl std::fmt::Display for SortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ListBooksRequest {
    sort_by: SortBy,
    search: String,
}

impl ListBooksRequest {
    pub fn new(sort_by: SortBy, search: &str) -> Self {
        Self {
            sort_by,
            search: search.into(),
        }
    }

    pub const fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// The text to filter on, if any. Whitespace is part of the match text.
    pub fn search_term(&self) -> Option<&str> {
        (!self.search.is_empty()).then_some(self.search.as_str())
    }
}

/// Books matching a listing query, along with the query itself so callers can
/// render it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookListing {
    books: Vec<BookWithAuthor>,
    sort_by: SortBy,
    search: String,
}

impl BookListing {
    pub const fn new(books: Vec<BookWithAuthor>, sort_by: SortBy, search: String) -> Self {
        Self {
            books,
            sort_by,
            search,
        }
    }

    pub fn books(&self) -> &[BookWithAuthor] {
        &self.books
    }

    pub const fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn search(&self) -> &str {
        &self.search
    }
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct ListBooksError(#[from] pub anyhow::Error);

#[derive(Debug)]
pub struct FindBooksByAuthorRequest {
    author_id: i32,
}

impl FindBooksByAuthorRequest {
    pub const fn new(author_id: i32) -> Self {
        Self { author_id }
    }

    pub const fn author_id(&self) -> i32 {
        self.author_id
    }
}

#[derive(Error, Debug)]
pub enum FindBooksByAuthorError {
    #[error("Author with id \"{author_id}\" does not exist")]
    AuthorNotFound { author_id: i32 },
    #[error(transparent)]
    Other(anyhow::Error),
}
