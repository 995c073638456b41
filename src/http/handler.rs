use crate::http::AppState;
use crate::models::{
    Author, AuthorIdError, AuthorName, AuthorNameEmptyError, Book, BookListing, BookTitle,
    BookTitleEmptyError, BookWithAuthor, CreateAuthorError, CreateAuthorRequest,
    CreateBookError, CreateBookRequest, DateParseError, FindAllAuthorsError, FindAuthorError,
    FindAuthorRequest, FindBooksByAuthorError, FindBooksByAuthorRequest, Isbn, IsbnEmptyError,
    ListBooksError, ListBooksRequest, PublicationYearError, SortBy, parse_author_id, parse_date,
    parse_optional_date, parse_publication_year,
};
use crate::repositories::{AuthorRepository, BookRepository};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug)]
pub struct ApiSuccess<T: Serialize>(StatusCode, Json<ApiResponse<T>>);

impl<T: Serialize> ApiSuccess<T> {
    pub const fn new(status: StatusCode, data: T) -> Self {
        Self(status, Json(ApiResponse::new(status, data)))
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> axum::response::Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    status_code: u16,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    const fn new(status: StatusCode, data: T) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    InternalServerError(String),
    Conflict(String),
    NotFound(String),
    UnprocessableEntity(String),
    Rejected(StatusCode, String),
}

impl ApiError {
    fn internal(cause: &anyhow::Error) -> Self {
        error!(error = ?cause, "Request failed");
        Self::InternalServerError("Internal server error".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg) = match self {
            Self::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Rejected(status, msg) => (status, msg),
        };
        (status, Json(ApiResponse::new(status, msg))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<ParseCreateAuthorHttpRequestError> for ApiError {
    fn from(err: ParseCreateAuthorHttpRequestError) -> Self {
        Self::UnprocessableEntity(err.to_string())
    }
}

impl From<ParseCreateBookHttpRequestError> for ApiError {
    fn from(err: ParseCreateBookHttpRequestError) -> Self {
        Self::UnprocessableEntity(err.to_string())
    }
}

impl From<CreateAuthorError> for ApiError {
    fn from(err: CreateAuthorError) -> Self {
        Self::internal(&err.0)
    }
}

impl From<CreateBookError> for ApiError {
    fn from(err: CreateBookError) -> Self {
        match err {
            CreateBookError::DuplicateIsbn { .. } => Self::Conflict(err.to_string()),
            CreateBookError::UnknownAuthor { .. } => Self::UnprocessableEntity(err.to_string()),
            CreateBookError::Other(cause) => Self::internal(&cause),
        }
    }
}

impl From<FindAuthorError> for ApiError {
    fn from(err: FindAuthorError) -> Self {
        match err {
            FindAuthorError::NotFound { .. } => Self::NotFound(err.to_string()),
            FindAuthorError::Other(cause) => Self::internal(&cause),
        }
    }
}

impl From<FindAllAuthorsError> for ApiError {
    fn from(err: FindAllAuthorsError) -> Self {
        Self::internal(&err.0)
    }
}

impl From<ListBooksError> for ApiError {
    fn from(err: ListBooksError) -> Self {
        Self::internal(&err.0)
    }
}

impl From<FindBooksByAuthorError> for ApiError {
    fn from(err: FindBooksByAuthorError) -> Self {
        match err {
            FindBooksByAuthorError::AuthorNotFound { .. } => Self::NotFound(err.to_string()),
            FindBooksByAuthorError::Other(cause) => Self::internal(&cause),
        }
    }
}

/// HTML forms post numbers as text, JSON clients as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    fn to_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthorHttpResponse {
    id: i32,
    name: String,
    birth_date: String,
    date_of_death: Option<String>,
}

impl From<&Author> for AuthorHttpResponse {
    fn from(value: &Author) -> Self {
        Self {
            id: value.id(),
            name: value.name().to_string(),
            birth_date: value.birth_date().to_string(),
            date_of_death: value.date_of_death().map(|date| date.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookHttpResponse {
    id: i32,
    title: String,
    isbn: String,
    publication_year: Option<i32>,
    author_id: i32,
    cover_url: String,
}

impl From<&Book> for BookHttpResponse {
    fn from(value: &Book) -> Self {
        Self {
            id: value.id(),
            title: value.title().to_string(),
            isbn: value.isbn().to_string(),
            publication_year: value.publication_year(),
            author_id: value.author_id(),
            cover_url: value.cover_url(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListedBookHttpResponse {
    #[serde(flatten)]
    book: BookHttpResponse,
    author: AuthorHttpResponse,
}

impl From<&BookWithAuthor> for ListedBookHttpResponse {
    fn from(value: &BookWithAuthor) -> Self {
        Self {
            book: value.book().into(),
            author: value.author().into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAuthorHttpRequest {
    name: String,
    birthdate: String,
    #[serde(default)]
    date_of_death: Option<String>,
}

#[derive(Error, Debug)]
pub enum ParseCreateAuthorHttpRequestError {
    #[error(transparent)]
    Name(#[from] AuthorNameEmptyError),
    #[error(transparent)]
    Date(#[from] DateParseError),
}

impl TryFrom<CreateAuthorHttpRequest> for CreateAuthorRequest {
    type Error = ParseCreateAuthorHttpRequestError;

    fn try_from(value: CreateAuthorHttpRequest) -> Result<Self, Self::Error> {
        let name = AuthorName::new(&value.name)?;
        let birth_date = parse_date("birthdate", &value.birthdate)?;
        let date_of_death = parse_optional_date("date_of_death", value.date_of_death.as_deref())?;
        Ok(Self::new(name, birth_date, date_of_death))
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAuthorHttpResponse {
    message: String,
    author: AuthorHttpResponse,
}

impl From<Author> for CreateAuthorHttpResponse {
    fn from(value: Author) -> Self {
        Self {
            message: format!("Author '{}' was successfully added!", value.name()),
            author: (&value).into(),
        }
    }
}

pub async fn create_author<AR: AuthorRepository>(
    State(state): State<AppState<AR>>,
    body: Result<Json<CreateAuthorHttpRequest>, JsonRejection>,
) -> Result<ApiSuccess<CreateAuthorHttpResponse>, ApiError> {
    let Json(body) = body?;
    let req = body.try_into()?;
    state
        .repo
        .create_author(&req)
        .await
        .map_err(ApiError::from)
        .map(|author| ApiSuccess::new(StatusCode::CREATED, author.into()))
}

pub async fn list_authors<AR: AuthorRepository>(
    State(state): State<AppState<AR>>,
) -> Result<ApiSuccess<Vec<AuthorHttpResponse>>, ApiError> {
    let authors = state.repo.find_all_authors().await?;
    let data = authors.iter().map(AuthorHttpResponse::from).collect();
    Ok(ApiSuccess::new(StatusCode::OK, data))
}

pub async fn find_author<AR: AuthorRepository>(
    State(state): State<AppState<AR>>,
    Path(id): Path<i32>,
) -> Result<ApiSuccess<AuthorHttpResponse>, ApiError> {
    let author = state.repo.find_author(&FindAuthorRequest::new(id)).await?;
    Ok(ApiSuccess::new(StatusCode::OK, (&author).into()))
}

pub async fn list_author_books<BR: BookRepository>(
    State(state): State<AppState<BR>>,
    Path(id): Path<i32>,
) -> Result<ApiSuccess<Vec<BookHttpResponse>>, ApiError> {
    let books = state
        .repo
        .find_books_by_author(&FindBooksByAuthorRequest::new(id))
        .await?;
    let data = books.iter().map(BookHttpResponse::from).collect();
    Ok(ApiSuccess::new(StatusCode::OK, data))
}

#[derive(Debug, Deserialize)]
pub struct CreateBookHttpRequest {
    title: String,
    isbn: String,
    #[serde(default)]
    publication_year: Option<NumberOrText>,
    author_id: NumberOrText,
}

#[derive(Error, Debug)]
pub enum ParseCreateBookHttpRequestError {
    #[error(transparent)]
    Title(#[from] BookTitleEmptyError),
    #[error(transparent)]
    Isbn(#[from] IsbnEmptyError),
    #[error(transparent)]
    PublicationYear(#[from] PublicationYearError),
    #[error(transparent)]
    AuthorId(#[from] AuthorIdError),
}

impl TryFrom<CreateBookHttpRequest> for CreateBookRequest {
    type Error = ParseCreateBookHttpRequestError;

    fn try_from(value: CreateBookHttpRequest) -> Result<Self, Self::Error> {
        let title = BookTitle::new(&value.title)?;
        let isbn = Isbn::new(&value.isbn)?;
        let publication_year =
            parse_publication_year(value.publication_year.map(|y| y.to_text()).as_deref())?;
        let author_id = parse_author_id(&value.author_id.to_text())?;
        Ok(Self::new(title, isbn, publication_year, author_id))
    }
}

#[derive(Debug, Serialize)]
pub struct CreateBookHttpResponse {
    message: String,
    book: BookHttpResponse,
}

impl From<Book> for CreateBookHttpResponse {
    fn from(value: Book) -> Self {
        Self {
            message: format!("Book '{}' was successfully added!", value.title()),
            book: (&value).into(),
        }
    }
}

pub async fn create_book<BR: BookRepository>(
    State(state): State<AppState<BR>>,
    body: Result<Json<CreateBookHttpRequest>, JsonRejection>,
) -> Result<ApiSuccess<CreateBookHttpResponse>, ApiError> {
    let Json(body) = body?;
    let req = body.try_into()?;
    state
        .repo
        .create_book(&req)
        .await
        .map_err(ApiError::from)
        .map(|book| ApiSuccess::new(StatusCode::CREATED, book.into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBooksHttpQuery {
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    search: Option<String>,
}

impl From<ListBooksHttpQuery> for ListBooksRequest {
    fn from(value: ListBooksHttpQuery) -> Self {
        let sort_by = value
            .sort_by
            .as_deref()
            .map(SortBy::parse)
            .unwrap_or_default();
        Self::new(sort_by, value.search.as_deref().unwrap_or_default())
    }
}

/// `sort_by` echoes what the caller sent, `sorted_by` is the order applied.
#[derive(Debug, Serialize)]
pub struct BookListingHttpResponse {
    sort_by: String,
    sorted_by: String,
    search: String,
    books: Vec<ListedBookHttpResponse>,
}

impl BookListingHttpResponse {
    fn new(sort_by: String, value: &BookListing) -> Self {
        Self {
            sort_by,
            sorted_by: value.sort_by().to_string(),
            search: value.search().to_string(),
            books: value
                .books()
                .iter()
                .map(ListedBookHttpResponse::from)
                .collect(),
        }
    }
}

pub async fn list_books<BR: BookRepository>(
    State(state): State<AppState<BR>>,
    Query(query): Query<ListBooksHttpQuery>,
) -> Result<ApiSuccess<BookListingHttpResponse>, ApiError> {
    let sort_by = query
        .sort_by
        .clone()
        .unwrap_or_else(|| SortBy::default().to_string());
    let req = query.into();
    let listing = state.repo.list_books(&req).await?;
    Ok(ApiSuccess::new(
        StatusCode::OK,
        BookListingHttpResponse::new(sort_by, &listing),
    ))
}
