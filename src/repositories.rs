use crate::models::{
    Author, Book, BookListing, CreateAuthorError, CreateAuthorRequest, CreateBookError,
    CreateBookRequest, FindAllAuthorsError, FindAuthorError, FindAuthorRequest,
    FindBooksByAuthorError, FindBooksByAuthorRequest, ListBooksError, ListBooksRequest,
};
use async_trait::async_trait;

#[async_trait]
pub trait AuthorRepository: Send + Sync + 'static {
    async fn create_author(&self, req: &CreateAuthorRequest) -> Result<Author, CreateAuthorError>;

    async fn find_author(&self, req: &FindAuthorRequest) -> Result<Author, FindAuthorError>;

    async fn find_all_authors(&self) -> Result<Vec<Author>, FindAllAuthorsError>;
}

#[async_trait]
pub trait BookRepository: Send + Sync + 'static {
    async fn create_book(&self, req: &CreateBookRequest) -> Result<Book, CreateBookError>;

    async fn list_books(&self, req: &ListBooksRequest) -> Result<BookListing, ListBooksError>;

    async fn find_books_by_author(
        &self,
        req: &FindBooksByAuthorRequest,
    ) -> Result<Vec<Book>, FindBooksByAuthorError>;
}
