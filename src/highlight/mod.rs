//! Highlight HTTP API
//!
//! Routes for creating, reading and deleting highlights and for managing the
//! image generated for each one. Mounted under `/book/:book_id`; every route
//! requires a bearer token and operates on the caller's own books.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .nest("/book/:book_id", highlight::routes())
//!     .with_state(app_state);
//! ```

mod handler;
mod routes;

pub use routes::routes;
