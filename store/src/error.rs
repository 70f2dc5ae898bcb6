/// Errors from the accounting store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("unsupported database url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("writer task gone")]
    WriterGone,
}
