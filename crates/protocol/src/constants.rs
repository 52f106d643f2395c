//! Limits and field names enforced at the API boundary.

/// Chunk size the server recommends to clients: 1 MiB.
pub const RECOMMENDED_CHUNK_SIZE: u64 = 1024 * 1024;

/// Largest chunk payload accepted in one request: 2 MiB.
pub const MAX_CHUNK_BYTES: u64 = 2 * 1024 * 1024;

/// Upper bound for `total_chunks` at initialization.
pub const MAX_TOTAL_CHUNKS: u32 = 10_000;

/// Upper bound for `file_size` at initialization: 5 GiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Longest accepted client filename, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Multipart field carrying the zero-based chunk index.
pub const FIELD_CHUNK_INDEX: &str = "chunk_index";

/// Multipart field carrying the chunk bytes.
pub const FIELD_CHUNK: &str = "chunk";

/// Header the HTTP layer reads the resolved uploader identity from.
pub const USER_ID_HEADER: &str = "x-user-id";
