pub mod method;
pub mod request;
pub mod response;

pub use method::Method;
pub use request::{canonicalize_path, ChunkState, HttpRequest, ParsingState};
pub use response::{status_text, HttpResponse};
