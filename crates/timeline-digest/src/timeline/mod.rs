//! Timeline reading: data types, page parsing and the scroll loop.

mod fetcher;
pub(crate) mod parser;
mod types;

pub use fetcher::{FetchConfig, ScrollLoop, ScrollState, StopReason, TimelineFetcher, TimelineSource};
pub use parser::{parse_status_path, PageSnapshot, PageState, ParsedPost, TimelineParser};
pub use types::{AcceptedPost, Account, RawPost};
