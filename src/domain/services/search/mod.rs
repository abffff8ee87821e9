//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// The search service keeps a projection of posts built only from events, and answers
// term queries over it.
//
// | Component                | Description                                                |
// |--------------------------|------------------------------------------------------------|
// | SearchProjection         | Event handler for post.created / post.deleted              |
// | SearchService            | Cached term search over the projection                     |
//--------------------------------------------------------------------------------------------------

mod projection;
mod search_service;

pub use projection::SearchProjection;
pub use search_service::{DEFAULT_SEARCH_LIMIT, SearchService};
