mod app;
mod compare;

pub use app::{add_routes, AppState, CompareSettings};
pub use compare::{
    format_similarity, CompareError, CompareResponse, ErrorResponse, MatchResponse,
    NoMatchResponse,
};
