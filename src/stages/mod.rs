pub mod detail;
pub mod listing;
pub mod search;

/// URL of a search result, visited by the detail stage.
pub type CandidateLink = String;
