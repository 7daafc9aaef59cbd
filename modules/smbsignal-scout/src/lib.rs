pub mod acquire;
pub mod credibility;
pub mod extraction;
pub mod feedback;
pub mod keywords;
pub mod pacing;
pub mod query_gen;
pub mod response_json;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod verify;
pub mod workflows;
