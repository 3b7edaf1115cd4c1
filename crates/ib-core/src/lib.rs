//! interview-board/crates/ib-core/src/lib.rs
//!
//! The central domain types and interface definitions for Interview-Board.

pub mod error;
pub mod models;
pub mod query;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::NaiveDate;

    #[test]
    fn public_projection_never_carries_secrets() {
        let post = PublicPost {
            id: 7,
            title: "Onsite loop".to_string(),
            create_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            interview_date: NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
            company: "Acme".to_string(),
            position: "SRE".to_string(),
            body: None,
            votes_up: 0,
            votes_down: 0,
            views: 3,
        };

        let json = serde_json::to_value(&post).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(keys.contains(&"interviewDate"));
        assert!(!keys.iter().any(|k| k.contains("pin") || *k == "status"));
    }
}
