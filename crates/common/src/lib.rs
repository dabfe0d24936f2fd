//! Shared building blocks for the marketplace crates: logging setup,
//! response envelope types and pagination helpers.

pub mod types;
pub mod utils;
pub mod pagination;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_ok() {
        let h = types::Health { status: "ok" };
        assert_eq!(h.status, "ok");
    }

    #[test]
    fn envelope_serializes_success_message_and_data() {
        let body = types::ApiResponse::with_message("created", 7u32);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "created");
        assert_eq!(json["data"], 7);
    }
}
