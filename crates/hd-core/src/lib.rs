//! helpdesk/crates/hd-core/src/lib.rs
//!
//! The central domain types and interface definitions for the helpdesk.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use super::error::AppError;

    #[test]
    fn new_ticket_is_pending_with_prefixed_id() {
        let ticket = Ticket::new("Printer on fire", "Third floor", "alice@example.com");
        assert!(ticket.id.starts_with("ticket_"));
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.author_id, 0);
        assert_eq!(ticket.created_at, ticket.updated_at);
    }

    #[test]
    fn image_id_has_short_suffix() {
        let image = Image::new("ticket_x", "shot.png", "image/png", "aGVsbG8=");
        assert!(image.id.starts_with("img_"));
        assert_eq!(image.id.len(), "img_".len() + 8);
    }

    #[test]
    fn status_parses_lowercase_only() {
        assert_eq!("doing".parse::<TicketStatus>().unwrap(), TicketStatus::Doing);
        assert!(matches!("Doing".parse::<TicketStatus>(), Err(AppError::Validation(_))));
        assert!("conclued".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn status_display_matches_storage_form() {
        for status in TicketStatus::ALL {
            assert_eq!(status.to_string().parse::<TicketStatus>().unwrap(), status);
        }
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn master_passes_every_role_check() {
        let master = Identity { user_id: 1, email: "m@x.io".into(), role: Role::Master };
        let user = Identity { user_id: 2, email: "u@x.io".into(), role: Role::User };
        assert!(master.has_any_role(&[Role::Admin]));
        assert!(!user.has_any_role(&[Role::Admin]));
        assert!(user.has_any_role(&[Role::User, Role::Admin]));
        assert!(master.is_staff());
        assert!(!user.is_staff());
    }

    #[test]
    fn filter_date_accepts_only_canonical_form() {
        assert!(TicketFilter::parse_date("2024-03-01").is_ok());
        assert!(TicketFilter::parse_date("2024-13-01").is_err());
        assert!(TicketFilter::parse_date("01/03/2024").is_err());
        assert!(TicketFilter::parse_date("yesterday").is_err());
    }

    #[test]
    fn counters_pick_matching_bucket() {
        let c = Counters { pending: 3, doing: 2, concluded: 1, total: 6 };
        assert_eq!(c.for_status(TicketStatus::Doing), 2);
        assert_eq!(c.for_status(TicketStatus::Concluded), 1);
    }
}
