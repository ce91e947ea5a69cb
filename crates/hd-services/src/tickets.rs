use std::sync::Arc;

use hd_core::error::{AppError, Result};
use hd_core::models::{
    Counters, Identity, Image, Ticket, TicketDetails, TicketFilter, TicketHistory, TicketStatus, TicketSummary,
};
use hd_core::traits::TicketRepo;

use crate::policy::{check_image, require_non_empty};

/// Image payload as submitted with a new ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub name: String,
    pub content_type: String,
    pub content_base64: String,
}

/// Raw listing criteria as they arrive from a query string. Empty means "no filter".
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    pub author: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub name: Option<String>,
}

impl TicketQuery {
    pub fn into_filter(self) -> Result<TicketFilter> {
        fn present(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        Ok(TicketFilter {
            author_email: present(self.author),
            status: present(self.status).map(|s| s.parse::<TicketStatus>()).transpose()?,
            created_since: present(self.date).map(|d| TicketFilter::parse_date(&d)).transpose()?,
            name: present(self.name),
        })
    }
}

pub struct TicketService {
    tickets: Arc<dyn TicketRepo>,
}

impl TicketService {
    pub fn new(tickets: Arc<dyn TicketRepo>) -> Self {
        Self { tickets }
    }

    /// Opens a `pending` ticket for `author` and counts it.
    pub async fn create(
        &self,
        author: &Identity,
        name: &str,
        explanation: &str,
        images: Vec<NewImage>,
    ) -> Result<Ticket> {
        require_non_empty("ticket_name", name)?;
        require_non_empty("ticket_explain", explanation)?;
        for image in &images {
            check_image(&image.name, &image.content_type, &image.content_base64)?;
        }

        let ticket = Ticket::new(name.trim(), explanation.trim(), author.email.clone());
        let images = images
            .into_iter()
            .map(|img| Image::new(ticket.id.clone(), img.name, img.content_type, img.content_base64))
            .collect();

        let created = self.tickets.create_ticket(ticket, images).await?;
        self.tickets.count_ticket(TicketStatus::Pending).await?;

        tracing::info!(ticket_id = %created.id, author = %created.author_email, "ticket created");
        Ok(created)
    }

    /// Owners may remove their own tickets; staff may remove any.
    pub async fn remove(&self, caller: &Identity, ticket_id: &str) -> Result<()> {
        require_non_empty("ticket_id", ticket_id)?;
        let ticket = self.tickets.get_ticket(ticket_id).await?;
        if !caller.is_staff() && ticket.author_email != caller.email {
            return Err(AppError::Forbidden("only the author or staff may remove this ticket".into()));
        }

        self.tickets.delete_ticket(ticket_id).await?;
        tracing::info!(ticket_id, by = %caller.email, "ticket removed");
        Ok(())
    }

    pub async fn counters(&self) -> Result<Counters> {
        self.tickets.get_counters().await
    }

    pub async fn fetch(&self, query: TicketQuery) -> Result<Vec<TicketSummary>> {
        self.tickets.find_tickets(query.into_filter()?).await
    }

    pub async fn info(&self, ticket_id: &str) -> Result<TicketDetails> {
        require_non_empty("ticket_id", ticket_id)?;
        self.tickets.get_ticket_details(ticket_id).await
    }

    /// Changes the status, then counts the new status.
    ///
    /// These are two separate transactions: a failure between them leaves the
    /// counters one short of the ticket's real history.
    // TODO: run the update and the increment in one transaction once TicketRepo exposes a combined operation.
    pub async fn edit(&self, ticket_id: &str, status: TicketStatus) -> Result<()> {
        require_non_empty("ticket_id", ticket_id)?;
        self.tickets.update_ticket_status(ticket_id, status).await?;
        self.tickets.count_ticket(status).await?;

        tracing::info!(ticket_id, %status, "ticket status changed");
        Ok(())
    }

    /// Appends a reply to the ticket's history.
    pub async fn reply(&self, ticket_id: &str, message: &str) -> Result<TicketHistory> {
        require_non_empty("ticket_id", ticket_id)?;
        require_non_empty("ticket_return", message)?;
        self.tickets.add_ticket_history(ticket_id, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hd_core::error::Resource;
    use hd_core::models::Role;
    use hd_core::traits::MockTicketRepo;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn caller(email: &str, role: Role) -> Identity {
        Identity { user_id: 1, email: email.into(), role }
    }

    fn stored(author: &str) -> Ticket {
        Ticket::new("t", "d", author)
    }

    #[tokio::test]
    async fn create_stores_then_counts_pending() {
        let mut repo = MockTicketRepo::new();
        let mut seq = Sequence::new();
        repo.expect_create_ticket()
            .withf(|t, imgs| t.status == TicketStatus::Pending && imgs.len() == 1 && imgs[0].ticket_id == t.id)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|mut t, _| {
                t.author_id = 5;
                Ok(t)
            });
        repo.expect_count_ticket()
            .with(eq(TicketStatus::Pending))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let image = NewImage {
            name: "shot.png".into(),
            content_type: "image/png".into(),
            content_base64: "aGVsbG8=".into(),
        };
        let created = TicketService::new(Arc::new(repo))
            .create(&caller("a@example.com", Role::User), "VPN", "down", vec![image])
            .await
            .unwrap();
        assert_eq!(created.author_id, 5);
    }

    #[tokio::test]
    async fn create_rejects_bad_image_without_storing() {
        let mut repo = MockTicketRepo::new();
        repo.expect_create_ticket().times(0);

        let image = NewImage {
            name: "x.bmp".into(),
            content_type: "image/bmp".into(),
            content_base64: "aGVsbG8=".into(),
        };
        let err = TicketService::new(Arc::new(repo))
            .create(&caller("a@example.com", Role::User), "VPN", "down", vec![image])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_does_not_count_when_author_is_missing() {
        let mut repo = MockTicketRepo::new();
        repo.expect_create_ticket()
            .returning(|_, _| Err(AppError::NotFound(Resource::Author)));
        repo.expect_count_ticket().times(0);

        let err = TicketService::new(Arc::new(repo))
            .create(&caller("ghost@example.com", Role::User), "VPN", "down", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(Resource::Author)));
    }

    #[tokio::test]
    async fn non_owner_user_cannot_remove() {
        let mut repo = MockTicketRepo::new();
        repo.expect_get_ticket().returning(|_| Ok(stored("owner@example.com")));
        repo.expect_delete_ticket().times(0);

        let err = TicketService::new(Arc::new(repo))
            .remove(&caller("other@example.com", Role::User), "ticket_1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn owner_and_staff_can_remove() {
        let mut repo = MockTicketRepo::new();
        repo.expect_get_ticket().returning(|_| Ok(stored("owner@example.com")));
        repo.expect_delete_ticket().times(2).returning(|_| Ok(()));
        let svc = TicketService::new(Arc::new(repo));

        svc.remove(&caller("owner@example.com", Role::User), "ticket_1").await.unwrap();
        svc.remove(&caller("admin@example.com", Role::Admin), "ticket_1").await.unwrap();
    }

    #[tokio::test]
    async fn edit_counts_only_after_a_real_change() {
        let mut repo = MockTicketRepo::new();
        repo.expect_update_ticket_status()
            .returning(|_, status| match status {
                TicketStatus::Doing => Err(AppError::NoStatusChange("doing".into())),
                _ => Ok(()),
            });
        repo.expect_count_ticket()
            .with(eq(TicketStatus::Concluded))
            .times(1)
            .returning(|_| Ok(()));
        let svc = TicketService::new(Arc::new(repo));

        assert!(matches!(
            svc.edit("ticket_1", TicketStatus::Doing).await,
            Err(AppError::NoStatusChange(_))
        ));
        svc.edit("ticket_1", TicketStatus::Concluded).await.unwrap();
    }

    #[test]
    fn query_parses_into_filter() {
        let filter = TicketQuery {
            author: Some("a@example.com".into()),
            status: Some("doing".into()),
            date: Some("2024-02-29".into()),
            name: Some("  ".into()),
        }
        .into_filter()
        .unwrap();

        assert_eq!(filter.author_email.as_deref(), Some("a@example.com"));
        assert_eq!(filter.status, Some(TicketStatus::Doing));
        assert_eq!(filter.created_since, NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(filter.name, None);
    }

    #[test]
    fn query_rejects_bad_date_and_status() {
        let bad_date = TicketQuery { date: Some("29/02/2024".into()), ..Default::default() };
        assert!(matches!(bad_date.into_filter(), Err(AppError::Validation(_))));

        let bad_status = TicketQuery { status: Some("closed".into()), ..Default::default() };
        assert!(matches!(bad_status.into_filter(), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_reply_is_rejected() {
        let mut repo = MockTicketRepo::new();
        repo.expect_add_ticket_history().times(0);

        let err = TicketService::new(Arc::new(repo)).reply("ticket_1", "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
