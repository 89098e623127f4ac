//! Label lookup and management.

use mailsweep_gmail::{Gateway, Label};
use tracing::info;

use crate::error::Result;
use crate::filter::is_query_safe;
use crate::validation::ValidationError;

/// Finds a label by case-insensitive name.
///
/// # Errors
///
/// Returns an error if the label listing fails.
pub async fn find_label<G: Gateway>(gateway: &G, name: &str) -> Result<Option<Label>> {
    let name = name.trim();
    let labels = gateway.list_labels().await?;
    Ok(labels
        .into_iter()
        .find(|l| l.name.eq_ignore_ascii_case(name)))
}

/// Returns the label named `name`, creating it if absent.
///
/// # Errors
///
/// Returns a validation error for an unusable name, or the error of the
/// listing or create call.
pub async fn ensure_label<G: Gateway>(gateway: &G, name: &str) -> Result<Label> {
    if !is_query_safe(name, true) {
        return Err(ValidationError::InvalidLabel.into());
    }
    if let Some(label) = find_label(gateway, name).await? {
        return Ok(label);
    }
    let label = gateway.create_label(name.trim()).await?;
    info!(label = %label.name, id = %label.id, "Created label");
    Ok(label)
}

/// Every label of the mailbox, user labels first, each group by name.
///
/// # Errors
///
/// Returns an error if the listing fails.
pub async fn list_labels<G: Gateway>(gateway: &G) -> Result<Vec<Label>> {
    let mut labels = gateway.list_labels().await?;
    labels.sort_by(|a, b| {
        a.is_system()
            .cmp(&b.is_system())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(labels)
}

/// Creates a user label; an existing label with the same name is returned
/// instead.
///
/// # Errors
///
/// See [`ensure_label`].
pub async fn create_label<G: Gateway>(gateway: &G, name: &str) -> Result<Label> {
    ensure_label(gateway, name).await
}

/// Deletes a user label by ID.
///
/// # Errors
///
/// Returns [`ValidationError::SystemLabel`] for Gmail-owned labels,
/// [`ValidationError::UnknownLabel`] for unknown IDs, or the error of the
/// delete call.
pub async fn delete_label<G: Gateway>(gateway: &G, label_id: &str) -> Result<()> {
    let labels = gateway.list_labels().await?;
    let label = labels
        .iter()
        .find(|l| l.id == label_id)
        .ok_or(ValidationError::UnknownLabel)?;
    if label.is_system() {
        return Err(ValidationError::SystemLabel.into());
    }
    gateway.delete_label(label_id).await?;
    info!(label = %label.name, "Deleted label");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::FakeGateway;
    use mailsweep_gmail::LabelType;

    #[tokio::test]
    async fn test_find_is_case_insensitive() {
        let gateway = FakeGateway::new();
        gateway.add_label("Label_1", "Newsletters", LabelType::User);
        let label = find_label(&gateway, " newsLETTERS ").await.unwrap().unwrap();
        assert_eq!(label.id, "Label_1");
        assert!(find_label(&gateway, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let gateway = FakeGateway::new();
        let first = create_label(&gateway, "Receipts").await.unwrap();
        let second = create_label(&gateway, "receipts").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(gateway.created_labels(), vec!["Receipts"]);
    }

    #[tokio::test]
    async fn test_create_rejects_query_syntax() {
        let gateway = FakeGateway::new();
        let err = create_label(&gateway, "a\"b").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidLabel)));
        assert!(gateway.created_labels().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rejects_system_labels() {
        let gateway = FakeGateway::new();
        gateway.add_label("INBOX", "INBOX", LabelType::System);
        gateway.add_label("Label_7", "Old", LabelType::User);

        let err = delete_label(&gateway, "INBOX").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::SystemLabel)));
        let err = delete_label(&gateway, "Label_404").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::UnknownLabel)));

        delete_label(&gateway, "Label_7").await.unwrap();
        assert_eq!(gateway.deleted_labels(), vec!["Label_7"]);
    }

    #[tokio::test]
    async fn test_list_puts_user_labels_first() {
        let gateway = FakeGateway::new();
        gateway.add_label("INBOX", "INBOX", LabelType::System);
        gateway.add_label("Label_2", "zeta", LabelType::User);
        gateway.add_label("Label_1", "Alpha", LabelType::User);
        let names: Vec<String> = list_labels(&gateway)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "zeta", "INBOX"]);
    }
}
