//! Input validation errors.

/// Input rejected before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `date_from` is after `date_to`.
    DateRangeInverted,
    /// `size_min` is zero.
    SizeMinZero,
    /// Sender is blank or contains query syntax.
    InvalidSender,
    /// Label name is blank or contains query syntax.
    InvalidLabel,
    /// No senders were selected for an action.
    NoSenders,
    /// A search query is blank.
    EmptyQuery,
    /// No thread IDs were given for an export.
    NoThreads,
    /// System labels cannot be deleted.
    SystemLabel,
    /// The named label does not exist.
    UnknownLabel,
    /// The unsubscribe link is missing or not a supported URL.
    InvalidLink,
    /// The unsubscribe link points at a local or private address.
    UnsafeLink,
    /// The operation kind cannot be used here.
    WrongOperation,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::DateRangeInverted => "Start date must not be after end date",
            Self::SizeMinZero => "Minimum size must be greater than zero",
            Self::InvalidSender => "Sender must be an address or domain without spaces or quotes",
            Self::InvalidLabel => "Label name must not be empty or contain quotes or parentheses",
            Self::NoSenders => "No senders selected",
            Self::EmptyQuery => "Search query cannot be empty",
            Self::NoThreads => "No threads selected",
            Self::SystemLabel => "System labels cannot be deleted",
            Self::UnknownLabel => "Label not found",
            Self::InvalidLink => "Unsubscribe link must be an http(s) or mailto URL",
            Self::UnsafeLink => "Unsubscribe link points to a local or private address",
            Self::WrongOperation => "Operation not supported for this kind",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::DateRangeInverted => "date_from",
            Self::SizeMinZero => "size_min",
            Self::InvalidSender => "sender",
            Self::InvalidLabel | Self::SystemLabel | Self::UnknownLabel => "label",
            Self::NoSenders => "senders",
            Self::EmptyQuery => "query",
            Self::NoThreads => "thread_ids",
            Self::InvalidLink | Self::UnsafeLink => "link",
            Self::WrongOperation => "kind",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}
