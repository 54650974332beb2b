use thiserror::Error;

/// Failures scoped to a single list operation or feed event. None of these
/// are fatal to the owning view.
#[derive(Debug, Error)]
pub enum ListError {
    /// The upstream page fetch failed; the view keeps its last good state.
    #[error("challenge page fetch failed: {0}")]
    FetchFailed(#[from] anyhow::Error),
    /// A feed event carried an action this client does not recognize. Only
    /// that event is dropped.
    #[error("unrecognized challenge feed action")]
    InvalidFeedAction,
    /// The push feed transport closed; recovered by resubscribing, never
    /// surfaced to the caller.
    #[error("challenge feed subscription lost")]
    FeedSubscriptionLost,
}
