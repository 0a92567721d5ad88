use std::sync::Arc;

use url::Url;

use crate::application::{
    notifications::Notifier, repos::MembersRepo, tokens::TokenSigner, tracker::CompletionTracker,
};

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct HttpState {
    pub members: Arc<dyn MembersRepo>,
    pub notifier: Notifier,
    pub signer: Arc<dyn TokenSigner>,
    pub tracker: CompletionTracker,
    /// Externally reachable base URL used for activation links.
    pub public_url: Url,
}
