mod access;
mod attachments;
mod conversations;
mod entries;
mod error;
mod memberships;
mod transfers;

use std::sync::Arc;

pub use access::{AccessGrant, AccessService};
pub use attachments::{AttachmentService, start_attachment_cleanup_worker};
pub use conversations::ConversationService;
pub use entries::{EntryService, ListEntriesQuery};
pub use error::{CoreError, CoreResult};
pub use memberships::MembershipService;
pub use transfers::TransferService;

use crate::{
    blob::BlobStore, config::ServiceConfig, crypto::DekProvider, search::SearchCoordinator,
    store::StorePool,
};

/// Service layer aggregate handed to route handlers.
#[derive(Clone)]
pub struct Services {
    pub access: AccessService,
    pub conversations: ConversationService,
    pub entries: EntryService,
    pub memberships: MembershipService,
    pub transfers: TransferService,
    pub attachments: AttachmentService,
}

impl Services {
    pub fn new(
        store: Arc<StorePool>,
        crypto: DekProvider,
        search: Arc<SearchCoordinator>,
        blobs: Arc<dyn BlobStore>,
        config: &ServiceConfig,
        http: reqwest::Client,
    ) -> Self {
        let access = AccessService::new(Arc::clone(&store));
        Self {
            conversations: ConversationService::new(
                Arc::clone(&store),
                crypto.clone(),
                access.clone(),
            ),
            entries: EntryService::new(
                Arc::clone(&store),
                crypto.clone(),
                access.clone(),
                search,
            ),
            memberships: MembershipService::new(Arc::clone(&store), access.clone()),
            transfers: TransferService::new(Arc::clone(&store)),
            attachments: AttachmentService::new(
                store,
                blobs,
                crypto,
                config.attachments.clone(),
                http,
            ),
            access,
        }
    }
}
