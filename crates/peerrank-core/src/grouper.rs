//! Partition an epoch's submissions by paper.

use std::collections::BTreeMap;
use std::sync::Arc;

use peerrank_state::ParticipantId;
use tracing::warn;

use crate::domain::{PaperCatalog, Submission, SubmissionStore};

/// Group responded submissions by paper id.
///
/// Submissions naming a paper that is not in the catalog are dropped with a
/// warning and listed in [`SubmissionStore::dropped`]. Within a group,
/// submissions keep participant order.
pub fn group_by_paper(
    responded: BTreeMap<ParticipantId, Submission>,
    catalog: Arc<PaperCatalog>,
) -> SubmissionStore {
    let mut store = SubmissionStore::new(catalog);
    for (_, submission) in responded {
        if let Err(dropped) = store.admit(submission) {
            warn!(
                event = "group.unknown_paper",
                participant = %dropped.participant,
                paper_id = %dropped.paper_id,
                "dropping submission for unknown paper"
            );
        }
    }
    store
}
