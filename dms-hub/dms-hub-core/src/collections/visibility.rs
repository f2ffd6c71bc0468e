use uuid::Uuid;

use crate::auth::{authorize, Operation, Subject, User};
use crate::error::DmsResult;
use crate::events::Event;
use crate::hub::{DmsHub, Effects};
use crate::types::{Collection, Visibility};

impl DmsHub {
    pub fn make_collection_public(&self, actor: &User, id: Uuid) -> DmsResult<Collection> {
        self.set_visibility(actor, id, Visibility::Public)
    }

    pub fn make_collection_private(&self, actor: &User, id: Uuid) -> DmsResult<Collection> {
        self.set_visibility(actor, id, Visibility::Private)
    }

    /// Flip the visibility of one collection and reindex its documents in the
    /// same transaction; a failed reindex keeps the previous visibility.
    /// Descendants keep their own flag.
    fn set_visibility(
        &self,
        actor: &User,
        id: Uuid,
        visibility: Visibility,
    ) -> DmsResult<Collection> {
        let mut store = self.store().write();
        let current = store.tree().require(id)?.clone();
        if current.visibility() == visibility {
            return Ok(current);
        }
        authorize(actor, Operation::ChangeCollectionVisibility, Subject::from(&current))?;

        let reindexer = self.reindexer();
        let updated = store.transaction(|s| {
            let node = s.tree_mut().require_mut(id)?;
            node.is_private = visibility == Visibility::Private;
            node.color = visibility.conventional_color().to_string();
            node.updated_at = chrono::Utc::now();
            let updated = node.clone();
            let documents = s.memberships().distinct_documents(id);
            reindexer.reindex_documents(s, &documents)?;
            Ok(updated)
        })?;

        let mut effects = Effects::default();
        effects.forget_both(actor);
        effects.forget_listing_of(&current);
        effects.forget_listing_of(&updated);
        effects.emit(Event::VisibilityChanged { id, visibility });
        tracing::info!(collection = %id, visibility = visibility.as_str(), "collection visibility changed");
        self.finish(&mut store, effects);
        Ok(updated)
    }
}
