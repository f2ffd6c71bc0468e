mod common;

use common::{admin, fixture, partner};
use dms_hub_core::types::{DocumentDescriptor, DocumentStatus, Visibility};
use dms_hub_core::DmsError;

#[test]
fn attaching_twice_creates_duplicates_until_cleaned() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "invoice.pdf");

    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc], false)
        .unwrap();
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc], false)
        .unwrap();
    assert_eq!(fx.hub.documents_in(inbox.id), vec![doc, doc]);
    assert_eq!(fx.hub.duplicate_memberships(), vec![(inbox.id, 1)]);

    let removed = fx.hub.clean_duplicate_memberships(&user, inbox.id).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(fx.hub.documents_in(inbox.id), vec![doc]);
    assert!(fx.hub.duplicate_memberships().is_empty());
    assert_eq!(fx.hub.clean_duplicate_memberships(&user, inbox.id).unwrap(), 0);
}

#[test]
fn reindex_pushes_owner_scoped_tag_for_private_collection() {
    let fx = fixture();
    let user = admin(7);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "contract.pdf");

    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc], true)
        .unwrap();

    let pushed = fx.index.last_update(doc).unwrap();
    assert_eq!(pushed.collections, vec![format!("7:{}", inbox.id)]);
    assert_eq!(pushed.visibility, Visibility::Private);
    assert_eq!(fx.hub.document(doc).unwrap().status, DocumentStatus::Indexed);
}

#[test]
fn batch_add_keeps_document_visibility_but_single_add_forces_private() {
    let fx = fixture();
    let user = admin(1);
    let shared = fx.public(&user, "Shared", None);
    let descriptor = DocumentDescriptor::new("memo.txt", user.id, common::INSTITUTION, Visibility::Public);
    let doc = fx.hub.index_document(&user, descriptor, None).unwrap().id;

    fx.hub
        .add_documents_to_collection(&user, shared.id, &[doc], true)
        .unwrap();
    let pushed = fx.index.last_update(doc).unwrap();
    assert_eq!(pushed.visibility, Visibility::Public);
    assert_eq!(pushed.collections, vec![format!("0:{}", shared.id)]);

    let other = fx.public(&user, "Other", None);
    fx.hub
        .add_document_to_collection(&user, other.id, doc, true)
        .unwrap();
    let pushed = fx.index.last_update(doc).unwrap();
    assert_eq!(pushed.visibility, Visibility::Private);
    assert_eq!(pushed.collections.len(), 2);
}

#[test]
fn reindex_failure_is_reported_after_rows_commit() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let good = fx.document(&user, "good.pdf");
    let bad = fx.document(&user, "bad.pdf");
    fx.index.fail(bad, 500);

    let err = fx
        .hub
        .add_documents_to_collection(&user, inbox.id, &[good, bad], true)
        .unwrap_err();

    match err {
        DmsError::ReindexFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].document, bad);
            assert_eq!(failures[0].status, 500);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.hub.documents_in(inbox.id), vec![good, bad]);
    assert_eq!(fx.hub.document(good).unwrap().status, DocumentStatus::Indexed);
    assert_eq!(fx.hub.document(bad).unwrap().status, DocumentStatus::Error);
}

#[test]
fn attaching_unknown_documents_fails() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let err = fx
        .hub
        .add_documents_to_collection(&user, inbox.id, &[uuid::Uuid::new_v4()], false)
        .unwrap_err();
    assert!(matches!(err, DmsError::NotFound(_)));
    assert!(fx.hub.documents_in(inbox.id).is_empty());
}

#[test]
fn membership_on_institution_collection_needs_institution_rights() {
    let fx = fixture();
    let owner = admin(1);
    let inbox = fx.public(&owner, "Library", None);
    let intruder = partner(2);
    let doc = fx.document(&intruder, "mine.pdf");

    let err = fx
        .hub
        .add_documents_to_collection(&intruder, inbox.id, &[doc], false)
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert!(fx.hub.documents_in(inbox.id).is_empty());
}

#[test]
fn remove_counts_rows_and_reindexes() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "a.pdf");
    let kept = fx.document(&user, "b.pdf");
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc, doc, kept], false)
        .unwrap();

    let removed = fx
        .hub
        .remove_documents_from_collection(&user, inbox.id, &[doc], true)
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(fx.hub.documents_in(inbox.id), vec![kept]);
    assert!(fx.index.last_update(doc).unwrap().collections.is_empty());

    assert!(!fx
        .hub
        .remove_document_from_collection(&user, inbox.id, doc, false)
        .unwrap());
    assert!(fx
        .hub
        .remove_document_from_collection(&user, inbox.id, kept, true)
        .unwrap());
    assert_eq!(fx.index.last_update(kept).unwrap().visibility, Visibility::Private);
}

#[test]
fn move_documents_between_collections() {
    let fx = fixture();
    let user = admin(1);
    let from = fx.private(&user, "From", None);
    let to = fx.private(&user, "To", None);
    let doc = fx.document(&user, "report.pdf");
    fx.hub
        .add_documents_to_collection(&user, from.id, &[doc], false)
        .unwrap();
    fx.index.clear_log();

    fx.hub
        .move_documents_to_collection(&user, &[doc], from.id, to.id)
        .unwrap();

    assert!(fx.hub.documents_in(from.id).is_empty());
    assert_eq!(fx.hub.documents_in(to.id), vec![doc]);
    assert_eq!(fx.index.update_count(doc), 1);
    assert_eq!(
        fx.index.last_update(doc).unwrap().collections,
        vec![format!("1:{}", to.id)]
    );
}

#[test]
fn trashing_a_collection_reindexes_its_documents_without_it() {
    let fx = fixture();
    let user = admin(1);
    let keep = fx.private(&user, "Keep", None);
    let drop = fx.private(&user, "Drop", None);
    let doc = fx.document(&user, "a.pdf");
    fx.hub
        .add_documents_to_collection(&user, keep.id, &[doc], false)
        .unwrap();
    fx.hub
        .add_documents_to_collection(&user, drop.id, &[doc], false)
        .unwrap();

    fx.hub.delete_collection(&user, drop.id).unwrap();

    assert_eq!(
        fx.index.last_update(doc).unwrap().collections,
        vec![format!("1:{}", keep.id)]
    );
    assert!(fx.hub.documents_in(drop.id).is_empty());
}

#[test]
fn failed_post_commit_reindex_does_not_undo_delete() {
    let fx = fixture();
    let user = admin(1);
    let drop = fx.private(&user, "Drop", None);
    let doc = fx.document(&user, "a.pdf");
    fx.hub
        .add_documents_to_collection(&user, drop.id, &[doc], false)
        .unwrap();
    fx.index.fail_everything(503);

    assert!(fx.hub.delete_collection(&user, drop.id).unwrap());
    assert!(fx.hub.collection(drop.id).unwrap().is_trashed());
    assert_eq!(fx.hub.document(doc).unwrap().status, DocumentStatus::Error);
}

#[test]
fn foreign_documents_are_never_pushed() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let descriptor = DocumentDescriptor::new("remote.pdf", 99, "ELSEWHERE", Visibility::Private);
    let foreign = fx.hub.index_document(&user, descriptor, None).unwrap();
    assert!(fx.index.adds().is_empty());

    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[foreign.id], true)
        .unwrap();
    assert_eq!(fx.index.update_count(foreign.id), 0);
    assert_eq!(fx.hub.documents_in(inbox.id), vec![foreign.id]);
}

#[test]
fn visibility_change_reindexes_with_public_tag() {
    let fx = fixture();
    let user = admin(3);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "a.pdf");
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc], false)
        .unwrap();

    let updated = fx.hub.make_collection_public(&user, inbox.id).unwrap();
    assert!(!updated.is_private);
    assert_eq!(
        fx.index.last_update(doc).unwrap().collections,
        vec![format!("0:{}", inbox.id)]
    );

    fx.hub.make_collection_private(&user, inbox.id).unwrap();
    assert_eq!(
        fx.index.last_update(doc).unwrap().collections,
        vec![format!("3:{}", inbox.id)]
    );
}

#[test]
fn visibility_change_rolls_back_when_reindex_fails() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let ok = fx.document(&user, "ok.pdf");
    let broken = fx.document(&user, "broken.pdf");
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[ok, broken], false)
        .unwrap();
    fx.index.fail(broken, 500);
    let mut events = fx.hub.subscribe();

    let err = fx.hub.make_collection_public(&user, inbox.id).unwrap_err();
    assert!(matches!(err, DmsError::ReindexFailed { ref failures } if failures.len() == 1));

    let current = fx.hub.collection(inbox.id).unwrap();
    assert!(current.is_private);
    assert_eq!(current.color, inbox.color);
    assert_eq!(fx.hub.document(broken).unwrap().status, DocumentStatus::Error);
    assert!(events.try_recv().is_err());

    fx.index.heal();
    assert!(!fx.hub.make_collection_public(&user, inbox.id).unwrap().is_private);
}

#[test]
fn reindex_collection_pushes_each_document_once() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let a = fx.document(&user, "a.pdf");
    let b = fx.document(&user, "b.pdf");
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[a, b, a], false)
        .unwrap();
    fx.index.clear_log();

    assert_eq!(fx.hub.reindex_collection(&user, inbox.id).unwrap(), 2);
    assert_eq!(fx.index.update_count(a), 1);
    assert_eq!(fx.index.update_count(b), 1);
}

#[test]
fn document_collections_hide_inaccessible_ones() {
    let fx = fixture();
    let owner = admin(1);
    let other = admin(2);
    let private = fx.private(&owner, "Mine", None);
    let public = fx.public(&owner, "Shared", None);
    let doc = fx.document(&owner, "a.pdf");
    fx.hub
        .add_documents_to_collection(&owner, private.id, &[doc], false)
        .unwrap();
    fx.hub
        .add_documents_to_collection(&owner, public.id, &[doc], false)
        .unwrap();

    assert_eq!(fx.hub.document_collections(doc, &owner).len(), 2);
    let visible: Vec<_> = fx
        .hub
        .document_collections(doc, &other)
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(visible, vec![public.id]);
}

#[test]
fn trashed_documents_stay_out_of_the_index() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "a.pdf");
    fx.hub
        .add_documents_to_collection(&user, inbox.id, &[doc], false)
        .unwrap();
    fx.hub.delete_document(&user, doc).unwrap();
    fx.index.clear_log();

    assert_eq!(fx.hub.reindex_collection(&user, inbox.id).unwrap(), 1);
    fx.hub.make_collection_public(&user, inbox.id).unwrap();
    fx.hub.delete_collection(&user, inbox.id).unwrap();

    assert_eq!(fx.index.update_count(doc), 0);
    assert!(!fx.index.is_indexed(doc));
    let stored = fx.hub.document(doc).unwrap();
    assert!(stored.is_trashed());
    assert_eq!(stored.status, DocumentStatus::NotIndexed);
}

#[test]
fn trashed_collection_rejects_membership_changes() {
    let fx = fixture();
    let user = admin(1);
    let inbox = fx.private(&user, "Inbox", None);
    let doc = fx.document(&user, "a.pdf");
    fx.hub.delete_collection(&user, inbox.id).unwrap();

    let err = fx
        .hub
        .add_documents_to_collection(&user, inbox.id, &[doc], true)
        .unwrap_err();
    assert!(matches!(err, DmsError::NotFound(_)));
    assert!(fx.hub.documents_in(inbox.id).is_empty());
    assert_eq!(fx.index.update_count(doc), 0);
}
