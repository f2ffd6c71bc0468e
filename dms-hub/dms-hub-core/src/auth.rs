//! Capability-based authorization for collection and document operations.
//!
//! Each operation kind maps to a [`Rule`] expression evaluated against the
//! acting user, the subject's owner and the subject's visibility. Operations
//! call [`authorize`] once, before any write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DmsError, DmsResult};
use crate::types::{Collection, DocumentDescriptor, UserId, Visibility};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageOwnCollections,
    ManageInstitutionCollections,
    UploadDocuments,
    EditDocument,
    DeleteDocument,
    ChangeVisibility,
    CleanTrash,
    ShareWithPersonal,
    ShareWithPrivate,
    ReceiveAndSeeShare,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::ManageOwnCollections,
        Capability::ManageInstitutionCollections,
        Capability::UploadDocuments,
        Capability::EditDocument,
        Capability::DeleteDocument,
        Capability::ChangeVisibility,
        Capability::CleanTrash,
        Capability::ShareWithPersonal,
        Capability::ShareWithPrivate,
        Capability::ReceiveAndSeeShare,
    ];
}

/// Capability presets handed to new accounts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectManager,
    Partner,
    Guest,
}

impl Role {
    pub fn capabilities(&self) -> Vec<Capability> {
        use Capability::*;
        match self {
            Role::Admin | Role::ProjectManager => Capability::ALL.to_vec(),
            Role::Partner => vec![
                ManageOwnCollections,
                UploadDocuments,
                EditDocument,
                DeleteDocument,
                ShareWithPersonal,
                ShareWithPrivate,
                ReceiveAndSeeShare,
            ],
            Role::Guest => vec![ReceiveAndSeeShare],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub capabilities: BTreeSet<Capability>,
}

impl User {
    pub fn new(id: UserId, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            id,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn with_role(id: UserId, role: Role) -> Self {
        Self::new(id, role.capabilities())
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is(&self, other: UserId) -> bool {
        self.id == other
    }
}

/// Operation kinds gated by the policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    CreatePrivateCollection,
    CreatePublicCollection,
    EditCollection,
    DeleteCollection,
    ChangeCollectionVisibility,
    ManageMembership,
    UploadDocument,
    TrashDocument,
    PurgeDocument,
}

#[derive(Clone, Copy, Debug)]
pub enum Rule {
    Cap(Capability),
    /// The actor owns the subject.
    Owner,
    /// The subject is private.
    Private,
    All(&'static [Rule]),
    Any(&'static [Rule]),
}

/// What a rule is evaluated against.
#[derive(Clone, Copy, Debug, Default)]
pub struct Subject {
    pub owner: Option<UserId>,
    pub is_private: bool,
}

impl Subject {
    pub fn none() -> Self {
        Self::default()
    }
}

impl From<&Collection> for Subject {
    fn from(c: &Collection) -> Self {
        Self {
            owner: Some(c.owner),
            is_private: c.is_private,
        }
    }
}

impl From<&DocumentDescriptor> for Subject {
    fn from(d: &DocumentDescriptor) -> Self {
        Self {
            owner: Some(d.owner),
            is_private: d.visibility == Visibility::Private,
        }
    }
}

const MANAGE_OWN: Rule = Rule::Cap(Capability::ManageOwnCollections);
const MANAGE_INSTITUTION: Rule = Rule::Cap(Capability::ManageInstitutionCollections);

const EDIT_RULE: Rule = Rule::All(&[
    Rule::Any(&[Rule::Private, MANAGE_INSTITUTION]),
    Rule::Any(&[Rule::Owner, MANAGE_OWN]),
]);

const DELETE_RULE: Rule = Rule::Any(&[
    Rule::Owner,
    Rule::All(&[MANAGE_OWN, Rule::Any(&[Rule::Private, MANAGE_INSTITUTION])]),
]);

const CREATE_PUBLIC_RULE: Rule = Rule::All(&[MANAGE_OWN, MANAGE_INSTITUTION]);
const TRASH_DOCUMENT_RULE: Rule = Rule::Any(&[Rule::Owner, Rule::Cap(Capability::DeleteDocument)]);
const PURGE_DOCUMENT_RULE: Rule = Rule::Any(&[Rule::Owner, Rule::Cap(Capability::CleanTrash)]);

impl Operation {
    pub fn rule(&self) -> Rule {
        match self {
            Operation::CreatePrivateCollection => MANAGE_OWN,
            Operation::CreatePublicCollection => CREATE_PUBLIC_RULE,
            Operation::EditCollection | Operation::ManageMembership => EDIT_RULE,
            Operation::DeleteCollection => DELETE_RULE,
            Operation::ChangeCollectionVisibility => MANAGE_INSTITUTION,
            Operation::UploadDocument => Rule::Cap(Capability::UploadDocuments),
            Operation::TrashDocument => TRASH_DOCUMENT_RULE,
            Operation::PurgeDocument => PURGE_DOCUMENT_RULE,
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Operation::CreatePrivateCollection => "You are not allowed to create personal collections",
            Operation::CreatePublicCollection => "You are not allowed to create institution collections",
            Operation::EditCollection => "You are not allowed to edit this collection",
            Operation::DeleteCollection => "You are not allowed to delete this collection",
            Operation::ChangeCollectionVisibility => {
                "You are not allowed to change the visibility of this collection"
            }
            Operation::ManageMembership => {
                "You are not allowed to add or remove documents from this collection"
            }
            Operation::UploadDocument => "You are not allowed to upload documents",
            Operation::TrashDocument => "You are not allowed to delete this document",
            Operation::PurgeDocument => "You are not allowed to permanently delete this document",
        }
    }
}

impl Rule {
    pub fn allows(&self, actor: &User, subject: Subject) -> bool {
        match self {
            Rule::Cap(cap) => actor.can(*cap),
            Rule::Owner => subject.owner.map_or(false, |o| actor.is(o)),
            Rule::Private => subject.is_private,
            Rule::All(rules) => rules.iter().all(|r| r.allows(actor, subject)),
            Rule::Any(rules) => rules.iter().any(|r| r.allows(actor, subject)),
        }
    }
}

pub fn authorize(actor: &User, op: Operation, subject: Subject) -> DmsResult<()> {
    if op.rule().allows(actor, subject) {
        Ok(())
    } else {
        tracing::debug!(user = actor.id, ?op, "operation denied");
        Err(DmsError::forbidden(op.denial()))
    }
}

/// Rule for creating a collection with the given visibility.
pub fn create_operation(is_private: bool) -> Operation {
    if is_private {
        Operation::CreatePrivateCollection
    } else {
        Operation::CreatePublicCollection
    }
}
